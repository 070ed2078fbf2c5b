//! Common functionality for object detection.
//!
//! The face, palm and body detectors all wrap an SSD network in a [`Detector`], which takes care
//! of letterboxing the input image, non-maximum suppression, and mapping the results back into the
//! coordinate system of the input image.

pub mod nms;
pub mod ssd;

use crate::image::{AsImageView, ImageView, Rect};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// Trait implemented by neural networks that detect objects in an input image.
pub trait Network: Send + 'static {
    /// Returns the [`Cnn`] to use for detection.
    fn cnn(&self) -> &Cnn;

    /// Extracts all detections with confidence above `threshold` from the network's output.
    ///
    /// Keypoint and detection positions are expected to be in the coordinate system of the
    /// network's input.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections,
    ) -> anyhow::Result<()>;
}

/// A list of object detections.
#[derive(Debug, Default)]
pub struct Detections {
    vec: Vec<Detection>,
}

impl Detections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn clear(&mut self) {
        self.vec.clear();
    }

    pub fn push(&mut self, detection: Detection) {
        self.vec.push(detection);
    }

    /// Returns an iterator yielding the stored detections, most confident first once the
    /// [`Detector`] has processed them.
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.vec.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Detection> {
        self.vec.iter_mut()
    }
}

/// A generic object detector wrapping a detection [`Network`].
pub struct Detector {
    network: Box<dyn Network>,
    detections: Detections,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
    thresh: f32,
    nms: NonMaxSuppression,
}

impl Detector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new<N: Network>(network: N) -> Self {
        Self {
            network: Box::new(network),
            detections: Detections::new(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
        }
    }

    /// Sets the minimum confidence a detection needs to be reported.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Runs the detector on `image`.
    ///
    /// Returned coordinates are in the coordinate system of `image`.
    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&Detections> {
        self.detect_impl(image.as_view())
    }

    fn detect_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&Detections> {
        self.detections.clear();

        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let aspect = input_res
            .aspect_ratio()
            .ok_or_else(|| anyhow::anyhow!("detector input {input_res} has no aspect ratio"))?;

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does. The out-of-bounds area reads as transparent black.
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract.time(|| {
            self.network
                .extract(&outputs, self.thresh, &mut self.detections)
        })?;

        self.t_nms.time(|| {
            let kept = self.nms.process(&mut self.detections.vec).collect::<Vec<_>>();
            self.detections.vec = kept;
        });

        // Map from the network's input coordinates back into `image`.
        let scale = rect.width() / input_res.width() as f32;
        for det in &mut self.detections.vec {
            let center = det.rect.center();
            det.rect = Rect::from_center(
                center.x * scale + rect.x(),
                center.y * scale + rect.y(),
                det.rect.width() * scale,
                det.rect.height() * scale,
            );
            for kp in &mut det.keypoints {
                kp.x = kp.x * scale + rect.x();
                kp.y = kp.y * scale + rect.y();
            }
        }

        Ok(&self.detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value
/// between 0.0 and 1.0, an optional rotation angle of the object, and a possibly empty set of
/// keypoints.
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the angle of the detected object, in radians, clockwise.
    ///
    /// Networks that do not compute an angle leave this at 0.0.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Sets the angle of the detected object, in radians, clockwise.
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }
}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on the specific detector and on its index in the keypoint
/// list. Keypoints are used to rotate and crop the detected object for landmark estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

/// Computes the clockwise angle (in image coordinates) by which the vector from `from` to `to`
/// is rotated relative to `reference`.
pub(crate) fn angle_between(reference: [f32; 2], from: Keypoint, to: Keypoint) -> f32 {
    use nalgebra::{Rotation2, Vector2};

    let v = Vector2::new(to.x() - from.x(), to.y() - from.y());
    Rotation2::rotation_between(&Vector2::new(reference[0], reference[1]), &v).angle()
}
