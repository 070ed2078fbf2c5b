//! Common code for visual landmark estimation.

use std::iter;

use crate::filter::Filter;
use crate::image::{AsImageView, AspectRatio, ImageView, Resolution, RotatedRect};
use crate::iter::zip_exact;
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

/// A landmark position. X and Y are in pixels, Z uses roughly the same scale as X.
pub type Position = [f32; 3];

/// A fixed-size list of landmarks, with optional per-landmark visibility and presence scores.
#[derive(Debug, Clone)]
pub struct Landmarks {
    positions: Box<[Position]>,
    visibility: Option<Box<[f32]>>,
    presence: Option<Box<[f32]>>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` landmarks at the origin.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
            visibility: None,
            presence: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        (0..self.positions.len()).map(|i| self.get(i))
    }

    pub fn get(&self, index: usize) -> Landmark {
        let mut lm = Landmark::new(self.positions[index]);
        if let Some(vis) = &self.visibility {
            lm = lm.with_visibility(vis[index]);
        }
        if let Some(pres) = &self.presence {
            lm = lm.with_presence(pres[index]);
        }
        lm
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        let len = self.positions.len();
        self.positions[index] = landmark.pos;
        if let Some(vis) = landmark.visibility {
            self.visibility.get_or_insert_with(|| vec![0.0; len].into())[index] = vis;
        }
        if let Some(pres) = landmark.presence {
            self.presence.get_or_insert_with(|| vec![0.0; len].into())[index] = pres;
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }
}

/// A landmark in 3D space.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
    presence: Option<f32>,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self {
            visibility: Some(visibility),
            ..self
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Probability that the landmark is visible (not occluded), if the network computes it.
    pub fn visibility(&self) -> Option<f32> {
        self.visibility
    }

    /// Probability that the landmark is inside the image, if the network computes it.
    pub fn presence(&self) -> Option<f32> {
        self.presence
    }
}

/// Batch-filter for landmark positions.
///
/// Every coordinate of every landmark is filtered as an independent signal.
pub struct LandmarkFilter {
    filter: Box<dyn FnMut(&mut Landmarks) + Send>,
    reset: Box<dyn FnMut() + Send>,
}

/// The default [`LandmarkFilter`] does not perform any filtering.
impl Default for LandmarkFilter {
    fn default() -> Self {
        Self {
            filter: Box::new(|_| ()),
            reset: Box::new(|| ()),
        }
    }
}

impl LandmarkFilter {
    /// Creates a new landmark filter for batches of `num_landmarks` landmarks.
    pub fn new<F>(filter: F, num_landmarks: usize) -> Self
    where
        F: Filter<f32> + Send + 'static,
        F::State: Send,
    {
        let new_states = move || {
            iter::repeat_with(<[F::State; 3]>::default)
                .take(num_landmarks)
                .collect::<Vec<_>>()
        };
        let states = std::sync::Arc::new(std::sync::Mutex::new(new_states()));
        let reset_states = states.clone();

        Self {
            filter: Box::new(move |landmarks| {
                let mut states = states.lock().unwrap_or_else(|e| e.into_inner());
                for (lm, state) in zip_exact(landmarks.positions_mut(), states.iter_mut()) {
                    for (coord, state) in zip_exact(lm, state) {
                        *coord = filter.filter(state, *coord);
                    }
                }
            }),
            reset: Box::new(move || {
                *reset_states.lock().unwrap_or_else(|e| e.into_inner()) = new_states();
            }),
        }
    }

    /// Filters a list of landmarks in-place.
    ///
    /// # Panics
    ///
    /// This method panics if `landmarks` does not have exactly as many entries as were specified in
    /// the `num_landmarks` parameter in the call to [`LandmarkFilter::new`].
    pub fn filter(&mut self, landmarks: &mut Landmarks) {
        (self.filter)(landmarks);
    }

    /// Forgets the filter history, so that the next batch passes through unchanged.
    pub fn reset(&mut self) {
        (self.reset)();
    }
}

/// Trait for landmark estimation results returned by [`Estimator::estimate`].
pub trait Estimate: Send + 'static {
    fn landmarks(&self) -> &Landmarks;

    fn landmarks_mut(&mut self) -> &mut Landmarks;

    /// Returns the estimated clockwise object rotation in radians.
    ///
    /// [`LandmarkTracker`] uses this to keep the RoI aligned with the tracked object. Returning
    /// [`None`] keeps the RoI axis-aligned.
    fn angle_radians(&self) -> Option<f32> {
        None
    }
}

/// Trait for network inference results that contain a confidence value.
///
/// [`LandmarkTracker`] uses this to decide when the tracked object was lost.
pub trait Confidence {
    /// Confidence value indicating whether the tracked object is in view, from 0.0 to 1.0.
    fn confidence(&self) -> f32;
}

/// Trait implemented by wrapper types around neural networks that estimate landmarks.
pub trait Network: Send + 'static {
    /// Type representing the predicted landmarks.
    type Output: Estimate;

    /// Returns the [`Cnn`] to use for landmark estimation.
    fn cnn(&self) -> &Cnn;

    /// Extracts the network outputs and writes them to `estimate`.
    ///
    /// The landmark positions are expected to be in the coordinate system of the network's input.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Neural-network based landmark estimator.
pub struct Estimator<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
    t_infer: Timer,
    t_extract: Timer,
}

impl<E: Estimate + Default> Estimator<E> {
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
        }
    }
}

impl<E: Estimate> Estimator<E> {
    /// Returns the expected input resolution of the internal neural network.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }

    /// Performs landmark estimation on `image`.
    ///
    /// If the aspect ratio of `image` does not match the network's input, an enlarged view of the
    /// right aspect ratio is used. Returned landmarks are in the coordinate system of `image`.
    pub fn estimate<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&mut E> {
        self.estimate_impl(image.as_view())
    }

    fn estimate_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&mut E> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let aspect = input_res
            .aspect_ratio()
            .ok_or_else(|| anyhow::anyhow!("estimator input {input_res} has no aspect ratio"))?;

        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract
            .time(|| self.network.extract(&outputs, &mut self.estimate))?;

        // Network input coordinates -> `rect` coordinates -> `image` coordinates.
        let scale = rect.width() / input_res.width() as f32;
        self.estimate
            .landmarks_mut()
            .map_positions(|[x, y, z]| [x * scale + rect.x(), y * scale + rect.y(), z * scale]);

        Ok(&mut self.estimate)
    }
}

/// Tracks a region of interest (RoI) across subsequent frames by following the estimated
/// landmarks.
///
/// Once seeded with a RoI (usually derived from a detection), the tracker moves the RoI to the
/// padded bounding rectangle of the landmarks after every frame. If the estimate's
/// [`Confidence`] drops below the loss threshold, the RoI is cleared and has to be seeded again.
pub struct LandmarkTracker<E: Estimate + Confidence> {
    aspect_ratio: AspectRatio,
    estimator: Estimator<E>,
    roi: Option<RotatedRect>,
    loss_thresh: f32,
    roi_padding: f32,
}

impl<E: Estimate + Confidence> LandmarkTracker<E> {
    pub const DEFAULT_LOSS_THRESHOLD: f32 = 0.5;

    pub const DEFAULT_ROI_PADDING: f32 = 0.3;

    pub fn new(estimator: Estimator<E>) -> anyhow::Result<Self> {
        let res = estimator.input_resolution();
        Ok(Self {
            aspect_ratio: res
                .aspect_ratio()
                .ok_or_else(|| anyhow::anyhow!("estimator input {res} has no aspect ratio"))?,
            estimator,
            roi: None,
            loss_thresh: Self::DEFAULT_LOSS_THRESHOLD,
            roi_padding: Self::DEFAULT_ROI_PADDING,
        })
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> {
        self.estimator.timers()
    }

    /// Sets the confidence below which tracking is considered lost.
    pub fn set_loss_threshold(&mut self, threshold: f32) {
        self.loss_thresh = threshold;
    }

    /// Sets the relative amount of padding added to each side of the landmarks' bounding rectangle.
    ///
    /// # Panics
    ///
    /// This method panics when `padding` is less than 0.0 or NaN.
    pub fn set_roi_padding(&mut self, padding: f32) {
        assert!(padding >= 0.0);
        self.roi_padding = padding;
    }

    /// Returns the current region of interest, or [`None`] if nothing is being tracked.
    pub fn roi(&self) -> Option<&RotatedRect> {
        self.roi.as_ref()
    }

    /// Sets the region of interest. No padding is applied.
    pub fn set_roi(&mut self, roi: impl Into<RotatedRect>) {
        self.roi = Some(roi.into());
    }

    /// Performs landmark tracking on `full_image`.
    ///
    /// Returns `Ok(None)` if no RoI is set or if tracking was lost in this frame. The landmarks of
    /// the returned estimate are in `full_image` coordinates.
    pub fn track<V: AsImageView>(&mut self, full_image: &V) -> anyhow::Result<Option<&E>> {
        self.track_impl(full_image.as_view())
    }

    fn track_impl(&mut self, full_image: ImageView<'_>) -> anyhow::Result<Option<&E>> {
        let Some(roi) = self.roi else {
            return Ok(None);
        };
        let view_rect = roi.map(|rect| rect.grow_to_fit_aspect(self.aspect_ratio));
        let view = full_image.view(view_rect);
        let estimate = match self.estimator.estimate(&view) {
            Ok(estimate) => estimate,
            Err(e) => {
                self.roi = None;
                return Err(e);
            }
        };
        if estimate.confidence() < self.loss_thresh {
            log::trace!(
                "LandmarkTracker: confidence {}, loss threshold {} -> LOST",
                estimate.confidence(),
                self.loss_thresh,
            );

            self.roi = None;
            return Ok(None);
        }

        let angle = match estimate.angle_radians() {
            Some(angle) => angle + roi.rotation_radians(),
            None => roi.rotation_radians(),
        };

        estimate.landmarks_mut().map_positions(|[x, y, z]| {
            let p = view_rect.transform_out([x, y]);
            [p.x, p.y, z]
        });

        let padding = self.roi_padding;
        let points = estimate.landmarks().iter().map(|lm| [lm.x(), lm.y()]);
        self.roi = RotatedRect::bounding(angle, points).map(|updated| updated.grow_rel(padding));

        Ok(Some(&*estimate))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::filter::ema::Ema;
    use crate::image::{Image, Rect};

    use super::*;

    /// Two landmarks at the corners of the network input, with a fixed confidence.
    #[derive(Debug, Clone)]
    struct Corners {
        landmarks: Landmarks,
        confidence: f32,
    }

    impl Default for Corners {
        fn default() -> Self {
            Self {
                landmarks: Landmarks::new(2),
                confidence: 0.0,
            }
        }
    }

    impl Estimate for Corners {
        fn landmarks(&self) -> &Landmarks {
            &self.landmarks
        }

        fn landmarks_mut(&mut self) -> &mut Landmarks {
            &mut self.landmarks
        }
    }

    impl Confidence for Corners {
        fn confidence(&self) -> f32 {
            self.confidence
        }
    }

    struct CornerNetwork {
        cnn: Cnn,
        confidence: f32,
    }

    impl Network for CornerNetwork {
        type Output = Corners;

        fn cnn(&self) -> &Cnn {
            &self.cnn
        }

        fn extract(&self, _: &Outputs, estimate: &mut Corners) -> anyhow::Result<()> {
            let res = self.cnn.input_resolution();
            let positions = estimate.landmarks.positions_mut();
            positions[0] = [0.0, 0.0, 0.0];
            positions[1] = [res.width() as f32, res.height() as f32, 0.0];
            estimate.confidence = self.confidence;
            Ok(())
        }
    }

    fn corner_tracker(confidence: f32) -> LandmarkTracker<Corners> {
        let cnn = Cnn::passthrough(Resolution::new(16, 16)).unwrap();
        let mut tracker =
            LandmarkTracker::new(Estimator::new(CornerNetwork { cnn, confidence })).unwrap();
        tracker.set_roi_padding(0.0);
        tracker
    }

    #[test]
    fn tracker_needs_roi() {
        let mut tracker = corner_tracker(1.0);
        let image = Image::new(64, 64);
        assert!(tracker.track(&image).unwrap().is_none());
        assert!(tracker.roi().is_none());
    }

    #[test]
    fn tracker_maps_landmarks_into_roi() {
        let mut tracker = corner_tracker(0.9);
        let image = Image::new(64, 64);
        tracker.set_roi(Rect::from_top_left(8.0, 12.0, 20.0, 20.0));

        let estimate = tracker.track(&image).unwrap().unwrap();
        let positions = estimate.landmarks().positions();
        assert_abs_diff_eq!(positions[0][0], 8.0, epsilon = 1e-4);
        assert_abs_diff_eq!(positions[0][1], 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(positions[1][0], 28.0, epsilon = 1e-4);
        assert_abs_diff_eq!(positions[1][1], 32.0, epsilon = 1e-4);

        // Without padding, the updated RoI is the landmarks' bounding rectangle.
        let roi = *tracker.roi().unwrap().rect();
        assert_abs_diff_eq!(roi.x(), 8.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.y(), 12.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.width(), 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.height(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn tracking_is_lost_below_threshold() {
        let mut tracker = corner_tracker(0.6);
        let image = Image::new(64, 64);
        tracker.set_roi(Rect::from_top_left(8.0, 8.0, 20.0, 20.0));

        // A confidence equal to the threshold keeps the object.
        tracker.set_loss_threshold(0.6);
        assert!(tracker.track(&image).unwrap().is_some());
        assert!(tracker.track(&image).unwrap().is_some());
        assert!(tracker.roi().is_some());

        tracker.set_loss_threshold(0.7);
        assert!(tracker.track(&image).unwrap().is_none());
        assert!(tracker.roi().is_none());

        // Once lost, the tracker stays idle until it gets a new RoI.
        tracker.set_loss_threshold(0.5);
        assert!(tracker.track(&image).unwrap().is_none());
        tracker.set_roi(Rect::from_top_left(0.0, 0.0, 16.0, 16.0));
        assert!(tracker.track(&image).unwrap().is_some());
    }

    #[test]
    fn landmark_scores_are_optional() {
        let mut lms = Landmarks::new(2);
        assert_eq!(lms.get(0).visibility(), None);

        lms.set(1, Landmark::new([1.0, 2.0, 3.0]).with_visibility(0.7));
        assert_eq!(lms.get(1).visibility(), Some(0.7));
        assert_eq!(lms.get(0).visibility(), Some(0.0));
        assert_eq!(lms.get(1).presence(), None);
        assert_eq!(lms.get(1).y(), 2.0);
    }

    #[test]
    fn filter_smooths_and_resets() {
        let mut filter = LandmarkFilter::new(Ema::new(0.5), 1);
        let mut lms = Landmarks::new(1);

        filter.filter(&mut lms);
        lms.positions_mut()[0] = [2.0, 4.0, 0.0];
        filter.filter(&mut lms);
        assert_eq!(lms.positions()[0], [1.0, 2.0, 0.0]);

        filter.reset();
        lms.positions_mut()[0] = [8.0, 8.0, 8.0];
        filter.filter(&mut lms);
        assert_eq!(lms.positions()[0], [8.0, 8.0, 8.0]);
    }

    #[test]
    fn default_filter_is_identity() {
        let mut filter = LandmarkFilter::default();
        let mut lms = Landmarks::new(1);
        lms.positions_mut()[0] = [3.0, 1.0, 2.0];
        filter.filter(&mut lms);
        assert_eq!(lms.positions()[0], [3.0, 1.0, 2.0]);
    }
}
