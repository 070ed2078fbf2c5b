//! Palm detection.

use std::path::Path;

use nalgebra::{Rotation2, Vector2};

use crate::detection::{
    angle_between,
    ssd::{extract_detections, Anchors, LayerInfo},
    Detection, Detections, Network,
};
use crate::image::{Rect, RotatedRect};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;

const LAYERS: &[LayerInfo] = &[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)];

/// The MediaPipe palm detection network, in its "lite" or "full" variant.
///
/// Both variants share input size, anchors and output layout. The full network is slower but
/// detects palms more reliably.
pub struct PalmNetwork {
    cnn: Cnn,
    anchors: Anchors,
}

impl PalmNetwork {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(
                NeuralNetwork::from_path(path)?.load()?,
                CnnInputShape::NCHW,
                ColorMapper::linear(0.0..=1.0),
            )?,
            anchors: Anchors::calculate(LAYERS),
        })
    }
}

impl Network for PalmNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Detections,
    ) -> anyhow::Result<()> {
        extract_detections(
            self.cnn.input_resolution(),
            &self.anchors,
            NUM_KEYPOINTS,
            outputs,
            threshold,
            detections,
        )?;

        for det in detections.iter_mut() {
            let kps = det.keypoints();
            let angle = angle_between(
                [0.0, -1.0],
                kps[Keypoint::Wrist as usize],
                kps[Keypoint::MiddleFingerMcp as usize],
            );
            det.set_angle(angle);
        }
        Ok(())
    }
}

/// Computes the region of interest for the hand landmark network from a palm detection.
///
/// The palm box only covers the palm, so the RoI is shifted towards the fingers and enlarged to
/// contain the whole hand.
pub fn detection_roi(det: &Detection) -> RotatedRect {
    let rect = det.bounding_rect();
    let size = rect.width().max(rect.height());
    let shift = Rotation2::new(det.angle()) * Vector2::new(0.0, -0.5 * rect.height());
    let center = rect.center() + shift;

    RotatedRect::new(
        Rect::from_center(center.x, center.y, size, size),
        det.angle(),
    )
    .grow_rel(0.8)
}
