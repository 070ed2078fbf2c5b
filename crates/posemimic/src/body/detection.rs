//! Human body detection.
//!
//! The MediaPipe pose detector finds people by their face and upper body, and computes keypoints
//! that describe the alignment of the whole body.

use std::path::Path;

use crate::detection::{
    angle_between,
    ssd::{extract_detections, Anchors, LayerInfo},
    Detection, Detections, Network,
};
use crate::image::{Rect, RotatedRect};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// Keypoints estimated by the detection network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    /// Midpoint between the hips.
    Hips = 0,
    /// Point above the head; its distance to [`Keypoint::Hips`] is the radius of a circle
    /// enclosing the whole body.
    FullBody = 1,
    /// Midpoint between the shoulders.
    Shoulders = 2,
    /// Point enclosing the upper body together with [`Keypoint::Shoulders`].
    UpperBody = 3,
}

const NUM_KEYPOINTS: usize = 4;

const LAYERS: &[LayerInfo] = &[
    LayerInfo::new(2, 28, 28),
    LayerInfo::new(2, 14, 14),
    LayerInfo::new(6, 7, 7),
];

/// Body pose detection network.
///
/// Use with [`Detector`](crate::detection::Detector).
pub struct PoseNetwork {
    cnn: Cnn,
    anchors: Anchors,
}

impl PoseNetwork {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(
                NeuralNetwork::from_path(path)?.load()?,
                CnnInputShape::NCHW,
                ColorMapper::linear(-1.0..=1.0),
            )?,
            anchors: Anchors::calculate(LAYERS),
        })
    }
}

impl Network for PoseNetwork {
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
                kps[Keypoint::Hips as usize],
                kps[Keypoint::FullBody as usize],
            );
            det.set_angle(angle);
        }
        Ok(())
    }
}

/// Computes the region of interest for the pose landmark network from a body detection.
///
/// The RoI is a square centered on the hips that encloses the circle described by the
/// [`Keypoint::Hips`] and [`Keypoint::FullBody`] keypoints.
pub fn detection_roi(det: &Detection) -> RotatedRect {
    let kps = det.keypoints();
    let hips = kps[Keypoint::Hips as usize];
    let full = kps[Keypoint::FullBody as usize];
    let radius = (full.x() - hips.x()).hypot(full.y() - hips.y());
    let size = radius * 2.0;

    RotatedRect::new(
        Rect::from_center(hips.x(), hips.y(), size, size),
        det.angle(),
    )
    .grow_rel(0.125)
}
