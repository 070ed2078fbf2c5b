//! Face detection module.
//!
//! This uses the short-range "BlazeFace" network from MediaPipe's [Face Detection] module, which
//! works best for faces within about 2 meters of the camera.
//!
//! [Face Detection]: https://google.github.io/mediapipe/solutions/face_detection

use std::path::Path;

use crate::detection::{
    angle_between,
    ssd::{extract_detections, Anchors, LayerInfo},
    Detection, Detections, Network,
};
use crate::image::{Rect, RotatedRect};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// Keypoints computed by the face detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    LeftEye = 0,
    RightEye = 1,
    NoseTip = 2,
    Mouth = 3,
    LeftTragion = 4,
    RightTragion = 5,
}

const NUM_KEYPOINTS: usize = 6;

const LAYERS: &[LayerInfo] = &[LayerInfo::new(2, 16, 16), LayerInfo::new(6, 8, 8)];

/// A small and efficient face detection network, best for faces in <2m of the camera.
pub struct ShortRangeNetwork {
    cnn: Cnn,
    anchors: Anchors,
}

impl ShortRangeNetwork {
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

impl Network for ShortRangeNetwork {
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
                [1.0, 0.0],
                kps[Keypoint::LeftEye as usize],
                kps[Keypoint::RightEye as usize],
            );
            det.set_angle(angle);
        }
        Ok(())
    }
}

/// Computes the region of interest to pass to the face mesh network for a face detection.
///
/// The RoI is a square around the detection box, rotated so that the eyes are level, and enlarged
/// so that the whole face fits.
pub fn detection_roi(det: &Detection) -> RotatedRect {
    let rect = det.bounding_rect();
    let size = rect.width().max(rect.height());
    let center = rect.center();
    RotatedRect::new(
        Rect::from_center(center.x, center.y, size, size),
        det.angle(),
    )
    .grow_rel(0.25)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::detection;

    #[test]
    fn roi_is_square_and_enlarged() {
        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(50.0, 40.0, 20.0, 10.0),
            vec![detection::Keypoint::new(0.0, 0.0); NUM_KEYPOINTS],
        );
        det.set_angle(0.1);

        let roi = detection_roi(&det);
        assert_abs_diff_eq!(roi.rect().width(), 30.0);
        assert_abs_diff_eq!(roi.rect().height(), 30.0);
        assert_abs_diff_eq!(roi.center().x, 50.0);
        assert_abs_diff_eq!(roi.center().y, 40.0);
        assert_eq!(roi.rotation_radians(), 0.1);
    }
}
