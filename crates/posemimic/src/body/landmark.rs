//! Body pose landmark prediction.

use std::path::Path;

use crate::detection::{angle_between, Keypoint};
use crate::image::{draw, AsImageViewMut, Color, ImageViewMut};
use crate::landmark::{Confidence, Estimate, Landmark, Landmarks, Network};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// Number of named pose landmarks, see [`LandmarkIdx`].
pub const NUM_POSE_LANDMARKS: usize = 33;

/// Number of auxiliary landmarks following the pose landmarks. They are used for RoI tracking.
const NUM_AUX_LANDMARKS: usize = 6;

/// Total number of landmarks in a [`LandmarkResult`].
pub const NUM_LANDMARKS: usize = NUM_POSE_LANDMARKS + NUM_AUX_LANDMARKS;

/// Auxiliary landmark at the center of the hips.
const AUX_HIPS: usize = NUM_POSE_LANDMARKS;
/// Auxiliary landmark marking the full-body rotation.
const AUX_FULL_BODY: usize = NUM_POSE_LANDMARKS + 1;

/// The MediaPipe pose landmark network, in its "lite" or "full" variant.
#[derive(Clone)]
pub struct PoseLandmarkNetwork {
    cnn: Cnn,
}

impl PoseLandmarkNetwork {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(
                // Segmentation, heatmap and world landmarks are not needed.
                NeuralNetwork::from_path(path)?
                    .with_output_selection([0, 1])
                    .load()?,
                CnnInputShape::NCHW,
                ColorMapper::linear(0.0..=1.0),
            )?,
        })
    }
}

impl Network for PoseLandmarkNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
        extract(outputs, estimate)
    }
}

fn extract(outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
    if outputs.len() != 2 {
        anyhow::bail!("pose landmark network produced {} outputs", outputs.len());
    }
    let screen_landmarks = &outputs[0];
    let pose_flag = &outputs[1];

    // 5 values each: x, y, z, visibility, presence
    if screen_landmarks.shape() != [1, NUM_LANDMARKS * 5] || pose_flag.shape() != [1, 1] {
        anyhow::bail!(
            "unexpected pose landmark output shapes {:?} and {:?}",
            screen_landmarks.shape(),
            pose_flag.shape(),
        );
    }

    estimate.pose_presence = pose_flag.index([0, 0]).as_singular();

    for (i, values) in screen_landmarks
        .index([0])
        .as_slice()
        .chunks_exact(5)
        .enumerate()
    {
        let (x, y, z) = (values[0], values[1], values[2]);
        estimate.landmarks.set(
            i,
            Landmark::new([x, y, z])
                .with_visibility(sigmoid(values[3]))
                .with_presence(sigmoid(values[4])),
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LandmarkResult {
    pose_presence: f32,
    landmarks: Landmarks,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        Self {
            pose_presence: 0.0,
            landmarks: Landmarks::new(NUM_LANDMARKS),
        }
    }
}

impl Estimate for LandmarkResult {
    fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }

    fn angle_radians(&self) -> Option<f32> {
        let [hx, hy, _] = self.landmarks.positions()[AUX_HIPS];
        let [fx, fy, _] = self.landmarks.positions()[AUX_FULL_BODY];
        Some(angle_between(
            [0.0, -1.0],
            Keypoint::new(hx, hy),
            Keypoint::new(fx, fy),
        ))
    }
}

impl Confidence for LandmarkResult {
    #[inline]
    fn confidence(&self) -> f32 {
        self.pose_presence
    }
}

impl LandmarkResult {
    /// Returns the 33 named pose landmarks, without the auxiliary ones.
    pub fn pose_landmarks(&self) -> impl Iterator<Item = Landmark> + '_ {
        (0..NUM_POSE_LANDMARKS).map(|i| self.landmarks.get(i))
    }

    pub fn get(&self, i: LandmarkIdx) -> Landmark {
        self.landmarks.get(i as usize)
    }

    #[inline]
    pub fn presence(&self) -> f32 {
        self.pose_presence
    }

    /// Draws the body skeleton.
    pub fn draw<I: AsImageViewMut>(&self, target: &mut I, line_color: Color, joint_color: Color) {
        self.draw_impl(&mut target.as_view_mut(), line_color, joint_color);
    }

    fn draw_impl(&self, target: &mut ImageViewMut<'_>, line_color: Color, joint_color: Color) {
        for &(a, b) in CONNECTIONS {
            let (a, b) = (self.get(a), self.get(b));
            draw::line(
                target,
                a.x().round() as i32,
                a.y().round() as i32,
                b.x().round() as i32,
                b.y().round() as i32,
            )
            .color(line_color)
            .stroke_width(2);
        }

        for lm in self.pose_landmarks() {
            draw::marker(target, lm.x().round() as i32, lm.y().round() as i32)
                .color(joint_color)
                .size(5);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// Skeleton connections drawn by [`LandmarkResult::draw`].
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        (LeftEar, LeftEyeOuter),
        (LeftEyeOuter, Nose),
        (Nose, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (MouthLeft, MouthRight),
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftIndex),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightIndex),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (LeftAnkle, LeftHeel),
        (LeftAnkle, LeftFootIndex),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (RightAnkle, RightHeel),
        (RightAnkle, RightFootIndex),
    ]
};

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::nn::tensor::Tensor;

    fn outputs(flag: f32) -> Outputs {
        let landmarks = Tensor::from_iter(
            &[1, NUM_LANDMARKS * 5],
            (0..NUM_LANDMARKS).flat_map(|i| [i as f32, 2.0 * i as f32, 0.5, 0.0, 100.0]),
        );
        let flag = Tensor::from_iter(&[1, 1], [flag]);
        Outputs::from_tensors([landmarks, flag])
    }

    #[test]
    fn extracts_landmarks_with_scores() {
        let mut result = LandmarkResult::default();
        extract(&outputs(0.8), &mut result).unwrap();

        assert_eq!(result.presence(), 0.8);
        let wrist = result.get(LandmarkIdx::LeftWrist);
        assert_eq!(wrist.position(), [15.0, 30.0, 0.5]);
        assert_abs_diff_eq!(wrist.visibility().unwrap(), 0.5);
        assert_abs_diff_eq!(wrist.presence().unwrap(), 1.0);
        assert_eq!(result.pose_landmarks().count(), NUM_POSE_LANDMARKS);
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut result = LandmarkResult::default();
        let bad = Outputs::from_tensors([
            Tensor::from_iter(&[1, 33 * 5], (0..33 * 5).map(|_| 0.0)),
            Tensor::from_iter(&[1, 1], [1.0]),
        ]);
        assert!(extract(&bad, &mut result).is_err());
    }

    #[test]
    fn angle_from_aux_landmarks() {
        let mut result = LandmarkResult::default();
        result.landmarks_mut().positions_mut()[AUX_HIPS] = [50.0, 100.0, 0.0];
        result.landmarks_mut().positions_mut()[AUX_FULL_BODY] = [50.0, 20.0, 0.0];
        assert_abs_diff_eq!(result.angle_radians().unwrap(), 0.0);
    }
}
