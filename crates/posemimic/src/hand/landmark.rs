//! Hand landmark prediction.

use std::path::Path;

use crate::detection::{angle_between, Keypoint};
use crate::image::{draw, AsImageViewMut, Color, ImageViewMut};
use crate::landmark::{self, Confidence, Landmarks};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

pub const NUM_LANDMARKS: usize = 21;

/// The MediaPipe hand landmark network, in its "lite" or "full" variant.
#[derive(Clone)]
pub struct HandLandmarkNetwork {
    cnn: Cnn,
}

impl HandLandmarkNetwork {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(
                NeuralNetwork::from_path(path)?.load()?,
                CnnInputShape::NCHW,
                ColorMapper::linear(0.0..=1.0),
            )?,
        })
    }
}

impl landmark::Network for HandLandmarkNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
        if outputs.len() < 3 {
            anyhow::bail!("hand landmark network produced {} outputs", outputs.len());
        }
        let screen_landmarks = &outputs[0];
        let presence_flag = &outputs[1];
        let handedness = &outputs[2];

        if screen_landmarks.shape() != [1, NUM_LANDMARKS * 3]
            || presence_flag.shape() != [1, 1]
            || handedness.shape() != [1, 1]
        {
            anyhow::bail!(
                "unexpected hand landmark output shapes {:?}, {:?}, {:?}",
                screen_landmarks.shape(),
                presence_flag.shape(),
                handedness.shape(),
            );
        }

        estimate.presence = presence_flag.index([0, 0]).as_singular();
        estimate.raw_handedness = handedness.index([0, 0]).as_singular();
        for (xyz, out) in screen_landmarks
            .index([0])
            .as_slice()
            .chunks_exact(3)
            .zip(estimate.landmarks.positions_mut())
        {
            *out = [xyz[0], xyz[1], xyz[2]];
        }
        Ok(())
    }
}

/// Landmark results estimated by [`HandLandmarkNetwork`].
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    presence: f32,
    raw_handedness: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        LandmarkResult {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            presence: 0.0,
            raw_handedness: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that fingers are pointed upwards.
    pub fn rotation_radians(&self) -> f32 {
        let pos = self.landmarks.positions();
        let [wx, wy, _] = pos[LandmarkIdx::Wrist as usize];
        let [mx, my, _] = pos[LandmarkIdx::MiddleFingerMcp as usize];
        angle_between([0.0, -1.0], Keypoint::new(wx, wy), Keypoint::new(mx, my))
    }

    /// Returns the estimated handedness of the hand, assuming an unmirrored camera image.
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    /// Draws the hand skeleton: `line_color` connections and `joint_color` markers.
    pub fn draw<I: AsImageViewMut>(&self, target: &mut I, line_color: Color, joint_color: Color) {
        self.draw_impl(&mut target.as_view_mut(), line_color, joint_color);
    }

    fn draw_impl(&self, target: &mut ImageViewMut<'_>, line_color: Color, joint_color: Color) {
        let pos = self.landmarks.positions();
        for &(a, b) in CONNECTIONS {
            let [ax, ay, _] = pos[a as usize];
            let [bx, by, _] = pos[b as usize];
            draw::line(
                target,
                ax.round() as i32,
                ay.round() as i32,
                bx.round() as i32,
                by.round() as i32,
            )
            .color(line_color)
            .stroke_width(2);
        }
        for &[x, y, _] in pos {
            draw::circle(target, x.round() as i32, y.round() as i32, 5)
                .color(joint_color)
                .fill();
        }
    }
}

impl landmark::Estimate for LandmarkResult {
    fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }

    fn angle_radians(&self) -> Option<f32> {
        Some(self.rotation_radians())
    }
}

impl Confidence for LandmarkResult {
    fn confidence(&self) -> f32 {
        self.presence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// Names for the hand landmarks.
///
/// - **CMC**: Carpometacarpal joint, the lowest joint of the thumb, near the wrist.
/// - **MCP**: Metacarpophalangeal joint, the knuckles near the palm.
/// - **PIP**/**DIP**: the proximal and distal interphalangeal joints.
/// - **Tip**: the tip of the finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Bone connections of the hand skeleton.
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::landmark::Estimate;

    #[test]
    fn connections_cover_every_landmark() {
        let mut seen = [false; NUM_LANDMARKS];
        for &(a, b) in CONNECTIONS {
            seen[a as usize] = true;
            seen[b as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(LandmarkIdx::PinkyTip as usize, NUM_LANDMARKS - 1);
    }

    #[test]
    fn upright_hand_has_no_rotation() {
        let mut result = LandmarkResult::default();
        let pos = result.landmarks_mut().positions_mut();
        pos[LandmarkIdx::Wrist as usize] = [50.0, 80.0, 0.0];
        pos[LandmarkIdx::MiddleFingerMcp as usize] = [50.0, 40.0, 0.0];
        assert_abs_diff_eq!(result.rotation_radians(), 0.0);

        let pos = result.landmarks_mut().positions_mut();
        pos[LandmarkIdx::MiddleFingerMcp as usize] = [90.0, 80.0, 0.0];
        assert_abs_diff_eq!(
            result.rotation_radians(),
            std::f32::consts::FRAC_PI_2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn handedness_threshold() {
        let mut result = LandmarkResult::default();
        assert_eq!(result.handedness(), Handedness::Left);
        result.raw_handedness = 0.9;
        assert_eq!(result.handedness(), Handedness::Right);
    }
}
