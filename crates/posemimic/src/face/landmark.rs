//! A wrapper around MediaPipe's [Face Mesh] landmark predictor networks.
//!
//! Two variants are supported: the original 468-landmark mesh, and the newer 478-landmark mesh
//! that adds 5 iris landmarks per eye.
//!
//! [Face Mesh]: https://google.github.io/mediapipe/solutions/face_mesh.html

use std::path::Path;

use crate::detection::{angle_between, Keypoint};
use crate::image::{draw, AsImageViewMut, Color, ImageViewMut};
use crate::landmark::{self, Confidence, Landmarks};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// Selects which face mesh network to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshVersion {
    /// 468 landmarks.
    V1,
    /// 478 landmarks, including irises.
    V2,
}

impl MeshVersion {
    pub fn num_landmarks(self) -> usize {
        match self {
            MeshVersion::V1 => 468,
            MeshVersion::V2 => 478,
        }
    }
}

/// Estimates facial landmarks on a cropped, mostly upright image of a face.
///
/// Use a [`LandmarkTracker`](crate::landmark::LandmarkTracker) to follow the face across frames.
#[derive(Clone)]
pub struct FaceMesh {
    cnn: Cnn,
    version: MeshVersion,
}

impl FaceMesh {
    pub fn load(path: &Path, version: MeshVersion) -> anyhow::Result<Self> {
        Ok(Self {
            cnn: Cnn::new(
                NeuralNetwork::from_path(path)?.load()?,
                CnnInputShape::NCHW,
                ColorMapper::linear(-1.0..=1.0),
            )?,
            version,
        })
    }
}

impl landmark::Network for FaceMesh {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
        let num_landmarks = self.version.num_landmarks();
        if outputs.len() < 2 {
            anyhow::bail!("face mesh network produced {} outputs", outputs.len());
        }
        let coords = &outputs[0];
        let face_flag = &outputs[1];
        if coords.shape() != [1, 1, 1, num_landmarks * 3] || face_flag.shape() != [1, 1, 1, 1] {
            anyhow::bail!(
                "unexpected face mesh output shapes {:?} and {:?}",
                coords.shape(),
                face_flag.shape()
            );
        }

        estimate.face_flag = sigmoid(face_flag.index([0, 0, 0, 0]).as_singular());
        if estimate.landmarks.len() != num_landmarks {
            estimate.landmarks = Landmarks::new(num_landmarks);
        }
        for (xyz, out) in coords
            .index([0, 0, 0])
            .as_slice()
            .chunks_exact(3)
            .zip(estimate.landmarks.positions_mut())
        {
            *out = [xyz[0], xyz[1], xyz[2]];
        }
        Ok(())
    }
}

/// Landmark results estimated by [`FaceMesh`].
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    face_flag: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        Self {
            landmarks: Landmarks::new(MeshVersion::V2.num_landmarks()),
            face_flag: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Computes the clockwise rotation of the face, based on the outer eye corners.
    pub fn rotation_radians(&self) -> f32 {
        let [lx, ly, _] = self.landmarks.positions()[LandmarkIdx::LeftEyeOuterCorner as usize];
        let [rx, ry, _] = self.landmarks.positions()[LandmarkIdx::RightEyeOuterCorner as usize];
        angle_between([1.0, 0.0], Keypoint::new(lx, ly), Keypoint::new(rx, ry))
    }

    /// Draws the outline of the lips.
    pub fn draw_lips<I: AsImageViewMut>(&self, image: &mut I, color: Color) {
        self.draw_lips_impl(&mut image.as_view_mut(), color);
    }

    fn draw_lips_impl(&self, image: &mut ImageViewMut<'_>, color: Color) {
        let positions = self.landmarks.positions();
        for &(a, b) in LIPS {
            let (Some(a), Some(b)) = (positions.get(a), positions.get(b)) else {
                continue;
            };
            draw::line(
                image,
                a[0].round() as i32,
                a[1].round() as i32,
                b[0].round() as i32,
                b[1].round() as i32,
            )
            .color(color);
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
        self.face_flag
    }
}

/// Named landmarks of the face mesh (from the perspective of the camera).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    LipCenter = 0,
    Forehead = 10,
    UpperLip = 13,
    LowerLip = 14,
    LeftEyeOuterCorner = 33,
    Chin = 152,
    RightEyeOuterCorner = 263,
}

/// Landmark index pairs outlining the outer and inner lips.
pub const LIPS: &[(usize, usize)] = &[
    // outer, lower
    (61, 146),
    (146, 91),
    (91, 181),
    (181, 84),
    (84, 17),
    (17, 314),
    (314, 405),
    (405, 321),
    (321, 375),
    (375, 291),
    // outer, upper
    (61, 185),
    (185, 40),
    (40, 39),
    (39, 37),
    (37, 0),
    (0, 267),
    (267, 269),
    (269, 270),
    (270, 409),
    (409, 291),
    // inner, lower
    (78, 95),
    (95, 88),
    (88, 178),
    (178, 87),
    (87, 14),
    (14, 317),
    (317, 402),
    (402, 318),
    (318, 324),
    (324, 308),
    // inner, upper
    (78, 191),
    (191, 80),
    (80, 81),
    (81, 82),
    (82, 13),
    (13, 312),
    (312, 311),
    (311, 310),
    (310, 415),
    (415, 308),
];
