//! Application configuration.
//!
//! Configuration is read from a TOML file. Every section and field is optional and falls back to
//! its default value, so an empty file is a valid configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::face::landmark::MeshVersion;
use crate::i18n::Language;
use crate::image::Color;
use crate::pose::{PoseKind, Thresholds};

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV_VAR: &str = "POSEMIMIC_CONFIG";

/// Configuration file loaded from the working directory when [`CONFIG_ENV_VAR`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "posemimic.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub pose: PoseConfig,
    pub hands: HandConfig,
    pub face: FaceConfig,
    pub ui: UiConfig,
    pub assets: AssetConfig,
    pub models: ModelConfig,
    #[serde(flatten)]
    pub general: GeneralConfig,
}

/// Parses configuration from a TOML string.
impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        contents
            .parse::<Self>()
            .with_context(|| format!("failed to parse config file '{}'", path.display()))
    }

    /// Loads the configuration file named by `POSEMIMIC_CONFIG`, or `posemimic.toml` if it
    /// exists. Otherwise the defaults are used.
    ///
    /// The loaded configuration is validated.
    pub fn load() -> anyhow::Result<Self> {
        let config = match env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks all values for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            bail!("camera.width and camera.height must be greater than 0");
        }
        if camera.fps == 0 {
            bail!("camera.fps must be greater than 0");
        }

        check_confidence("pose.min_detection_confidence", self.pose.min_detection_confidence)?;
        check_confidence("pose.min_tracking_confidence", self.pose.min_tracking_confidence)?;
        check_model_complexity("pose.model_complexity", self.pose.model_complexity)?;
        for (field, value) in [
            ("pose.hand_raise_threshold", self.pose.hand_raise_threshold),
            ("pose.mouth_open_threshold", self.pose.mouth_open_threshold),
            ("pose.hand_to_face_threshold", self.pose.hand_to_face_threshold),
        ] {
            if !value.is_finite() {
                bail!("{field} must be a finite number, got {value}");
            }
        }

        if self.hands.max_num_hands == 0 {
            bail!("hands.max_num_hands must be greater than 0");
        }
        check_confidence("hands.min_detection_confidence", self.hands.min_detection_confidence)?;
        check_confidence("hands.min_tracking_confidence", self.hands.min_tracking_confidence)?;
        check_model_complexity("hands.model_complexity", self.hands.model_complexity)?;

        if self.face.max_num_faces != 1 {
            bail!(
                "face.max_num_faces must be 1, got {}",
                self.face.max_num_faces
            );
        }
        check_confidence("face.min_detection_confidence", self.face.min_detection_confidence)?;
        check_confidence("face.min_tracking_confidence", self.face.min_tracking_confidence)?;

        let ui = &self.ui;
        if ui.window_width == 0 || ui.window_height == 0 {
            bail!("ui.window_width and ui.window_height must be greater than 0");
        }
        for (field, color) in ui.colors() {
            HexColor::parse(color).with_context(|| format!("invalid color ui.{field}"))?;
        }

        if Language::parse(&self.general.default_language).is_none() {
            bail!(
                "unknown default_language '{}' (expected one of: {})",
                self.general.default_language,
                Language::ALL.map(Language::code).join(", "),
            );
        }

        Ok(())
    }
}

fn check_confidence(field: &str, value: f32) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{field} must be between 0.0 and 1.0, got {value}");
    }
    Ok(())
}

fn check_model_complexity(field: &str, value: u8) -> anyhow::Result<()> {
    if value > 1 {
        bail!("{field} must be 0 or 1, got {value}");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Index of the V4L2 device, as in `/dev/videoN`.
    pub device_id: u32,
    /// Mirror the camera image.
    pub flip_horizontal: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 40,
            device_id: 0,
            flip_horizontal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// 0 selects the lite landmark network, 1 the full one.
    pub model_complexity: u8,
    pub smooth_landmarks: bool,

    pub hand_raise_threshold: f32,
    pub mouth_open_threshold: f32,
    pub hand_to_face_threshold: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
            smooth_landmarks: true,
            hand_raise_threshold: thresholds.hand_raise,
            mouth_open_threshold: thresholds.mouth_open,
            hand_to_face_threshold: thresholds.hand_to_face,
        }
    }
}

impl PoseConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            hand_raise: self.hand_raise_threshold,
            mouth_open: self.mouth_open_threshold,
            hand_to_face: self.hand_to_face_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    pub max_num_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_complexity: u8,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            max_num_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub max_num_faces: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Use the face mesh with iris landmarks.
    pub refine_landmarks: bool,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            max_num_faces: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            refine_landmarks: true,
        }
    }
}

impl FaceConfig {
    pub fn mesh_version(&self) -> MeshVersion {
        if self.refine_landmarks {
            MeshVersion::V2
        } else {
            MeshVersion::V1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub window_pos_x: i32,
    pub window_pos_y: i32,

    pub camera_min_width: u32,
    pub camera_min_height: u32,
    pub monkey_min_width: u32,
    pub monkey_min_height: u32,

    pub bg_color: String,
    pub secondary_bg: String,
    pub border_color: String,
    pub text_color: String,
    pub secondary_text: String,
    pub accent_color: String,
    pub success_color: String,
    pub warning_color: String,

    pub layout_spacing: u32,
    pub layout_margin: u32,
    pub border_radius: u32,
    pub shadow_blur: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_title: "Monkey Pose Mimic".into(),
            window_width: 1280,
            window_height: 720,
            window_pos_x: 100,
            window_pos_y: 100,
            camera_min_width: 640,
            camera_min_height: 480,
            monkey_min_width: 480,
            monkey_min_height: 480,
            bg_color: "#F5F5F7".into(),
            secondary_bg: "#FFFFFF".into(),
            border_color: "#E5E5E7".into(),
            text_color: "#1D1D1F".into(),
            secondary_text: "#86868B".into(),
            accent_color: "#007AFF".into(),
            success_color: "#34C759".into(),
            warning_color: "#FF9500".into(),
            layout_spacing: 20,
            layout_margin: 20,
            border_radius: 12,
            shadow_blur: 20,
        }
    }
}

impl UiConfig {
    fn colors(&self) -> [(&'static str, &str); 8] {
        [
            ("bg_color", &self.bg_color),
            ("secondary_bg", &self.secondary_bg),
            ("border_color", &self.border_color),
            ("text_color", &self.text_color),
            ("secondary_text", &self.secondary_text),
            ("accent_color", &self.accent_color),
            ("success_color", &self.success_color),
            ("warning_color", &self.warning_color),
        ]
    }

    /// Resolves the configured colors. Fails if any of them is malformed.
    pub fn palette(&self) -> anyhow::Result<Palette> {
        Ok(Palette {
            bg: HexColor::parse(&self.bg_color)?,
            secondary_bg: HexColor::parse(&self.secondary_bg)?,
            border: HexColor::parse(&self.border_color)?,
            text: HexColor::parse(&self.text_color)?,
            secondary_text: HexColor::parse(&self.secondary_text)?,
            accent: HexColor::parse(&self.accent_color)?,
            success: HexColor::parse(&self.success_color)?,
            warning: HexColor::parse(&self.warning_color)?,
        })
    }
}

/// The resolved colors of a [`UiConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub bg: Color,
    pub secondary_bg: Color,
    pub border: Color,
    pub text: Color,
    pub secondary_text: Color,
    pub accent: Color,
    pub success: Color,
    pub warning: Color,
}

/// Parser for `#RRGGBB` color strings.
pub struct HexColor;

impl HexColor {
    pub fn parse(s: &str) -> anyhow::Result<Color> {
        let hex = match s.strip_prefix('#') {
            Some(hex) if hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => hex,
            _ => bail!("expected a color of the form '#RRGGBB', got '{s}'"),
        };
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        Ok(Color::from_rgb8(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub base_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("assets"),
        }
    }
}

impl AssetConfig {
    /// Returns the path of the character image shown for `pose`.
    pub fn path_for(&self, pose: PoseKind) -> PathBuf {
        self.base_dir.join(format!("{}_pose.jpg", pose.key()))
    }
}

/// Location of the ONNX networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

impl ModelConfig {
    pub fn face_detection(&self) -> PathBuf {
        self.dir.join("face_detection_short_range.onnx")
    }

    pub fn face_landmarks(&self, version: MeshVersion) -> PathBuf {
        self.dir.join(match version {
            MeshVersion::V1 => "face_landmark.onnx",
            MeshVersion::V2 => "face_landmarks_detector.onnx",
        })
    }

    pub fn palm_detection(&self, model_complexity: u8) -> PathBuf {
        self.dir.join(match model_complexity {
            0 => "palm_detection_lite.onnx",
            _ => "palm_detection_full.onnx",
        })
    }

    pub fn hand_landmarks(&self, model_complexity: u8) -> PathBuf {
        self.dir.join(match model_complexity {
            0 => "hand_landmark_lite.onnx",
            _ => "hand_landmark_full.onnx",
        })
    }

    pub fn pose_detection(&self) -> PathBuf {
        self.dir.join("pose_detection.onnx")
    }

    pub fn pose_landmarks(&self, model_complexity: u8) -> PathBuf {
        self.dir.join(match model_complexity {
            0 => "pose_landmark_lite.onnx",
            _ => "pose_landmark_full.onnx",
        })
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// `DEBUG`, `INFO`, `WARNING`, `ERROR` or `CRITICAL`.
    pub log_level: String,
    pub show_debug_info: bool,
    pub show_landmarks: bool,
    /// Code of the initial user interface language.
    pub default_language: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            show_debug_info: true,
            show_landmarks: true,
            default_language: Language::default().code().into(),
        }
    }
}

impl GeneralConfig {
    /// Maps the configured log level to a [`log::LevelFilter`].
    ///
    /// Unknown levels log at `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_ascii_uppercase().as_str() {
            "DEBUG" => log::LevelFilter::Debug,
            "WARNING" | "WARN" => log::LevelFilter::Warn,
            "ERROR" | "CRITICAL" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }

    pub fn language(&self) -> Language {
        Language::from_code(&self.default_language)
    }
}
