//! Pose classification.
//!
//! Classifies the landmarks observed in a frame into one of the [`PoseKind`]s by a few threshold
//! comparisons. All coordinates are normalized to the frame size, so that `(0, 0)` is the top left
//! and `(1, 1)` the bottom right corner of the frame.

use std::fmt;

/// A landmark position, normalized to the frame size.
pub type Point = [f32; 2];

/// The poses the character can mimic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoseKind {
    RaisingHand,
    Thinking,
    Shocking,
    #[default]
    Default,
}

impl PoseKind {
    pub const ALL: [PoseKind; 4] = [
        PoseKind::RaisingHand,
        PoseKind::Shocking,
        PoseKind::Thinking,
        PoseKind::Default,
    ];

    /// Returns the raw, untranslated key of this pose.
    pub fn key(self) -> &'static str {
        match self {
            PoseKind::RaisingHand => "raising_hand",
            PoseKind::Thinking => "thinking",
            PoseKind::Shocking => "shocking",
            PoseKind::Default => "default",
        }
    }
}

impl fmt::Display for PoseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Body landmark indices used by the classifier.
mod body {
    pub const NOSE: usize = 0;
}

/// Hand landmark indices used by the classifier.
mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_TIP: usize = 12;
}

/// Face mesh landmark indices used by the classifier.
mod face {
    pub const LIP_CENTER: usize = 0;
    pub const FOREHEAD: usize = 10;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;
    pub const CHIN: usize = 152;
}

/// The landmarks found in a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Landmarks of the first detected body.
    pub body: Option<Vec<Point>>,
    /// 21 landmarks for each detected hand.
    pub hands: Vec<Vec<Point>>,
    /// Face mesh landmarks for each detected face.
    pub faces: Vec<Vec<Point>>,
}

impl Observation {
    /// Normalizes a landmark position given in pixels.
    pub fn normalize(x: f32, y: f32, frame_width: u32, frame_height: u32) -> Point {
        [x / frame_width as f32, y / frame_height as f32]
    }
}

/// Thresholds the classification rules compare against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum height of a wrist above the nose.
    pub hand_raise: f32,
    /// Minimum ratio of mouth opening to face height.
    pub mouth_open: f32,
    /// Maximum distance between a fingertip and the mouth region.
    pub hand_to_face: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            hand_raise: 0.05,
            mouth_open: 0.15,
            hand_to_face: 0.08,
        }
    }
}

/// Measurements taken while classifying the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebugInfo {
    pub mouth_ratio: f32,
    pub hand_height: f32,
    pub hands_detected: usize,
    pub face_detected: bool,
}

impl DebugInfo {
    /// Creates fresh debug info for `obs`, with detection counts filled in.
    pub fn for_observation(obs: &Observation) -> Self {
        Self {
            hands_detected: obs.hands.len(),
            face_detected: !obs.faces.is_empty(),
            ..Self::default()
        }
    }
}

/// Classifies the pose shown in `obs`.
///
/// Rules are checked in order of priority: raising a hand, thinking, shocking, and finally the
/// default pose. Checking stops at the first match, so measurements of later rules stay at their
/// previous value in `debug`.
pub fn classify(obs: &Observation, thresholds: &Thresholds, debug: &mut DebugInfo) -> PoseKind {
    if is_raising_hand(obs, thresholds, debug) {
        return PoseKind::RaisingHand;
    }
    if is_thinking(obs, thresholds) {
        return PoseKind::Thinking;
    }
    if is_shocking(obs, thresholds, debug) {
        return PoseKind::Shocking;
    }
    PoseKind::Default
}

fn is_raising_hand(obs: &Observation, thresholds: &Thresholds, debug: &mut DebugInfo) -> bool {
    let nose = match &obs.body {
        Some(body) if !obs.hands.is_empty() => body.get(body::NOSE),
        _ => None,
    };
    let Some(nose) = nose else {
        debug.hand_height = 0.0;
        return false;
    };

    for hand in &obs.hands {
        let Some(wrist) = hand.get(hand::WRIST) else {
            log::error!("hand has no wrist landmark ({} landmarks)", hand.len());
            continue;
        };
        // Y grows downwards, so a raised hand has a smaller Y than the nose.
        let diff = nose[1] - wrist[1];
        debug.hand_height = diff;
        if diff > thresholds.hand_raise {
            return true;
        }
    }
    false
}

fn is_thinking(obs: &Observation, thresholds: &Thresholds) -> bool {
    let Some(face) = obs.faces.first() else {
        return false;
    };
    if obs.hands.is_empty() {
        return false;
    }

    let Some(mouth_region) = landmarks(
        face,
        [face::UPPER_LIP, face::LOWER_LIP, face::CHIN, face::LIP_CENTER],
    ) else {
        log::error!(
            "error checking thinking pose: face has only {} landmarks",
            face.len()
        );
        return false;
    };

    for hand in &obs.hands {
        let Some(tips) = landmarks(
            hand,
            [hand::THUMB_TIP, hand::INDEX_FINGER_TIP, hand::MIDDLE_FINGER_TIP],
        ) else {
            log::error!(
                "error checking thinking pose: hand has only {} landmarks",
                hand.len()
            );
            return false;
        };

        for tip in tips {
            for point in mouth_region {
                if distance(tip, point) < thresholds.hand_to_face {
                    return true;
                }
            }
        }
    }
    false
}

fn is_shocking(obs: &Observation, thresholds: &Thresholds, debug: &mut DebugInfo) -> bool {
    let Some(face) = obs.faces.first() else {
        debug.mouth_ratio = 0.0;
        return false;
    };

    let Some([upper_lip, lower_lip, forehead, chin]) = landmarks(
        face,
        [face::UPPER_LIP, face::LOWER_LIP, face::FOREHEAD, face::CHIN],
    ) else {
        log::error!(
            "error checking shocking pose: face has only {} landmarks",
            face.len()
        );
        debug.mouth_ratio = 0.0;
        return false;
    };

    let face_height = (chin[1] - forehead[1]).abs();
    let mouth_opening = (lower_lip[1] - upper_lip[1]).abs();
    let mouth_ratio = if face_height > 0.0 {
        mouth_opening / face_height
    } else {
        0.0
    };
    debug.mouth_ratio = mouth_ratio;

    mouth_ratio > thresholds.mouth_open
}

/// Looks up several landmarks at once, returning [`None`] if any index is out of range.
fn landmarks<const N: usize>(points: &[Point], indices: [usize; N]) -> Option<[Point; N]> {
    let mut out = [[0.0; 2]; N];
    for (out, index) in out.iter_mut().zip(indices) {
        *out = *points.get(index)?;
    }
    Some(out)
}

fn distance(a: Point, b: Point) -> f32 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const FACE_LANDMARKS: usize = 478;

    fn body(nose_y: f32) -> Vec<Point> {
        let mut body = vec![[0.5, 0.9]; 33];
        body[body::NOSE] = [0.5, nose_y];
        body
    }

    /// A hand at the bottom of the frame, far away from the face.
    fn hand(wrist_y: f32) -> Vec<Point> {
        let mut hand = vec![[0.9, 0.95]; 21];
        hand[hand::WRIST] = [0.9, wrist_y];
        hand
    }

    /// A face with the given forehead, upper lip, lower lip and chin heights.
    fn face(forehead: f32, upper: f32, lower: f32, chin: f32) -> Vec<Point> {
        let mut face = vec![[0.5, 0.3]; FACE_LANDMARKS];
        face[face::FOREHEAD] = [0.5, forehead];
        face[face::UPPER_LIP] = [0.5, upper];
        face[face::LOWER_LIP] = [0.5, lower];
        face[face::LIP_CENTER] = [0.5, upper];
        face[face::CHIN] = [0.5, chin];
        face
    }

    fn closed_mouth() -> Vec<Point> {
        face(0.1, 0.3, 0.31, 0.5)
    }

    fn classify_default(obs: &Observation) -> (PoseKind, DebugInfo) {
        let mut debug = DebugInfo::for_observation(obs);
        let pose = classify(obs, &Thresholds::default(), &mut debug);
        (pose, debug)
    }

    #[test]
    fn pose_keys() {
        for pose in PoseKind::ALL {
            assert_eq!(pose.to_string(), pose.key());
        }
        assert_eq!(PoseKind::default(), PoseKind::Default);
    }

    #[test]
    fn empty_observation_is_default() {
        let (pose, debug) = classify_default(&Observation::default());
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(debug, DebugInfo::default());
    }

    #[test]
    fn raised_hand() {
        let obs = Observation {
            body: Some(body(0.5)),
            hands: vec![hand(0.4)],
            faces: vec![],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::RaisingHand);
        assert_relative_eq!(debug.hand_height, 0.1, epsilon = 1e-6);
        assert_eq!(debug.hands_detected, 1);
        assert!(!debug.face_detected);
    }

    #[test]
    fn hand_at_threshold_is_not_raised() {
        let obs = Observation {
            body: Some(body(0.5)),
            hands: vec![hand(0.5)],
            faces: vec![],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(debug.hand_height, 0.0);
    }

    #[test]
    fn hand_height_reports_last_checked_hand() {
        let obs = Observation {
            body: Some(body(0.5)),
            hands: vec![hand(0.7), hand(0.6)],
            faces: vec![],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Default);
        assert_relative_eq!(debug.hand_height, -0.1, epsilon = 1e-6);

        // The second hand is raised; the first one is checked first.
        let obs = Observation {
            body: Some(body(0.5)),
            hands: vec![hand(0.7), hand(0.2)],
            faces: vec![],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::RaisingHand);
        assert_relative_eq!(debug.hand_height, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn raised_hand_needs_body() {
        let obs = Observation {
            body: None,
            hands: vec![hand(0.0)],
            faces: vec![],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(debug.hand_height, 0.0);
    }

    #[test]
    fn fingertip_near_mouth_is_thinking() {
        let mut h = hand(0.9);
        h[hand::INDEX_FINGER_TIP] = [0.52, 0.33];
        let obs = Observation {
            body: Some(body(0.2)),
            hands: vec![h],
            faces: vec![closed_mouth()],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Thinking);
        // Shocking is never checked.
        assert_eq!(debug.mouth_ratio, 0.0);
        assert!(debug.face_detected);
    }

    #[test]
    fn raised_hand_wins_over_thinking() {
        let mut h = hand(0.1);
        h[hand::THUMB_TIP] = [0.5, 0.3];
        let obs = Observation {
            body: Some(body(0.2)),
            hands: vec![h],
            faces: vec![closed_mouth()],
        };
        assert_eq!(classify_default(&obs).0, PoseKind::RaisingHand);
    }

    #[test]
    fn thinking_wins_over_shocking() {
        let mut h = hand(0.9);
        h[hand::MIDDLE_FINGER_TIP] = [0.5, 0.52];
        let obs = Observation {
            body: None,
            hands: vec![h],
            faces: vec![face(0.1, 0.3, 0.4, 0.5)],
        };
        assert_eq!(classify_default(&obs).0, PoseKind::Thinking);
    }

    #[test]
    fn thinking_distance_is_strict() {
        let mut h = hand(0.9);
        h[hand::THUMB_TIP] = [0.5, 0.75];
        let mut f = closed_mouth();
        f[face::CHIN] = [0.5, 0.5];
        let obs = Observation {
            body: None,
            hands: vec![h.clone()],
            faces: vec![f.clone()],
        };
        let thresholds = Thresholds {
            hand_to_face: 0.25,
            ..Thresholds::default()
        };
        let mut debug = DebugInfo::for_observation(&obs);
        assert_eq!(classify(&obs, &thresholds, &mut debug), PoseKind::Default);

        h[hand::THUMB_TIP] = [0.5, 0.74];
        let obs = Observation {
            body: None,
            hands: vec![h],
            faces: vec![f],
        };
        assert_eq!(classify(&obs, &thresholds, &mut debug), PoseKind::Thinking);
    }

    #[test]
    fn open_mouth_is_shocking() {
        let obs = Observation {
            body: None,
            hands: vec![],
            faces: vec![face(0.1, 0.3, 0.4, 0.5)],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Shocking);
        assert_relative_eq!(debug.mouth_ratio, 0.25, epsilon = 1e-5);
        assert_eq!(debug.hands_detected, 0);
    }

    #[test]
    fn closed_mouth_is_default() {
        let obs = Observation {
            body: None,
            hands: vec![hand(0.9)],
            faces: vec![closed_mouth()],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Default);
        assert_relative_eq!(debug.mouth_ratio, 0.025, epsilon = 1e-5);
    }

    #[test]
    fn flat_face_has_zero_mouth_ratio() {
        let obs = Observation {
            body: None,
            hands: vec![],
            faces: vec![face(0.3, 0.3, 0.4, 0.3)],
        };
        let (pose, debug) = classify_default(&obs);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(debug.mouth_ratio, 0.0);
    }

    #[test]
    fn only_first_face_is_used() {
        let obs = Observation {
            body: None,
            hands: vec![],
            faces: vec![closed_mouth(), face(0.1, 0.3, 0.45, 0.5)],
        };
        assert_eq!(classify_default(&obs).0, PoseKind::Default);
    }

    #[test]
    fn truncated_face_is_rejected() {
        let obs = Observation {
            body: None,
            hands: vec![hand(0.9)],
            faces: vec![vec![[0.5, 0.5]; 100]],
        };
        let mut debug = DebugInfo::for_observation(&obs);
        debug.mouth_ratio = 0.7;
        assert_eq!(
            classify(&obs, &Thresholds::default(), &mut debug),
            PoseKind::Default
        );
        assert_eq!(debug.mouth_ratio, 0.0);
    }

    #[test]
    fn normalizes_by_frame_size() {
        assert_eq!(Observation::normalize(320.0, 120.0, 640, 480), [0.5, 0.25]);
    }
}
