//! Annotations drawn onto camera frames.

use crate::face;
use crate::hand;
use crate::i18n::Language;
use crate::image::draw::{self, Font};
use crate::image::{Color, Image, Rect};
use crate::pose::{DebugInfo, PoseKind};

/// Alpha of the dark panels behind the debug text (60% opacity).
const PANEL_ALPHA: u8 = 153;

const PANEL_TEXT_COLOR: Color = Color::CYAN;
const POSE_TEXT_COLOR: Color = Color::GREEN;
const LIP_COLOR: Color = Color::YELLOW;
const HAND_LINE_COLOR: Color = Color::WHITE;
const HAND_JOINT_COLOR: Color = Color::RED;

/// Draws the lip outline of every face and the skeleton of every hand.
pub fn draw_landmarks(
    image: &mut Image,
    faces: &[face::landmark::LandmarkResult],
    hands: &[hand::landmark::LandmarkResult],
) {
    for face in faces {
        face.draw_lips(image, LIP_COLOR);
    }
    for hand in hands {
        hand.draw(image, HAND_LINE_COLOR, HAND_JOINT_COLOR);
    }
}

/// Draws the detection measurements in the top left corner and the classified pose at the
/// bottom of `image`.
pub fn draw_debug_info(image: &mut Image, info: &DebugInfo, pose: PoseKind, language: Language) {
    let text = language.ui_text();

    draw::rect(image, Rect::from_top_left(5.0, 10.0, 275.0, 170.0))
        .color(Color::BLACK.with_alpha(PANEL_ALPHA))
        .fill();

    let lines = [
        format!("{}: {}", text.hands, info.hands_detected),
        format!("{}: {}", text.face, language.yes_no(info.face_detected)),
        format!("{}: {:.3}", text.mouth, info.mouth_ratio),
        format!("{}: {:.3}", text.hand_height, info.hand_height),
    ];
    for (i, line) in lines.iter().enumerate() {
        let y = 30 + 30 * i as i32;
        draw::text(image, 10, y, line)
            .align_left()
            .align_bottom()
            .font(Font::Medium)
            .color(PANEL_TEXT_COLOR);
    }

    let pose_text = format!("{}: {}", text.pose, pose.key());
    let (w, h) = Font::MediumBold.text_size(&pose_text);
    let (x, y) = (10, image.height() as i32 - 20);
    draw::rect(
        image,
        Rect::from_top_left(
            (x - 5) as f32,
            (y - h as i32 - 5) as f32,
            (w + 10) as f32,
            (h + 10) as f32,
        ),
    )
    .color(Color::BLACK.with_alpha(PANEL_ALPHA))
    .fill();
    draw::text(image, x, y, &pose_text)
        .align_left()
        .align_bottom()
        .font(Font::MediumBold)
        .color(POSE_TEXT_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Estimate;

    fn contains_color(image: &Image, area: Rect, color: Color) -> bool {
        let (x0, y0) = (area.x() as u32, area.y() as u32);
        let (x1, y1) = (x0 + area.width() as u32, y0 + area.height() as u32);
        (y0..y1).any(|y| (x0..x1).any(|x| image.get(x, y) == color))
    }

    #[test]
    fn debug_panel() {
        let mut image = Image::filled(640, 480, Color::WHITE);
        let info = DebugInfo {
            mouth_ratio: 0.2,
            hand_height: -0.1,
            hands_detected: 2,
            face_detected: true,
        };
        draw_debug_info(&mut image, &info, PoseKind::Shocking, Language::English);

        // Darkened, but not opaque.
        let panel = image.get(270, 170);
        assert!(panel.r() < 255 && panel.r() > 0, "{panel:?}");
        // Outside of the panel.
        assert_eq!(image.get(300, 100), Color::WHITE);

        assert!(contains_color(
            &image,
            Rect::from_top_left(10.0, 12.0, 200.0, 20.0),
            PANEL_TEXT_COLOR
        ));
        assert!(contains_color(
            &image,
            Rect::from_top_left(10.0, 430.0, 200.0, 30.0),
            POSE_TEXT_COLOR
        ));
        assert_eq!(image.get(600, 470), Color::WHITE);
    }

    #[test]
    fn hand_skeleton() {
        let mut hand = hand::landmark::LandmarkResult::default();
        for (i, pos) in hand.landmarks_mut().positions_mut().iter_mut().enumerate() {
            *pos = [10.0 + 4.0 * i as f32, 50.0, 0.0];
        }

        let mut image = Image::filled(120, 100, Color::BLACK);
        draw_landmarks(&mut image, &[], &[hand]);
        assert_eq!(image.get(10, 50), HAND_JOINT_COLOR);
        assert_eq!(image.get(10, 10), Color::BLACK);
    }
}
