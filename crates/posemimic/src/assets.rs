//! Character images shown for each pose.

use std::collections::HashMap;

use crate::config::{AssetConfig, Palette};
use crate::image::draw::{self, Font};
use crate::image::{AsImageViewMut, Image};
use crate::pose::PoseKind;

/// Length of the dashes of the placeholder frame, in pixels.
const PLACEHOLDER_DASH: u32 = 8;
const PLACEHOLDER_INSET: f32 = 10.0;

/// The character image of every pose, as far as they could be loaded.
#[derive(Debug, Default)]
pub struct CharacterImages {
    images: HashMap<PoseKind, Image>,
}

impl CharacterImages {
    /// Loads `<base_dir>/<pose>_pose.jpg` for every pose.
    ///
    /// Images that are missing or fail to decode are logged and skipped; the pose will be shown
    /// with a placeholder instead.
    pub fn load(config: &AssetConfig) -> Self {
        let mut images = HashMap::new();
        for pose in PoseKind::ALL {
            let path = config.path_for(pose);
            if !path.exists() {
                log::warn!("Image not found for pose '{}': {}", pose.key(), path.display());
                continue;
            }
            match Image::load(&path) {
                Ok(image) => {
                    log::info!("Loaded image for pose '{}': {}", pose.key(), path.display());
                    images.insert(pose, image);
                }
                Err(e) => log::warn!("Failed to load image {}: {e:#}", path.display()),
            }
        }
        Self { images }
    }

    pub fn get(&self, pose: PoseKind) -> Option<&Image> {
        self.images.get(&pose)
    }

    pub fn insert(&mut self, pose: PoseKind, image: Image) {
        self.images.insert(pose, image);
    }

    /// Returns the number of loaded images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Fills `target` with a dashed frame and a notice that the image of `pose` is missing.
pub fn draw_placeholder<I: AsImageViewMut>(target: &mut I, pose: PoseKind, palette: &Palette) {
    let mut view = target.as_view_mut();
    let rect = view.rect().inset(PLACEHOLDER_INSET);
    draw::rect(&mut view, rect)
        .color(palette.border)
        .stroke_width(2)
        .dashed(PLACEHOLDER_DASH);

    let text = format!("{}\n\n(Image not found)", pose.key());
    let (_, text_height) = Font::Medium.text_size(&text);
    let center = rect.center();
    // The first line is centered on `y`, the rest hangs below it.
    let y = center.y - (text_height - Font::Medium.line_height()) as f32 / 2.0;
    draw::text(&mut view, center.x.round() as i32, y.round() as i32, &text)
        .font(Font::Medium)
        .color(palette.warning);
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::UiConfig;
    use crate::image::{Color, Rect};

    #[test]
    fn missing_directory_loads_nothing() {
        let images = CharacterImages::load(&AssetConfig {
            base_dir: PathBuf::from("/nonexistent/posemimic-assets"),
        });
        assert!(images.is_empty());
        assert!(images.get(PoseKind::Default).is_none());
    }

    #[test]
    fn insert_and_get() {
        let mut images = CharacterImages::default();
        images.insert(PoseKind::Shocking, Image::filled(4, 4, Color::RED));
        assert_eq!(images.len(), 1);
        assert_eq!(
            images.get(PoseKind::Shocking).map(|img| img.get(0, 0)),
            Some(Color::RED)
        );
        assert!(images.get(PoseKind::Thinking).is_none());
    }

    #[test]
    fn placeholder() {
        let palette = UiConfig::default().palette().unwrap();
        let mut image = Image::filled(300, 300, Color::WHITE);
        draw_placeholder(&mut image, PoseKind::RaisingHand, &palette);

        // First dash of the frame, along the top edge of the inset rect.
        assert!(contains_color(
            &image,
            Rect::from_top_left(11.0, 8.0, 6.0, 5.0),
            palette.border
        ));
        // Gap between the first two dashes.
        assert!(!contains_color(
            &image,
            Rect::from_top_left(20.0, 8.0, 4.0, 5.0),
            palette.border
        ));
        assert!(contains_color(
            &image,
            Rect::from_top_left(50.0, 100.0, 200.0, 100.0),
            palette.warning
        ));
    }

    fn contains_color(image: &Image, area: Rect, color: Color) -> bool {
        let (x0, y0) = (area.x() as u32, area.y() as u32);
        let (x1, y1) = (x0 + area.width() as u32, y0 + area.height() as u32);
        (y0..y1).any(|y| (x0..x1).any(|x| image.get(x, y) == color))
    }
}
