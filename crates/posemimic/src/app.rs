//! Application state and window composition.

use crate::assets::{self, CharacterImages};
use crate::config::{Config, Palette};
use crate::detector::{DetectPose, PoseDetector};
use crate::gui::{Event, Key};
use crate::i18n::Language;
use crate::image::draw::{self, Font};
use crate::image::{BlendMode, Color, Image, Rect, Resolution};
use crate::pose::PoseKind;

const TOP_BAR_HEIGHT: f32 = 60.0;
/// Space reserved above each panel for its title.
const TITLE_HEIGHT: f32 = 35.0;
/// Space reserved below the character image for the pose name.
const POSE_LABEL_HEIGHT: f32 = 45.0;
/// Share of the content width taken by the camera panel.
const CAMERA_SHARE: f32 = 0.6;
const IMAGE_PADDING: f32 = 10.0;
const CHECKBOX_SIZE: f32 = 14.0;
const SHADOW_ALPHA: u8 = 24;
const SHADOW_OFFSET: f32 = 3.0;

/// Position of the window elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub top_bar: Rect,
    /// Camera panel, including its title.
    pub camera: Rect,
    /// Character panel, including its title and the pose name.
    pub monkey: Rect,
}

impl Layout {
    pub fn compute(resolution: Resolution, margin: f32, spacing: f32) -> Self {
        let (width, height) = (resolution.width() as f32, resolution.height() as f32);
        let top = TOP_BAR_HEIGHT + margin;
        let content_height = (height - top - margin).max(0.0);
        let content_width = (width - 2.0 * margin - spacing).max(0.0);
        let camera_width = (content_width * CAMERA_SHARE).round();

        Self {
            top_bar: Rect::from_top_left(0.0, 0.0, width, TOP_BAR_HEIGHT),
            camera: Rect::from_top_left(margin, top, camera_width, content_height),
            monkey: Rect::from_top_left(
                margin + camera_width + spacing,
                top,
                content_width - camera_width,
                content_height,
            ),
        }
    }
}

/// The state of the application: detector, current pose, and user settings.
pub struct App<D = PoseDetector> {
    detector: D,
    images: CharacterImages,
    palette: Palette,
    margin: f32,
    spacing: f32,
    border_radius: u32,
    shadow: bool,
    flip_horizontal: bool,

    pose: PoseKind,
    show_landmarks: bool,
    language: Language,
    frame: Option<Image>,
}

impl<D: DetectPose> App<D> {
    pub fn new(config: &Config, detector: D, images: CharacterImages) -> anyhow::Result<Self> {
        let ui = &config.ui;
        let this = Self {
            detector,
            images,
            palette: ui.palette()?,
            margin: ui.layout_margin as f32,
            spacing: ui.layout_spacing as f32,
            border_radius: ui.border_radius,
            shadow: ui.shadow_blur > 0,
            flip_horizontal: config.camera.flip_horizontal,
            pose: PoseKind::Default,
            show_landmarks: config.general.show_landmarks,
            language: config.general.language(),
            frame: None,
        };
        let layout = Layout::compute(
            Resolution::new(ui.window_width, ui.window_height),
            this.margin,
            this.spacing,
        );
        for (name, panel, min_width, min_height) in [
            ("camera", layout.camera, ui.camera_min_width, ui.camera_min_height),
            ("character", layout.monkey, ui.monkey_min_width, ui.monkey_min_height),
        ] {
            if panel.width() < min_width as f32 || panel.height() < min_height as f32 {
                log::warn!(
                    "{name} panel is {}x{}, smaller than its minimum size {min_width}x{min_height}",
                    panel.width(),
                    panel.height(),
                );
            }
        }

        this.check_character_image();
        Ok(this)
    }

    pub fn pose(&self) -> PoseKind {
        self.pose
    }

    pub fn show_landmarks(&self) -> bool {
        self.show_landmarks
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Returns the most recent camera frame, with annotations.
    pub fn frame(&self) -> Option<&Image> {
        self.frame.as_ref()
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Classifies a new camera frame and updates the displayed pose.
    pub fn update_frame(&mut self, mut frame: Image) {
        if self.flip_horizontal {
            frame.flip_horizontal_in_place();
        }

        let (frame, pose) = self
            .detector
            .detect_pose(frame, self.show_landmarks, self.language);
        self.frame = Some(frame);

        if pose != self.pose {
            self.pose = pose;
            log::debug!("Updated monkey image to pose: {}", pose.key());
            self.check_character_image();
        }
    }

    fn check_character_image(&self) {
        if self.images.get(self.pose).is_none() {
            log::warn!("No image found for pose: {}", self.pose.key());
        }
    }

    pub fn toggle_landmarks(&mut self) {
        self.show_landmarks = !self.show_landmarks;
        log::info!("Landmarks visibility: {}", self.show_landmarks);
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        log::info!("Language changed to: {}", language.code());
    }

    pub fn cycle_language(&mut self) {
        self.set_language(self.language.next());
    }

    pub fn toggle_debug(&mut self) {
        let show = !self.detector.show_debug_info();
        self.detector.set_show_debug_info(show);
        log::info!("Debug info: {}", if show { "ON" } else { "OFF" });
    }

    /// Reacts to user input. Returns `false` if the application should quit.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::CloseRequested | Event::KeyPressed(Key::Escape | Key::Q) => return false,
            Event::KeyPressed(Key::L) => self.toggle_landmarks(),
            Event::KeyPressed(Key::Tab) => self.cycle_language(),
            Event::KeyPressed(Key::Num1) => self.set_language(Language::Indonesian),
            Event::KeyPressed(Key::Num2) => self.set_language(Language::English),
            Event::KeyPressed(Key::Num3) => self.set_language(Language::Turkish),
            Event::KeyPressed(Key::D) => self.toggle_debug(),
        }
        true
    }

    /// Draws the window contents.
    pub fn render(&self, resolution: Resolution) -> Image {
        let mut canvas = Image::filled(resolution.width(), resolution.height(), self.palette.bg);
        let layout = Layout::compute(resolution, self.margin, self.spacing);
        self.draw_top_bar(&mut canvas, layout.top_bar);
        self.draw_camera_panel(&mut canvas, layout.camera);
        self.draw_monkey_panel(&mut canvas, layout.monkey);
        canvas
    }

    fn draw_top_bar(&self, canvas: &mut Image, area: Rect) {
        let p = &self.palette;
        let text = self.language.ui_text();
        draw::rect(canvas, area).color(p.secondary_bg).fill();
        let bottom = (area.y() + area.height()) as i32 - 1;
        draw::line(canvas, 0, bottom, area.width() as i32, bottom).color(p.border);

        let y = (area.y() + area.height() / 2.0) as i32;
        let mut x = self.margin as i32;

        let language = format!("{} {}", text.language, self.language.display_name());
        draw::text(canvas, x, y, &language)
            .align_left()
            .font(Font::MediumBold)
            .color(p.text);
        x += Font::MediumBold.text_size(&language).0 as i32 + 2 * self.spacing as i32;

        let checkbox = Rect::from_center(
            x as f32 + CHECKBOX_SIZE / 2.0,
            y as f32,
            CHECKBOX_SIZE,
            CHECKBOX_SIZE,
        );
        if self.show_landmarks {
            draw::rect(canvas, checkbox).color(p.accent).fill().corner_radius(3);
        } else {
            draw::rect(canvas, checkbox).color(p.border).stroke_width(2).corner_radius(3);
        }
        x += CHECKBOX_SIZE as i32 + 8;
        draw::text(canvas, x, y, self.language.landmark_toggle(self.show_landmarks))
            .align_left()
            .font(Font::Medium)
            .color(p.text);

        let right = (area.width() - self.margin) as i32;
        draw::text(canvas, right, y, "L | Tab 1 2 3 | D | Esc")
            .align_right()
            .font(Font::Small)
            .color(p.secondary_text);
    }

    fn draw_title(&self, canvas: &mut Image, area: Rect, title: &str) {
        draw::text(canvas, area.x() as i32, area.y() as i32, title)
            .align_left()
            .align_top()
            .font(Font::Large)
            .color(self.palette.text);
    }

    fn draw_container(&self, canvas: &mut Image, rect: Rect, fill: Color) {
        if self.shadow {
            draw::rect(canvas, rect.move_by(SHADOW_OFFSET, SHADOW_OFFSET))
                .color(Color::BLACK.with_alpha(SHADOW_ALPHA))
                .fill()
                .corner_radius(self.border_radius);
        }
        draw::rect(canvas, rect)
            .color(fill)
            .fill()
            .corner_radius(self.border_radius);
    }

    fn draw_camera_panel(&self, canvas: &mut Image, area: Rect) {
        let text = self.language.ui_text();
        self.draw_title(canvas, area, text.camera_title);

        let container = Rect::from_top_left(
            area.x(),
            area.y() + TITLE_HEIGHT,
            area.width(),
            (area.height() - TITLE_HEIGHT).max(0.0),
        );
        self.draw_container(canvas, container, Color::BLACK);
        if let Some(frame) = &self.frame {
            blit_fit(canvas, container, frame);
        }
    }

    fn draw_monkey_panel(&self, canvas: &mut Image, area: Rect) {
        let p = &self.palette;
        let text = self.language.ui_text();
        self.draw_title(canvas, area, text.monkey_title);

        let container = Rect::from_top_left(
            area.x(),
            area.y() + TITLE_HEIGHT,
            area.width(),
            (area.height() - TITLE_HEIGHT - POSE_LABEL_HEIGHT).max(0.0),
        );
        self.draw_container(canvas, container, p.secondary_bg);
        draw::rect(canvas, container)
            .color(p.border)
            .corner_radius(self.border_radius);

        let inner = container.inset(IMAGE_PADDING);
        match self.images.get(self.pose) {
            Some(image) => blit_fit(canvas, inner, image),
            None => assets::draw_placeholder(&mut canvas.view_mut(inner), self.pose, p),
        }

        let center = container.center();
        let label_y = container.y() + container.height() + POSE_LABEL_HEIGHT / 2.0;
        draw::text(
            canvas,
            center.x as i32,
            label_y as i32,
            self.language.pose_name(self.pose),
        )
        .font(Font::Large)
        .color(p.accent);
    }
}

/// Scales `image` to the largest size fitting into `area` that keeps its aspect ratio, and draws
/// it centered in `area`.
fn blit_fit(canvas: &mut Image, area: Rect, image: &Image) {
    let Some(aspect) = image.resolution().aspect_ratio() else {
        return;
    };
    let fit = area.fit_aspect_inside(aspect.as_f32());
    let target = Rect::from_top_left(
        fit.x().round(),
        fit.y().round(),
        fit.width().round(),
        fit.height().round(),
    );
    if target.width() < 1.0 || target.height() < 1.0 {
        return;
    }
    canvas
        .view_mut(target)
        .blend_from(image)
        .mode(BlendMode::Overwrite);
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, Once};

    use super::*;

    /// Returns a fixed pose and marks the frame.
    struct FakeDetector {
        pose: PoseKind,
        show_debug_info: bool,
        calls: Vec<(bool, Language)>,
    }

    impl FakeDetector {
        fn new(pose: PoseKind) -> Self {
            Self {
                pose,
                show_debug_info: true,
                calls: Vec::new(),
            }
        }
    }

    impl DetectPose for FakeDetector {
        fn detect_pose(
            &mut self,
            frame: Image,
            show_landmarks: bool,
            language: Language,
        ) -> (Image, PoseKind) {
            self.calls.push((show_landmarks, language));
            (frame, self.pose)
        }

        fn show_debug_info(&self) -> bool {
            self.show_debug_info
        }

        fn set_show_debug_info(&mut self, show: bool) {
            self.show_debug_info = show;
        }

        fn release(&mut self) {}
    }

    /// Records every logged message, so tests can check what was reported.
    struct CaptureLog(Mutex<Vec<String>>);

    impl CaptureLog {
        fn contains(&self, message: &str) -> bool {
            let messages = self.0.lock().unwrap_or_else(|e| e.into_inner());
            messages.iter().any(|m| m == message)
        }
    }

    impl log::Log for CaptureLog {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let mut messages = self.0.lock().unwrap_or_else(|e| e.into_inner());
            messages.push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    fn capture_logs() -> &'static CaptureLog {
        static LOG: CaptureLog = CaptureLog(Mutex::new(Vec::new()));
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&LOG).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
        &LOG
    }

    fn app(pose: PoseKind) -> App<FakeDetector> {
        App::new(
            &Config::default(),
            FakeDetector::new(pose),
            CharacterImages::default(),
        )
        .unwrap()
    }

    #[test]
    fn layout() {
        let layout = Layout::compute(Resolution::new(1280, 720), 20.0, 20.0);
        assert_eq!(layout.top_bar, Rect::from_top_left(0.0, 0.0, 1280.0, 60.0));
        assert_eq!(layout.camera, Rect::from_top_left(20.0, 80.0, 732.0, 620.0));
        assert_eq!(layout.monkey, Rect::from_top_left(772.0, 80.0, 488.0, 620.0));
    }

    #[test]
    fn tiny_window_layout() {
        let layout = Layout::compute(Resolution::new(10, 10), 20.0, 20.0);
        assert_eq!(layout.camera.width(), 0.0);
        assert_eq!(layout.camera.height(), 0.0);
        assert_eq!(layout.monkey.width(), 0.0);
    }

    #[test]
    fn initial_state() {
        let app = app(PoseKind::Default);
        assert_eq!(app.pose(), PoseKind::Default);
        assert!(app.show_landmarks());
        assert_eq!(app.language(), Language::Indonesian);
        assert!(app.frame().is_none());
    }

    #[test]
    fn update_frame_flips_and_classifies() {
        let mut app = app(PoseKind::Shocking);
        let mut frame = Image::filled(4, 2, Color::BLACK);
        frame.set(0, 0, Color::RED);

        app.update_frame(frame);
        assert_eq!(app.pose(), PoseKind::Shocking);
        let frame = app.frame().unwrap();
        assert_eq!(frame.get(3, 0), Color::RED);
        assert_eq!(frame.get(0, 0), Color::BLACK);
        assert_eq!(app.detector.calls, [(true, Language::Indonesian)]);
    }

    #[test]
    fn logs_state_changes() {
        let log = capture_logs();
        let mut app = app(PoseKind::RaisingHand);

        app.update_frame(Image::new(2, 2));
        assert!(log.contains("Updated monkey image to pose: raising_hand"));

        app.toggle_landmarks();
        assert!(log.contains("Landmarks visibility: false"));
        app.toggle_landmarks();
        assert!(log.contains("Landmarks visibility: true"));

        app.set_language(Language::Turkish);
        assert!(log.contains("Language changed to: tr"));
    }

    #[test]
    fn keys() {
        let mut app = app(PoseKind::Default);

        assert!(app.handle_event(Event::KeyPressed(Key::L)));
        assert!(!app.show_landmarks());
        assert!(app.handle_event(Event::KeyPressed(Key::Tab)));
        assert_eq!(app.language(), Language::English);
        assert!(app.handle_event(Event::KeyPressed(Key::Num3)));
        assert_eq!(app.language(), Language::Turkish);
        assert!(app.handle_event(Event::KeyPressed(Key::Num1)));
        assert_eq!(app.language(), Language::Indonesian);
        assert!(app.handle_event(Event::KeyPressed(Key::D)));
        assert!(!app.detector.show_debug_info);

        app.update_frame(Image::new(2, 2));
        assert_eq!(app.detector.calls, [(false, Language::Indonesian)]);

        assert!(!app.handle_event(Event::KeyPressed(Key::Escape)));
        assert!(!app.handle_event(Event::KeyPressed(Key::Q)));
        assert!(!app.handle_event(Event::CloseRequested));
    }

    #[test]
    fn render_composes_panels() {
        let mut app = app(PoseKind::Thinking);
        let character = Image::filled(100, 100, Color::from_rgb8(10, 200, 10));
        app.images.insert(PoseKind::Thinking, character);
        app.update_frame(Image::filled(640, 480, Color::RED));

        let canvas = app.render(Resolution::new(1280, 720));
        assert_eq!(canvas.width(), 1280);
        assert_eq!(canvas.height(), 720);

        let palette = app.palette;
        // Top bar and background.
        assert_eq!(canvas.get(640, 5), palette.secondary_bg);
        assert_eq!(canvas.get(5, 710), palette.bg);
        // Camera frame, letterboxed into the camera container.
        let layout = Layout::compute(Resolution::new(1280, 720), 20.0, 20.0);
        let camera = layout.camera.center();
        assert_eq!(canvas.get(camera.x as u32, camera.y as u32), Color::RED);
        // Character image, in the middle of the character panel.
        let monkey = layout.monkey.center();
        assert_eq!(
            canvas.get(monkey.x as u32, monkey.y as u32),
            Color::from_rgb8(10, 200, 10)
        );
    }

    #[test]
    fn render_placeholder_for_missing_image() {
        let mut app = app(PoseKind::RaisingHand);
        app.update_frame(Image::filled(64, 48, Color::from_rgb8(0, 0, 255)));

        let canvas = app.render(Resolution::new(1280, 720));
        let layout = Layout::compute(Resolution::new(1280, 720), 20.0, 20.0);
        let monkey = layout.monkey;
        let (x0, y0) = (monkey.x() as u32, monkey.y() as u32);
        let warning = (y0..y0 + monkey.height() as u32).any(|y| {
            (x0..x0 + monkey.width() as u32).any(|x| canvas.get(x, y) == app.palette.warning)
        });
        assert!(warning);
    }
}
