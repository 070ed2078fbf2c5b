use std::thread;
use std::time::{Duration, Instant};

use log::LevelFilter;
use posemimic::app::App;
use posemimic::assets::CharacterImages;
use posemimic::config::Config;
use posemimic::detector::{DetectPose, PoseDetector};
use posemimic::gui::{self, Gui};
use posemimic::timer::FpsCounter;
use posemimic::video::webcam::Webcam;

fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let log_level = config
        .as_ref()
        .map_or(LevelFilter::Info, |config| config.general.level_filter());
    posemimic::init_logger!(log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {e:#}");
            return Err(e);
        }
    };

    log::info!("Starting Monkey Pose Mimic application...");
    let ui = config.ui.clone();
    gui::run(&ui, move |gui| run(config, gui))
}

fn run(config: Config, gui: Gui) -> anyhow::Result<()> {
    let mut webcam = Webcam::open(&config.camera).map_err(|e| {
        log::error!("Camera initialization failed: {e:#}");
        e
    })?;
    log::info!("Camera initialized: {}", webcam.resolution());

    let detector = PoseDetector::new(&config).map_err(|e| {
        log::error!("Failed to initialize PoseDetector: {e:#}");
        e
    })?;
    let images = CharacterImages::load(&config.assets);
    let mut app = App::new(&config, detector, images)?;
    log::info!("Application window displayed");

    let frame_time = Duration::from_millis(1000 / u64::from(config.camera.fps.max(1)));
    let mut fps = FpsCounter::new("main loop");
    'main: loop {
        let frame_start = Instant::now();

        for event in gui.events().poll() {
            if !app.handle_event(event) {
                break 'main;
            }
        }

        match webcam.read() {
            Ok(frame) => {
                app.update_frame(frame);
                let canvas = app.render(gui.resolution());
                if gui.show(&canvas).is_err() {
                    break 'main;
                }
            }
            Err(e) => log::warn!("Failed to read frame from camera: {e:#}"),
        }

        fps.tick_with(webcam.timers());

        // Cameras may deliver frames faster than the configured rate.
        if let Some(remaining) = frame_time.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    log::info!("Closing application...");
    drop(webcam);
    app.detector_mut().release();
    log::info!("Application closed successfully");
    Ok(())
}
