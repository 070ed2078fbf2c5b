//! Pose detection facade.
//!
//! [`PoseDetector`] runs the face, hand and body pipelines concurrently on one worker thread each,
//! then classifies the combined landmarks with [`pose::classify`].
//!
//! Every pipeline follows the same scheme: while fewer objects than allowed are tracked, a
//! detection network looks for new ones. Each detection seeds a [`LandmarkTracker`], which follows
//! its object across frames until the landmark network's confidence drops below the tracking
//! threshold.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use pawawwewism::{promise, Promise, PromiseHandle, Worker};

use crate::body::{self, detection::PoseNetwork, landmark::PoseLandmarkNetwork};
use crate::config::Config;
use crate::detection::{Detection, Detector};
use crate::face::{self, detection::ShortRangeNetwork, landmark::FaceMesh};
use crate::filter::ema::Ema;
use crate::hand::{self, detection::PalmNetwork, landmark::HandLandmarkNetwork};
use crate::i18n::Language;
use crate::image::{Image, RotatedRect};
use crate::landmark::{Confidence, Estimate, Estimator, LandmarkFilter, LandmarkTracker, Network};
use crate::overlay;
use crate::pose::{self, DebugInfo, Observation, PoseKind, Thresholds};
use crate::timer::{FpsCounter, Timer};

/// Minimum overlap of a new detection with a tracked object for them to be considered the same.
const OVERLAP_IOU: f32 = 0.3;

const FACE_ROI_PADDING: f32 = 0.25;
const HAND_ROI_PADDING: f32 = 0.5;
const BODY_ROI_PADDING: f32 = 0.125;

/// Weight of new body landmark positions when smoothing is enabled.
const BODY_SMOOTHING_ALPHA: f32 = 0.7;

/// Landmarks found in a single frame, in pixel coordinates of that frame.
#[derive(Debug, Clone, Default)]
pub struct FrameLandmarks {
    pub faces: Vec<face::landmark::LandmarkResult>,
    pub hands: Vec<hand::landmark::LandmarkResult>,
    pub bodies: Vec<body::landmark::LandmarkResult>,
}

impl FrameLandmarks {
    /// Converts the landmarks to the normalized form the classifier works on.
    pub fn observation(&self, frame_width: u32, frame_height: u32) -> Observation {
        let normalize = |[x, y, _]: [f32; 3]| Observation::normalize(x, y, frame_width, frame_height);

        Observation {
            body: self.bodies.first().map(|body| {
                body.pose_landmarks()
                    .map(|lm| normalize(lm.position()))
                    .collect()
            }),
            hands: self
                .hands
                .iter()
                .map(|hand| hand.landmarks().positions().iter().copied().map(normalize).collect())
                .collect(),
            faces: self
                .faces
                .iter()
                .map(|face| face.landmarks().positions().iter().copied().map(normalize).collect())
                .collect(),
        }
    }
}

/// Detects faces, hands and bodies in camera frames and classifies the pose they show.
pub struct PoseDetector {
    workers: Option<Workers>,
    thresholds: Thresholds,
    show_debug_info: bool,
    debug_info: DebugInfo,
}

impl PoseDetector {
    /// Loads all networks and starts the pipeline workers.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        log::info!("Initializing PoseDetector...");
        let workers = Workers::spawn(config).context("Failed to initialize models")?;
        log::info!("Models initialized successfully");

        Ok(Self {
            workers: Some(workers),
            thresholds: config.pose.thresholds(),
            show_debug_info: config.general.show_debug_info,
            debug_info: DebugInfo::default(),
        })
    }

    /// Returns the measurements of the most recent classification.
    pub fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }

    fn run_pipelines(&mut self, image: &Arc<Image>) -> anyhow::Result<FrameLandmarks> {
        let workers = self
            .workers
            .as_mut()
            .ok_or_else(|| anyhow!("PoseDetector has been released"))?;

        let (faces, faces_handle) = promise();
        let (hands, hands_handle) = promise();
        let (bodies, bodies_handle) = promise();
        workers.face.send(Job {
            image: image.clone(),
            results: faces,
        });
        workers.hands.send(Job {
            image: image.clone(),
            results: hands,
        });
        workers.body.send(Job {
            image: image.clone(),
            results: bodies,
        });

        Ok(FrameLandmarks {
            faces: wait("face", faces_handle)?,
            hands: wait("hand", hands_handle)?,
            bodies: wait("body", bodies_handle)?,
        })
    }

    /// Stops all pipeline workers. Calling [`PoseDetector::detect_pose`] afterwards only returns
    /// the default pose.
    pub fn release(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };

        log::info!("Releasing PoseDetector resources...");
        match catch_unwind(AssertUnwindSafe(move || drop(workers))) {
            Ok(()) => log::info!("Resources released successfully"),
            Err(_) => log::error!("Error releasing resources: a worker thread panicked"),
        }
    }
}

impl Drop for PoseDetector {
    fn drop(&mut self) {
        self.release();
    }
}

/// Classifies the pose shown in camera frames.
pub trait DetectPose {
    /// Runs detection on `frame` and classifies the pose.
    ///
    /// Detection always runs. If `show_landmarks` is set, the landmarks (and, if enabled, the
    /// debug panel, translated to `language`) are drawn onto the returned frame; otherwise it is
    /// returned unchanged. If detection fails, the error is logged and the unchanged frame is
    /// returned together with [`PoseKind::Default`].
    fn detect_pose(
        &mut self,
        frame: Image,
        show_landmarks: bool,
        language: Language,
    ) -> (Image, PoseKind);

    /// Returns whether the debug panel is drawn along with the landmarks.
    fn show_debug_info(&self) -> bool;

    fn set_show_debug_info(&mut self, show: bool);

    /// Frees all resources. Afterwards, every frame is classified as [`PoseKind::Default`].
    fn release(&mut self);
}

impl DetectPose for PoseDetector {
    fn show_debug_info(&self) -> bool {
        self.show_debug_info
    }

    fn set_show_debug_info(&mut self, show: bool) {
        self.show_debug_info = show;
    }

    fn detect_pose(
        &mut self,
        frame: Image,
        show_landmarks: bool,
        language: Language,
    ) -> (Image, PoseKind) {
        let frame = Arc::new(frame);
        let result = self.run_pipelines(&frame);
        // Workers release the frame before fulfilling their promise, so this usually avoids a copy.
        let mut frame = Arc::try_unwrap(frame).unwrap_or_else(|frame| (*frame).clone());

        let landmarks = match result {
            Ok(landmarks) => landmarks,
            Err(e) => {
                log::error!("Detection failed: {e:#}");
                return (frame, PoseKind::Default);
            }
        };

        let obs = landmarks.observation(frame.width(), frame.height());
        self.debug_info = DebugInfo::for_observation(&obs);
        let pose = pose::classify(&obs, &self.thresholds, &mut self.debug_info);

        if show_landmarks {
            overlay::draw_landmarks(&mut frame, &landmarks.faces, &landmarks.hands);
            if self.show_debug_info {
                overlay::draw_debug_info(&mut frame, &self.debug_info, pose, language);
            }
        }

        (frame, pose)
    }

    fn release(&mut self) {
        PoseDetector::release(self);
    }
}

fn wait<E>(name: &str, handle: PromiseHandle<anyhow::Result<Vec<E>>>) -> anyhow::Result<Vec<E>> {
    handle
        .block()
        .map_err(|_| anyhow!("{name} worker has stopped"))?
        .with_context(|| format!("{name} pipeline failed"))
}

struct Job<E> {
    image: Arc<Image>,
    results: Promise<anyhow::Result<Vec<E>>>,
}

struct Workers {
    face: Worker<Job<face::landmark::LandmarkResult>>,
    hands: Worker<Job<hand::landmark::LandmarkResult>>,
    body: Worker<Job<body::landmark::LandmarkResult>>,
}

impl Workers {
    fn spawn(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            face: spawn_pipeline(face_pipeline(config)?)?,
            hands: spawn_pipeline(hand_pipeline(config)?)?,
            body: spawn_pipeline(body_pipeline(config)?)?,
        })
    }
}

fn face_pipeline(config: &Config) -> anyhow::Result<Pipeline<face::landmark::LandmarkResult>> {
    let cfg = &config.face;
    let models = &config.models;
    let version = cfg.mesh_version();

    let mut detector = Detector::new(ShortRangeNetwork::load(&models.face_detection())?);
    detector.set_threshold(cfg.min_detection_confidence);
    let mesh = FaceMesh::load(&models.face_landmarks(version), version)?;

    Ok(Pipeline::new(
        "face",
        detector,
        face::detection::detection_roi,
        tracker_factory(mesh, cfg.min_tracking_confidence, FACE_ROI_PADDING),
        cfg.max_num_faces,
    ))
}

fn hand_pipeline(config: &Config) -> anyhow::Result<Pipeline<hand::landmark::LandmarkResult>> {
    let cfg = &config.hands;
    let models = &config.models;

    let mut detector = Detector::new(PalmNetwork::load(
        &models.palm_detection(cfg.model_complexity),
    )?);
    detector.set_threshold(cfg.min_detection_confidence);
    let landmarker = HandLandmarkNetwork::load(&models.hand_landmarks(cfg.model_complexity))?;

    Ok(Pipeline::new(
        "hand",
        detector,
        hand::detection::detection_roi,
        tracker_factory(landmarker, cfg.min_tracking_confidence, HAND_ROI_PADDING),
        cfg.max_num_hands,
    ))
}

fn body_pipeline(config: &Config) -> anyhow::Result<Pipeline<body::landmark::LandmarkResult>> {
    let cfg = &config.pose;
    let models = &config.models;

    let mut detector = Detector::new(PoseNetwork::load(&models.pose_detection())?);
    detector.set_threshold(cfg.min_detection_confidence);
    let landmarker = PoseLandmarkNetwork::load(&models.pose_landmarks(cfg.model_complexity))?;

    let mut pipeline = Pipeline::new(
        "body",
        detector,
        body::detection::detection_roi,
        tracker_factory(landmarker, cfg.min_tracking_confidence, BODY_ROI_PADDING),
        1,
    );
    if cfg.smooth_landmarks {
        pipeline.set_filter(|| {
            LandmarkFilter::new(
                Ema::new(BODY_SMOOTHING_ALPHA),
                body::landmark::NUM_LANDMARKS,
            )
        });
    }
    Ok(pipeline)
}

type TrackerFactory<E> = Box<dyn FnMut() -> anyhow::Result<LandmarkTracker<E>> + Send>;

fn tracker_factory<N>(network: N, loss_threshold: f32, roi_padding: f32) -> TrackerFactory<N::Output>
where
    N: Network + Clone,
    N::Output: Confidence + Default,
{
    Box::new(move || {
        let mut tracker = LandmarkTracker::new(Estimator::new(network.clone()))?;
        tracker.set_loss_threshold(loss_threshold);
        tracker.set_roi_padding(roi_padding);
        Ok(tracker)
    })
}

fn spawn_pipeline<E>(mut pipeline: Pipeline<E>) -> anyhow::Result<Worker<Job<E>>>
where
    E: Estimate + Confidence + Clone,
{
    let name = pipeline.name;
    let mut fps = FpsCounter::new(name);
    let t_total = Timer::new("total");

    let worker = Worker::builder()
        .name(format!("{name} pipeline"))
        .spawn(move |Job { image, results }: Job<E>| {
            let res = t_total.time(|| pipeline.process(&image));
            drop(image);
            results.fulfill(res);

            fps.tick_with([&t_total].into_iter().chain(pipeline.timers()));
        })
        .with_context(|| format!("failed to spawn {name} worker"))?;
    Ok(worker)
}

struct Tracked<E: Estimate + Confidence> {
    tracker: LandmarkTracker<E>,
    filter: LandmarkFilter,
}

impl<E: Estimate + Confidence + Clone> Tracked<E> {
    /// Tracks the object in `image`, returning its filtered landmarks, or [`None`] if it was lost.
    fn track(&mut self, image: &Image) -> anyhow::Result<Option<E>> {
        let Some(estimate) = self.tracker.track(image)? else {
            return Ok(None);
        };
        let mut estimate = estimate.clone();
        self.filter.filter(estimate.landmarks_mut());
        Ok(Some(estimate))
    }
}

/// Detection and tracking of up to `max_tracked` objects of one kind.
struct Pipeline<E: Estimate + Confidence> {
    name: &'static str,
    detector: Detector,
    detection_roi: fn(&Detection) -> RotatedRect,
    new_tracker: TrackerFactory<E>,
    new_filter: Box<dyn Fn() -> LandmarkFilter + Send>,
    tracked: Vec<Tracked<E>>,
    max_tracked: usize,
}

impl<E: Estimate + Confidence + Clone> Pipeline<E> {
    fn new(
        name: &'static str,
        detector: Detector,
        detection_roi: fn(&Detection) -> RotatedRect,
        new_tracker: TrackerFactory<E>,
        max_tracked: usize,
    ) -> Self {
        Self {
            name,
            detector,
            detection_roi,
            new_tracker,
            new_filter: Box::new(LandmarkFilter::default),
            tracked: Vec::new(),
            max_tracked,
        }
    }

    /// Sets the filter applied to the landmarks of every newly tracked object.
    fn set_filter(&mut self, new_filter: impl Fn() -> LandmarkFilter + Send + 'static) {
        self.new_filter = Box::new(new_filter);
    }

    fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        self.detector
            .timers()
            .chain(self.tracked.iter().flat_map(|t| t.tracker.timers()))
    }

    /// Updates all tracked objects and looks for new ones, returning the landmarks of every object
    /// found in `image`.
    ///
    /// On error, all tracking state is discarded.
    fn process(&mut self, image: &Image) -> anyhow::Result<Vec<E>> {
        let res = self.process_impl(image);
        if res.is_err() {
            self.tracked.clear();
        }
        res
    }

    fn process_impl(&mut self, image: &Image) -> anyhow::Result<Vec<E>> {
        let mut results = Vec::with_capacity(self.max_tracked);

        let mut still_tracked = Vec::with_capacity(self.tracked.len());
        for mut tracked in self.tracked.drain(..) {
            match tracked.track(image)? {
                Some(estimate) => {
                    results.push(estimate);
                    still_tracked.push(tracked);
                }
                None => log::debug!("{}: tracking lost", self.name),
            }
        }
        self.tracked = still_tracked;

        if self.tracked.len() >= self.max_tracked {
            return Ok(results);
        }

        let rois = self
            .detector
            .detect(image)?
            .iter()
            .map(self.detection_roi)
            .collect::<Vec<_>>();
        for roi in rois {
            if self.tracked.len() >= self.max_tracked {
                break;
            }
            let overlaps = self.tracked.iter().any(|t| {
                t.tracker
                    .roi()
                    .map_or(false, |tracked| tracked.rect().iou(roi.rect()) >= OVERLAP_IOU)
            });
            if overlaps {
                continue;
            }

            let mut tracked = Tracked {
                tracker: (self.new_tracker)()?,
                filter: (self.new_filter)(),
            };
            tracked.tracker.set_roi(roi);
            if let Some(estimate) = tracked.track(image)? {
                log::debug!("{}: tracking new object", self.name);
                results.push(estimate);
                self.tracked.push(tracked);
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use approx::assert_abs_diff_eq;

    use crate::detection::Detections;
    use crate::image::{Color, Rect, Resolution};
    use crate::landmark::Landmarks;
    use crate::nn::{Cnn, Outputs};

    use super::*;

    const INPUT: Resolution = Resolution::new(64, 64);

    /// What the scripted networks see. Shared by the detection and landmark networks of a test.
    #[derive(Default)]
    struct Scene {
        /// Objects reported by every detection pass.
        objects: Vec<Rect>,
        /// Confidence reported by every landmark pass.
        confidence: f32,
        detect_calls: usize,
        fail_detection: bool,
        fail_tracking: bool,
    }

    type SharedScene = Arc<Mutex<Scene>>;

    fn scene(objects: Vec<Rect>) -> SharedScene {
        Arc::new(Mutex::new(Scene {
            objects,
            confidence: 0.9,
            ..Scene::default()
        }))
    }

    struct SceneDetector {
        cnn: Cnn,
        scene: SharedScene,
    }

    impl crate::detection::Network for SceneDetector {
        fn cnn(&self) -> &Cnn {
            &self.cnn
        }

        fn extract(&self, _: &Outputs, _: f32, detections: &mut Detections) -> anyhow::Result<()> {
            let mut scene = self.scene.lock().unwrap();
            scene.detect_calls += 1;
            if scene.fail_detection {
                anyhow::bail!("detection network failed");
            }
            for rect in &scene.objects {
                detections.push(Detection::new(1.0, *rect));
            }
            Ok(())
        }
    }

    /// Two landmarks on the corners of the tracked RoI.
    #[derive(Debug, Clone)]
    struct Object {
        landmarks: Landmarks,
        confidence: f32,
    }

    impl Default for Object {
        fn default() -> Self {
            Self {
                landmarks: Landmarks::new(2),
                confidence: 0.0,
            }
        }
    }

    impl Estimate for Object {
        fn landmarks(&self) -> &Landmarks {
            &self.landmarks
        }

        fn landmarks_mut(&mut self) -> &mut Landmarks {
            &mut self.landmarks
        }
    }

    impl Confidence for Object {
        fn confidence(&self) -> f32 {
            self.confidence
        }
    }

    #[derive(Clone)]
    struct SceneLandmarks {
        cnn: Cnn,
        scene: SharedScene,
    }

    impl Network for SceneLandmarks {
        type Output = Object;

        fn cnn(&self) -> &Cnn {
            &self.cnn
        }

        fn extract(&self, _: &Outputs, estimate: &mut Object) -> anyhow::Result<()> {
            let scene = self.scene.lock().unwrap();
            if scene.fail_tracking {
                anyhow::bail!("landmark network failed");
            }
            let positions = estimate.landmarks.positions_mut();
            positions[0] = [0.0, 0.0, 0.0];
            positions[1] = [INPUT.width() as f32, INPUT.height() as f32, 0.0];
            estimate.confidence = scene.confidence;
            Ok(())
        }
    }

    fn object_roi(det: &Detection) -> RotatedRect {
        det.bounding_rect().into()
    }

    fn scene_detector(scene: &SharedScene) -> Detector {
        Detector::new(SceneDetector {
            cnn: Cnn::passthrough(INPUT).unwrap(),
            scene: scene.clone(),
        })
    }

    /// A pipeline with a loss threshold of 0.5 whose RoIs are exactly the landmark bounds.
    fn scene_pipeline(scene: &SharedScene, max_tracked: usize) -> Pipeline<Object> {
        let landmarks = SceneLandmarks {
            cnn: Cnn::passthrough(INPUT).unwrap(),
            scene: scene.clone(),
        };
        Pipeline::new(
            "test",
            scene_detector(scene),
            object_roi,
            tracker_factory(landmarks, 0.5, 0.0),
            max_tracked,
        )
    }

    fn square(x: f32, y: f32) -> Rect {
        Rect::from_top_left(x, y, 16.0, 16.0)
    }

    fn assert_position(actual: [f32; 3], [x, y]: [f32; 2]) {
        assert_abs_diff_eq!(actual[0], x, epsilon = 1e-3);
        assert_abs_diff_eq!(actual[1], y, epsilon = 1e-3);
    }

    fn detect_calls(scene: &SharedScene) -> usize {
        scene.lock().unwrap().detect_calls
    }

    #[test]
    fn tracked_object_skips_detection() {
        let scene = scene(vec![square(8.0, 8.0)]);
        let mut pipeline = scene_pipeline(&scene, 1);
        let image = Image::new(64, 64);

        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(detect_calls(&scene), 1);

        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(detect_calls(&scene), 1);
    }

    #[test]
    fn lost_object_is_detected_again() {
        let scene = scene(vec![square(8.0, 8.0)]);
        let mut pipeline = scene_pipeline(&scene, 1);
        let image = Image::new(64, 64);

        assert_eq!(pipeline.process(&image).unwrap().len(), 1);

        // Confidence at the loss threshold keeps the object.
        scene.lock().unwrap().confidence = 0.5;
        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(detect_calls(&scene), 1);

        // Below it, the object is dropped and the detector runs again in the same frame.
        scene.lock().unwrap().confidence = 0.4;
        assert!(pipeline.process(&image).unwrap().is_empty());
        assert!(pipeline.tracked.is_empty());
        assert_eq!(detect_calls(&scene), 2);

        scene.lock().unwrap().confidence = 0.9;
        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(detect_calls(&scene), 3);
    }

    #[test]
    fn overlapping_detection_is_not_tracked_twice() {
        let scene = scene(vec![square(8.0, 8.0)]);
        let mut pipeline = scene_pipeline(&scene, 3);
        let image = Image::new(64, 64);

        assert_eq!(pipeline.process(&image).unwrap().len(), 1);

        // The first object is still detected, next to a new one.
        scene.lock().unwrap().objects = vec![square(10.0, 10.0), square(40.0, 40.0)];
        assert_eq!(pipeline.process(&image).unwrap().len(), 2);
        assert_eq!(pipeline.tracked.len(), 2);

        assert_eq!(pipeline.process(&image).unwrap().len(), 2);
        assert_eq!(pipeline.tracked.len(), 2);
    }

    #[test]
    fn tracks_at_most_max_objects() {
        let objects = vec![square(0.0, 0.0), square(40.0, 0.0), square(0.0, 40.0)];

        let scene1 = scene(objects.clone());
        let mut single = scene_pipeline(&scene1, 1);
        let scene2 = scene(objects);
        let mut double = scene_pipeline(&scene2, 2);

        let image = Image::new(64, 64);
        for _ in 0..2 {
            assert_eq!(single.process(&image).unwrap().len(), 1);
            assert_eq!(single.tracked.len(), 1);
            assert_eq!(double.process(&image).unwrap().len(), 2);
            assert_eq!(double.tracked.len(), 2);
        }
    }

    #[test]
    fn new_object_starts_with_fresh_filter() {
        let scene = scene(vec![square(0.0, 0.0)]);
        let mut pipeline = scene_pipeline(&scene, 1);
        pipeline.set_filter(|| LandmarkFilter::new(Ema::new(0.5), 2));
        let image = Image::new(64, 64);

        let first = pipeline.process(&image).unwrap();
        assert_position(first[0].landmarks().positions()[1], [16.0, 16.0]);

        scene.lock().unwrap().confidence = 0.1;
        assert!(pipeline.process(&image).unwrap().is_empty());

        // Sharing the previous object's filter would drag these landmarks towards the old ones.
        {
            let mut scene = scene.lock().unwrap();
            scene.confidence = 0.9;
            scene.objects = vec![square(40.0, 40.0)];
        }
        let second = pipeline.process(&image).unwrap();
        assert_eq!(second.len(), 1);
        let positions = second[0].landmarks().positions();
        assert_position(positions[0], [40.0, 40.0]);
        assert_position(positions[1], [56.0, 56.0]);
    }

    #[test]
    fn error_discards_tracking_state() {
        let scene = scene(vec![square(8.0, 8.0)]);
        let mut pipeline = scene_pipeline(&scene, 1);
        let image = Image::new(64, 64);

        assert_eq!(pipeline.process(&image).unwrap().len(), 1);

        scene.lock().unwrap().fail_tracking = true;
        assert!(pipeline.process(&image).is_err());
        assert!(pipeline.tracked.is_empty());

        scene.lock().unwrap().fail_tracking = false;
        assert_eq!(pipeline.process(&image).unwrap().len(), 1);
        assert_eq!(detect_calls(&scene), 2);

        scene.lock().unwrap().fail_detection = true;
        scene.lock().unwrap().confidence = 0.1;
        assert!(pipeline.process(&image).is_err());
        assert!(pipeline.tracked.is_empty());
    }

    /// A pipeline that never creates a tracker, because its scene has no objects.
    fn detection_only<E: Estimate + Confidence + Clone>(
        name: &'static str,
        scene: &SharedScene,
    ) -> Pipeline<E> {
        Pipeline::new(
            name,
            scene_detector(scene),
            object_roi,
            Box::new(|| -> anyhow::Result<LandmarkTracker<E>> {
                anyhow::bail!("no landmark network")
            }),
            1,
        )
    }

    fn scene_pose_detector(scene: &SharedScene) -> PoseDetector {
        PoseDetector {
            workers: Some(Workers {
                face: spawn_pipeline(detection_only("face", scene)).unwrap(),
                hands: spawn_pipeline(detection_only("hand", scene)).unwrap(),
                body: spawn_pipeline(detection_only("body", scene)).unwrap(),
            }),
            thresholds: Thresholds::default(),
            show_debug_info: true,
            debug_info: DebugInfo::default(),
        }
    }

    #[test]
    fn frame_is_untouched_without_landmarks() {
        let scene = scene(Vec::new());
        let mut detector = scene_pose_detector(&scene);
        let frame = Image::filled(320, 240, Color::WHITE);

        let (out, pose) = detector.detect_pose(frame.clone(), false, Language::English);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(out.data(), frame.data());
        // Detection runs regardless.
        assert_eq!(detect_calls(&scene), 3);
        assert_eq!(detector.debug_info().hands_detected, 0);
        assert!(!detector.debug_info().face_detected);

        let (out, _) = detector.detect_pose(frame.clone(), true, Language::English);
        assert_ne!(out.data(), frame.data());
    }

    #[test]
    fn detection_failure_returns_default() {
        let scene = scene(Vec::new());
        let mut detector = scene_pose_detector(&scene);
        let frame = Image::filled(320, 240, Color::WHITE);

        scene.lock().unwrap().fail_detection = true;
        let (out, pose) = detector.detect_pose(frame.clone(), true, Language::Indonesian);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(out.data(), frame.data());

        // The workers keep running after a failed frame.
        scene.lock().unwrap().fail_detection = false;
        let (out, pose) = detector.detect_pose(frame.clone(), true, Language::Indonesian);
        assert_eq!(pose, PoseKind::Default);
        assert_ne!(out.data(), frame.data());
    }

    #[test]
    fn released_detector_returns_default() {
        let mut detector = scene_pose_detector(&scene(Vec::new()));
        detector.release();
        detector.release();

        let frame = Image::filled(320, 240, Color::WHITE);
        let (out, pose) = detector.detect_pose(frame.clone(), true, Language::Turkish);
        assert_eq!(pose, PoseKind::Default);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn observation_is_normalized() {
        let mut hand = hand::landmark::LandmarkResult::default();
        hand.landmarks_mut().positions_mut()[0] = [320.0, 240.0, 5.0];
        let mut face = face::landmark::LandmarkResult::default();
        face.landmarks_mut().positions_mut()[152] = [64.0, 480.0, 0.0];
        let mut body = body::landmark::LandmarkResult::default();
        body.landmarks_mut().positions_mut()[0] = [640.0, 48.0, 0.0];

        let landmarks = FrameLandmarks {
            faces: vec![face],
            hands: vec![hand],
            bodies: vec![body],
        };
        let obs = landmarks.observation(640, 480);

        assert_eq!(obs.hands.len(), 1);
        assert_eq!(obs.hands[0].len(), 21);
        assert_eq!(obs.hands[0][0], [0.5, 0.5]);
        assert_eq!(obs.faces[0].len(), 478);
        assert_eq!(obs.faces[0][152], [0.1, 1.0]);
        let body = obs.body.as_ref().unwrap();
        assert_eq!(body.len(), body::landmark::NUM_POSE_LANDMARKS);
        assert_eq!(body[0], [1.0, 0.1]);
    }

    #[test]
    fn empty_frame_has_no_body() {
        let obs = FrameLandmarks::default().observation(640, 480);
        assert_eq!(obs, Observation::default());
    }

    #[test]
    fn missing_models_fail_to_load() {
        let mut config = Config::default();
        config.models.dir = "/nonexistent/posemimic-models".into();
        let err = PoseDetector::new(&config).err().unwrap();
        assert!(format!("{err:#}").contains("Failed to initialize models"));
    }
}
