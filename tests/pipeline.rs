use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use pose_coach::{
    Error,
    pipeline::{FrameSource, LandmarkEngine, LandmarkOutput, PoseCoach, PublisherConfig, StillFrameSource, Tick},
    pose::{
        AngleMode, AngleRule, Connection, ConnectionClassifier, LANDMARK_COUNT, NO_POSE,
        PoseCatalog, PoseDefinition,
    },
    types::{Frame, Landmark, SegmentationMask},
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Scripted {
    output: Arc<Mutex<LandmarkOutput>>,
}

impl Scripted {
    fn set(&self, output: LandmarkOutput) {
        *self.output.lock().unwrap() = output;
    }
}

impl LandmarkEngine for Scripted {
    fn infer(&mut self, _frame: &Frame) -> anyhow::Result<LandmarkOutput> {
        Ok(self.output.lock().unwrap().clone())
    }
}

struct Gated {
    gate: Receiver<()>,
}

impl LandmarkEngine for Gated {
    fn infer(&mut self, _frame: &Frame) -> anyhow::Result<LandmarkOutput> {
        self.gate.recv()?;
        Ok(LandmarkOutput::default())
    }
}

struct NoCamera;

impl FrameSource for NoCamera {
    fn acquire(&self) -> Option<Frame> {
        None
    }
}

fn tree_classifier() -> ConnectionClassifier {
    let catalog = PoseCatalog::new([PoseDefinition {
        name: "tree".to_string(),
        rules: vec![AngleRule::new(
            Connection::LeftHipToLeftKnee,
            Connection::LeftKneeToLeftAnkle,
            180.0,
        )],
    }]);
    ConnectionClassifier::new(Arc::new(catalog), AngleMode::Planar)
}

fn gray_source() -> StillFrameSource {
    StillFrameSource::new(Frame::new(
        vec![90; (WIDTH * HEIGHT * 3) as usize],
        WIDTH,
        HEIGHT,
    ))
}

/// Landmarks whose left knee bends to `degrees`.
fn knee_at(degrees: f32) -> Vec<Landmark> {
    let mut landmarks = vec![Landmark::new(0.05, 0.05); LANDMARK_COUNT];
    let radians = degrees.to_radians();
    landmarks[23] = Landmark::new(0.5, 0.3);
    landmarks[25] = Landmark::new(0.5, 0.5);
    landmarks[27] = Landmark::new(0.5 + 0.2 * radians.sin(), 0.5 - 0.2 * radians.cos());
    landmarks
}

fn output(landmarks: Vec<Landmark>) -> LandmarkOutput {
    LandmarkOutput {
        landmarks,
        mask: None,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
    let offset = (y * frame.width + x) as usize * 3;
    [frame.rgb[offset], frame.rgb[offset + 1], frame.rgb[offset + 2]]
}

#[test]
fn tree_pose_flags_bent_knee() {
    let engine = Scripted::default();
    engine.set(output(knee_at(175.0)));
    let script = engine.clone();
    let coach = PoseCoach::new(gray_source(), tree_classifier(), move || Ok(engine));
    coach.set_active_pose("tree").unwrap();

    assert!(wait_until(|| {
        coach.tick();
        coach.latest_frame().is_some()
    }));
    let frame = coach.latest_frame().unwrap();
    assert!(!frame.any_wrong);
    assert!(!coach.is_pose_wrong());
    // Midway between hip and knee.
    assert_eq!(pixel(&frame.frame, 32, 19), [48, 255, 48]);

    script.set(output(knee_at(140.0)));
    assert!(wait_until(|| {
        coach.tick();
        coach.is_pose_wrong()
    }));
    let frame = coach.latest_frame().unwrap();
    assert_eq!(pixel(&frame.frame, 32, 19), [255, 48, 48]);
}

#[test]
fn no_pose_never_flags() {
    let engine = Scripted::default();
    engine.set(output(knee_at(90.0)));
    let coach = PoseCoach::new(gray_source(), tree_classifier(), move || Ok(engine));
    assert_eq!(coach.active_pose(), NO_POSE);

    assert!(wait_until(|| {
        coach.tick();
        coach.latest_frame().is_some()
    }));
    assert!(!coach.is_pose_wrong());
    let frame = coach.latest_frame().unwrap();
    assert_eq!(pixel(&frame.frame, 32, 19), [128, 128, 128]);
}

#[test]
fn unknown_pose_is_rejected_without_changing_selection() {
    let coach = PoseCoach::new(gray_source(), tree_classifier(), || Ok(Scripted::default()));
    coach.set_active_pose("tree").unwrap();

    let err = coach.set_active_pose("warrior").unwrap_err();
    assert!(matches!(err, Error::UnknownPose(name) if name == "warrior"));
    assert_eq!(coach.active_pose(), "tree");

    coach.set_active_pose(NO_POSE).unwrap();
    assert_eq!(coach.active_pose(), NO_POSE);
    assert_eq!(coach.pose_names(), vec!["tree".to_string()]);
}

#[test]
fn missing_background_is_rejected() {
    let coach = PoseCoach::new(gray_source(), tree_classifier(), || Ok(Scripted::default()));
    let err = coach
        .set_background_image("/nonexistent/background.jpg")
        .unwrap_err();
    assert!(matches!(err, Error::BackgroundNotFound(_)));
}

#[test]
fn empty_source_skips_tick() {
    let coach = PoseCoach::new(NoCamera, tree_classifier(), || Ok(Scripted::default()));
    assert!(matches!(coach.tick(), Tick::NoFrame));
    thread::sleep(Duration::from_millis(50));
    assert!(coach.latest_frame().is_none());
}

#[test]
fn mask_is_visualized_and_background_blacked_out() {
    let engine = Scripted::default();
    engine.set(LandmarkOutput {
        landmarks: Vec::new(),
        mask: Some(SegmentationMask {
            width: 2,
            height: 1,
            data: vec![1.0, 0.0],
        }),
    });
    let coach = PoseCoach::new(gray_source(), tree_classifier(), move || Ok(engine));

    assert!(wait_until(|| {
        coach.tick();
        coach.latest_frame().is_some()
    }));
    let frame = coach.latest_frame().unwrap();
    let mask = frame.mask.as_ref().unwrap();
    assert_eq!(pixel(mask, 0, 0), [255, 255, 255]);
    assert_eq!(pixel(mask, WIDTH - 1, 0), [0, 0, 0]);
    assert_eq!(pixel(&frame.frame, 0, 0), [90, 90, 90]);
    assert_eq!(pixel(&frame.frame, WIDTH - 1, 0), [0, 0, 0]);
}

#[test]
fn stream_falls_back_to_raw_frames_and_stops_on_cancel() {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let coach = Arc::new(PoseCoach::new(gray_source(), tree_classifier(), move || {
        Ok(Gated { gate: gate_rx })
    }));

    let mut stream = coach.stream_frames(PublisherConfig {
        max_fps: 200,
        ..PublisherConfig::default()
    });
    let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    for _ in 0..3 {
        let chunk = stream.next_timeout(TIMEOUT).unwrap();
        assert!(chunk.starts_with(header));
        assert_eq!(&chunk[header.len()..header.len() + 2], &[0xFF, 0xD8]);
        assert!(chunk.ends_with(b"\r\n"));
    }
    // Detection never finished, so every chunk was the raw camera frame.
    assert!(coach.latest_frame().is_none());

    stream.cancel();
    assert!(stream.next().is_none());
    drop(stream);

    // The outstanding detection still completes against the shared state.
    gate_tx.send(()).unwrap();
    assert!(wait_until(|| coach.latest_frame().is_some()));
    drop(gate_tx);
}

#[test]
fn wrong_flag_watch_samples_current_state() {
    let engine = Scripted::default();
    engine.set(output(knee_at(120.0)));
    let coach = Arc::new(PoseCoach::new(gray_source(), tree_classifier(), move || {
        Ok(engine)
    }));
    coach.set_active_pose("tree").unwrap();

    let mut flags = coach.watch_pose_wrong(Duration::from_millis(10));
    assert_eq!(flags.next_timeout(TIMEOUT), Some(false));

    assert!(wait_until(|| {
        coach.tick();
        coach.is_pose_wrong()
    }));
    assert!(wait_until(|| flags.next_timeout(TIMEOUT) == Some(true)));
}

#[test]
fn bundled_catalog_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/pose.json");
    let catalog = PoseCatalog::load(path).unwrap();
    assert!(catalog.contains("tree"));
    assert!(catalog.contains("warrior_ii"));

    let tree = catalog.get("tree").unwrap();
    assert_eq!(
        tree.rules[0],
        AngleRule::new(
            Connection::LeftHipToLeftKnee,
            Connection::LeftKneeToLeftAnkle,
            180.0
        )
    );
}

#[test]
fn background_is_composited_into_published_frame() {
    let path = std::env::temp_dir().join(format!("pose-coach-bg-{}.png", std::process::id()));
    image::RgbImage::from_pixel(8, 6, image::Rgb([255, 0, 0]))
        .save(&path)
        .unwrap();

    let engine = Scripted::default();
    engine.set(LandmarkOutput {
        landmarks: Vec::new(),
        mask: Some(SegmentationMask {
            width: 2,
            height: 1,
            data: vec![1.0, 0.0],
        }),
    });
    // Loaded at the default 1280x720, then refitted to the 64x48 camera.
    let coach = PoseCoach::new(gray_source(), tree_classifier(), move || Ok(engine));
    coach.set_background_image(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(wait_until(|| {
        coach.tick();
        coach.latest_frame().is_some()
    }));
    let frame = coach.latest_frame().unwrap();
    assert_eq!(pixel(&frame.frame, 10, 24), [90, 90, 90]);
    let [r, g, b] = pixel(&frame.frame, 40, 24);
    assert!(r > 200 && g < 50 && b < 50, "{:?}", [r, g, b]);
}
