use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Instant,
};

use image::RgbImage;

use crate::{
    error::{Error, Result},
    pipeline::{
        camera::FrameSource,
        compositor::{compose, fit_background, load_background, visualize_mask},
        detector::{Detector, LandmarkEngine},
        skeleton::draw_skeleton,
        state::{FrameState, PoseSelection},
    },
    pose::{ConnectionClassifier, NO_POSE},
    types::{AnnotatedFrame, DetectionResult, Frame},
};

/// What a single tick did.
#[derive(Debug)]
pub enum Tick {
    /// The frame went to the detector.
    Submitted(Frame),
    /// A frame was read but the detector was still busy with an earlier one.
    Dropped(Frame),
    /// The frame source had nothing to offer.
    NoFrame,
}

impl Tick {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Tick::Submitted(frame) | Tick::Dropped(frame) => Some(frame),
            Tick::NoFrame => None,
        }
    }
}

/// Background refitted to the camera size, remembered per loaded image.
struct FittedBackground {
    source: Arc<RgbImage>,
    image: Arc<RgbImage>,
}

/// State touched by both ticks and detection callbacks.
struct Shared {
    classifier: ConnectionClassifier,
    selection: PoseSelection,
    frames: FrameState,
    background: RwLock<Option<Arc<RgbImage>>>,
    fitted: Mutex<Option<FittedBackground>>,
}

impl Shared {
    fn background(&self) -> Option<Arc<RgbImage>> {
        self.background
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_background(&self, image: Option<Arc<RgbImage>>) {
        *self.background.write().unwrap_or_else(PoisonError::into_inner) = image;
        *self.fitted.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The background sized for `width` x `height` frames. A camera whose
    /// size differs from the loaded image pays for the refit once.
    fn background_for(&self, width: u32, height: u32) -> Option<Arc<RgbImage>> {
        let source = self.background()?;
        if source.dimensions() == (width, height) {
            return Some(source);
        }

        let mut fitted = self.fitted.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = fitted.as_ref().filter(|cached| {
            Arc::ptr_eq(&cached.source, &source) && cached.image.dimensions() == (width, height)
        }) {
            return Some(cached.image.clone());
        }

        log::debug!(
            "refitting background from {:?} to {width}x{height}",
            source.dimensions()
        );
        let image = Arc::new(fit_background(&source, width, height));
        *fitted = Some(FittedBackground {
            source,
            image: image.clone(),
        });
        Some(image)
    }

    /// Runs on the detector worker for every completed detection.
    fn handle_detection(&self, result: DetectionResult) {
        let DetectionResult {
            frame,
            landmarks,
            mask,
            timestamp_ms,
        } = result;

        let mask_frame = mask
            .as_ref()
            .map(|mask| visualize_mask(mask, frame.width, frame.height));
        let background = self.background_for(frame.width, frame.height);
        let mut rendered = compose(&frame, mask.as_ref(), background.as_deref());

        let pose = self.selection.get();
        let classification = self.classifier.classify(&pose, &landmarks);
        draw_skeleton(&mut rendered, &landmarks, &classification);

        self.frames.publish(AnnotatedFrame {
            frame: rendered,
            mask: mask_frame,
            any_wrong: classification.any_wrong(),
            timestamp_ms,
        });
    }
}

/// Drives detection and owns the state shared with the publishers.
///
/// One instance per deployment; wrap it in an `Arc` and hand clones to
/// whatever serves the frames.
pub struct PoseCoach {
    source: Box<dyn FrameSource>,
    detector: Detector,
    shared: Arc<Shared>,
    background_size: (u32, u32),
    started: Instant,
}

impl PoseCoach {
    pub fn new<S, E, B>(source: S, classifier: ConnectionClassifier, build_engine: B) -> Self
    where
        S: FrameSource,
        E: LandmarkEngine,
        B: FnOnce() -> anyhow::Result<E> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            classifier,
            selection: PoseSelection::default(),
            frames: FrameState::new(),
            background: RwLock::new(None),
            fitted: Mutex::new(None),
        });

        let callback_state = shared.clone();
        let detector = Detector::start(build_engine, move |result| {
            callback_state.handle_detection(result);
        });

        Self {
            source: Box::new(source),
            detector,
            shared,
            background_size: (1280, 720),
            started: Instant::now(),
        }
    }

    /// Size backgrounds are fitted to when loaded.
    pub fn with_background_size(mut self, width: u32, height: u32) -> Self {
        self.background_size = (width, height);
        self
    }

    /// Reads one frame and submits it for detection without waiting for
    /// the result.
    pub fn tick(&self) -> Tick {
        let Some(frame) = self.source.acquire().filter(|frame| !frame.is_empty()) else {
            log::warn!("failed to read frame from source, skipping tick");
            return Tick::NoFrame;
        };

        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        if self.detector.submit(frame.clone(), timestamp_ms) {
            Tick::Submitted(frame)
        } else {
            Tick::Dropped(frame)
        }
    }

    pub fn latest_frame(&self) -> Option<Arc<AnnotatedFrame>> {
        self.shared.frames.latest()
    }

    pub fn is_pose_wrong(&self) -> bool {
        self.shared.frames.is_pose_wrong()
    }

    pub fn active_pose(&self) -> String {
        self.shared.selection.get()
    }

    /// Selects the pose to coach. [`NO_POSE`] is always accepted and turns
    /// classification off.
    pub fn set_active_pose(&self, name: &str) -> Result<()> {
        if name != NO_POSE && !self.shared.classifier.catalog().contains(name) {
            return Err(Error::UnknownPose(name.to_string()));
        }
        self.shared.selection.set(name);
        log::info!("active pose set to {name:?}");
        Ok(())
    }

    pub fn pose_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .classifier
            .catalog()
            .names()
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    pub fn set_background_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (width, height) = self.background_size;
        let image = load_background(path, width, height)?;
        self.shared.set_background(Some(Arc::new(image)));
        log::info!("background set to {}", path.display());
        Ok(())
    }

    pub fn clear_background(&self) {
        self.shared.set_background(None);
    }
}
