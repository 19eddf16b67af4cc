use std::{
    env,
    io::{self, BufRead},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use pose_coach::{
    config::Config,
    pipeline::{FrameSource, PoseCoach, StillFrameSource},
    pose::{ConnectionClassifier, NO_POSE, PoseCatalog},
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pose-coach.toml"));
    let config = Config::load_or_default(&config_path)?;

    let catalog = PoseCatalog::load(&config.catalog.path)
        .with_context(|| format!("failed to load poses from {}", config.catalog.path.display()))?;
    let classifier = ConnectionClassifier::new(Arc::new(catalog), config.classifier.mode)
        .with_tolerance(config.classifier.tolerance());

    let source = build_source(&config)?;
    let coach = Arc::new(
        engine::build_coach(source, classifier, &config)?
            .with_background_size(config.camera.width, config.camera.height),
    );

    coach.set_active_pose(&config.catalog.initial_pose)?;
    if let Some(background) = &config.background.image {
        coach.set_background_image(background)?;
    }
    log::info!("available poses: {}", coach.pose_names().join(", "));

    let running = Arc::new(AtomicBool::new(true));
    let consumers = [
        spawn_frame_consumer(&coach, &config, running.clone()),
        spawn_flag_logger(&coach, &config, running.clone()),
    ];

    run_commands(&coach);

    running.store(false, Ordering::SeqCst);
    for consumer in consumers {
        let _ = consumer.join();
    }
    Ok(())
}

fn build_source(config: &Config) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &config.camera.still_image {
        log::info!("serving still image {}", path.display());
        return Ok(Box::new(StillFrameSource::open(path, config.camera.mirror)?));
    }
    camera_source(config)
}

#[cfg(feature = "camera-nokhwa")]
fn camera_source(config: &Config) -> Result<Box<dyn FrameSource>> {
    use pose_coach::pipeline::CameraSource;

    let camera = &config.camera;
    let source = CameraSource::start(camera.index, camera.width, camera.height, camera.mirror)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn camera_source(_config: &Config) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without camera support; set camera.still_image or enable `camera-nokhwa`")
}

#[cfg(feature = "backend-ort")]
mod engine {
    use anyhow::Result;
    use pose_coach::{
        config::Config,
        pipeline::{
            FrameSource, PoseCoach,
            detector::{BlazePoseConfig, BlazePoseEngine},
        },
        pose::ConnectionClassifier,
    };

    pub fn build_coach(
        source: Box<dyn FrameSource>,
        classifier: ConnectionClassifier,
        config: &Config,
    ) -> Result<PoseCoach> {
        let engine_config = BlazePoseConfig {
            model_path: config.detector.model_path.clone(),
            min_pose_score: config.detector.min_pose_score,
            intra_threads: config.detector.intra_threads,
        };
        Ok(PoseCoach::new(source, classifier, move || {
            BlazePoseEngine::new(&engine_config)
        }))
    }
}

#[cfg(not(feature = "backend-ort"))]
mod engine {
    use anyhow::{Result, bail};
    use pose_coach::{
        config::Config,
        pipeline::{FrameSource, PoseCoach},
        pose::ConnectionClassifier,
    };

    pub fn build_coach(
        _source: Box<dyn FrameSource>,
        _classifier: ConnectionClassifier,
        _config: &Config,
    ) -> Result<PoseCoach> {
        bail!("built without a landmark engine; enable the `backend-ort` feature")
    }
}

fn spawn_frame_consumer(
    coach: &Arc<PoseCoach>,
    config: &Config,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let mut frames = coach.stream_frames(config.publisher.to_publisher_config());
    thread::spawn(move || {
        let mut window_start = Instant::now();
        let mut chunks = 0u32;
        let mut bytes = 0usize;
        while running.load(Ordering::Relaxed) {
            let Some(chunk) = frames.next_timeout(Duration::from_millis(250)) else {
                continue;
            };
            chunks += 1;
            bytes += chunk.len();

            let elapsed = window_start.elapsed();
            if elapsed >= STATS_INTERVAL {
                log::info!(
                    "published {:.1} frames/s, {} KiB/frame",
                    chunks as f64 / elapsed.as_secs_f64(),
                    bytes / chunks.max(1) as usize / 1024
                );
                window_start = Instant::now();
                chunks = 0;
                bytes = 0;
            }
        }
    })
}

fn spawn_flag_logger(
    coach: &Arc<PoseCoach>,
    config: &Config,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let mut flags = coach.watch_pose_wrong(config.watch.interval());
    thread::spawn(move || {
        let mut last = false;
        while running.load(Ordering::Relaxed) {
            let Some(wrong) = flags.next_timeout(Duration::from_millis(250)) else {
                continue;
            };
            if wrong != last {
                log::info!("pose is {}", if wrong { "wrong" } else { "ok" });
                last = wrong;
            }
        }
    })
}

/// Reads control commands from stdin until `quit` or end of input.
fn run_commands(coach: &PoseCoach) {
    println!("commands: pose <name> | background <path> | clear | poses | status | quit");
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let mut parts = line.trim().splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).unwrap_or_default();

        let outcome = match command {
            "" => continue,
            "quit" | "exit" => break,
            "pose" if argument.is_empty() => coach.set_active_pose(NO_POSE),
            "pose" => coach.set_active_pose(argument),
            "background" => coach.set_background_image(argument),
            "clear" => {
                coach.clear_background();
                Ok(())
            }
            "poses" => {
                println!("{}", coach.pose_names().join("\n"));
                Ok(())
            }
            "status" => {
                println!(
                    "pose: {}, wrong: {}",
                    coach.active_pose(),
                    coach.is_pose_wrong()
                );
                Ok(())
            }
            other => {
                println!("unknown command: {other}");
                Ok(())
            }
        };

        if let Err(err) = outcome {
            println!("rejected: {err}");
        }
    }
}
