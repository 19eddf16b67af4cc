#[cfg(feature = "backend-ort")]
mod blazepose;

#[cfg(feature = "backend-ort")]
pub use blazepose::{BlazePoseConfig, BlazePoseEngine};

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::types::{DetectionResult, Frame, Landmark, SegmentationMask};

#[derive(Clone, Debug, Default)]
pub struct LandmarkOutput {
    /// Empty when nobody is in view.
    pub landmarks: Vec<Landmark>,
    pub mask: Option<SegmentationMask>,
}

/// A body landmark model. Runs on the detector worker thread only.
pub trait LandmarkEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<LandmarkOutput>;
}

struct Submission {
    frame: Frame,
    timestamp_ms: u64,
}

/// Asynchronous landmark detection on a worker thread.
///
/// [`Detector::submit`] never waits for inference. Results are delivered to
/// the callback given at start, from the worker thread. At most one frame is
/// outstanding: a submission made while the previous one is still being
/// processed is dropped.
#[derive(Debug)]
pub struct Detector {
    submit_tx: Option<Sender<Submission>>,
    in_flight: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Detector {
    /// Spawns the worker. `build` runs on the worker thread so engines that
    /// are expensive to load do not block the caller.
    pub fn start<E, B, F>(build: B, on_result: F) -> Self
    where
        E: LandmarkEngine,
        B: FnOnce() -> anyhow::Result<E> + Send + 'static,
        F: FnMut(DetectionResult) + Send + 'static,
    {
        let (submit_tx, submit_rx) = crossbeam_channel::bounded(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let worker_flag = in_flight.clone();

        let handle = thread::spawn(move || {
            let engine = match build() {
                Ok(engine) => engine,
                Err(err) => {
                    log::error!("failed to load landmark engine: {err:?}");
                    drop(submit_rx);
                    worker_flag.store(false, Ordering::Release);
                    return;
                }
            };
            run_worker_loop(engine, submit_rx, worker_flag, on_result);
        });

        Self {
            submit_tx: Some(submit_tx),
            in_flight,
            handle: Some(handle),
        }
    }

    /// Hands `frame` to the worker. Returns `false` when it was dropped
    /// because a detection is still outstanding or the worker is gone.
    pub fn submit(&self, frame: Frame, timestamp_ms: u64) -> bool {
        let Some(tx) = &self.submit_tx else {
            return false;
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("detector busy, dropping frame {timestamp_ms}");
            return false;
        }

        match tx.try_send(Submission {
            frame,
            timestamp_ms,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.in_flight.store(false, Ordering::Release);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.store(false, Ordering::Release);
                log::warn!("detector worker stopped, frame {timestamp_ms} not submitted");
                false
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after any in-flight result.
        self.submit_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker_loop<E, F>(
    mut engine: E,
    submit_rx: Receiver<Submission>,
    in_flight: Arc<AtomicBool>,
    mut on_result: F,
) where
    E: LandmarkEngine,
    F: FnMut(DetectionResult),
{
    while let Some(submission) = recv_latest(&submit_rx) {
        match engine.infer(&submission.frame) {
            Ok(output) => on_result(DetectionResult {
                frame: submission.frame,
                landmarks: output.landmarks,
                mask: output.mask,
                timestamp_ms: submission.timestamp_ms,
            }),
            Err(err) => {
                log::warn!(
                    "landmark inference failed for frame {}: {err:?}",
                    submission.timestamp_ms
                );
            }
        }
        in_flight.store(false, Ordering::Release);
    }
}

fn recv_latest(submit_rx: &Receiver<Submission>) -> Option<Submission> {
    let mut submission = submit_rx.recv().ok()?;
    while let Ok(newer) = submit_rx.try_recv() {
        submission = newer;
    }
    Some(submission)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;

    use super::*;

    struct Echo {
        gate: Receiver<()>,
    }

    impl LandmarkEngine for Echo {
        fn infer(&mut self, frame: &Frame) -> anyhow::Result<LandmarkOutput> {
            self.gate.recv()?;
            if frame.width == 0 {
                return Err(anyhow!("empty frame"));
            }
            Ok(LandmarkOutput {
                landmarks: vec![Landmark::new(0.5, 0.5)],
                mask: None,
            })
        }
    }

    fn echo_detector() -> (Detector, Sender<()>, Receiver<DetectionResult>) {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let detector = Detector::start(
            move || Ok(Echo { gate: gate_rx }),
            move |result| {
                let _ = result_tx.send(result);
            },
        );
        (detector, gate_tx, result_rx)
    }

    #[test]
    fn delivers_result_through_callback() {
        let (detector, gate, results) = echo_detector();
        assert!(detector.submit(Frame::blank(2, 2), 42));
        gate.send(()).unwrap();

        let result = results.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.timestamp_ms, 42);
        assert_eq!(result.landmarks.len(), 1);
    }

    #[test]
    fn drops_submissions_while_busy() {
        let (detector, gate, results) = echo_detector();
        assert!(detector.submit(Frame::blank(2, 2), 1));
        assert!(detector.is_busy());
        assert!(!detector.submit(Frame::blank(2, 2), 2));

        gate.send(()).unwrap();
        assert_eq!(
            results.recv_timeout(Duration::from_secs(5)).unwrap().timestamp_ms,
            1
        );
        assert!(results.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn failed_inference_frees_the_slot_without_callback() {
        let (detector, gate, results) = echo_detector();
        assert!(detector.submit(Frame::blank(0, 0), 1));
        gate.send(()).unwrap();
        assert!(results.recv_timeout(Duration::from_millis(200)).is_err());

        // The worker clears the flag right after the failed inference.
        let mut accepted = false;
        for _ in 0..100 {
            if detector.submit(Frame::blank(2, 2), 2) {
                accepted = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(accepted);
        gate.send(()).unwrap();
        assert_eq!(
            results.recv_timeout(Duration::from_secs(5)).unwrap().timestamp_ms,
            2
        );
    }

    #[test]
    fn engine_load_failure_rejects_submissions() {
        let detector = Detector::start(
            || Err::<Echo, _>(anyhow!("model missing")),
            |_result| {},
        );
        let mut rejected = false;
        for _ in 0..100 {
            if !detector.submit(Frame::blank(2, 2), 1) && !detector.is_busy() {
                rejected = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(rejected);
    }
}
