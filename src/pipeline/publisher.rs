use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use image::{
    ExtendedColorType, ImageEncoder, ImageError,
    codecs::jpeg::JpegEncoder,
    error::{ParameterError, ParameterErrorKind},
};

use crate::{
    error::{Error, Result},
    pipeline::coach::PoseCoach,
    types::{AnnotatedFrame, Frame},
};

// How often a blocked send re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub max_fps: u32,
    pub jpeg_quality: u8,
    pub boundary: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_fps: 30,
            jpeg_quality: 80,
            boundary: "frame".to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    if frame.is_empty() || frame.rgb.len() != frame.width as usize * frame.height as usize * 3 {
        return Err(Error::Encode(ImageError::Parameter(
            ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
        )));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .write_image(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(Error::Encode)?;
    Ok(jpeg)
}

/// Wraps one JPEG image as a `multipart/x-mixed-replace` part.
pub fn multipart_chunk(boundary: &str, jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{boundary}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// Producer half handed to a stream's worker thread.
pub struct StreamSink<T> {
    tx: Sender<T>,
    stop: Arc<AtomicBool>,
}

impl<T> StreamSink<T> {
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Blocks until the consumer takes `item`. Returns `false` once the
    /// stream was cancelled or the consumer went away.
    pub fn emit(&self, mut item: T) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(item, CANCEL_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => item = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Sleeps for what is left of `interval` since `started`, or just
    /// yields when the iteration already overran it.
    pub fn pace(&self, started: Instant, interval: Duration) {
        match interval.checked_sub(started.elapsed()) {
            Some(rest) if !rest.is_zero() => thread::sleep(rest),
            _ => thread::yield_now(),
        }
    }
}

/// Infinite sequence produced on its own thread, one per subscriber.
///
/// Iteration ends after [`Stream::cancel`] or when the producer stops.
/// Dropping the stream cancels it and waits for the producer to exit.
pub struct Stream<T> {
    rx: Option<Receiver<T>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

pub type FrameStream = Stream<Vec<u8>>;
pub type WrongFlagStream = Stream<bool>;

impl<T: Send + 'static> Stream<T> {
    pub fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(StreamSink<T>) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let sink = StreamSink {
            tx,
            stop: stop.clone(),
        };
        let handle = thread::spawn(move || body(sink));

        Self {
            rx: Some(rx),
            stop,
            handle: Some(handle),
        }
    }
}

impl<T> Stream<T> {
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<T> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.as_ref()?.recv_timeout(timeout).ok()
    }
}

impl<T> Iterator for Stream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.as_ref()?.recv().ok()
    }
}

impl<T> Drop for Stream<T> {
    fn drop(&mut self) {
        self.cancel();
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl PoseCoach {
    /// Starts a subscriber stream of multipart JPEG chunks. Every iteration
    /// ticks detection, then emits the latest annotated frame, or the raw
    /// camera frame while nothing has been annotated yet.
    pub fn stream_frames(self: &Arc<Self>, config: PublisherConfig) -> FrameStream {
        let coach = self.clone();
        Stream::spawn(move |sink| publish_loop(coach, config, sink))
    }

    /// Samples the "pose is wrong" flag every `interval`.
    pub fn watch_pose_wrong(self: &Arc<Self>, interval: Duration) -> WrongFlagStream {
        let coach = self.clone();
        Stream::spawn(move |sink| {
            while !sink.is_cancelled() {
                let started = Instant::now();
                if !sink.emit(coach.is_pose_wrong()) {
                    break;
                }
                sink.pace(started, interval);
            }
        })
    }
}

fn publish_loop(coach: Arc<PoseCoach>, config: PublisherConfig, sink: StreamSink<Vec<u8>>) {
    let interval = config.frame_interval();
    let mut raw_fallback: Option<Frame> = None;
    let mut last_encoded: Option<(Arc<AnnotatedFrame>, Vec<u8>)> = None;

    log::info!("frame stream started");
    while !sink.is_cancelled() {
        let started = Instant::now();
        if let Some(frame) = coach.tick().into_frame() {
            raw_fallback = Some(frame);
        }

        let jpeg = match coach.latest_frame() {
            Some(annotated) => {
                let cached = last_encoded
                    .as_ref()
                    .filter(|(previous, _)| Arc::ptr_eq(previous, &annotated))
                    .map(|(_, jpeg)| jpeg.clone());
                match cached {
                    Some(jpeg) => Ok(jpeg),
                    None => {
                        let encoded = encode_jpeg(&annotated.frame, config.jpeg_quality);
                        if let Ok(jpeg) = &encoded {
                            last_encoded = Some((annotated, jpeg.clone()));
                        }
                        encoded
                    }
                }
            }
            None => match &raw_fallback {
                Some(frame) => encode_jpeg(frame, config.jpeg_quality),
                None => {
                    sink.pace(started, interval);
                    continue;
                }
            },
        };

        match jpeg {
            Ok(jpeg) => {
                if !sink.emit(multipart_chunk(&config.boundary, &jpeg)) {
                    break;
                }
            }
            Err(err) => log::warn!("frame encoding failed, skipping: {err}"),
        }

        sink.pace(started, interval);
    }
    log::info!("frame stream exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_is_framed_as_multipart_part() {
        let chunk = multipart_chunk("frame", b"JPEG");
        assert_eq!(
            chunk,
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec()
        );
    }

    #[test]
    fn encodes_valid_jpeg() {
        let frame = Frame::new(vec![128; 16 * 8 * 3], 16, 8);
        let jpeg = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn mismatched_buffer_is_encoding_failure() {
        let frame = Frame::new(vec![0; 5], 16, 8);
        assert!(matches!(encode_jpeg(&frame, 80), Err(Error::Encode(_))));
    }

    #[test]
    fn stream_yields_until_cancelled() {
        let mut stream = Stream::spawn(|sink| {
            let mut n = 0u32;
            while sink.emit(n) {
                n += 1;
            }
        });
        assert_eq!(stream.next(), Some(0));
        assert_eq!(stream.next(), Some(1));
        stream.cancel();
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn dropping_stream_stops_producer() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let mut stream = Stream::spawn(move |sink| {
            while sink.emit(()) {}
            flag.store(true, Ordering::SeqCst);
        });
        assert!(stream.next().is_some());
        drop(stream);
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn content_type_names_boundary() {
        assert_eq!(
            PublisherConfig::default().content_type(),
            "multipart/x-mixed-replace; boundary=frame"
        );
    }
}
