use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};

use crate::types::Frame;

/// Where ticks get their frames from. Implementations must not panic and
/// return `None` when no frame is available.
pub trait FrameSource: Send + Sync + 'static {
    fn acquire(&self) -> Option<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&self) -> Option<Frame> {
        (**self).acquire()
    }
}

/// Serves the same decoded image on every acquisition.
#[derive(Debug)]
pub struct StillFrameSource {
    frame: Frame,
}

impl StillFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn open(path: impl AsRef<Path>, mirror: bool) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to open still image {}", path.display()))?
            .to_rgb8();
        let mut frame = Frame::from_image(image);
        if mirror {
            frame.flip_horizontal();
        }
        Ok(Self::new(frame))
    }
}

impl FrameSource for StillFrameSource {
    fn acquire(&self) -> Option<Frame> {
        let mut frame = self.frame.clone();
        frame.timestamp = std::time::Instant::now();
        Some(frame)
    }
}

/// Latest frame written by a capture thread, read by ticks.
#[derive(Clone, Debug, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrame {
    pub fn store(&self, frame: Option<Frame>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = frame;
    }
}

impl FrameSource for LatestFrame {
    fn acquire(&self) -> Option<Frame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(feature = "camera-nokhwa")]
pub use self::device::CameraSource;

#[cfg(feature = "camera-nokhwa")]
mod device {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    };

    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::{FrameSource, LatestFrame};
    use crate::types::Frame;

    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::MJPEG,
        FrameFormat::NV12,
        FrameFormat::RAWRGB,
        FrameFormat::YUYV,
    ];

    // Give up after this many consecutive failed reads and report an empty source.
    const MAX_FAILED_READS: u32 = 30;

    fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::Closest(CameraFormat::new_from(
                    width,
                    height,
                    FrameFormat::MJPEG,
                    30,
                )),
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    fn build_camera(index: u32, width: u32, height: u32) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats(width, height) {
            match Camera::new(CameraIndex::Index(index), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    /// Webcam capture on a dedicated thread. Every read goes into a shared
    /// slot; [`FrameSource::acquire`] hands out a copy of the newest frame.
    #[derive(Debug)]
    pub struct CameraSource {
        latest: LatestFrame,
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl CameraSource {
        pub fn start(index: u32, width: u32, height: u32, mirror: bool) -> Result<Self> {
            // Fail fast before spawning the capture thread.
            build_camera(index, width, height)?;

            let latest = LatestFrame::default();
            let stop = Arc::new(AtomicBool::new(false));
            let slot = latest.clone();
            let stop_flag = stop.clone();

            let handle = thread::spawn(move || {
                let mut camera = match build_camera(index, width, height) {
                    Ok(cam) => cam,
                    Err(err) => {
                        log::error!("failed to open camera: {err:?}");
                        return;
                    }
                };
                log::info!("camera {index} streaming");

                let mut failed_reads = 0;
                while !stop_flag.load(Ordering::Relaxed) {
                    match read_frame(&mut camera) {
                        Ok(mut frame) => {
                            failed_reads = 0;
                            if mirror {
                                frame.flip_horizontal();
                            }
                            slot.store(Some(frame));
                        }
                        Err(err) => {
                            failed_reads += 1;
                            log::warn!("camera frame read failed: {err:?}");
                            if failed_reads >= MAX_FAILED_READS {
                                slot.store(None);
                            }
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
                slot.store(None);
            });

            Ok(Self {
                latest,
                stop,
                handle: Some(handle),
            })
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    impl FrameSource for CameraSource {
        fn acquire(&self) -> Option<Frame> {
            self.latest.acquire()
        }
    }

    fn read_frame(camera: &mut Camera) -> Result<Frame> {
        let buffer = camera.frame()?;
        let decoded = buffer.decode_image::<RgbFormat>()?;
        let (width, height) = decoded.dimensions();
        let rgb = decoded.into_raw();
        if rgb.is_empty() {
            return Err(anyhow!("camera returned an empty frame"));
        }

        Ok(Frame {
            rgb,
            width,
            height,
            timestamp: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_frame_reports_empty_until_stored() {
        let latest = LatestFrame::default();
        assert!(latest.acquire().is_none());

        latest.store(Some(Frame::blank(4, 2)));
        let frame = latest.acquire().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));

        latest.store(None);
        assert!(latest.acquire().is_none());
    }

    #[test]
    fn still_source_repeats_frame() {
        let source = StillFrameSource::new(Frame::new(vec![7; 12], 2, 2));
        for _ in 0..3 {
            assert_eq!(source.acquire().unwrap().rgb, vec![7; 12]);
        }
    }

    #[test]
    fn still_source_missing_file_errors() {
        assert!(StillFrameSource::open("/nonexistent/frame.png", true).is_err());
    }
}
