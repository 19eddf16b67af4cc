pub mod camera;
pub mod coach;
pub mod compositor;
pub mod detector;
pub mod publisher;
pub mod skeleton;
pub mod state;

pub use camera::{FrameSource, LatestFrame, StillFrameSource};
#[cfg(feature = "camera-nokhwa")]
pub use camera::CameraSource;
pub use coach::{PoseCoach, Tick};
pub use detector::{Detector, LandmarkEngine, LandmarkOutput};
pub use publisher::{FrameStream, PublisherConfig, Stream, StreamSink, WrongFlagStream};
pub use state::{FrameState, PoseSelection};
