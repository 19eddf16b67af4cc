pub mod angle;
pub mod catalog;
pub mod classifier;
pub mod topology;

pub use angle::{Joint, joint_angle_degrees, shared_vertex};
pub use catalog::{AngleRule, NO_POSE, PoseCatalog, PoseDefinition};
pub use classifier::{AngleMode, Classification, ConnectionClassifier, ConnectionStyle};
pub use topology::{Connection, LANDMARK_COUNT, UnknownConnection};
