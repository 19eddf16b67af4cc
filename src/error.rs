use std::path::PathBuf;

use crate::pose::Connection;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connections {0:?} and {1:?} do not form a single-vertex angle")]
    Topology(Connection, Connection),

    #[error("pose not found: {0}")]
    UnknownPose(String),

    #[error("background image not found: {0:?}")]
    BackgroundNotFound(PathBuf),

    #[error("failed to load background image: {1:?}")]
    LoadBackground(#[source] image::ImageError, PathBuf),

    #[error("failed to encode frame as jpeg")]
    Encode(#[source] image::ImageError),

    #[error("failed to read file: {1:?}")]
    ReadFile(#[source] std::io::Error, PathBuf),

    #[error("failed to parse pose catalog")]
    ParseCatalog(#[source] serde_json::Error),

    #[error("failed to parse config file: {1:?}")]
    ParseConfig(#[source] toml::de::Error, PathBuf),

    #[error("landmark index {0} is out of range for {1} detected landmarks")]
    LandmarkOutOfRange(usize, usize),
}
