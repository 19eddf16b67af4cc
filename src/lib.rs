pub mod config;
pub mod error;
pub mod pipeline;
pub mod pose;
pub mod types;

pub use error::{Error, Result};
