use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::{pose::NO_POSE, types::AnnotatedFrame};

/// Holds the most recent annotated frame.
///
/// Writers replace the whole frame behind an `Arc`, so a reader either gets
/// the previous complete frame or the new one, never a mix of both. The lock
/// is held only for the pointer swap or clone.
#[derive(Debug, Default)]
pub struct FrameState {
    latest: Mutex<Option<Arc<AnnotatedFrame>>>,
}

impl FrameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: AnnotatedFrame) {
        let frame = Arc::new(frame);
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *latest = Some(frame);
    }

    pub fn latest(&self) -> Option<Arc<AnnotatedFrame>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_pose_wrong(&self) -> bool {
        self.latest().is_some_and(|frame| frame.any_wrong)
    }
}

/// Process-wide name of the pose being coached.
#[derive(Debug)]
pub struct PoseSelection {
    name: RwLock<String>,
}

impl Default for PoseSelection {
    fn default() -> Self {
        Self::new(NO_POSE)
    }
}

impl PoseSelection {
    pub fn new(name: &str) -> Self {
        Self {
            name: RwLock::new(name.to_string()),
        }
    }

    pub fn set(&self, name: &str) {
        let mut current = self.name.write().unwrap_or_else(PoisonError::into_inner);
        *current = name.to_string();
    }

    pub fn get(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
