//! Progress notifications for long-running assignments.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::constants::Float;

/// Something worth telling a caller while an assignment runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AssignmentEvent {
    /// Iteration `k` is starting.
    Iteration(usize),
    /// Gap known at the start of the current iteration.
    RelativeGap(Float),
    Finished,
}

/// Receives [`AssignmentEvent`]s. Called from the assignment's thread.
pub trait AssignmentObserver: Send + Sync {
    fn on_event(&self, event: AssignmentEvent);
}

/// Observer that records every event it receives.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    events: Arc<Mutex<Vec<AssignmentEvent>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AssignmentEvent> {
        self.events.lock().clone()
    }

    pub fn last_iteration(&self) -> Option<usize> {
        self.events.lock().iter().rev().find_map(|e| match e {
            AssignmentEvent::Iteration(k) => Some(*k),
            _ => None,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.events.lock().last() == Some(&AssignmentEvent::Finished)
    }
}

impl AssignmentObserver for ProgressLog {
    fn on_event(&self, event: AssignmentEvent) {
        self.events.lock().push(event);
    }
}
