#[cfg(test)]
#[path = "errors_test.rs"]
mod tests;

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::models::{ErrorSource, UiError};

#[derive(Debug, Default)]
struct State {
    current: Option<UiError>,
    history: VecDeque<UiError>,
}

/// Holds the most recent action failure plus a short history. A newer error
/// always replaces the current one.
#[derive(Debug)]
pub struct ErrorSlot {
    state: Mutex<State>,
    capacity: usize,
}

impl ErrorSlot {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity,
        }
    }

    pub fn set(&self, source: ErrorSource, message: impl Into<String>) -> UiError {
        let err = UiError::new(source, message);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.capacity > 0 {
            if state.history.len() == self.capacity {
                state.history.pop_front();
            }
            state.history.push_back(err.clone());
        }
        state.current = Some(err.clone());
        err
    }

    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
    }

    pub fn current(&self) -> Option<UiError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Recorded errors, oldest first, bounded by the slot capacity.
    pub fn recent(&self) -> Vec<UiError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .cloned()
            .collect()
    }
}
