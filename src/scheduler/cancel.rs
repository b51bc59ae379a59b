// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Cooperative cancellation and progress reporting

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, cheap to clone and pass down call chains
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled; call at phase boundaries
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress callback: status text and overall ratio in `[0, 1]`
pub type Progress<'a> = &'a dyn Fn(&str, f64);

/// Progress sink that ignores everything
pub fn no_progress(_status: &str, _ratio: f64) {}

/// Map a sub-operation's `[0, 1]` progress into `[start, start + span]`
pub fn scaled<'a>(progress: Progress<'a>, start: f64, span: f64) -> impl Fn(&str, f64) + 'a {
    move |status: &str, ratio: f64| progress(status, start + span * ratio.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_scaled_progress() {
        let seen = Mutex::new(Vec::new());
        {
            let record = |status: &str, ratio: f64| seen.lock().unwrap().push((status.to_string(), ratio));
            let half = scaled(&record, 0.5, 0.5);
            half("Do CSG", 0.0);
            half("Do CSG", 1.0);
        }
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![("Do CSG".to_string(), 0.5), ("Do CSG".to_string(), 1.0)]);
    }
}
