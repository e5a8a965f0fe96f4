//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared flag observed between units of work.
///
/// Cancellation is cooperative: long-running operations check the token
/// at tile and item boundaries and abandon their staged output, never a
/// committed file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out when the token has been tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Resource("operation cancelled".to_string()))
        } else {
            Ok(())
        }
    }
}
