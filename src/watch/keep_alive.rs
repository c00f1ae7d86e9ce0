//! Keep-alive ("wake lock") tokens held for the duration of a poll cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Hands out tokens that keep the host awake until dropped.
pub trait KeepAlive: Send + Sync {
    fn acquire(&self) -> KeepAliveToken;
}

/// Releases its keep-alive when dropped.
pub struct KeepAliveToken {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl KeepAliveToken {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for KeepAliveToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAliveToken")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Keep-alive for headless hosts: counts holders and logs transitions.
#[derive(Debug, Default)]
pub struct LoggingKeepAlive {
    held: Arc<AtomicUsize>,
}

impl LoggingKeepAlive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens currently held.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

impl KeepAlive for LoggingKeepAlive {
    fn acquire(&self) -> KeepAliveToken {
        let held = Arc::clone(&self.held);
        let now = held.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(held = now, "Keep-alive acquired");
        KeepAliveToken::new(move || {
            let left = held.fetch_sub(1, Ordering::SeqCst) - 1;
            debug!(held = left, "Keep-alive released");
        })
    }
}
