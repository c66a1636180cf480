//! Job-wide cancellation signaling.
//!
//! Generalizes the donor editor crate's single-export `ExportCancel` handle
//! (an `Arc<AtomicBool>`) into a job-scoped token threaded through every
//! pipeline stage, with a `Notify` so `async` waiters can wake promptly
//! instead of polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cheaply cloneable handle shared by every stage of one job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<Inner>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent: calling twice is a no-op the second
    /// time.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Return an error if already cancelled; call at every stage boundary.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is signalled, for use in `tokio::select!`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0.notify.notified().await;
    }
}

/// Zero-sized marker indicating a stage stopped because of cancellation, not
/// failure. Propagates upward without being logged as an error (§7).
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("job cancelled")]
pub struct Cancelled;
