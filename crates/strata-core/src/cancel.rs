//! Cancellation for long-running resolution
//!
//! A [`Cancellation`] is a cheap cloneable handle. Every clone observes the
//! same flag, so a caller can cancel from another thread while a resolution
//! is running. An optional deadline cancels implicitly once it passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child(Some(timeout))
    }

    /// A handle sharing this flag whose deadline is the earlier of this
    /// handle's deadline and `timeout` from now.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout.map(|t| Instant::now() + t)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    /// Request cancellation for every clone of this handle.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`Error::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let cancel = Cancellation::new();
        let clone = cancel.clone();
        assert!(clone.check().is_ok());
        cancel.cancel();
        assert!(matches!(clone.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_cancels() {
        let cancel = Cancellation::with_timeout(Duration::ZERO);
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn child_keeps_the_earlier_deadline() {
        let parent = Cancellation::with_timeout(Duration::from_secs(1));
        let child = parent.child(Some(Duration::from_secs(3600)));
        assert!(child.remaining().unwrap() <= Duration::from_secs(1));
        assert!(Cancellation::new().child(None).remaining().is_none());
    }
}
