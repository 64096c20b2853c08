//! A cloneable handle for observing and interrupting a session from external code.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A cloneable handle onto a session's shared flags.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    loading: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string().into(),
            loading: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Unique id of the session, for log correlation
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a template or chat round-trip is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Claim the loading flag for one round-trip.
    ///
    /// Fails with `Error::ShutDown` after `shutdown`, and with `Error::Busy`
    /// if another round-trip holds it. The flag is released when the returned
    /// guard drops.
    pub(crate) fn begin(&self) -> Result<LoadingGuard> {
        if self.is_shut_down() {
            return Err(Error::ShutDown);
        }
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(LoadingGuard {
            loading: Arc::clone(&self.loading),
        })
    }

    /// Signal shutdown to everything watching this session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Releases the loading flag on drop
pub(crate) struct LoadingGuard {
    loading: Arc<AtomicBool>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.loading.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_busy() {
        let handle = SessionHandle::new();
        let guard = handle.begin().unwrap();
        assert!(handle.is_loading());
        assert!(matches!(handle.clone().begin(), Err(Error::Busy)));

        drop(guard);
        assert!(!handle.is_loading());
        assert!(handle.begin().is_ok());
    }

    #[test]
    fn test_no_claims_after_shutdown() {
        let handle = SessionHandle::new();
        handle.clone().shutdown();
        assert!(handle.is_shut_down());
        assert!(matches!(handle.begin(), Err(Error::ShutDown)));
        assert!(!handle.is_loading());
    }
}
