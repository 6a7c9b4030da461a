//! Re-entrancy exclusion for the binding's mutation paths.
//!
//! A [`ReentrancyGuard`] is owned by a single [`SyncBinding`](crate::SyncBinding)
//! and wraps every local write and every observer invocation. While one path
//! holds the guard, any nested attempt to run through it is skipped instead of
//! recursing, which absorbs synchronous re-entrant triggers such as an observer
//! firing while a local transaction is still committing.
//!
//! The guard is a coarse safety net. Distinguishing self-caused from
//! peer-caused document events is done with the transaction origin tag
//! (see [`OriginTag`](crate::OriginTag)).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-owner, non-queueing exclusion flag with scoped acquisition.
///
/// # Example
///
/// ```
/// use recordsync::ReentrancyGuard;
///
/// let guard = ReentrancyGuard::new();
/// let outer = guard.run(|| {
///     // Nested acquisition is a no-op.
///     assert!(guard.run(|| ()).is_none());
///     42
/// });
/// assert_eq!(outer, Some(42));
/// assert!(!guard.is_held());
/// ```
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    held: AtomicBool,
}

/// Releases the guard when dropped, including during unwinding.
struct Held<'a>(&'a AtomicBool);

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReentrancyGuard {
    /// Create a released guard.
    pub fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Run `f` with the guard held.
    ///
    /// Returns `None` without calling `f` when the guard is already held.
    /// The guard is released on every exit path of `f`, including panics.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.held.swap(true, Ordering::AcqRel) {
            tracing::trace!("Reentrancy guard already held, skipping nested run");
            return None;
        }
        let _held = Held(&self.held);
        Some(f())
    }

    /// Whether some caller is currently inside [`run`](Self::run).
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
