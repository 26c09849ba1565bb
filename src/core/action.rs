//! A single pending filesystem mutation and its completion latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Notify;

/// The filesystem mutation an [`Action`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Create and populate a new file.
    Copy,
    /// Update mode/mtime on an existing entry without touching its content.
    UpdateMeta,
    /// Create a new directory.
    Mkdir,
}

/// A one-shot, broadcast completion signal.
///
/// Mirrors the original's `close(chan struct{})` idiom: any number of callers
/// may `wait()`, including ones that start waiting after `done()` has already
/// fired, and `done()` may only be called once.
#[derive(Debug, Default)]
struct Latch {
    fired: AtomicBool,
    notify: Notify,
}

impl Latch {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Suspend until `done()` has been called, returning immediately if it
    /// already has.
    async fn wait(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if self.fired.load(Ordering::Acquire) {
                return;
            }
            notified.await;
            if self.fired.load(Ordering::Acquire) {
                return;
            }
        }
    }

    /// Latch the signal and wake every current and future waiter. Must be
    /// called at most once.
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// One pending or in-flight destination mutation, produced by the
/// [`crate::core::ActionGenerator`] and consumed by the
/// [`crate::core::ExecutorPool`].
#[derive(Debug, Clone)]
pub struct Action {
    /// What kind of mutation this is.
    pub kind: ActionKind,
    /// Path relative to the sync root, '/'-separated, never absolute.
    pub path: String,
    /// POSIX mode bits taken from the source entry.
    pub mode: u32,
    /// Source mtime, applied to the destination entry.
    pub mtime: OffsetDateTime,
    /// Source size in bytes; meaningful only for `Copy`.
    pub size: u64,
    latch: Arc<Latch>,
}

impl Action {
    /// Create a new, unlatched action.
    pub fn new(kind: ActionKind, path: impl Into<String>, mode: u32, mtime: OffsetDateTime, size: u64) -> Self {
        Self {
            kind,
            path: path.into(),
            mode,
            mtime,
            size,
            latch: Arc::new(Latch::new()),
        }
    }

    /// Suspend until this action's executor has called [`Action::done`].
    pub async fn wait(&self) {
        self.latch.wait().await;
    }

    /// Signal that this action has finished executing (success or failure).
    /// Must be called exactly once, on every control-flow exit from the
    /// executor's processing of this action.
    pub fn done(&self) {
        self.latch.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sample(kind: ActionKind) -> Action {
        Action::new(kind, "a/b", 0o755, OffsetDateTime::UNIX_EPOCH, 0)
    }

    #[tokio::test]
    async fn wait_returns_after_done() {
        let action = sample(ActionKind::Mkdir);
        action.done();
        // Already-fired latch: wait() must return immediately.
        action.wait().await;
    }

    #[tokio::test]
    async fn wait_blocks_until_done_then_broadcasts() {
        let action = sample(ActionKind::Copy);
        let woken = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let action = action.clone();
            let woken = woken.clone();
            waiters.push(tokio::spawn(async move {
                action.wait().await;
                woken.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::task::yield_now().await;
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        action.done();
        for w in waiters {
            w.await.unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn clone_shares_the_same_latch() {
        let a = sample(ActionKind::UpdateMeta);
        let b = a.clone();
        a.done();
        // b observes completion through the same underlying latch.
        assert!(b.latch.fired.load(Ordering::SeqCst));
    }
}
