//! Ordered commit gate for concurrently generated shots.

use tokio::sync::watch;

/// Lets shots finish generation in any order while their store commits
/// happen strictly in plan order.
///
/// Shot `i` calls [`wait_turn`](Self::wait_turn) before committing and
/// [`advance`](Self::advance) afterwards. Every shot index must advance
/// exactly once (cancelled shots included), otherwise later shots wait
/// forever.
pub struct CommitBarrier {
    next: watch::Sender<usize>,
}

impl CommitBarrier {
    pub fn new() -> Self {
        let (next, _) = watch::channel(0);
        Self { next }
    }

    /// Index of the next shot allowed to commit.
    pub fn next_index(&self) -> usize {
        *self.next.borrow()
    }

    pub async fn wait_turn(&self, index: usize) {
        let mut rx = self.next.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|next| *next >= index).await;
    }

    pub fn advance(&self) {
        self.next.send_modify(|next| *next += 1);
    }
}

impl Default for CommitBarrier {
    fn default() -> Self {
        Self::new()
    }
}
