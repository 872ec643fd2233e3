//! Lock-wrapped continuity store shared by the tasks of one production.

use std::sync::Arc;

use montage_core::continuity::ContinuityStore;
use tokio::sync::Mutex;

/// Cheap-to-clone handle to one production's [`ContinuityStore`].
///
/// Access goes through closures so a read-then-write sequence runs under
/// a single lock acquisition.
#[derive(Clone, Default)]
pub struct SharedContinuityStore {
    inner: Arc<Mutex<ContinuityStore>>,
}

impl SharedContinuityStore {
    pub fn new(store: ContinuityStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ContinuityStore) -> R) -> R {
        let guard = self.inner.lock().await;
        f(&guard)
    }

    pub async fn write<R>(&self, f: impl FnOnce(&mut ContinuityStore) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }
}
