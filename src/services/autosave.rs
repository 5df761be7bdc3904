//! Debounced auto-save for task edits.
//!
//! The UI streams field edits as they happen; only the last pending write
//! for an entity id executes, after a quiet period. Queueing a new write for
//! the same id cancels the previous one, and switching away from an entity
//! cancels its pending write outright.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;

const TASK_AUTOSAVE_DELAY_MS: u64 = 800;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule `write` to run after the quiet period, replacing any write
    /// already pending for this id.
    pub fn queue<F>(&self, id: i64, write: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, handle| !handle.is_finished());
        if let Some(handle) = pending.remove(&id) {
            handle.abort();
        }

        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            write();
        });
        pending.insert(id, handle);
    }

    pub fn cancel(&self, id: i64) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.remove(&id) {
            handle.abort();
        }
    }
}

/// Shared debouncer for task edits coming over IPC.
pub fn task_autosaver() -> &'static Debouncer {
    static AUTOSAVER: OnceLock<Debouncer> = OnceLock::new();
    AUTOSAVER.get_or_init(|| Debouncer::new(Duration::from_millis(TASK_AUTOSAVE_DELAY_MS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn rapid_edits_coalesce_into_one_write() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let writes = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let writes = writes.clone();
            debouncer.queue(1, move || {
                writes.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_drops_the_pending_write() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let writes = Arc::new(AtomicUsize::new(0));

        let counter = writes.clone();
        debouncer.queue(7, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel(7);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn distinct_ids_do_not_interfere() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let writes = Arc::new(AtomicUsize::new(0));

        for id in [1, 2] {
            let writes = writes.clone();
            debouncer.queue(id, move || {
                writes.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }
}
