use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;

type ThreadCell = Arc<OnceCell<String>>;

/// Single-flight thread creation keyed by session id.
///
/// Concurrent first turns for a session await the same creation. A resolved
/// thread id stays registered until `forget` runs for that session (reset,
/// rotation, an unfinished run, clear, idle pruning), so a late caller never
/// starts a second thread.
#[derive(Default)]
pub struct ThreadRegistry {
    threads: Mutex<HashMap<String, ThreadCell>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create<F, Fut, E>(&self, session_id: &str, create: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let cell = self
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(create).await.cloned()
    }

    pub fn forget(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ThreadCell>> {
        match self.threads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
