use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::model::Session;

pub type SessionStoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SessionStoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Backing storage for sessions keyed by session id.
pub trait SessionStore: Send + Sync {
    fn load<'a>(&'a self, session_id: &'a str) -> SessionStoreFuture<'a, Option<Session>>;
    fn save<'a>(&'a self, session: Session) -> SessionStoreFuture<'a, ()>;
    fn remove<'a>(&'a self, session_id: &'a str) -> SessionStoreFuture<'a, bool>;
    /// Drops sessions last updated before `idle_before` and returns their ids.
    fn prune_idle<'a>(&'a self, idle_before: DateTime<Utc>) -> SessionStoreFuture<'a, Vec<String>>;
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn load<'a>(&'a self, session_id: &'a str) -> SessionStoreFuture<'a, Option<Session>> {
        Box::pin(async move { Ok(self.lock().get(session_id).cloned()) })
    }

    fn save<'a>(&'a self, session: Session) -> SessionStoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock().insert(session.id.clone(), session);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, session_id: &'a str) -> SessionStoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.lock().remove(session_id).is_some()) })
    }

    fn prune_idle<'a>(&'a self, idle_before: DateTime<Utc>) -> SessionStoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut pruned = Vec::new();
            self.lock().retain(|session_id, session| {
                let keep = session.updated_at >= idle_before;
                if !keep {
                    pruned.push(session_id.clone());
                }
                keep
            });
            Ok(pruned)
        })
    }
}
