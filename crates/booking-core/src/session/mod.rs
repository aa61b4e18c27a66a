mod model;
mod store;
mod threads;

pub use model::{OptionCache, Session, ThreadState};
pub use store::{InMemorySessionStore, SessionStore, SessionStoreError, SessionStoreFuture};
pub use threads::ThreadRegistry;
