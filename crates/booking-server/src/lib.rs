pub mod http;

pub use http::{AppState, build_router};
