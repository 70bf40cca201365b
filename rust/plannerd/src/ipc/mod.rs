mod error;
mod handlers;
mod helpers;
mod router;
mod session;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
