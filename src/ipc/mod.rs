mod error;
mod handlers;
mod helpers;
mod router;
mod types;
mod validate;

pub use router::handle_request;
pub use types::{AppState, Request};
