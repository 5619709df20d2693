//! HTTP front door: authentication, request parsing, response labelling

mod inbound;
mod response;
mod router;

pub use response::ApiError;
pub use router::{router, serve, ServerState};
