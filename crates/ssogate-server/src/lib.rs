//! HTTP boundary for ssogate

pub mod routes;
pub mod server;

pub use routes::ApiError;
pub use server::{create_router, AppState, SsoServer};
