//! HTTP API for the Mines game
//!
//! Axum router in front of `MinesService`. Every game endpoint requires a
//! bearer credential resolved by an `Authenticator`.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use auth::{ApiKeyAuthenticator, AuthUser, Authenticator};
pub use errors::{ApiError, ErrorResponse};
pub use handlers::AppState;
pub use server::{create_app, ApiServer};
