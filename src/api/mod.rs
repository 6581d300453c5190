//! HTTP API
//!
//! Player and admin endpoints over the settlement engine, wallet and catalog.
//! Authentication happens upstream; the gateway forwards the player id in
//! `x-user-id`.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};
