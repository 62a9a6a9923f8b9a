//! # Gateway Server
//!
//! HTTP surface of the LLM agent gateway.
//!
//! This crate provides:
//! - Axum router with chat, streaming, cost, tenant, health and metrics routes
//! - Bearer-token and per-tenant key checks
//! - Request id, logging and CORS middleware
//! - Graceful shutdown on process signals

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use error::{status_for, ApiError};
pub use routes::create_router;
pub use server::{shutdown_signal, Server, ServerError};
pub use state::AppState;
