//! Metrics registry and the HTTP endpoint that exposes it.

pub mod dto;
pub mod error;
pub mod registry;
pub mod routes;
pub mod state;

pub use registry::Registry;
pub use state::AppState;
