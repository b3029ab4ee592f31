//! REST client for delivering queued mutations to the farm-records API.
//!
//! This module provides:
//! - `ActionTransport`: the delivery seam the orchestrator drains through
//! - `ApiClient`: the reqwest-backed implementation that resolves each
//!   pending action to a REST verb and path
//! - `ApiError`: the failure taxonomy for a single delivery attempt

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::ActionTransport;
