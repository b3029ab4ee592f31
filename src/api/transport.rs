//! The delivery seam between the orchestrator and the network.

use std::future::Future;

use crate::models::PendingAction;

use super::ApiError;

/// Delivers one pending action to the remote server.
///
/// The orchestrator drains the queue through this trait rather than the
/// concrete HTTP client so tests can script delivery outcomes without a
/// server. `ApiClient` is the production implementation.
pub trait ActionTransport: Send + Sync {
    /// Attempt delivery of a single action. `Ok(())` means the server
    /// accepted the mutation (any 2xx response).
    fn deliver(
        &self,
        action: &PendingAction,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
