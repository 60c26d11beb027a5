//! The single capability the engine depends on: "ask the model for this role".
//!
//! - [`ProviderRouter`] dispatches to the configured [`LlmClient`](crate::llm::LlmClient)s
//! - [`LimitedInvoker`] bounds how many calls are in flight at once

mod limit;
mod router;
#[cfg(test)]
pub(crate) mod testing;

pub use limit::LimitedInvoker;
pub use router::ProviderRouter;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::LlmError;
use crate::task::{ProviderKind, RoleSpec, Stage};

/// Failure of a single model call, after any adapter-level backoff.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// Network, auth, rate-limit or provider failure.
    #[error("{0}")]
    Transport(#[from] LlmError),

    /// No adapter is configured for the role's provider.
    #[error("Provider {0} is not configured")]
    ProviderUnavailable(ProviderKind),
}

/// Run one model call for a pipeline stage.
///
/// Implementations return the trimmed response text. An empty response is a
/// valid (empty) string, not an error.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        stage: Stage,
        role: &RoleSpec,
        message: &str,
    ) -> Result<String, InvokeError>;
}
