use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{InvokeError, ModelInvoker};
use crate::task::{RoleSpec, Stage};

/// Shares one provider rate budget across every run.
///
/// Each call holds a permit for its whole duration, so at most
/// `max_inflight` calls reach the inner invoker at once. Dropping a pending
/// call (run cancelled) releases its permit.
pub struct LimitedInvoker {
    inner: Arc<dyn ModelInvoker>,
    permits: Arc<Semaphore>,
    max_inflight: usize,
}

impl LimitedInvoker {
    pub fn new(inner: Arc<dyn ModelInvoker>, max_inflight: usize) -> Self {
        let max_inflight = max_inflight.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
        }
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    /// Calls currently holding a permit.
    pub fn inflight(&self) -> usize {
        self.max_inflight - self.permits.available_permits()
    }
}

#[async_trait]
impl ModelInvoker for LimitedInvoker {
    async fn invoke(
        &self,
        stage: Stage,
        role: &RoleSpec,
        message: &str,
    ) -> Result<String, InvokeError> {
        // Never closed; `ok()` only drops the impossible error arm.
        let _permit = self.permits.acquire().await.ok();
        self.inner.invoke(stage, role, message).await
    }
}
