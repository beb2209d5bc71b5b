//! Response interceptors run by `ApiClient` when a request fails authentication.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ApiError, ApiRequest};

/// Handle returned by `ApiClient::register_interceptor`, used to eject it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// Hook for recovering a request that failed with 401.
///
/// On success the interceptor has rewritten `request` (typically its
/// Authorization header) and the client replays it once. On error the
/// original request is surfaced as failed.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_auth_failure(&self, request: &mut ApiRequest) -> Result<(), ApiError>;
}

#[derive(Default)]
pub(crate) struct InterceptorRegistry {
    next_id: u64,
    entries: Vec<(InterceptorId, Arc<dyn ResponseInterceptor>)>,
}

impl InterceptorRegistry {
    pub fn register(&mut self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorId {
        self.next_id += 1;
        let id = InterceptorId(self.next_id);
        self.entries.push((id, interceptor));
        id
    }

    /// Remove an interceptor. Returns false if it was already gone.
    pub fn eject(&mut self, id: InterceptorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Clone out the current interceptors so none of them runs under the lock
    pub fn snapshot(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        self.entries.iter().map(|(_, i)| Arc::clone(i)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
