use std::sync::Arc;

use tower::Layer;

use super::{AdaptiveBulkheadService, PermitPool};

/// Enforces an adaptive bulkhead on the underlying service.
///
/// Every service built by this layer shares the same [`PermitPool`], so the limit applies to
/// all of them together.
#[derive(Debug, Clone)]
pub struct AdaptiveBulkheadLayer {
    pool: Arc<PermitPool>,
}

impl AdaptiveBulkheadLayer {
    pub fn new(pool: Arc<PermitPool>) -> Self {
        AdaptiveBulkheadLayer { pool }
    }

    pub fn pool(&self) -> &Arc<PermitPool> {
        &self.pool
    }
}

impl<S> Layer<S> for AdaptiveBulkheadLayer {
    type Service = AdaptiveBulkheadService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdaptiveBulkheadService::new(service, Arc::clone(&self.pool))
    }
}
