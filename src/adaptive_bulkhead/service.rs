use std::{
    sync::Arc,
    task::{Context, Poll},
};

use tower::Service;

use super::{PermitPool, future::ResponseFuture};
use crate::Error;

/// Enforces an adaptive bulkhead on the inner service.
///
/// Calls that find no free permit fail immediately with
/// [`BulkheadError::BulkheadFull`](super::BulkheadError::BulkheadFull); they are never
/// queued. Readiness is the inner service's readiness.
#[derive(Debug, Clone)]
pub struct AdaptiveBulkheadService<S> {
    inner: S,
    pool: Arc<PermitPool>,
}

impl<S> AdaptiveBulkheadService<S> {
    pub fn new(inner: S, pool: Arc<PermitPool>) -> Self {
        AdaptiveBulkheadService { inner, pool }
    }

    pub fn pool(&self) -> &Arc<PermitPool> {
        &self.pool
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, Request> Service<Request> for AdaptiveBulkheadService<S>
where
    S: Service<Request>,
    S::Error: Into<Error>,
{
    type Response = S::Response;
    type Error = Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        match self.pool.try_acquire() {
            Some(permit) => ResponseFuture::admitted(self.inner.call(request), permit),
            None => ResponseFuture::rejected(self.pool.name()),
        }
    }
}
