//! Future types

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;

use super::{BulkheadError, Permit};
use crate::Error;

/// Future for the `AdaptiveBulkheadService` service.
///
/// Holds the call's [`Permit`] until the inner future resolves. `Ok` counts as a successful
/// call and `Err` as a failed one. If the future is dropped first, the permit is returned
/// without a sample.
#[pin_project(project = ResponseFutureProj)]
#[derive(Debug)]
pub enum ResponseFuture<T> {
    Admitted {
        #[pin]
        inner: T,
        permit: Option<Permit>,
    },
    Rejected {
        bulkhead: String,
    },
}

impl<T> ResponseFuture<T> {
    pub(super) fn admitted(inner: T, permit: Permit) -> Self {
        ResponseFuture::Admitted {
            inner,
            permit: Some(permit),
        }
    }

    pub(super) fn rejected(bulkhead: &str) -> Self {
        ResponseFuture::Rejected {
            bulkhead: bulkhead.to_owned(),
        }
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner, permit } => {
                let output = ready!(inner.poll(cx));
                if let Some(permit) = permit.take() {
                    if let Err(error) = permit.record(output.is_ok()) {
                        warn!(message = "Failed to record call outcome.", %error);
                    }
                }
                Poll::Ready(output.map_err(Into::into))
            }
            ResponseFutureProj::Rejected { bulkhead } => {
                let name = std::mem::take(bulkhead);
                Poll::Ready(Err(Box::new(BulkheadError::BulkheadFull { name })))
            }
        }
    }
}
