//! Transport contract: the network engine that performs HTTP round trips.
//!
//! A [`Transport`] turns a [`Request`] into a [`TransportCall`], a single-use
//! handle that can be executed (awaited) or enqueued (completed through a
//! callback on a transport-owned task), and canceled at any time.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{RawResponse, Request, Result};

/// Completion callback for [`TransportCall::enqueue`].
///
/// Called exactly once, from a task owned by the transport.
pub type TransportCallback = Box<dyn FnOnce(Result<RawResponse>) -> BoxFuture<'static, ()> + Send>;

/// Factory of transport calls.
///
/// # Example
///
/// ```ignore
/// struct Canned;
///
/// impl Transport for Canned {
///     fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>> {
///         Ok(Arc::new(CannedCall::new(request)))
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Prepare a call for the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent by this transport.
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>> {
        (**self).new_call(request)
    }
}

/// One network round trip.
pub trait TransportCall: Send + Sync {
    /// Send the request and wait for the response head.
    ///
    /// Fails with [`crate::Error::AlreadyExecuted`] when called twice, and
    /// with [`crate::Error::Canceled`] once canceled.
    fn execute(&self) -> BoxFuture<'static, Result<RawResponse>>;

    /// Send the request in the background and report through `callback`.
    fn enqueue(&self, callback: TransportCallback);

    /// Cancel the call. Idempotent; a no-op once completed.
    fn cancel(&self);

    /// Whether [`TransportCall::cancel`] was called.
    fn is_canceled(&self) -> bool;
}
