//! Calls: single-use handles on one HTTP exchange.
//!
//! [`HttpCall`] is the engine call. It builds its transport call lazily,
//! caches a creation failure so it is replayed on every later use, and
//! parses the raw response into a [`Response`]:
//!
//! - non-2xx statuses buffer the body into an error response,
//! - 204 and 205 succeed without decoding,
//! - everything else goes through the response converter. A read error
//!   seen by the converter takes precedence over the converter's own error.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier_core::{Error, RawResponse, Request, Response, ResponseBody, Result, TransportCall};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tracing::{debug, trace};

use crate::args::Args;
use crate::descriptor::MethodDescriptor;
use crate::type_token::AnyValue;

// ============================================================================
// Contracts
// ============================================================================

/// Type-erased call, the currency between the engine and call adapters.
pub trait DynCall: Send + Sync {
    /// Run the exchange and wait for its outcome.
    ///
    /// Fails with [`Error::AlreadyExecuted`] on a second execution.
    fn execute(&self) -> BoxFuture<'_, Result<Response<AnyValue>>>;

    /// Run the exchange in the background and report to `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExecuted`] without invoking the callback if
    /// the call was already executed or enqueued.
    fn enqueue(&self, callback: Box<dyn Callback<AnyValue>>) -> Result<()>;

    /// Whether the call was executed or enqueued.
    fn is_executed(&self) -> bool;

    /// Cancel the call. Idempotent.
    fn cancel(&self);

    /// Whether the call was canceled.
    fn is_canceled(&self) -> bool;

    /// A fresh, unexecuted call for the same request.
    fn clone_call(&self) -> Arc<dyn DynCall>;

    /// The request this call sends.
    ///
    /// # Errors
    ///
    /// Returns the request creation failure, replayed on every use.
    fn request(&self) -> Result<Request>;
}

/// Receives the outcome of an enqueued call, exactly once.
///
/// Any `FnOnce(Result<Response<T>>)` closure is a callback.
pub trait Callback<T>: Send + 'static {
    /// The exchange completed with a response, successful or not.
    fn on_response(self: Box<Self>, response: Response<T>);

    /// The exchange failed or was canceled.
    fn on_failure(self: Box<Self>, error: Error);
}

impl<T, F> Callback<T> for F
where
    F: FnOnce(Result<Response<T>>) + Send + 'static,
{
    fn on_response(self: Box<Self>, response: Response<T>) {
        (*self)(Ok(response));
    }

    fn on_failure(self: Box<Self>, error: Error) {
        (*self)(Err(error));
    }
}

// ============================================================================
// Typed Call
// ============================================================================

/// A typed call whose successful body decodes to `T`.
///
/// Cloning yields a fresh, unexecuted call for the same request.
pub struct Call<T> {
    raw: Arc<dyn DynCall>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Call<T> {
    /// Wrap an erased call.
    #[must_use]
    pub fn from_raw(raw: Arc<dyn DynCall>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Run the exchange and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExecuted`] on a second execution, the
    /// request creation failure, transport errors, [`Error::Canceled`], or
    /// the body conversion error.
    pub async fn execute(&self) -> Result<Response<T>> {
        let response = self.raw.execute().await?;
        downcast_response(response)
    }

    /// Run the exchange in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExecuted`] if the call was already used.
    pub fn enqueue(&self, callback: impl Callback<T>) -> Result<()> {
        self.raw.enqueue(Box::new(Downcast::<T> {
            callback: Box::new(callback),
        }))
    }

    /// Whether the call was executed or enqueued.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.raw.is_executed()
    }

    /// Cancel the call.
    pub fn cancel(&self) {
        self.raw.cancel();
    }

    /// Whether the call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.raw.is_canceled()
    }

    /// The request this call sends.
    ///
    /// # Errors
    ///
    /// Returns the request creation failure.
    pub fn request(&self) -> Result<Request> {
        self.raw.request()
    }

    /// The erased call.
    #[must_use]
    pub fn as_raw(&self) -> &Arc<dyn DynCall> {
        &self.raw
    }
}

impl<T> Clone for Call<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone_call(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("type", &type_name::<T>())
            .field("executed", &self.raw.is_executed())
            .field("canceled", &self.raw.is_canceled())
            .finish()
    }
}

/// Downcast the body of an erased response.
pub(crate) fn downcast_response<T: 'static>(response: Response<AnyValue>) -> Result<Response<T>> {
    response.try_map_body(|body| {
        body.downcast::<T>()
            .map(|body| *body)
            .map_err(|_| Error::type_mismatch(type_name::<T>()))
    })
}

struct Downcast<T> {
    callback: Box<dyn Callback<T>>,
}

impl<T: Send + 'static> Callback<AnyValue> for Downcast<T> {
    fn on_response(self: Box<Self>, response: Response<AnyValue>) {
        match downcast_response(response) {
            Ok(response) => self.callback.on_response(response),
            Err(error) => self.callback.on_failure(error),
        }
    }

    fn on_failure(self: Box<Self>, error: Error) {
        self.callback.on_failure(error);
    }
}

// ============================================================================
// Engine Call
// ============================================================================

#[derive(Default)]
struct CallState {
    executed: bool,
    request: Option<Request>,
    raw: Option<Arc<dyn TransportCall>>,
    creation_failure: Option<Arc<Error>>,
}

/// The engine's call: assembles the request and drives the transport.
pub(crate) struct HttpCall {
    descriptor: Arc<MethodDescriptor>,
    args: Args,
    canceled: AtomicBool,
    state: Mutex<CallState>,
}

impl HttpCall {
    pub(crate) fn new(descriptor: Arc<MethodDescriptor>, args: Args) -> Self {
        Self {
            descriptor,
            args,
            canceled: AtomicBool::new(false),
            state: Mutex::new(CallState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The transport call, created on first use.
    fn raw_call(&self, state: &mut CallState) -> Result<Arc<dyn TransportCall>> {
        if let Some(raw) = &state.raw {
            return Ok(Arc::clone(raw));
        }
        if let Some(failure) = &state.creation_failure {
            return Err(Error::RequestCreation(Arc::clone(failure)));
        }

        let created = self.descriptor.to_request(&self.args).and_then(|request| {
            let raw = self.descriptor.transport().new_call(request.clone())?;
            Ok((request, raw))
        });
        match created {
            Ok((request, raw)) => {
                trace!(
                    method = %self.descriptor.name(),
                    url = %request.url(),
                    "created transport call"
                );
                state.request = Some(request);
                state.raw = Some(Arc::clone(&raw));
                Ok(raw)
            }
            Err(error) => {
                debug!(method = %self.descriptor.name(), error = %error, "request creation failed");
                let error = Arc::new(error);
                state.creation_failure = Some(Arc::clone(&error));
                Err(Error::RequestCreation(error))
            }
        }
    }

    /// Mark executed and get the transport call.
    fn start(&self) -> Result<Result<Arc<dyn TransportCall>>> {
        let mut state = self.lock();
        if state.executed {
            return Err(Error::AlreadyExecuted);
        }
        state.executed = true;
        let raw = self.raw_call(&mut state);
        drop(state);

        if let Ok(raw) = &raw
            && self.canceled.load(Ordering::Acquire)
        {
            raw.cancel();
        }
        Ok(raw)
    }
}

impl DynCall for HttpCall {
    fn execute(&self) -> BoxFuture<'_, Result<Response<AnyValue>>> {
        Box::pin(async move {
            let raw = self.start()??;
            debug!(method = %self.descriptor.name(), "executing call");
            let response = raw.execute().await?;
            parse_response(&self.descriptor, response).await
        })
    }

    fn enqueue(&self, callback: Box<dyn Callback<AnyValue>>) -> Result<()> {
        let raw = match self.start()? {
            Ok(raw) => raw,
            Err(error) => {
                callback.on_failure(error);
                return Ok(());
            }
        };

        debug!(method = %self.descriptor.name(), "enqueuing call");
        let descriptor = Arc::clone(&self.descriptor);
        raw.enqueue(Box::new(move |result: Result<RawResponse>| {
            Box::pin(async move {
                let parsed = match result {
                    Ok(response) => parse_response(&descriptor, response).await,
                    Err(error) => Err(error),
                };
                match parsed {
                    Ok(response) => callback.on_response(response),
                    Err(error) => callback.on_failure(error),
                }
            }) as BoxFuture<'static, ()>
        }));
        Ok(())
    }

    fn is_executed(&self) -> bool {
        self.lock().executed
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        let raw = self.lock().raw.clone();
        if let Some(raw) = raw {
            raw.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        if self.canceled.load(Ordering::Acquire) {
            return true;
        }
        self.lock().raw.as_ref().is_some_and(|raw| raw.is_canceled())
    }

    fn clone_call(&self) -> Arc<dyn DynCall> {
        Arc::new(Self::new(Arc::clone(&self.descriptor), self.args.clone()))
    }

    fn request(&self) -> Result<Request> {
        let mut state = self.lock();
        if let Some(request) = &state.request {
            return Ok(request.clone());
        }
        self.raw_call(&mut state)?;
        state
            .request
            .clone()
            .ok_or_else(|| Error::invalid_request("request was not created"))
    }
}

/// Turn a raw transport response into the call outcome.
pub(crate) async fn parse_response(
    descriptor: &MethodDescriptor,
    raw: RawResponse,
) -> Result<Response<AnyValue>> {
    let (status, headers, body) = raw.into_parts();

    if !(200..300).contains(&status) {
        let error_body = body.bytes().await?;
        debug!(method = %descriptor.name(), status, "error response");
        return Response::error(status, headers, error_body);
    }

    if status == 204 || status == 205 {
        drop(body);
        return Response::success(status, headers, None);
    }

    let (body, caught) = catch_read_errors(body);
    match descriptor.response_converter().convert(body).await {
        Ok(value) => Response::success(status, headers, Some(value)),
        Err(error) => {
            let read_error = caught.lock().unwrap_or_else(PoisonError::into_inner).take();
            Err(read_error.unwrap_or(error))
        }
    }
}

type CaughtError = Arc<Mutex<Option<Error>>>;

/// Remember the first read error of `body`, handing the converter a copy.
fn catch_read_errors(body: ResponseBody) -> (ResponseBody, CaughtError) {
    let caught: CaughtError = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&caught);
    let body = body.map_stream(move |stream| {
        Box::pin(stream.map(move |chunk| {
            chunk.map_err(|error| {
                let copy = Error::connection(error.to_string());
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(error);
                copy
            })
        }))
    });
    (body, caught)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use courier_core::HeaderMap;
    use futures_util::stream;

    use super::*;

    #[tokio::test]
    async fn catches_first_read_error() {
        let chunks = stream::iter([
            Ok(Bytes::from("{")),
            Err(Error::Timeout),
            Err(Error::connection("later")),
        ]);
        let (body, caught) = catch_read_errors(ResponseBody::new(None, None, Box::pin(chunks)));

        let seen = body.bytes().await.expect_err("read error");
        assert!(seen.is_connection());
        let original = caught.lock().expect("lock").take().expect("caught");
        assert!(original.is_timeout());
    }

    #[test]
    fn downcasts_bodies() {
        let response: Response<AnyValue> =
            Response::success(200, HeaderMap::new(), Some(Box::new(7_u8) as AnyValue))
                .expect("2xx");
        let typed = downcast_response::<u8>(response).expect("u8");
        assert_eq!(typed.body(), Some(&7));

        let response: Response<AnyValue> =
            Response::success(200, HeaderMap::new(), Some(Box::new(7_u8) as AnyValue))
                .expect("2xx");
        let err = downcast_response::<String>(response).expect_err("wrong type");
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn closures_are_callbacks() {
        let (tx, rx) = std::sync::mpsc::channel();
        let callback: Box<dyn Callback<u8>> = Box::new(move |result: Result<Response<u8>>| {
            tx.send(result.map(Response::into_body)).expect("send");
        });
        callback.on_failure(Error::Canceled);
        assert!(matches!(rx.recv().expect("recv"), Err(Error::Canceled)));
    }
}
