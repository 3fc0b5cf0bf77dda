//! Shared test fixtures: a scripted in-memory transport.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::future::{pending, ready};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use courier::converter::{ConverterFactory, ResponseConverter};
use courier::{
    AnyValue, Courier, CourierBuilder, Error, HeaderMap, MethodAnnotation, RawResponse, Request,
    ResponseBody, Result, Transport, TransportCall, TransportCallback, TypeToken,
};
use futures_util::future::{AbortHandle, Abortable, BoxFuture};
use futures_util::{FutureExt, stream};

/// What the transport answers to the next call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A response with the given status, content type and body.
    Respond {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },
    /// A 200 whose body fails after its first chunk.
    BrokenBody(Bytes),
    /// A transport failure.
    Fail(String),
    /// Never answers; only cancellation ends the call.
    Hang,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            content_type: Some("text/plain".to_owned()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            content_type: Some("application/json".to_owned()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn into_response(self) -> BoxFuture<'static, Result<RawResponse>> {
        match self {
            Self::Respond {
                status,
                content_type,
                body,
            } => {
                let body = ResponseBody::from_bytes(content_type, body);
                Box::pin(ready(Ok(RawResponse::new(status, HeaderMap::new(), body))))
            }
            Self::BrokenBody(first) => {
                let chunks = stream::iter([Ok(first), Err(Error::connection("connection reset"))]);
                let body = ResponseBody::new(None, None, Box::pin(chunks));
                Box::pin(ready(Ok(RawResponse::new(200, HeaderMap::new(), body))))
            }
            Self::Fail(message) => Box::pin(ready(Err(Error::connection(message)))),
            Self::Hang => Box::pin(pending()),
        }
    }
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    requests: Vec<Request>,
    calls: Vec<Arc<MockCall>>,
}

/// Transport answering from a queue of scripted replies.
///
/// Clones share the queue and the recorded requests.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call; calls beyond the queue get a 200.
    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    /// The last request seen.
    pub fn last_request(&self) -> Request {
        self.requests().pop().expect("a request was sent")
    }

    /// Transport calls created so far.
    pub fn calls(&self) -> Vec<Arc<MockCall>> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Transport for MockTransport {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>> {
        let mut state = self.state.lock().unwrap();
        let reply = state.replies.pop_front().unwrap_or(Reply::status(200));
        state.requests.push(request);
        let call = Arc::new(MockCall::new(reply));
        state.calls.push(Arc::clone(&call));
        Ok(call)
    }
}

/// One scripted transport call.
pub struct MockCall {
    reply: Mutex<Option<Reply>>,
    abort: AbortHandle,
    registration: Mutex<Option<futures_util::future::AbortRegistration>>,
    canceled: AtomicBool,
    executions: AtomicUsize,
}

impl MockCall {
    fn new(reply: Reply) -> Self {
        let (abort, registration) = AbortHandle::new_pair();
        Self {
            reply: Mutex::new(Some(reply)),
            abort,
            registration: Mutex::new(Some(registration)),
            canceled: AtomicBool::new(false),
            executions: AtomicUsize::new(0),
        }
    }

    /// How many times the call was started.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn start(&self) -> BoxFuture<'static, Result<RawResponse>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.lock().unwrap().take();
        let registration = self.registration.lock().unwrap().take();
        match (reply, registration) {
            (Some(reply), Some(registration)) => Abortable::new(reply.into_response(), registration)
                .map(|result| result.unwrap_or(Err(Error::Canceled)))
                .boxed(),
            _ => Box::pin(ready(Err(Error::AlreadyExecuted))),
        }
    }
}

impl TransportCall for MockCall {
    fn execute(&self) -> BoxFuture<'static, Result<RawResponse>> {
        self.start()
    }

    fn enqueue(&self, callback: TransportCallback) {
        let response = self.start();
        tokio::spawn(async move { callback(response.await).await });
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// A client builder over `transport` with the JSON converter installed.
pub fn builder(transport: &MockTransport) -> CourierBuilder {
    Courier::builder()
        .base_url("http://example.com/api/")
        .transport(transport.clone())
        .add_converter_factory(courier::converter::JsonConverterFactory::new())
}

/// A client over `transport` with the JSON converter installed.
pub fn courier(transport: &MockTransport) -> Courier {
    builder(transport).build().expect("valid client")
}

// ============================================================================
// Counting converters
// ============================================================================

/// Decodes `String` responses as UTF-8 text, counting lookups and decodes.
#[derive(Debug, Clone, Default)]
pub struct CountingText {
    lookups: Arc<AtomicUsize>,
    decodes: Arc<AtomicUsize>,
}

impl CountingText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times a response converter was asked for.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Times a response body went through the converter.
    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ConverterFactory for CountingText {
    fn name(&self) -> &str {
        "CountingText"
    }

    fn response_body_converter(
        &self,
        ty: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn ResponseConverter>> {
        if !ty.is::<String>() {
            return None;
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(TextConverter(Arc::clone(&self.decodes))))
    }
}

struct TextConverter(Arc<AtomicUsize>);

impl ResponseConverter for TextConverter {
    fn convert(&self, body: ResponseBody) -> BoxFuture<'static, Result<AnyValue>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let bytes = body.bytes().await?;
            Ok(Box::new(String::from_utf8_lossy(&bytes).into_owned()) as AnyValue)
        })
    }
}
