//! Default transport: hyper-util client with rustls and tower middleware.

use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use courier_core::{
    BodyStream, Error, RawResponse, Request, ResponseBody, Result, Transport, TransportCall,
    TransportCallback, header,
};
use futures_util::future::{self, AbortHandle, AbortRegistration, Abortable, BoxFuture};
use futures_util::{FutureExt, StreamExt, TryStreamExt, stream};
use http_body_util::{BodyStream as FrameStream, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::runtime::Handle;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceExt};
use tower_service::Service;
use tracing::trace;

use super::config::ClientConfig;
use crate::middleware::LoggingLayer;

// ============================================================================
// Type-Erased Service for Middleware Composition
// ============================================================================

/// Type-erased transport service that layers wrap.
pub type BoxedService = BoxCloneService<Request, RawResponse, Error>;

/// Makes a [`BoxedService`] shareable across threads.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> BoxFuture<'static, Result<RawResponse>> {
        let service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::pin(service.oneshot(request))
    }
}

// ============================================================================
// Raw Client
// ============================================================================

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Innermost service: sends one request through hyper.
#[derive(Clone)]
struct RawHyperClient {
    inner: HyperClient,
    config: Arc<ClientConfig>,
}

impl RawHyperClient {
    fn new(config: Arc<ClientConfig>) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .retry_canceled_requests(config.retry_canceled_requests)
            .build(https_connector(config.connect_timeout));
        Self { inner, config }
    }

    fn build_hyper_request(&self, request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, mut headers, body) = request.into_parts();
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_request(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        if let Some(content_type) = body.as_ref().and_then(|body| body.content_type())
            && !headers.contains_key(header::CONTENT_TYPE)
        {
            headers.insert(header::CONTENT_TYPE, header_value(content_type)?);
        }
        if let Some(user_agent) = &self.config.user_agent
            && !headers.contains_key(header::USER_AGENT)
        {
            headers.insert(header::USER_AGENT, header_value(user_agent)?);
        }

        let body = body.map_or_else(Full::default, |body| Full::new(body.into_bytes()));
        let mut http_request = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        *http_request.headers_mut() = headers;
        Ok(http_request)
    }

    async fn execute(self, request: Request) -> Result<RawResponse> {
        let hyper_request = self.build_hyper_request(request)?;

        let deadline = self
            .config
            .timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let exchange = self.inner.request(hyper_request);
        let response = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, exchange)
                .await
                .map_err(|_| Error::Timeout)?,
            None => exchange.await,
        }
        .map_err(map_hyper_error)?;

        let (parts, body) = response.into_parts();
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let content_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let mut stream: BodyStream = Box::pin(
            FrameStream::new(body)
                .map_ok(|frame| frame.into_data().unwrap_or_default())
                .map_err(|e| Error::connection(e.to_string())),
        );
        if let Some(deadline) = deadline {
            let expired = tokio::time::sleep_until(deadline).map(|()| Error::Timeout);
            stream = interrupt_body(stream, expired);
        }

        Ok(RawResponse::new(
            parts.status.as_u16(),
            parts.headers,
            ResponseBody::new(content_type, content_length, stream),
        ))
    }
}

impl Service<Request> for RawHyperClient {
    type Response = RawResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        Box::pin(self.clone().execute(request))
    }
}

fn https_connector(connect_timeout: Duration) -> HttpsConnector<HttpConnector> {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}

fn header_value(value: &str) -> Result<http::HeaderValue> {
    http::HeaderValue::from_str(value)
        .map_err(|e| Error::invalid_request(format!("invalid header value {value:?}: {e}")))
}

/// End `body` with the error produced by `stop` if it resolves first.
fn interrupt_body(
    body: BodyStream,
    stop: impl Future<Output = Error> + Send + 'static,
) -> BodyStream {
    let reason = Arc::new(Mutex::new(None));
    let trigger = {
        let reason = Arc::clone(&reason);
        stop.map(move |error| {
            *reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        })
    };
    let tail = stream::once(ready(())).filter_map(move |()| {
        let error = reason.lock().unwrap_or_else(PoisonError::into_inner).take();
        ready(error.map(Err))
    });
    Box::pin(body.take_until(Box::pin(trigger)).chain(tail))
}

#[allow(clippy::needless_pass_by_value)]
fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
    let msg = err.to_string();
    if err.is_connect() {
        return Error::connection(msg);
    }
    if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
        return Error::tls(msg);
    }
    Error::connection(msg)
}

// ============================================================================
// Transport
// ============================================================================

/// Transport over a pooled hyper client, with HTTP/1.1, HTTP/2 and rustls.
///
/// Enqueued calls run as tasks on a tokio runtime: the one given to
/// [`HyperTransportBuilder::runtime`], or else the one current when the
/// call is created.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use courier::transport::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .timeout(Duration::from_secs(5))
///     .with_logging()
///     .build();
/// assert_eq!(transport.config().timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    service: SyncService,
    config: Arc<ClientConfig>,
    runtime: Option<Handle>,
}

impl HyperTransport {
    /// Create a transport with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a transport with `config` and no middleware.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Create a transport builder.
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// The transport configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>> {
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current()
                .map_err(|e| Error::invalid_request(format!("no tokio runtime: {e}")))?,
        };
        Ok(Arc::new(HyperCall::new(
            self.service.clone(),
            runtime,
            request,
        )))
    }
}

// ============================================================================
// Call
// ============================================================================

/// Registrations tying the head and the body of one exchange to its cancel.
struct Pending {
    request: Request,
    head: AbortRegistration,
    body: AbortRegistration,
}

/// One round trip through the service stack, abortable at any time.
///
/// Canceling interrupts the wait for the response head and any body
/// still being read, which then fails with [`Error::Canceled`].
struct HyperCall {
    service: SyncService,
    runtime: Handle,
    pending: Mutex<Option<Pending>>,
    aborts: [AbortHandle; 2],
    canceled: AtomicBool,
}

impl HyperCall {
    fn new(service: SyncService, runtime: Handle, request: Request) -> Self {
        let (head_abort, head) = AbortHandle::new_pair();
        let (body_abort, body) = AbortHandle::new_pair();
        Self {
            service,
            runtime,
            pending: Mutex::new(Some(Pending {
                request,
                head,
                body,
            })),
            aborts: [head_abort, body_abort],
            canceled: AtomicBool::new(false),
        }
    }

    fn start(&self) -> Result<BoxFuture<'static, Result<RawResponse>>> {
        let Pending {
            request,
            head,
            body,
        } = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyExecuted)?;
        trace!(method = %request.method(), url = %request.url(), "sending request");
        let response = self.service.call(request);
        Ok(Abortable::new(response, head)
            .map(move |result| {
                let raw = result.unwrap_or(Err(Error::Canceled))?;
                let canceled =
                    Abortable::new(future::pending::<()>(), body).map(|_| Error::Canceled);
                let (status, headers, body) = raw.into_parts();
                let body = body.map_stream(|stream| interrupt_body(stream, canceled));
                Ok(RawResponse::new(status, headers, body))
            })
            .boxed())
    }
}

impl TransportCall for HyperCall {
    fn execute(&self) -> BoxFuture<'static, Result<RawResponse>> {
        match self.start() {
            Ok(response) => response,
            Err(error) => Box::pin(ready(Err(error))),
        }
    }

    fn enqueue(&self, callback: TransportCallback) {
        let response = self.start();
        drop(self.runtime.spawn(async move {
            let result = match response {
                Ok(response) => response.await,
                Err(error) => Err(error),
            };
            callback(result).await;
        }));
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        for abort in &self.aborts {
            abort.abort();
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Builder
// ============================================================================

type LayerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Builder for [`HyperTransport`].
///
/// Layers are applied in order: the first added is the outermost.
#[derive(Default)]
pub struct HyperTransportBuilder {
    config: ClientConfig,
    layers: Vec<LayerFn>,
    runtime: Option<Handle>,
}

impl fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("config", &self.config)
            .field("layers_count", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl HyperTransportBuilder {
    // ========================================================================
    // Core Configuration
    // ========================================================================

    /// Set the deadline of each exchange, response body included.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(Some(timeout));
        self
    }

    /// Wait for responses without a deadline.
    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.config = self.config.with_timeout(None);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_connect_timeout(timeout);
        self
    }

    /// Set the idle connection pool size per host and idle lifetime.
    #[must_use]
    pub fn pool(mut self, idle_per_host: usize, idle_timeout: Duration) -> Self {
        self.config = self.config.with_pool(idle_per_host, idle_timeout);
        self
    }

    /// Set the default `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config = self.config.with_user_agent(user_agent);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Run enqueued calls on `runtime`.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    // ========================================================================
    // Middleware
    // ========================================================================

    /// Add a tower layer.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service:
            Service<Request, Response = RawResponse, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send,
    {
        self.layers
            .push(Arc::new(move |service| BoxCloneService::new(layer.layer(service))));
        self
    }

    /// Log each exchange at info level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.layer(LoggingLayer::new())
    }

    /// Log each exchange at debug level, headers included.
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.layer(LoggingLayer::debug())
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the transport.
    #[must_use]
    pub fn build(self) -> HyperTransport {
        let config = Arc::new(self.config);
        let mut service: BoxedService =
            BoxCloneService::new(RawHyperClient::new(Arc::clone(&config)));
        for layer_fn in self.layers.iter().rev() {
            service = layer_fn(service);
        }
        HyperTransport {
            service: SyncService::new(service),
            config,
            runtime: self.runtime,
        }
    }
}
