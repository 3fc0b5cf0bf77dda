//! Exchange logging with `tracing`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use courier_core::{Error, HeaderMap, RawResponse, Request, Result, header};
use tower::{Layer, Service};
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Headers whose values never reach the logs.
const REDACTED: [header::HeaderName; 4] = [
    header::AUTHORIZATION,
    header::PROXY_AUTHORIZATION,
    header::COOKIE,
    header::SET_COOKIE,
];

/// Layer recording one span per exchange.
///
/// The request line and the response status are logged at the layer's level.
/// Error statuses and transport failures are always logged as warnings.
/// At debug level the headers are included, with credentials masked.
///
/// ```
/// use courier::middleware::LoggingLayer;
/// use courier::transport::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .layer(LoggingLayer::debug())
///     .build();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Detail of the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Headers and body sizes as well.
    Debug,
    /// Request line, status and elapsed time.
    #[default]
    Info,
}

impl LoggingLayer {
    /// Log at info level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log at debug level.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// The configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service produced by [`LoggingLayer`].
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

// ============================================================================
// Events
// ============================================================================

fn masked_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if REDACTED.contains(name) {
                "***".to_owned()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_owned(), shown)
        })
        .collect()
}

fn request_sent(span: &Span, level: LogLevel, request: &Request) {
    match level {
        LogLevel::Info => info!(parent: span, "sending request"),
        LogLevel::Debug => debug!(
            parent: span,
            headers = ?masked_headers(request.headers()),
            body_len = request.body().map_or(0, courier_core::RequestBody::len),
            content_type = request.content_type(),
            "sending request"
        ),
    }
}

fn exchange_done(level: LogLevel, result: &Result<RawResponse>, elapsed_ms: u64) {
    let response = match result {
        Err(error) => {
            warn!(%error, elapsed_ms, "request failed");
            return;
        }
        Ok(response) => response,
    };
    let status = response.status();
    if !response.is_success() {
        warn!(status, elapsed_ms, "error status received");
        return;
    }
    match level {
        LogLevel::Info => info!(status, elapsed_ms, "response received"),
        LogLevel::Debug => debug!(
            status,
            elapsed_ms,
            headers = ?masked_headers(response.headers()),
            content_length = response.body().content_length(),
            "response received"
        ),
    }
}

impl<S> Service<Request> for Logging<S>
where
    S: Service<Request, Response = RawResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = RawResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<RawResponse>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let level = self.level;
        let span = info_span!(
            "http_exchange",
            method = %request.method(),
            url = %request.url(),
        );
        request_sent(&span, level, &request);

        // The service polled ready is the one that must serve the call.
        let clone = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, clone);
        let exchange = async move {
            let started = Instant::now();
            let mut ready = ready;
            let result = ready.call(request).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            exchange_done(level, &result, elapsed_ms);
            result
        };
        Box::pin(exchange.instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use courier_core::{Method, ResponseBody};
    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;

    fn request() -> Request {
        Request::builder(Method::Get, "http://localhost/tea".parse().expect("url"))
            .header("Authorization", "Bearer secret")
            .header("Accept", "text/plain")
            .build()
            .expect("request")
    }

    #[test]
    fn levels() {
        assert_eq!(LoggingLayer::new().level(), LogLevel::Info);
        assert_eq!(LoggingLayer::debug().level(), LogLevel::Debug);
    }

    #[test]
    fn credentials_are_masked() {
        let headers = masked_headers(request().headers());

        assert!(headers.contains(&("authorization".to_owned(), "***".to_owned())));
        assert!(headers.contains(&("accept".to_owned(), "text/plain".to_owned())));
    }

    #[tokio::test]
    async fn passes_responses_through() {
        let inner = service_fn(|_request: Request| async {
            Ok::<_, Error>(RawResponse::new(418, HeaderMap::new(), ResponseBody::empty()))
        });
        let service = LoggingLayer::debug().layer(inner);

        let response = service.oneshot(request()).await.expect("response");
        assert_eq!(response.status(), 418);
    }

    #[tokio::test]
    async fn passes_failures_through() {
        let inner = service_fn(|_request: Request| async {
            Err::<RawResponse, _>(Error::Timeout)
        });
        let service = LoggingLayer::new().layer(inner);

        let result = service.oneshot(request()).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
