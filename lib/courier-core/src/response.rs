//! HTTP response handling.
//!
//! - [`RawResponse`] is what a transport hands back: status, headers and a
//!   streaming [`ResponseBody`].
//! - [`Response`] is the decoded outcome of a call: either a successful
//!   response with a decoded body, or an error response carrying the
//!   buffered error body. Never both.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::{StreamExt, stream};
use http::HeaderMap;

use crate::Result;

// ============================================================================
// Streaming Body
// ============================================================================

/// A streaming body: chunks of bytes arriving over time.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body of a raw response, consumed once.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    stream: BodyStream,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl ResponseBody {
    /// Creates a body from a stream of chunks.
    #[must_use]
    pub fn new(
        content_type: Option<String>,
        content_length: Option<u64>,
        stream: BodyStream,
    ) -> Self {
        Self {
            content_type,
            content_length,
            stream,
        }
    }

    /// Creates a body from bytes already in memory.
    #[must_use]
    pub fn from_bytes(content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let length = u64::try_from(bytes.len()).ok();
        Self::new(content_type, length, Box::pin(stream::once(async move { Ok(bytes) })))
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(None, Some(0), Box::pin(stream::empty()))
    }

    /// Content type announced by the server.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Content length announced by the server.
    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Replace the chunk stream, keeping the metadata.
    #[must_use]
    pub fn map_stream(self, f: impl FnOnce(BodyStream) -> BodyStream) -> Self {
        Self {
            stream: f(self.stream),
            ..self
        }
    }

    /// Consume into the chunk stream.
    #[must_use]
    pub fn into_stream(self) -> BodyStream {
        self.stream
    }

    /// Buffer the entire stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading any chunk fails.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.stream;
        let mut collected = Vec::new();

        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk?);
        }

        Ok(Bytes::from(collected))
    }
}

// ============================================================================
// Raw Response
// ============================================================================

/// HTTP response as produced by a transport.
#[derive(Debug)]
pub struct RawResponse {
    status: u16,
    headers: HeaderMap,
    body: ResponseBody,
}

impl RawResponse {
    /// Creates a new raw response.
    #[must_use]
    pub const fn new(status: u16, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }
}

// ============================================================================
// Decoded Response
// ============================================================================

const fn is_success_status(status: u16) -> bool {
    matches!(status, 200..=299)
}

/// Outcome of a call: a decoded success, or an error with its raw body.
#[derive(Debug, Clone)]
pub struct Response<T> {
    status: u16,
    headers: HeaderMap,
    body: Option<T>,
    error_body: Option<Bytes>,
}

impl<T> Response<T> {
    /// A successful response; `body` is `None` for bodiless statuses (204, 205).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRequest`] if `status` is outside `200..300`.
    pub fn success(status: u16, headers: HeaderMap, body: Option<T>) -> Result<Self> {
        if !is_success_status(status) {
            return Err(crate::Error::invalid_request(format!(
                "successful response with status {status}"
            )));
        }
        Ok(Self {
            status,
            headers,
            body,
            error_body: None,
        })
    }

    /// An error response carrying the buffered error body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRequest`] if `status` is within `200..300`.
    pub fn error(status: u16, headers: HeaderMap, error_body: Bytes) -> Result<Self> {
        if is_success_status(status) {
            return Err(crate::Error::invalid_request(format!(
                "error response with status {status}"
            )));
        }
        Ok(Self {
            status,
            headers,
            body: None,
            error_body: Some(error_body),
        })
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Response was built as a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error_body.is_none()
    }

    /// Decoded body of a successful response.
    #[must_use]
    pub const fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Consume into the decoded body.
    #[must_use]
    pub fn into_body(self) -> Option<T> {
        self.body
    }

    /// Raw body of an error response.
    #[must_use]
    pub const fn error_body(&self) -> Option<&Bytes> {
        self.error_body.as_ref()
    }

    /// Try to decode the error body as JSON.
    ///
    /// Returns `None` for successful responses.
    pub fn decode_error_body<E: serde::de::DeserializeOwned>(&self) -> Option<Result<E>> {
        self.error_body.as_ref().map(|body| crate::from_json(body))
    }

    /// Turn an error response into [`crate::Error::Http`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Http`] with the error body if this is an error response.
    pub fn into_result(self) -> Result<Option<T>> {
        match self.error_body {
            None => Ok(self.body),
            Some(body) => {
                let reason = http::StatusCode::from_u16(self.status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or("Unknown Status");
                Err(crate::Error::http_with_body(self.status, reason, body))
            }
        }
    }

    /// Transform the decoded body with a function.
    pub fn map_body<F, U>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body.map(f),
            error_body: self.error_body,
        }
    }

    /// Transform the decoded body with a fallible function.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`.
    pub fn try_map_body<F, U, E>(self, f: F) -> std::result::Result<Response<U>, E>
    where
        F: FnOnce(T) -> std::result::Result<U, E>,
    {
        Ok(Response {
            status: self.status,
            headers: self.headers,
            body: self.body.map(f).transpose()?,
            error_body: self.error_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn response_body_buffers_chunks() {
        let chunks = stream::iter([
            Ok::<_, crate::Error>(Bytes::from("hello ")),
            Ok(Bytes::from("world")),
        ]);
        let body = ResponseBody::new(Some("text/plain".to_string()), None, Box::pin(chunks));
        assert_eq!(body.content_type(), Some("text/plain"));

        let bytes = body.bytes().await.expect("bytes");
        assert_eq!(bytes.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn response_body_propagates_read_errors() {
        let chunks = stream::iter([
            Ok(Bytes::from("partial")),
            Err(crate::Error::connection("reset")),
        ]);
        let body = ResponseBody::new(None, None, Box::pin(chunks));

        let err = body.bytes().await.expect_err("read error");
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn response_body_from_bytes() {
        let body = ResponseBody::from_bytes(None, "abc");
        assert_eq!(body.content_length(), Some(3));
        assert_eq!(body.bytes().await.expect("bytes").as_ref(), b"abc");

        assert!(ResponseBody::empty().bytes().await.expect("bytes").is_empty());
    }

    #[test]
    fn success_and_error_are_exclusive() {
        let ok = Response::success(200, HeaderMap::new(), Some(42)).expect("2xx");
        assert!(ok.is_success());
        assert_eq!(ok.body(), Some(&42));
        assert!(ok.error_body().is_none());

        let err: Response<i32> =
            Response::error(404, HeaderMap::new(), Bytes::from("missing")).expect("4xx");
        assert!(!err.is_success());
        assert!(err.body().is_none());
        assert_eq!(err.error_body().map(Bytes::as_ref), Some(b"missing".as_slice()));
    }

    #[test]
    fn status_must_match_the_outcome() {
        assert!(Response::success(199, HeaderMap::new(), Some(1)).is_err());
        assert!(Response::success(300, HeaderMap::new(), Some(1)).is_err());
        assert!(Response::success(299, HeaderMap::new(), Some(1)).is_ok());

        let err = Response::<i32>::error(200, HeaderMap::new(), Bytes::new()).expect_err("2xx");
        assert!(matches!(err, crate::Error::InvalidRequest(_)));
        assert!(Response::<i32>::error(300, HeaderMap::new(), Bytes::new()).is_ok());
    }

    #[test]
    fn into_result_maps_error_response() {
        let err: Response<i32> =
            Response::error(503, HeaderMap::new(), Bytes::from(r#"{"error":"down"}"#)).expect("5xx");
        let err = err.into_result().expect_err("error response");
        assert_eq!(err.to_string(), "HTTP error 503: Service Unavailable");
        assert!(err.is_server_error());

        let ok = Response::success(204, HeaderMap::new(), None::<i32>).expect("2xx");
        assert_eq!(ok.into_result().expect("success"), None);
    }

    #[test]
    fn decode_error_body() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let response: Response<()> =
            Response::error(400, HeaderMap::new(), Bytes::from(r#"{"error":"bad"}"#)).expect("4xx");
        let decoded = response
            .decode_error_body::<ApiError>()
            .expect("error body")
            .expect("decodes");
        assert_eq!(decoded.error, "bad");
    }

    #[test]
    fn map_body() {
        let response = Response::success(200, HeaderMap::new(), Some("test")).expect("2xx");
        let mapped = response.map_body(str::len);
        assert_eq!(mapped.body(), Some(&4));

        let parsed = Response::success(200, HeaderMap::new(), Some("12"))
            .expect("2xx")
            .try_map_body(str::parse::<u8>)
            .expect("parses");
        assert_eq!(parsed.into_body(), Some(12));
    }
}
