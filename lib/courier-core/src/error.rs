//! Error types for courier.

use std::fmt;
use std::sync::Arc;

use derive_more::{Display, Error, From};

/// Boxed error raised by user code (observers, callbacks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// Diagnostics
// ============================================================================

/// A method declaration that could not be compiled into a descriptor.
///
/// Always names the method (`Service.method`), and the 1-based parameter
/// position when a single parameter is at fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationError {
    method: String,
    parameter: Option<usize>,
    message: String,
}

impl DeclarationError {
    /// Create a method-level declaration error.
    #[must_use]
    pub fn new(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            parameter: None,
            message: message.into(),
        }
    }

    /// Attach the zero-based index of the offending parameter.
    #[must_use]
    pub const fn at_parameter(mut self, index: usize) -> Self {
        self.parameter = Some(index + 1);
        self
    }

    /// Qualified method name, e.g. `GitHub.contributors`.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 1-based parameter position, if the error concerns a parameter.
    #[must_use]
    pub const fn parameter(&self) -> Option<usize> {
        self.parameter
    }

    /// The bare message, without method or parameter context.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(parameter) = self.parameter {
            write!(f, " (parameter #{parameter})")?;
        }
        write!(f, "\n    for method {}", self.method)
    }
}

/// No factory in a resolution chain produced a result for a type.
///
/// Lists every factory that was skipped (when resuming past a factory)
/// and every factory that was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    subject: &'static str,
    type_name: String,
    skipped: Vec<String>,
    tried: Vec<String>,
}

impl ResolutionError {
    /// Create a resolution error.
    ///
    /// `subject` names what was looked up, e.g. `"call adapter"`.
    #[must_use]
    pub fn new(
        subject: &'static str,
        type_name: impl Into<String>,
        skipped: Vec<String>,
        tried: Vec<String>,
    ) -> Self {
        Self {
            subject,
            type_name: type_name.into(),
            skipped,
            tried,
        }
    }

    /// What was being resolved.
    #[must_use]
    pub const fn subject(&self) -> &'static str {
        self.subject
    }

    /// The type that had no match.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Factories skipped before the search started.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Factories asked, in order.
    #[must_use]
    pub fn tried(&self) -> &[String] {
        &self.tried
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not locate {} for {}.", self.subject, self.type_name)?;
        if !self.skipped.is_empty() {
            f.write_str("\n  Skipped:")?;
            for name in &self.skipped {
                write!(f, "\n   * {name}")?;
            }
        }
        f.write_str("\n  Tried:")?;
        for name in &self.tried {
            write!(f, "\n   * {name}")?;
        }
        Ok(())
    }
}

/// Several errors that happened while handling one another.
#[derive(Debug)]
pub struct CompositeError(Vec<Error>);

impl CompositeError {
    /// Combine errors, in the order they happened.
    #[must_use]
    pub const fn new(errors: Vec<Error>) -> Self {
        Self(errors)
    }

    /// The combined errors.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.0
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  * {error}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for courier operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// HTTP-level errors (non-2xx status codes).
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// A method declaration is inconsistent.
    #[display("{_0}")]
    #[from]
    Declaration(#[error(not(source))] DeclarationError),

    /// No converter or call adapter matched a type.
    #[display("{_0}")]
    #[from]
    Resolution(#[error(not(source))] ResolutionError),

    /// The request of a call could not be created.
    ///
    /// The cause is shared so the same failure is replayed on every
    /// further use of the call.
    #[display("request creation failed: {_0}")]
    #[from(skip)]
    RequestCreation(Arc<Error>),

    /// A call was executed or enqueued twice.
    #[display("already executed")]
    #[from(skip)]
    AlreadyExecuted,

    /// A call was canceled.
    #[display("canceled")]
    #[from(skip)]
    Canceled,

    /// A method was invoked with the wrong number of arguments.
    #[display("{method} expects {expected} arguments, got {found}")]
    #[from(skip)]
    ArgumentCount {
        /// Qualified method name.
        method: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// A value did not have the declared type.
    #[display("type mismatch: expected {expected}")]
    #[from(skip)]
    TypeMismatch {
        /// Name of the expected type.
        expected: String,
    },

    /// A service has no method with the given name.
    #[display("unknown method: {_0}")]
    #[from(skip)]
    UnknownMethod(#[error(not(source))] String),

    /// An error raised by a callback or observer.
    #[display("callback error: {_0}")]
    #[from(skip)]
    Callback(#[error(not(source))] BoxError),

    /// An error raised while another one was being delivered.
    #[display("{_0}")]
    #[from(skip)]
    Composite(#[error(not(source))] CompositeError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a type mismatch error for the expected type.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
        }
    }

    /// Wrap an error raised by user code.
    #[must_use]
    pub fn callback(error: impl Into<BoxError>) -> Self {
        Self::Callback(error.into())
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the call was canceled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// The underlying failure of a [`Error::RequestCreation`].
    #[must_use]
    pub fn creation_cause(&self) -> Option<&Arc<Self>> {
        match self {
            Self::RequestCreation(cause) => Some(cause),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::http(404, "Not Found");
        assert_eq!(err.to_string(), "HTTP error 404: Not Found");

        let err = Error::Timeout;
        assert_eq!(err.to_string(), "request timeout");

        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "connection error: failed to connect");

        let err = Error::json_deserialization("user.address.city", "missing field `city`");
        assert_eq!(
            err.to_string(),
            "JSON deserialization error at 'user.address.city': missing field `city`"
        );
    }

    #[test]
    fn declaration_error_names_method_and_parameter() {
        let err = Error::from(
            DeclarationError::new("GitHub.contributors", "No binding annotation found.")
                .at_parameter(1),
        );
        insta::assert_snapshot!(err.to_string(), @r"
        No binding annotation found. (parameter #2)
            for method GitHub.contributors
        ");

        let err = DeclarationError::new("GitHub.list", "HTTP method annotation is required.");
        assert_eq!(err.parameter(), None);
        assert_eq!(err.method(), "GitHub.list");
    }

    #[test]
    fn resolution_error_lists_factories() {
        let err = ResolutionError::new(
            "call adapter",
            "Flux<User>",
            vec!["Skipper".to_string()],
            vec!["Default".to_string(), "Single".to_string()],
        );
        insta::assert_snapshot!(err.to_string(), @r"
        Could not locate call adapter for Flux<User>.
          Skipped:
           * Skipper
          Tried:
           * Default
           * Single
        ");

        let err = ResolutionError::new("response converter", "Bytes", vec![], vec![]);
        assert_eq!(
            err.to_string(),
            "Could not locate response converter for Bytes.\n  Tried:"
        );
    }

    #[test]
    fn composite_error_keeps_every_cause() {
        let err = Error::Composite(CompositeError::new(vec![
            Error::Timeout,
            Error::callback("observer failed"),
        ]));
        assert_eq!(
            err.to_string(),
            "2 errors occurred\n  * request timeout\n  * callback error: observer failed"
        );
    }

    #[test]
    fn request_creation_shares_cause() {
        let cause = Arc::new(Error::invalid_request("bad"));
        let first = Error::RequestCreation(Arc::clone(&cause));
        let second = Error::RequestCreation(Arc::clone(&cause));

        let (Some(a), Some(b)) = (first.creation_cause(), second.creation_cause()) else {
            panic!("both carry a cause");
        };
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(first.to_string(), "request creation failed: invalid request: bad");
    }

    #[test]
    fn error_status() {
        let err = Error::http(404, "Not Found");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = Error::http(500, "Internal Server Error");
        assert!(err.is_server_error());

        let err = Error::Timeout;
        assert_eq!(err.status(), None);
        assert!(!err.is_client_error());
    }

    #[test]
    fn error_predicates() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::connection("failed").is_connection());
        assert!(Error::Canceled.is_canceled());
        assert!(!Error::AlreadyExecuted.is_canceled());
    }

    #[test]
    fn error_decode_body() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let body = bytes::Bytes::from(r#"{"error": "not found"}"#);
        let err = Error::http_with_body(404, "Not Found", body);

        let decoded = err
            .decode_body::<ApiError>()
            .expect("should have body")
            .expect("should decode");
        assert_eq!(
            decoded,
            ApiError {
                error: "not found".to_string()
            }
        );

        assert!(Error::http(404, "Not Found").decode_body::<ApiError>().is_none());
        assert!(Error::Timeout.decode_body::<ApiError>().is_none());
    }
}
