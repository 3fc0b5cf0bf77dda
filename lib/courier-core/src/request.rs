//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers and a body.
//!
//! # Example
//!
//! ```
//! use courier_core::{Method, Request};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com/users".parse().expect("url"))
//!     .header("Accept", "application/json")
//!     .build()
//!     .expect("valid request");
//! assert_eq!(request.header("accept"), Some("application/json"));
//! ```

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{Error, Method, RequestBody, Result};

/// An HTTP request with method, URL, headers, and optional body.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First header value by name, if it is visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Content type of the body, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.body.as_ref().and_then(RequestBody::content_type)
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, HeaderMap, Option<RequestBody>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
///
/// Header names and values are validated on [`RequestBuilder::build`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
    error: Option<Error>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            error: None,
        }
    }

    /// Appends a header; repeated names keep every value.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(_), _) => {
                self.error = Some(Error::invalid_request(format!("invalid header name: {name:?}")));
            }
            (_, Err(_)) => {
                self.error = Some(Error::invalid_request(format!(
                    "invalid value for header {name}: {value:?}"
                )));
            }
        }
        self
    }

    /// Appends multiple headers.
    #[must_use]
    pub fn headers<'a>(self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        headers
            .into_iter()
            .fold(self, |builder, (name, value)| builder.header(name, value))
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        Ok(self.body(RequestBody::json(value)?))
    }

    /// Builds the [`Request`].
    ///
    /// # Errors
    ///
    /// Returns the first invalid header name or value.
    pub fn build(self) -> Result<Request> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).expect("valid URL")
    }

    #[test]
    fn request_builder_basic() {
        let request = Request::builder(Method::Get, url("https://api.example.com/users"))
            .header("Accept", "application/json")
            .build()
            .expect("request");

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().as_str(), "https://api.example.com/users");
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert!(request.body().is_none());
    }

    #[test]
    fn request_builder_repeated_headers() {
        let request = Request::builder(Method::Get, url("https://api.example.com"))
            .headers([("X-Tag", "a"), ("X-Tag", "b")])
            .build()
            .expect("request");

        let values: Vec<_> = request
            .headers()
            .get_all("x-tag")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn request_builder_rejects_invalid_header() {
        let err = Request::builder(Method::Get, url("https://api.example.com"))
            .header("Bad Header", "x")
            .header("X-Ok", "fine")
            .build()
            .expect_err("invalid name");
        assert_eq!(err.to_string(), "invalid request: invalid header name: \"Bad Header\"");

        let err = Request::builder(Method::Get, url("https://api.example.com"))
            .header("X-Line", "a\nb")
            .build()
            .expect_err("invalid value");
        assert!(err.to_string().contains("X-Line"));
    }

    #[test]
    fn request_builder_json_body() {
        #[derive(serde::Serialize)]
        struct User {
            name: String,
        }

        let request = Request::builder(Method::Post, url("https://api.example.com/users"))
            .json(&User {
                name: "Alice".to_string(),
            })
            .expect("json")
            .build()
            .expect("request");

        assert_eq!(request.content_type(), Some("application/json"));
        assert_eq!(
            request.body().map(|b| b.bytes().as_ref()),
            Some(br#"{"name":"Alice"}"#.as_slice())
        );
    }
}
