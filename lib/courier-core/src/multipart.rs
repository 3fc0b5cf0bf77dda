//! Multipart form data support.
//!
//! A [`Part`] is a set of part headers plus a [`RequestBody`]; a [`Form`]
//! accumulates parts and encodes them as `multipart/form-data`.
//!
//! # Example
//!
//! ```
//! use courier_core::{Form, Part};
//!
//! let mut form = Form::with_boundary("xyz");
//! form.push(Part::text("name", "John Doe"));
//! form.push(Part::file("avatar", "photo.jpg", vec![0xFF, 0xD8]));
//!
//! let body = form.into_body().expect("at least one part");
//! assert_eq!(body.content_type(), Some("multipart/form-data; boundary=xyz"));
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, RequestBody, Result};

/// A single part in a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Vec<(String, String)>,
    body: RequestBody,
}

impl Part {
    /// Create a part from raw part headers and a body.
    #[must_use]
    pub const fn new(headers: Vec<(String, String)>, body: RequestBody) -> Self {
        Self { headers, body }
    }

    /// Create a `form-data` part with the given field name.
    #[must_use]
    pub fn form_data(name: &str, body: RequestBody) -> Self {
        Self::new(
            vec![(
                "Content-Disposition".to_string(),
                format!("form-data; name=\"{name}\""),
            )],
            body,
        )
    }

    /// Create a text part.
    ///
    /// Sets the content type to `text/plain; charset=utf-8`.
    #[must_use]
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self::form_data(name, RequestBody::text(value))
    }

    /// Create a file part with filename.
    ///
    /// The content type is guessed from the filename extension, or defaults
    /// to `application/octet-stream` if unknown.
    #[must_use]
    pub fn file(name: &str, filename: &str, data: impl Into<Bytes>) -> Self {
        let body = RequestBody::new(data).with_content_type(guess_content_type(filename));
        Self::new(
            vec![(
                "Content-Disposition".to_string(),
                format!("form-data; name=\"{name}\"; filename=\"{filename}\""),
            )],
            body,
        )
    }

    /// Add a part header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Part headers, in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Single part header value by name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Part body.
    #[must_use]
    pub const fn body(&self) -> &RequestBody {
        &self.body
    }
}

/// Guess the content type from a filename extension.
fn guess_content_type(filename: &str) -> String {
    let extension = filename
        .rsplit('.')
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "json" => "application/json",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// A multipart form accumulating parts.
#[derive(Debug, Clone)]
pub struct Form {
    parts: Vec<Part>,
    boundary: String,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    /// Create a new empty form with a generated boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    /// Create a new form with a custom boundary.
    ///
    /// The boundary should be a unique string that doesn't appear in any part data.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            parts: Vec::new(),
            boundary: boundary.into(),
        }
    }

    /// Append a part.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Get the boundary string.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Get the parts in this form.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// No part was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get the Content-Type header value for this form.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the form into a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the form has no part.
    pub fn into_body(self) -> Result<RequestBody> {
        if self.parts.is_empty() {
            return Err(Error::invalid_request(
                "Multipart body must have at least one part.",
            ));
        }
        let content_type = self.content_type();
        Ok(RequestBody::new(self.encode()).with_content_type(content_type))
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        for part in &self.parts {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");

            for (name, value) in &part.headers {
                buf.put_slice(name.as_bytes());
                buf.put_slice(b": ");
                buf.put_slice(value.as_bytes());
                buf.put_slice(b"\r\n");
            }
            if let Some(content_type) = part.body.content_type() {
                buf.put_slice(b"Content-Type: ");
                buf.put_slice(content_type.as_bytes());
                buf.put_slice(b"\r\n");
            }

            buf.put_slice(b"\r\n");
            buf.put_slice(part.body.bytes());
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");

        buf.freeze()
    }
}

/// Generate a boundary string unique enough for a single process.
fn generate_boundary() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("----CourierBoundary{timestamp:x}{count:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_form_data_headers() {
        let part = Part::form_data("name", RequestBody::text("value"))
            .header("Content-Transfer-Encoding", "binary");

        assert_eq!(
            part.header_value("content-disposition"),
            Some("form-data; name=\"name\"")
        );
        assert_eq!(part.header_value("Content-Transfer-Encoding"), Some("binary"));
        assert_eq!(part.body().bytes().as_ref(), b"value");
    }

    #[test]
    fn part_file_guesses_content_type() {
        let part = Part::file("doc", "report.PDF", vec![1, 2, 3]);
        assert_eq!(part.body().content_type(), Some("application/pdf"));

        let part = Part::file("blob", "data.unknown", vec![1]);
        assert_eq!(part.body().content_type(), Some("application/octet-stream"));
    }

    #[test]
    fn form_encoding() {
        let mut form = Form::with_boundary("boundary123");
        form.push(Part::text("field1", "value1"));
        form.push(
            Part::form_data("file", RequestBody::new("hello")).header("Content-Transfer-Encoding", "8bit"),
        );

        let body = form.into_body().expect("non empty form");
        assert_eq!(
            body.content_type(),
            Some("multipart/form-data; boundary=boundary123")
        );

        let text = String::from_utf8(body.bytes().to_vec()).expect("utf8");
        assert_eq!(
            text,
            "--boundary123\r\n\
             Content-Disposition: form-data; name=\"field1\"\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             value1\r\n\
             --boundary123\r\n\
             Content-Disposition: form-data; name=\"file\"\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             hello\r\n\
             --boundary123--\r\n"
        );
    }

    #[test]
    fn empty_form_is_rejected() {
        let err = Form::new().into_body().expect_err("no parts");
        assert_eq!(
            err.to_string(),
            "invalid request: Multipart body must have at least one part."
        );
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(Form::new().boundary(), Form::new().boundary());
    }
}
