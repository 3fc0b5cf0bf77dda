//! Request bodies and serialization utilities.

use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::Result;

/// Characters escaped in `application/x-www-form-urlencoded` names and values.
const FORM_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'/')
    .add(b'\\')
    .add(b'?')
    .add(b'#')
    .add(b'&')
    .add(b'!')
    .add(b'$')
    .add(b'(')
    .add(b')')
    .add(b',')
    .add(b'~')
    .add(b'+')
    .add(b'%');

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Request Body
// ============================================================================

/// Bytes to send, with the content type they advertise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestBody {
    content_type: Option<String>,
    bytes: Bytes,
}

impl RequestBody {
    /// A body without a content type.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A `text/plain; charset=utf-8` body.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(value.into()).with_content_type("text/plain; charset=utf-8")
    }

    /// A JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(to_json(value)?).with_content_type(ContentType::Json.as_str()))
    }

    /// Replace the advertised content type, keeping the bytes.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Advertised content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Body bytes.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume into the body bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Body has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Form Body
// ============================================================================

/// Accumulates `application/x-www-form-urlencoded` fields.
///
/// ```
/// use courier_core::FormBody;
///
/// let mut form = FormBody::new();
/// form.add("name", "a b");
/// form.add_encoded("value", "1%2B1");
/// let body = form.into_body();
/// assert_eq!(body.bytes().as_ref(), b"name=a%20b&value=1%2B1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormBody {
    encoded: String,
}

impl FormBody {
    /// An empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, percent-encoding name and value.
    pub fn add(&mut self, name: &str, value: &str) {
        let name = utf8_percent_encode(name, FORM_ENCODE_SET).to_string();
        let value = utf8_percent_encode(value, FORM_ENCODE_SET).to_string();
        self.push(&name, &value);
    }

    /// Add a field whose name and value are already encoded.
    pub fn add_encoded(&mut self, name: &str, value: &str) {
        self.push(name, value);
    }

    fn push(&mut self, name: &str, value: &str) {
        if !self.encoded.is_empty() {
            self.encoded.push('&');
        }
        self.encoded.push_str(name);
        self.encoded.push('=');
        self.encoded.push_str(value);
    }

    /// No field was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Finish into a request body.
    #[must_use]
    pub fn into_body(self) -> RequestBody {
        RequestBody::new(self.encoded).with_content_type(ContentType::FormUrlEncoded.as_str())
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use courier_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// Uses `serde_path_to_error` to provide detailed error messages that include
/// the exact path to the field that failed to deserialize.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_as_str() {
        assert_eq!(ContentType::Json.as_str(), "application/json");
        assert_eq!(
            ContentType::FormUrlEncoded.as_str(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(ContentType::PlainText.to_string(), "text/plain");
    }

    #[test]
    fn request_body_content_type_override_keeps_bytes() {
        let body = RequestBody::text("hello");
        assert_eq!(body.content_type(), Some("text/plain; charset=utf-8"));

        let body = body.with_content_type("text/x-custom");
        assert_eq!(body.content_type(), Some("text/x-custom"));
        assert_eq!(body.bytes().as_ref(), b"hello");
        assert_eq!(body.len(), 5);
    }

    #[test]
    fn request_body_json() {
        #[derive(serde::Serialize)]
        struct User {
            name: String,
            age: u32,
        }

        let body = RequestBody::json(&User {
            name: "Alice".to_string(),
            age: 30,
        })
        .expect("serialize");
        assert_eq!(body.content_type(), Some("application/json"));
        assert_eq!(body.bytes().as_ref(), br#"{"name":"Alice","age":30}"#);
    }

    #[test]
    fn form_body_fields() {
        let mut form = FormBody::new();
        assert!(form.is_empty());
        form.add("name", "a");
        form.add("value", "1");
        let body = form.into_body();

        assert_eq!(body.bytes().as_ref(), b"name=a&value=1");
        assert_eq!(
            body.content_type(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn form_body_escapes_reserved_characters() {
        let mut form = FormBody::new();
        form.add("q", "rust & go=fun/2");
        form.add("emoji", "caf\u{e9}");
        let body = form.into_body();

        assert_eq!(
            body.bytes().as_ref(),
            b"q=rust%20%26%20go%3Dfun%2F2&emoji=caf%C3%A9"
        );
    }

    #[test]
    fn from_json_deserialize() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct User {
            name: String,
            age: u32,
        }

        let user: User = from_json(br#"{"name":"Alice","age":30}"#).expect("deserialize");
        assert_eq!(
            user,
            User {
                name: "Alice".to_string(),
                age: 30,
            }
        );
    }

    #[test]
    fn from_json_missing_field_error_with_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Address {
            #[allow(dead_code)]
            city: String,
        }

        #[derive(Debug, serde::Deserialize)]
        struct User {
            #[allow(dead_code)]
            address: Address,
        }

        let err = from_json::<User>(br#"{"address":{}}"#).expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("address"), "error should contain path: {msg}");
        assert!(msg.contains("city"), "error should mention field: {msg}");
    }
}
