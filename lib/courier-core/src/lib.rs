//! Core types and traits for the courier declarative HTTP client.
//!
//! This crate provides the HTTP primitives shared by the engine and transports:
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`RequestBody`], [`FormBody`], [`Form`] and [`Part`] - request bodies
//! - [`RawResponse`] and [`ResponseBody`] - streaming transport responses
//! - [`Response`] - decoded call outcome (success or error, never both)
//! - [`Error`] and [`Result`] - Error handling
//! - [`Transport`] and [`TransportCall`] - the network engine contract
//! - [`PathTemplate`] - relative URL templates with `{name}` placeholders

mod body;
mod error;
mod method;
mod multipart;
mod path_template;
pub mod prelude;
mod request;
mod response;
mod transport;

pub use body::{ContentType, FormBody, RequestBody, from_json, to_json};
pub use error::{BoxError, CompositeError, DeclarationError, Error, ResolutionError, Result};
pub use method::Method;
pub use multipart::{Form, Part};
pub use path_template::PathTemplate;
pub use request::{Request, RequestBuilder};
pub use response::{BodyStream, RawResponse, Response, ResponseBody};
pub use transport::{Transport, TransportCall, TransportCallback};

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, StatusCode, header};
