//! Tower middleware for [`crate::transport::HyperTransport`].
//!
//! Layers wrap a `Service<Request, Response = RawResponse, Error = Error>`
//! and are added with [`crate::transport::HyperTransportBuilder::layer`].

mod logging;

pub use logging::{LogLevel, Logging, LoggingLayer};
