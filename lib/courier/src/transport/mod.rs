//! Default transport built on hyper.
//!
//! Any [`courier_core::Transport`] can be plugged into the client; this one is
//! used when none is configured.

mod config;
mod hyper;

pub use config::ClientConfig;
pub use hyper::{BoxedService, HyperTransport, HyperTransportBuilder};
