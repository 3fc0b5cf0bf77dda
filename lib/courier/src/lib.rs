//! Declarative HTTP client engine.
//!
//! An HTTP API is declared as data: a [`ServiceDescription`] lists methods
//! with their verb, URL template and parameter bindings. A [`Courier`]
//! compiles each method once into a cached [`MethodDescriptor`], binds call
//! arguments into requests, runs them through a pluggable
//! [`Transport`](courier_core::Transport), decodes responses through its
//! converter chain and adapts the result into the declared return type.
//!
//! # Example
//!
//! ```no_run
//! use courier::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! struct Contributor {
//!     login: String,
//!     contributions: u32,
//! }
//!
//! # async fn run() -> courier::Result<()> {
//! let github = ServiceDescription::builder("GitHub")
//!     .method(
//!         MethodDeclaration::new(
//!             "contributors",
//!             TypeToken::builder::<Vec<Contributor>>().deserialize().call(),
//!         )
//!         .annotation(MethodAnnotation::get("repos/{owner}/{repo}/contributors"))
//!         .param(TypeToken::string(), ParamAnnotation::path("owner"))
//!         .param(TypeToken::string(), ParamAnnotation::path("repo")),
//!     )
//!     .build()?;
//!
//! let courier = Courier::builder()
//!     .base_url("https://api.github.com/")
//!     .add_converter_factory(JsonConverterFactory::new())
//!     .validate_eagerly(true)
//!     .build()?;
//! let service = courier.create(github)?;
//!
//! let call: Call<Vec<Contributor>> = service.call(
//!     "contributors",
//!     Args::new().arg("rust-lang".to_owned()).arg("rust".to_owned()),
//! )?;
//! for contributor in call.execute().await?.into_body().unwrap_or_default() {
//!     println!("{} ({})", contributor.login, contributor.contributions);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`adapter`] - call adapters: direct, executor-bridged and reactive
//! - [`converter`] - converter factories, built-in and JSON
//! - [`transport`] - the default hyper transport
//! - [`middleware`] - tower layers for the hyper transport

pub mod adapter;
mod args;
mod assembler;
mod call;
mod client;
pub mod converter;
mod declaration;
mod descriptor;
pub mod middleware;
mod parameter;
pub mod prelude;
mod service;
pub mod transport;
mod type_token;

pub use args::Args;
pub use call::{Call, Callback, DynCall};
pub use client::{Courier, CourierBuilder};
pub use declaration::{
    MethodAnnotation, MethodDeclaration, ParamAnnotation, ParamDeclaration, ServiceDescription,
    ServiceDescriptionBuilder, ServiceId,
};
pub use descriptor::MethodDescriptor;
pub use service::Service;
pub use type_token::{
    AnyValue, DynValue, RawType, TokenBuilder, TypeToken, WrapFn, call_raw_type, single_raw_type,
};

// Re-export core types
pub use courier_core::{
    BoxError, CompositeError, ContentType, DeclarationError, Error, Form, FormBody, HeaderMap,
    Method, Part, PathTemplate, RawResponse, Request, RequestBody, RequestBuilder,
    ResolutionError, Response, ResponseBody, Result, StatusCode, Transport, TransportCall,
    TransportCallback, from_json, header, to_json,
};

// Re-export tower for middleware composition
pub use tower;
pub use url;
