//! Prelude module for convenient imports.
//!
//! ```ignore
//! use courier_core::prelude::*;
//! ```

pub use crate::{
    ContentType, Error, Form, FormBody, Method, Part, RawResponse, Request, RequestBody,
    RequestBuilder, Response, ResponseBody, Result, Transport, TransportCall, from_json, to_json,
};
