//! Prelude module for convenient imports.
//!
//! ```
//! use courier::prelude::*;
//! ```

pub use crate::adapter::{Observer, Single};
pub use crate::converter::JsonConverterFactory;
pub use crate::transport::HyperTransport;
pub use crate::{
    Args, Call, Callback, Courier, Error, Method, MethodAnnotation, MethodDeclaration,
    ParamAnnotation, ParamDeclaration, Request, Response, Result, Service, ServiceDescription,
    TypeToken,
};
pub use serde::{Deserialize, Serialize};
