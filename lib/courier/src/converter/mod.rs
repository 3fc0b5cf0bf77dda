//! Converters between typed values and HTTP representations.
//!
//! Converter factories are asked in registration order; the first one that
//! recognizes a type wins. [`BuiltInConverters`] always comes first, and
//! string conversion falls back to [`std::fmt::Display`] when no factory
//! offers a string converter.

mod builtin;
mod json;

use std::any::type_name;
use std::sync::Arc;

use courier_core::{RequestBody, ResponseBody, Result};
use futures_util::future::BoxFuture;

pub use builtin::BuiltInConverters;
pub(crate) use builtin::ToStringConverter;
pub use json::JsonConverterFactory;

use crate::client::Courier;
use crate::declaration::{MethodAnnotation, ParamAnnotation};
use crate::type_token::{AnyValue, DynValue, TypeToken};

/// Decodes a response body into a value of the resolved type.
pub trait ResponseConverter: Send + Sync {
    /// Consume the body and produce the boxed value.
    fn convert(&self, body: ResponseBody) -> BoxFuture<'static, Result<AnyValue>>;
}

/// Encodes a value into a request body.
pub trait RequestConverter: Send + Sync {
    /// Encode the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not of the resolved type or cannot be encoded.
    fn convert(&self, value: &DynValue) -> Result<RequestBody>;
}

/// Renders a value as a string for paths, queries, headers and fields.
pub trait StringConverter: Send + Sync {
    /// Render the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not of the resolved type.
    fn convert(&self, value: &DynValue) -> Result<String>;
}

/// Source of converters for the types it recognizes.
///
/// Every method returns `None` for types the factory does not handle, so
/// the next factory in the chain is asked.
///
/// # Example
///
/// ```ignore
/// struct Upper;
///
/// impl ConverterFactory for Upper {
///     fn string_converter(
///         &self,
///         ty: &TypeToken,
///         _annotations: &[ParamAnnotation],
///         _courier: &Courier,
///     ) -> Option<Arc<dyn StringConverter>> {
///         ty.is::<String>().then(|| Arc::new(UpperConverter) as Arc<dyn StringConverter>)
///     }
/// }
/// ```
pub trait ConverterFactory: Send + Sync + 'static {
    /// Name used in resolution diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Converter for response bodies of type `ty`.
    fn response_body_converter(
        &self,
        _ty: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn ResponseConverter>> {
        None
    }

    /// Converter for `@Body`, `@Part` and `@PartMap` values of type `ty`.
    fn request_body_converter(
        &self,
        _ty: &TypeToken,
        _parameter_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn RequestConverter>> {
        None
    }

    /// Converter rendering values of type `ty` as strings.
    fn string_converter(
        &self,
        _ty: &TypeToken,
        _annotations: &[ParamAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn StringConverter>> {
        None
    }
}
