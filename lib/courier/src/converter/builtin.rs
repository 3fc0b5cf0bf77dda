//! Converters every client understands.

use std::sync::Arc;

use bytes::Bytes;
use courier_core::{RequestBody, ResponseBody, Result};
use futures_util::future::BoxFuture;

use super::{ConverterFactory, RequestConverter, ResponseConverter, StringConverter};
use crate::client::Courier;
use crate::declaration::{MethodAnnotation, ParamAnnotation};
use crate::type_token::{AnyValue, DynValue, TypeToken, mismatch};

/// Handles raw bytes, unit responses and ready-made request bodies.
///
/// - `Bytes` responses are fully buffered.
/// - `()` responses discard the body.
/// - `RequestBody` values are sent as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltInConverters;

impl ConverterFactory for BuiltInConverters {
    fn name(&self) -> &str {
        "BuiltInConverters"
    }

    fn response_body_converter(
        &self,
        ty: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn ResponseConverter>> {
        if ty.is::<Bytes>() {
            Some(Arc::new(BufferingConverter))
        } else if ty.is_unit() {
            Some(Arc::new(UnitConverter))
        } else {
            None
        }
    }

    fn request_body_converter(
        &self,
        ty: &TypeToken,
        _parameter_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn RequestConverter>> {
        ty.is::<RequestBody>()
            .then(|| Arc::new(PassThroughConverter(ty.clone())) as Arc<dyn RequestConverter>)
    }
}

struct BufferingConverter;

impl ResponseConverter for BufferingConverter {
    fn convert(&self, body: ResponseBody) -> BoxFuture<'static, Result<AnyValue>> {
        Box::pin(async move { Ok(Box::new(body.bytes().await?) as AnyValue) })
    }
}

struct UnitConverter;

impl ResponseConverter for UnitConverter {
    fn convert(&self, body: ResponseBody) -> BoxFuture<'static, Result<AnyValue>> {
        drop(body);
        Box::pin(async { Ok(Box::new(()) as AnyValue) })
    }
}

struct PassThroughConverter(TypeToken);

impl RequestConverter for PassThroughConverter {
    fn convert(&self, value: &DynValue) -> Result<RequestBody> {
        value
            .downcast_ref::<RequestBody>()
            .cloned()
            .ok_or_else(|| mismatch(&self.0))
    }
}

/// Renders values through their `Display` capability.
pub(crate) struct ToStringConverter(pub(crate) TypeToken);

impl StringConverter for ToStringConverter {
    fn convert(&self, value: &DynValue) -> Result<String> {
        self.0.render(value).ok_or_else(|| mismatch(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffers_bytes() {
        let body = ResponseBody::from_bytes(None, "payload");
        let value = BufferingConverter.convert(body).await.expect("buffers");
        assert_eq!(value.downcast_ref::<Bytes>().map(Bytes::as_ref), Some(b"payload".as_slice()));
    }

    #[tokio::test]
    async fn unit_discards_body() {
        let body = ResponseBody::from_bytes(None, "ignored");
        let value = UnitConverter.convert(body).await.expect("discards");
        assert!(value.downcast_ref::<()>().is_some());
    }

    #[test]
    fn passes_request_body_through() {
        let converter = PassThroughConverter(TypeToken::request_body());
        let body = RequestBody::text("hi");
        let converted = converter.convert(&body).expect("same type");
        assert_eq!(converted.bytes().as_ref(), b"hi");

        let err = converter.convert(&"hi").expect_err("wrong type");
        assert!(matches!(err, courier_core::Error::TypeMismatch { .. }));
    }

    #[test]
    fn renders_with_display() {
        let converter = ToStringConverter(TypeToken::display::<i64>());
        assert_eq!(converter.convert(&-7_i64).expect("renders"), "-7");
        assert!(converter.convert(&"x").is_err());
    }
}
