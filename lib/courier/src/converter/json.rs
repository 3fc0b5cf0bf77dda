//! JSON converters backed by serde.

use std::sync::Arc;

use courier_core::{ContentType, RequestBody, ResponseBody, Result};
use futures_util::future::BoxFuture;

use super::{ConverterFactory, RequestConverter, ResponseConverter};
use crate::client::Courier;
use crate::declaration::{MethodAnnotation, ParamAnnotation};
use crate::type_token::{AnyValue, DynValue, TypeToken, mismatch};

/// Encodes and decodes JSON for tokens built with serde capabilities.
///
/// Decoding errors carry the path of the offending field.
///
/// ```ignore
/// let courier = Courier::builder()
///     .base_url("https://api.github.com/")
///     .add_converter_factory(JsonConverterFactory::new())
///     .build()?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverterFactory;

impl JsonConverterFactory {
    /// Create the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConverterFactory for JsonConverterFactory {
    fn name(&self) -> &str {
        "JsonConverterFactory"
    }

    fn response_body_converter(
        &self,
        ty: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn ResponseConverter>> {
        ty.can_decode_json()
            .then(|| Arc::new(JsonResponseConverter(ty.clone())) as Arc<dyn ResponseConverter>)
    }

    fn request_body_converter(
        &self,
        ty: &TypeToken,
        _parameter_annotations: &[ParamAnnotation],
        _method_annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn RequestConverter>> {
        ty.can_encode_json()
            .then(|| Arc::new(JsonRequestConverter(ty.clone())) as Arc<dyn RequestConverter>)
    }
}

struct JsonResponseConverter(TypeToken);

impl ResponseConverter for JsonResponseConverter {
    fn convert(&self, body: ResponseBody) -> BoxFuture<'static, Result<AnyValue>> {
        let token = self.0.clone();
        Box::pin(async move {
            let bytes = body.bytes().await?;
            token
                .decode_json(&bytes)
                .unwrap_or_else(|| Err(mismatch(&token)))
        })
    }
}

struct JsonRequestConverter(TypeToken);

impl RequestConverter for JsonRequestConverter {
    fn convert(&self, value: &DynValue) -> Result<RequestBody> {
        let bytes = self
            .0
            .encode_json(value)
            .ok_or_else(|| mismatch(&self.0))??;
        Ok(RequestBody::new(bytes)
            .with_content_type(format!("{}; charset=UTF-8", ContentType::Json.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Contributor {
        login: String,
        contributions: u32,
    }

    #[tokio::test]
    async fn decodes_json() {
        let converter = JsonResponseConverter(TypeToken::json::<Vec<Contributor>>());
        let body = ResponseBody::from_bytes(None, r#"[{"login":"octocat","contributions":3}]"#);

        let value = converter.convert(body).await.expect("decodes");
        let contributors = value.downcast::<Vec<Contributor>>().expect("type");
        assert_eq!(contributors[0].login, "octocat");
    }

    #[tokio::test]
    async fn decode_error_has_path() {
        let converter = JsonResponseConverter(TypeToken::json::<Contributor>());
        let body = ResponseBody::from_bytes(None, r#"{"login":"octocat","contributions":"many"}"#);

        let err = converter.convert(body).await.expect_err("bad field");
        assert!(matches!(
            err,
            courier_core::Error::JsonDeserialization { ref path, .. } if path == "contributions"
        ));
    }

    #[test]
    fn encodes_json_with_content_type() {
        let converter = JsonRequestConverter(TypeToken::json::<Contributor>());
        let value = Contributor {
            login: "octocat".to_string(),
            contributions: 1,
        };

        let body = converter.convert(&value).expect("encodes");
        assert_eq!(body.content_type(), Some("application/json; charset=UTF-8"));
        assert_eq!(body.bytes().as_ref(), br#"{"login":"octocat","contributions":1}"#);
    }
}
