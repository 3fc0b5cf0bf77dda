//! Direct adapter: `Call<T>` methods get the engine call as is.

use std::sync::Arc;

use super::{CallAdapter, CallAdapterFactory};
use crate::call::DynCall;
use crate::client::Courier;
use crate::declaration::MethodAnnotation;
use crate::type_token::{AnyValue, TypeToken, WrapFn, call_raw_type};

/// Adapts `Call<T>` return types without any callback dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallAdapterFactory;

impl CallAdapterFactory for DefaultCallAdapterFactory {
    fn name(&self) -> &str {
        "DefaultCallAdapterFactory"
    }

    fn get(
        &self,
        return_type: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        if return_type.raw_type() != Some(call_raw_type()) {
            return None;
        }
        Some(Arc::new(DirectAdapter {
            response_type: return_type.inner()?.clone(),
            wrap: return_type.wrap_fn()?,
        }))
    }
}

struct DirectAdapter {
    response_type: TypeToken,
    wrap: WrapFn,
}

impl CallAdapter for DirectAdapter {
    fn response_type(&self) -> &TypeToken {
        &self.response_type
    }

    fn adapt(&self, call: Arc<dyn DynCall>) -> AnyValue {
        (self.wrap)(call)
    }
}
