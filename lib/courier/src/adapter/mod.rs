//! Call adapters: turn the engine call into the declared return value.
//!
//! Adapter factories are asked in registration order. The client always
//! appends one for [`crate::Call`] last: the direct one, or the executor
//! one when a callback executor is configured.

mod default;
mod executor;
mod reactive;

use std::any::type_name;
use std::sync::Arc;

pub use default::DefaultCallAdapterFactory;
pub use executor::{
    CallbackExecutor, CallbackQueue, ExecutorCallAdapterFactory, QueueExecutor, RuntimeExecutor,
    Task, callback_queue,
};
pub use reactive::{
    Disposable, Observer, ObserverResult, Single, SingleCallAdapterFactory,
    reset_undeliverable_error_handler, set_undeliverable_error_handler,
};

use crate::call::DynCall;
use crate::client::Courier;
use crate::declaration::MethodAnnotation;
use crate::type_token::{AnyValue, TypeToken};

/// Adapts erased calls into one return type.
pub trait CallAdapter: Send + Sync {
    /// Type the response body decodes to, e.g. `User` for `Call<User>`.
    fn response_type(&self) -> &TypeToken;

    /// Wrap the call into the declared return value.
    fn adapt(&self, call: Arc<dyn DynCall>) -> AnyValue;
}

/// Source of call adapters for the return types it recognizes.
pub trait CallAdapterFactory: Send + Sync + 'static {
    /// Name used in resolution diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Adapter for `return_type`, or `None` to let the next factory try.
    fn get(
        &self,
        return_type: &TypeToken,
        annotations: &[MethodAnnotation],
        courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>>;
}
