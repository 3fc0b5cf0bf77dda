//! Reactive bridge: `Single<T>` emits one `Response<T>` per subscription.
//!
//! Each subscription runs its own clone of the call, so one `Single` can be
//! subscribed any number of times. Disposing a subscription cancels its call.
//!
//! Errors an observer raises after the stream terminated have nowhere to go;
//! they are handed to the undeliverable error handler, which logs them by
//! default.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use courier_core::{BoxError, CompositeError, Error, Response};
use tracing::error;

use super::{CallAdapter, CallAdapterFactory};
use crate::call::{Callback, DynCall, downcast_response};
use crate::client::Courier;
use crate::declaration::MethodAnnotation;
use crate::type_token::{AnyValue, TypeToken, WrapFn, single_raw_type};

/// Outcome of an observer method.
pub type ObserverResult = Result<(), BoxError>;

/// Receives the events of one subscription.
///
/// A subscription ends with either `on_next` then `on_complete`, or a
/// single `on_error`.
pub trait Observer<T>: Send + 'static {
    /// Called first, before the call starts.
    fn on_subscribe(&mut self, disposable: &Disposable) {
        let _ = disposable;
    }

    /// The single value.
    ///
    /// # Errors
    ///
    /// A failure is reported back through [`Observer::on_error`].
    fn on_next(&mut self, value: T) -> ObserverResult;

    /// The call failed.
    ///
    /// # Errors
    ///
    /// A failure is combined with `error` and sent to the undeliverable
    /// error handler.
    fn on_error(&mut self, error: &Error) -> ObserverResult;

    /// The value was delivered.
    ///
    /// # Errors
    ///
    /// A failure is sent to the undeliverable error handler.
    fn on_complete(&mut self) -> ObserverResult {
        Ok(())
    }
}

/// Handle on one subscription.
#[derive(Clone)]
pub struct Disposable {
    call: Arc<dyn DynCall>,
    disposed: Arc<AtomicBool>,
}

impl Disposable {
    fn new(call: Arc<dyn DynCall>) -> Self {
        Self {
            call,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop the subscription and cancel its call.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.call.cancel();
    }

    /// Whether [`Disposable::dispose`] was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Single
// ============================================================================

/// A lazy single-value stream of `Response<T>`.
///
/// Nothing is sent until [`Single::subscribe`].
pub struct Single<T> {
    call: Arc<dyn DynCall>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Single<T> {
    /// Wrap an erased call.
    #[must_use]
    pub fn from_raw(call: Arc<dyn DynCall>) -> Self {
        Self {
            call,
            _marker: PhantomData,
        }
    }

    /// Start a subscription backed by a fresh clone of the call.
    pub fn subscribe(&self, observer: impl Observer<Response<T>>) -> Disposable {
        let call = self.call.clone_call();
        let disposable = Disposable::new(Arc::clone(&call));

        let mut observer = observer;
        observer.on_subscribe(&disposable);
        if disposable.is_disposed() {
            return disposable;
        }

        let callback = SubscriptionCallback {
            observer,
            call: Arc::clone(&call),
            disposed: Arc::clone(&disposable.disposed),
            _marker: PhantomData::<fn() -> T>,
        };
        if let Err(error) = call.enqueue(Box::new(callback)) {
            undeliverable(error);
        }
        disposable
    }
}

impl<T> fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Single")
            .field("type", &type_name::<T>())
            .finish_non_exhaustive()
    }
}

struct SubscriptionCallback<T, O> {
    observer: O,
    call: Arc<dyn DynCall>,
    disposed: Arc<AtomicBool>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, O> SubscriptionCallback<T, O>
where
    T: Send + 'static,
    O: Observer<Response<T>>,
{
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn fail(&mut self, error: Error) {
        if self.is_disposed() {
            return;
        }
        if let Err(inner) = self.observer.on_error(&error) {
            undeliverable(Error::Composite(CompositeError::new(vec![
                error,
                Error::callback(inner),
            ])));
        }
    }
}

impl<T, O> Callback<AnyValue> for SubscriptionCallback<T, O>
where
    T: Send + 'static,
    O: Observer<Response<T>>,
{
    fn on_response(mut self: Box<Self>, response: Response<AnyValue>) {
        if self.is_disposed() {
            return;
        }
        let response = match downcast_response::<T>(response) {
            Ok(response) => response,
            Err(error) => return self.fail(error),
        };

        match self.observer.on_next(response) {
            Ok(()) => {
                if self.is_disposed() {
                    return;
                }
                if let Err(error) = self.observer.on_complete() {
                    undeliverable(Error::callback(error));
                }
            }
            Err(error) => self.fail(Error::callback(error)),
        }
    }

    fn on_failure(mut self: Box<Self>, error: Error) {
        if self.call.is_canceled() {
            return;
        }
        self.fail(error);
    }
}

// ============================================================================
// Undeliverable Errors
// ============================================================================

type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

static UNDELIVERABLE: RwLock<Option<ErrorHandler>> = RwLock::new(None);

/// Install the process-wide handler for errors no observer can receive.
pub fn set_undeliverable_error_handler(handler: impl Fn(Error) + Send + Sync + 'static) {
    *UNDELIVERABLE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
}

/// Restore the default handler, which logs at error level.
pub fn reset_undeliverable_error_handler() {
    *UNDELIVERABLE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn undeliverable(err: Error) {
    let handler = UNDELIVERABLE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match handler {
        Some(handler) => handler(err),
        None => error!(error = %err, "undeliverable error"),
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapts `Single<T>` return types.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCallAdapterFactory;

impl SingleCallAdapterFactory {
    /// Create the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CallAdapterFactory for SingleCallAdapterFactory {
    fn name(&self) -> &str {
        "SingleCallAdapterFactory"
    }

    fn get(
        &self,
        return_type: &TypeToken,
        _annotations: &[MethodAnnotation],
        _courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        if return_type.raw_type() != Some(single_raw_type()) {
            return None;
        }
        Some(Arc::new(SingleAdapter {
            response_type: return_type.inner()?.clone(),
            wrap: return_type.wrap_fn()?,
        }))
    }
}

struct SingleAdapter {
    response_type: TypeToken,
    wrap: WrapFn,
}

impl CallAdapter for SingleAdapter {
    fn response_type(&self) -> &TypeToken {
        &self.response_type
    }

    fn adapt(&self, call: Arc<dyn DynCall>) -> AnyValue {
        (self.wrap)(call)
    }
}
