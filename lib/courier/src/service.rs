//! Service handles: dispatch method invocations by name.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use courier_core::{Error, Result};
use tracing::trace;

use crate::args::Args;
use crate::call::{Call, HttpCall};
use crate::client::Courier;
use crate::declaration::ServiceDescription;
use crate::descriptor::MethodDescriptor;

/// A service created by [`Courier::create`].
///
/// Invoking a method looks up its descriptor, binds the arguments into a
/// call and hands the call to the method's adapter.
#[derive(Clone)]
pub struct Service {
    courier: Courier,
    description: Arc<ServiceDescription>,
}

impl Service {
    pub(crate) fn new(courier: Courier, description: Arc<ServiceDescription>) -> Self {
        Self {
            courier,
            description,
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.description.name()
    }

    /// The declarations this service dispatches.
    #[must_use]
    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// The client this service belongs to.
    #[must_use]
    pub fn courier(&self) -> &Courier {
        &self.courier
    }

    /// Cached descriptor of method `name`, compiled on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] or the compilation error.
    pub fn descriptor(&self, name: &str) -> Result<Arc<MethodDescriptor>> {
        let index = self.index_of(name)?;
        self.courier.load_descriptor(&self.description, index)
    }

    /// Invoke method `name`, returning the value its adapter produces.
    ///
    /// `R` is the declared return type, e.g. `Call<User>` or `Single<User>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`], the compilation error,
    /// [`Error::ArgumentCount`] when `args` does not match the declaration,
    /// or [`Error::TypeMismatch`] when `R` is not the declared return type.
    pub fn invoke<R: 'static>(&self, name: &str, args: Args) -> Result<R> {
        let descriptor = self.descriptor(name)?;
        if args.len() != descriptor.parameter_count() {
            return Err(Error::ArgumentCount {
                method: descriptor.name().to_owned(),
                expected: descriptor.parameter_count(),
                found: args.len(),
            });
        }

        trace!(method = %descriptor.name(), "invoking");
        let call = Arc::new(HttpCall::new(Arc::clone(&descriptor), args));
        descriptor
            .adapt(call)
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| Error::type_mismatch(type_name::<R>()))
    }

    /// Invoke a method declared to return `Call<T>`.
    ///
    /// # Errors
    ///
    /// Same as [`Service::invoke`].
    pub fn call<T: Send + 'static>(&self, name: &str, args: Args) -> Result<Call<T>> {
        self.invoke(name, args)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.description
            .method(name)
            .map(|(index, _)| index)
            .ok_or_else(|| Error::UnknownMethod(format!("{}.{name}", self.description.name())))
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<_> = self.description.methods().iter().map(|m| m.name()).collect();
        f.debug_struct("Service")
            .field("name", &self.name())
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}
