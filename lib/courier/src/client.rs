//! The client: factory chains, descriptor cache and service creation.

use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use courier_core::{Error, ResolutionError, Result, Transport};
use tracing::{debug, trace};
use url::Url;

use crate::adapter::{
    CallAdapter, CallAdapterFactory, CallbackExecutor, DefaultCallAdapterFactory,
    ExecutorCallAdapterFactory,
};
use crate::converter::{
    BuiltInConverters, ConverterFactory, RequestConverter, ResponseConverter, StringConverter,
    ToStringConverter,
};
use crate::declaration::{MethodAnnotation, ParamAnnotation, ServiceDescription, ServiceId};
use crate::descriptor::{MethodDescriptor, compile};
use crate::service::Service;
use crate::transport::HyperTransport;
use crate::type_token::TypeToken;

/// Declarative HTTP client.
///
/// Cloning is cheap and clones share the descriptor cache.
///
/// # Example
///
/// ```no_run
/// use courier::prelude::*;
///
/// # async fn run() -> courier::Result<()> {
/// let courier = Courier::builder()
///     .base_url("https://api.github.com/")
///     .add_converter_factory(JsonConverterFactory::new())
///     .build()?;
///
/// let description = ServiceDescription::builder("GitHub")
///     .method(
///         MethodDeclaration::new("zen", TypeToken::builder::<String>().json().call())
///             .annotation(MethodAnnotation::get("zen")),
///     )
///     .build()?;
///
/// let github = courier.create(description)?;
/// let call: Call<String> = github.call("zen", Args::new())?;
/// let zen = call.execute().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Courier {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: Url,
    transport: Arc<dyn Transport>,
    converter_factories: Vec<Arc<dyn ConverterFactory>>,
    call_adapter_factories: Vec<Arc<dyn CallAdapterFactory>>,
    callback_executor: Option<Arc<dyn CallbackExecutor>>,
    validate_eagerly: bool,
    descriptors: DescriptorCache,
}

impl Courier {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> CourierBuilder {
        CourierBuilder::default()
    }

    /// A builder with this client's configuration, without the built-in factories.
    #[must_use]
    pub fn new_builder(&self) -> CourierBuilder {
        let inner = &self.inner;
        let adapters = inner.call_adapter_factories.len().saturating_sub(1);
        CourierBuilder {
            base_url: Some(inner.base_url.to_string()),
            transport: Some(Arc::clone(&inner.transport)),
            converter_factories: inner.converter_factories.iter().skip(1).cloned().collect(),
            call_adapter_factories: inner
                .call_adapter_factories
                .iter()
                .take(adapters)
                .cloned()
                .collect(),
            callback_executor: inner.callback_executor.clone(),
            validate_eagerly: inner.validate_eagerly,
        }
    }

    /// Create a service handle for `description`.
    ///
    /// With eager validation, every method is compiled here.
    ///
    /// # Errors
    ///
    /// With eager validation, returns the first declaration or resolution error.
    pub fn create(&self, description: ServiceDescription) -> Result<Service> {
        let description = Arc::new(description);
        if self.inner.validate_eagerly {
            debug!(service = %description.name(), "validating service eagerly");
            for index in 0..description.methods().len() {
                self.load_descriptor(&description, index)?;
            }
        }
        Ok(Service::new(self.clone(), description))
    }

    /// Base URL relative URLs resolve against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Transport executing the requests.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Converter factories, in resolution order.
    #[must_use]
    pub fn converter_factories(&self) -> &[Arc<dyn ConverterFactory>] {
        &self.inner.converter_factories
    }

    /// Call adapter factories, in resolution order.
    #[must_use]
    pub fn call_adapter_factories(&self) -> &[Arc<dyn CallAdapterFactory>] {
        &self.inner.call_adapter_factories
    }

    /// Executor for enqueued callbacks, if any.
    #[must_use]
    pub fn callback_executor(&self) -> Option<&Arc<dyn CallbackExecutor>> {
        self.inner.callback_executor.as_ref()
    }

    /// Whether [`Courier::create`] compiles every method up front.
    #[must_use]
    pub fn validates_eagerly(&self) -> bool {
        self.inner.validate_eagerly
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Call adapter for `return_type`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory tried.
    pub fn call_adapter(
        &self,
        return_type: &TypeToken,
        annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn CallAdapter>> {
        self.next_call_adapter(None, return_type, annotations)
    }

    /// Call adapter for `return_type` from the factories after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory skipped and tried.
    pub fn next_call_adapter(
        &self,
        skip_past: Option<&dyn CallAdapterFactory>,
        return_type: &TypeToken,
        annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn CallAdapter>> {
        resolve(
            "call adapter",
            return_type,
            &self.inner.call_adapter_factories,
            skip_past,
            |factory| factory.get(return_type, annotations, self),
        )
    }

    /// Response body converter for `ty`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory tried.
    pub fn response_body_converter(
        &self,
        ty: &TypeToken,
        annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn ResponseConverter>> {
        self.next_response_body_converter(None, ty, annotations)
    }

    /// Response body converter for `ty` from the factories after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory skipped and tried.
    pub fn next_response_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &TypeToken,
        annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn ResponseConverter>> {
        resolve(
            "response converter",
            ty,
            &self.inner.converter_factories,
            skip_past,
            |factory| factory.response_body_converter(ty, annotations, self),
        )
    }

    /// Request body converter for `ty`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory tried.
    pub fn request_body_converter(
        &self,
        ty: &TypeToken,
        parameter_annotations: &[ParamAnnotation],
        method_annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn RequestConverter>> {
        self.next_request_body_converter(None, ty, parameter_annotations, method_annotations)
    }

    /// Request body converter for `ty` from the factories after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error listing every factory skipped and tried.
    pub fn next_request_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &TypeToken,
        parameter_annotations: &[ParamAnnotation],
        method_annotations: &[MethodAnnotation],
    ) -> Result<Arc<dyn RequestConverter>> {
        resolve(
            "request converter",
            ty,
            &self.inner.converter_factories,
            skip_past,
            |factory| {
                factory.request_body_converter(ty, parameter_annotations, method_annotations, self)
            },
        )
    }

    /// String converter for `ty`, falling back to its `Display` rendering.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if no factory handles `ty` and it has no
    /// `Display` capability.
    pub fn string_converter(
        &self,
        ty: &TypeToken,
        annotations: &[ParamAnnotation],
    ) -> Result<Arc<dyn StringConverter>> {
        let resolved = resolve(
            "string converter",
            ty,
            &self.inner.converter_factories,
            None,
            |factory| factory.string_converter(ty, annotations, self),
        );
        match resolved {
            Err(_) if ty.can_display() => Ok(Arc::new(ToStringConverter(ty.clone()))),
            other => other,
        }
    }

    // ------------------------------------------------------------------------
    // Descriptor cache
    // ------------------------------------------------------------------------

    /// Compiled descriptor of method `index` of `service`, compiled at most once.
    pub(crate) fn load_descriptor(
        &self,
        service: &ServiceDescription,
        index: usize,
    ) -> Result<Arc<MethodDescriptor>> {
        let slot = self.inner.descriptors.slot((service.id(), index));
        if let Some(descriptor) = slot.descriptor.get() {
            trace!(service = %service.name(), index, "descriptor cache hit");
            return Ok(Arc::clone(descriptor));
        }

        let _compiling = slot.compiling.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(descriptor) = slot.descriptor.get() {
            trace!(service = %service.name(), index, "descriptor compiled concurrently");
            return Ok(Arc::clone(descriptor));
        }
        let declaration = service
            .methods()
            .get(index)
            .ok_or_else(|| Error::UnknownMethod(format!("{}#{index}", service.name())))?;
        let descriptor = Arc::new(compile(self, service.name(), declaration)?);
        let descriptor = slot.descriptor.get_or_init(|| descriptor);
        debug!(method = %descriptor.name(), "cached method descriptor");
        Ok(Arc::clone(descriptor))
    }
}

impl fmt::Debug for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let converters: Vec<_> = self.converter_factories().iter().map(|f| f.name()).collect();
        let adapters: Vec<_> = self.call_adapter_factories().iter().map(|f| f.name()).collect();
        f.debug_struct("Courier")
            .field("base_url", &self.inner.base_url.as_str())
            .field("converter_factories", &converters)
            .field("call_adapter_factories", &adapters)
            .field("callback_executor", &self.inner.callback_executor.is_some())
            .field("validate_eagerly", &self.inner.validate_eagerly)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Factory Resolution
// ============================================================================

trait Named {
    fn factory_name(&self) -> &str;
}

impl Named for dyn ConverterFactory {
    fn factory_name(&self) -> &str {
        self.name()
    }
}

impl Named for dyn CallAdapterFactory {
    fn factory_name(&self) -> &str {
        self.name()
    }
}

/// First non-`None` answer of the factories after `skip_past`.
fn resolve<F, R>(
    subject: &'static str,
    ty: &TypeToken,
    factories: &[Arc<F>],
    skip_past: Option<&F>,
    mut get: impl FnMut(&F) -> Option<R>,
) -> Result<R>
where
    F: Named + ?Sized,
{
    let start = skip_past
        .and_then(|skip| {
            factories
                .iter()
                .position(|factory| ptr::addr_eq(Arc::as_ptr(factory), ptr::from_ref(skip)))
        })
        .map_or(0, |index| index + 1);

    for factory in factories.iter().skip(start) {
        if let Some(found) = get(factory.as_ref()) {
            trace!(subject, ty = %ty, factory = factory.factory_name(), "resolved");
            return Ok(found);
        }
    }

    let skipped = names(factories.iter().take(start));
    let tried = names(factories.iter().skip(start));
    Err(ResolutionError::new(subject, ty.name(), skipped, tried).into())
}

fn names<'a, F>(factories: impl Iterator<Item = &'a Arc<F>>) -> Vec<String>
where
    F: Named + ?Sized + 'a,
{
    factories.map(|f| f.factory_name().to_owned()).collect()
}

// ============================================================================
// Descriptor Cache
// ============================================================================

type CacheKey = (ServiceId, usize);

/// Per-method slots; each slot compiles once under its own lock.
#[derive(Default)]
struct DescriptorCache {
    slots: RwLock<HashMap<CacheKey, Arc<Slot>>>,
}

#[derive(Default)]
struct Slot {
    descriptor: OnceLock<Arc<MethodDescriptor>>,
    compiling: Mutex<()>,
}

impl DescriptorCache {
    fn slot(&self, key: CacheKey) -> Arc<Slot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Courier`].
#[derive(Default)]
pub struct CourierBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    converter_factories: Vec<Arc<dyn ConverterFactory>>,
    call_adapter_factories: Vec<Arc<dyn CallAdapterFactory>>,
    callback_executor: Option<Arc<dyn CallbackExecutor>>,
    validate_eagerly: bool,
}

impl CourierBuilder {
    /// Set the base URL. It must end with `/`.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the transport. Defaults to a [`HyperTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Add a converter factory after the built-in one.
    #[must_use]
    pub fn add_converter_factory(mut self, factory: impl ConverterFactory) -> Self {
        self.converter_factories.push(Arc::new(factory));
        self
    }

    /// Add a call adapter factory before the default one.
    #[must_use]
    pub fn add_call_adapter_factory(mut self, factory: impl CallAdapterFactory) -> Self {
        self.call_adapter_factories.push(Arc::new(factory));
        self
    }

    /// Deliver enqueued `Call` callbacks through `executor`.
    #[must_use]
    pub fn callback_executor(mut self, executor: impl CallbackExecutor) -> Self {
        self.callback_executor = Some(Arc::new(executor));
        self
    }

    /// Compile every method when a service is created.
    #[must_use]
    pub const fn validate_eagerly(mut self, validate: bool) -> Self {
        self.validate_eagerly = validate;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing, malformed, or does not
    /// end with `/`.
    pub fn build(self) -> Result<Courier> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::invalid_request("Base URL required."))?;
        let base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            return Err(Error::invalid_request(format!(
                "baseUrl must end in /: {base_url}"
            )));
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new()));

        let mut converter_factories: Vec<Arc<dyn ConverterFactory>> =
            Vec::with_capacity(self.converter_factories.len() + 1);
        converter_factories.push(Arc::new(BuiltInConverters));
        converter_factories.extend(self.converter_factories);

        let mut call_adapter_factories = self.call_adapter_factories;
        call_adapter_factories.push(match &self.callback_executor {
            Some(executor) => Arc::new(ExecutorCallAdapterFactory::new(Arc::clone(executor))),
            None => Arc::new(DefaultCallAdapterFactory),
        });

        debug!(
            base_url = %base_url,
            converters = converter_factories.len(),
            adapters = call_adapter_factories.len(),
            "built courier"
        );
        Ok(Courier {
            inner: Arc::new(Inner {
                base_url,
                transport,
                converter_factories,
                call_adapter_factories,
                callback_executor: self.callback_executor,
                validate_eagerly: self.validate_eagerly,
                descriptors: DescriptorCache::default(),
            }),
        })
    }
}

impl fmt::Debug for CourierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourierBuilder")
            .field("base_url", &self.base_url)
            .field("converter_factories", &self.converter_factories.len())
            .field("call_adapter_factories", &self.call_adapter_factories.len())
            .field("validate_eagerly", &self.validate_eagerly)
            .finish_non_exhaustive()
    }
}
