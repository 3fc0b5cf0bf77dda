//! Service declarations: methods, their annotations and parameters.
//!
//! A declaration is plain data describing an HTTP API. It is compiled into
//! method descriptors by [`crate::Courier`].
//!
//! ```
//! use courier::{MethodAnnotation, MethodDeclaration, ParamAnnotation, ParamDeclaration,
//!     ServiceDescription, TypeToken};
//!
//! let github = ServiceDescription::builder("GitHub")
//!     .method(
//!         MethodDeclaration::new("contributors", TypeToken::builder::<String>().call())
//!             .annotation(MethodAnnotation::get("repos/{owner}/{repo}/contributors"))
//!             .param(TypeToken::string(), ParamAnnotation::path("owner"))
//!             .param(TypeToken::string(), ParamAnnotation::path("repo")),
//!     )
//!     .build()?;
//! assert_eq!(github.methods().len(), 1);
//! # Ok::<(), courier::Error>(())
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::{Error, Method, Result};

use crate::type_token::TypeToken;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one built [`ServiceDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(u64);

// ============================================================================
// Service
// ============================================================================

/// A validated service declaration.
#[derive(Debug)]
pub struct ServiceDescription {
    id: ServiceId,
    name: String,
    methods: Vec<MethodDeclaration>,
    index: HashMap<String, usize>,
}

impl ServiceDescription {
    /// Start declaring a service.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ServiceDescriptionBuilder {
        ServiceDescriptionBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Identity of this description.
    #[must_use]
    pub const fn id(&self) -> ServiceId {
        self.id
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods, in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDeclaration] {
        &self.methods
    }

    /// Find a method by name, with its position.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<(usize, &MethodDeclaration)> {
        let index = *self.index.get(name)?;
        self.methods.get(index).map(|method| (index, method))
    }
}

/// Builder for [`ServiceDescription`].
#[derive(Debug)]
pub struct ServiceDescriptionBuilder {
    name: String,
    methods: Vec<MethodDeclaration>,
}

impl ServiceDescriptionBuilder {
    /// Declare a method.
    #[must_use]
    pub fn method(mut self, method: MethodDeclaration) -> Self {
        self.methods.push(method);
        self
    }

    /// Validate and finish the description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if no method is declared or a
    /// method name is declared twice.
    pub fn build(self) -> Result<ServiceDescription> {
        if self.methods.is_empty() {
            return Err(Error::invalid_request(format!(
                "service {} must declare at least one method",
                self.name
            )));
        }

        let mut index = HashMap::with_capacity(self.methods.len());
        for (position, method) in self.methods.iter().enumerate() {
            if index.insert(method.name.clone(), position).is_some() {
                return Err(Error::invalid_request(format!(
                    "service {} declares method {} more than once",
                    self.name, method.name
                )));
            }
        }

        Ok(ServiceDescription {
            id: ServiceId(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            methods: self.methods,
            index,
        })
    }
}

// ============================================================================
// Method
// ============================================================================

/// One declared service method.
#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    name: String,
    return_type: TypeToken,
    annotations: Vec<MethodAnnotation>,
    parameters: Vec<ParamDeclaration>,
}

impl MethodDeclaration {
    /// Declare a method returning `return_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: TypeToken) -> Self {
        Self {
            name: name.into(),
            return_type,
            annotations: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a method annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: MethodAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ParamDeclaration) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Add a parameter with a single annotation.
    #[must_use]
    pub fn param(self, ty: TypeToken, annotation: ParamAnnotation) -> Self {
        self.parameter(ParamDeclaration::new(ty).annotation(annotation))
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return type.
    #[must_use]
    pub const fn return_type(&self) -> &TypeToken {
        &self.return_type
    }

    /// Method annotations.
    #[must_use]
    pub fn annotations(&self) -> &[MethodAnnotation] {
        &self.annotations
    }

    /// Parameters, in order.
    #[must_use]
    pub fn parameters(&self) -> &[ParamDeclaration] {
        &self.parameters
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamDeclaration {
    ty: TypeToken,
    annotations: Vec<ParamAnnotation>,
}

impl ParamDeclaration {
    /// Declare a parameter of type `ty`.
    #[must_use]
    pub const fn new(ty: TypeToken) -> Self {
        Self {
            ty,
            annotations: Vec::new(),
        }
    }

    /// Add an annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: ParamAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Parameter type.
    #[must_use]
    pub const fn ty(&self) -> &TypeToken {
        &self.ty
    }

    /// Annotations.
    #[must_use]
    pub fn annotations(&self) -> &[ParamAnnotation] {
        &self.annotations
    }
}

// ============================================================================
// Annotations
// ============================================================================

/// Annotation on a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodAnnotation {
    /// HTTP verb and relative URL. An empty path means none.
    Http {
        /// HTTP method.
        method: Method,
        /// Relative URL template.
        path: String,
        /// Whether the verb carries a request body.
        has_body: bool,
    },
    /// Static headers as `"Name: value"` lines.
    Headers(Vec<String>),
    /// Form-encoded request body.
    FormUrlEncoded,
    /// Multipart request body.
    Multipart,
    /// Opaque marker, ignored by the compiler but visible to factories.
    Other(&'static str),
}

impl MethodAnnotation {
    /// Any verb.
    #[must_use]
    pub fn http(method: Method, path: impl Into<String>, has_body: bool) -> Self {
        Self::Http {
            method,
            path: path.into(),
            has_body,
        }
    }

    /// The verb with its usual body semantics.
    #[must_use]
    pub fn verb(method: Method, path: impl Into<String>) -> Self {
        Self::http(method, path, method.carries_body())
    }

    /// `GET`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::verb(Method::Get, path)
    }

    /// `POST`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::verb(Method::Post, path)
    }

    /// `PUT`.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::verb(Method::Put, path)
    }

    /// `PATCH`.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::verb(Method::Patch, path)
    }

    /// `DELETE`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::verb(Method::Delete, path)
    }

    /// `HEAD`.
    #[must_use]
    pub fn head(path: impl Into<String>) -> Self {
        Self::verb(Method::Head, path)
    }

    /// `OPTIONS`.
    #[must_use]
    pub fn options(path: impl Into<String>) -> Self {
        Self::verb(Method::Options, path)
    }

    /// Static headers.
    #[must_use]
    pub fn headers<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Headers(lines.into_iter().map(Into::into).collect())
    }
}

/// Annotation binding a parameter to part of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ParamAnnotation {
    /// Full or relative URL replacing the method path.
    Url,
    /// `{name}` placeholder in the relative URL.
    Path { name: String, encoded: bool },
    /// Query parameter.
    Query { name: String, encoded: bool },
    /// Query parameter without a value.
    QueryName { encoded: bool },
    /// Query parameters from a string-keyed map.
    QueryMap { encoded: bool },
    /// Request header.
    Header { name: String },
    /// Request headers from a string-keyed map.
    HeaderMap,
    /// Form field.
    Field { name: String, encoded: bool },
    /// Form fields from a string-keyed map.
    FieldMap { encoded: bool },
    /// Multipart part. An empty name expects a ready-made [`courier_core::Part`].
    Part { name: String, encoding: String },
    /// Multipart parts from a string-keyed map.
    PartMap { encoding: String },
    /// Request body.
    Body,
    /// Opaque marker, ignored by the compiler but visible to factories.
    Other(&'static str),
}

const DEFAULT_PART_ENCODING: &str = "binary";

impl ParamAnnotation {
    /// `@Url`.
    #[must_use]
    pub const fn url() -> Self {
        Self::Url
    }

    /// `@Path`.
    #[must_use]
    pub fn path(name: impl Into<String>) -> Self {
        Self::Path {
            name: name.into(),
            encoded: false,
        }
    }

    /// `@Query`.
    #[must_use]
    pub fn query(name: impl Into<String>) -> Self {
        Self::Query {
            name: name.into(),
            encoded: false,
        }
    }

    /// `@QueryName`.
    #[must_use]
    pub const fn query_name() -> Self {
        Self::QueryName { encoded: false }
    }

    /// `@QueryMap`.
    #[must_use]
    pub const fn query_map() -> Self {
        Self::QueryMap { encoded: false }
    }

    /// `@Header`.
    #[must_use]
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// `@HeaderMap`.
    #[must_use]
    pub const fn header_map() -> Self {
        Self::HeaderMap
    }

    /// `@Field`.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            encoded: false,
        }
    }

    /// `@FieldMap`.
    #[must_use]
    pub const fn field_map() -> Self {
        Self::FieldMap { encoded: false }
    }

    /// Named `@Part`.
    #[must_use]
    pub fn part(name: impl Into<String>) -> Self {
        Self::Part {
            name: name.into(),
            encoding: DEFAULT_PART_ENCODING.to_string(),
        }
    }

    /// `@Part` taking a ready-made part.
    #[must_use]
    pub fn raw_part() -> Self {
        Self::part("")
    }

    /// `@PartMap`.
    #[must_use]
    pub fn part_map() -> Self {
        Self::PartMap {
            encoding: DEFAULT_PART_ENCODING.to_string(),
        }
    }

    /// `@Body`.
    #[must_use]
    pub const fn body() -> Self {
        Self::Body
    }

    /// Mark the value as already percent-encoded.
    ///
    /// No effect on bindings without an encoding flag.
    #[must_use]
    pub fn encoded(mut self) -> Self {
        match &mut self {
            Self::Path { encoded, .. }
            | Self::Query { encoded, .. }
            | Self::QueryName { encoded }
            | Self::QueryMap { encoded }
            | Self::Field { encoded, .. }
            | Self::FieldMap { encoded } => *encoded = true,
            _ => {}
        }
        self
    }

    /// Set the `Content-Transfer-Encoding` of a part binding.
    #[must_use]
    pub fn encoding(mut self, value: impl Into<String>) -> Self {
        if let Self::Part { encoding, .. } | Self::PartMap { encoding } = &mut self {
            *encoding = value.into();
        }
        self
    }

    /// Short name used in diagnostics, such as `@Path`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Url => "@Url",
            Self::Path { .. } => "@Path",
            Self::Query { .. } => "@Query",
            Self::QueryName { .. } => "@QueryName",
            Self::QueryMap { .. } => "@QueryMap",
            Self::Header { .. } => "@Header",
            Self::HeaderMap => "@HeaderMap",
            Self::Field { .. } => "@Field",
            Self::FieldMap { .. } => "@FieldMap",
            Self::Part { .. } => "@Part",
            Self::PartMap { .. } => "@PartMap",
            Self::Body => "@Body",
            Self::Other(name) => name,
        }
    }

    pub(crate) const fn is_binding(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}
