//! Method descriptors: the compiled, validated form of one declared method.
//!
//! Compilation resolves the call adapter and converters through the client's
//! factory chains and checks every declaration rule, failing with a
//! [`DeclarationError`] that names the method and, for parameter problems,
//! the 1-based parameter position.

use std::fmt;
use std::sync::Arc;

use courier_core::{DeclarationError, Error, Method, PathTemplate, Request, Result, Transport};
use tracing::debug;
use url::Url;

use crate::adapter::CallAdapter;
use crate::args::Args;
use crate::assembler::{RequestAssembler, RequestShape};
use crate::call::DynCall;
use crate::client::Courier;
use crate::converter::{RequestConverter, ResponseConverter, StringConverter};
use crate::declaration::{MethodAnnotation, MethodDeclaration, ParamAnnotation};
use crate::parameter::{ParameterHandler, part_headers};
use crate::type_token::{AnyValue, TypeToken};

/// Everything needed to turn arguments into a request and a response into a value.
pub struct MethodDescriptor {
    name: String,
    method: Method,
    relative_url: Option<PathTemplate>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    has_body: bool,
    is_form_encoded: bool,
    is_multipart: bool,
    handlers: Vec<ParameterHandler>,
    response_converter: Arc<dyn ResponseConverter>,
    call_adapter: Arc<dyn CallAdapter>,
    base_url: Url,
    transport: Arc<dyn Transport>,
}

impl MethodDescriptor {
    /// Qualified method name, `Service.method`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Relative URL template, if declared on the method.
    #[must_use]
    pub fn relative_url(&self) -> Option<&str> {
        self.relative_url.as_ref().map(PathTemplate::as_str)
    }

    /// Static headers.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Static content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether the HTTP method carries a body.
    #[must_use]
    pub const fn has_body(&self) -> bool {
        self.has_body
    }

    /// Form-encoded body.
    #[must_use]
    pub const fn is_form_encoded(&self) -> bool {
        self.is_form_encoded
    }

    /// Multipart body.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.is_multipart
    }

    /// Number of parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.handlers.len()
    }

    /// Type produced by the response converter.
    #[must_use]
    pub fn response_type(&self) -> &TypeToken {
        self.call_adapter.response_type()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn response_converter(&self) -> &Arc<dyn ResponseConverter> {
        &self.response_converter
    }

    pub(crate) fn adapt(&self, call: Arc<dyn DynCall>) -> AnyValue {
        self.call_adapter.adapt(call)
    }

    /// Build the request for one set of arguments.
    pub(crate) fn to_request(&self, args: &Args) -> Result<Request> {
        if args.len() != self.handlers.len() {
            return Err(Error::ArgumentCount {
                method: self.name.clone(),
                expected: self.handlers.len(),
                found: args.len(),
            });
        }

        let mut assembler = RequestAssembler::new(RequestShape {
            method: self.method,
            base_url: &self.base_url,
            relative_url: self.relative_url.as_ref().map(PathTemplate::as_str),
            headers: &self.headers,
            content_type: self.content_type.as_deref(),
            has_body: self.has_body,
            is_form_encoded: self.is_form_encoded,
            is_multipart: self.is_multipart,
        });
        for (handler, value) in self.handlers.iter().zip(args.iter()) {
            handler.apply(&mut assembler, value)?;
        }
        assembler.build()
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("relative_url", &self.relative_url)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("is_form_encoded", &self.is_form_encoded)
            .field("is_multipart", &self.is_multipart)
            .field("parameters", &self.handlers.len())
            .field("response_type", self.response_type())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile `declaration` of service `service` against `courier`.
pub(crate) fn compile(
    courier: &Courier,
    service: &str,
    declaration: &MethodDeclaration,
) -> Result<MethodDescriptor> {
    let name = format!("{service}.{}", declaration.name());
    debug!(method = %name, "compiling method descriptor");
    Compiler {
        courier,
        declaration,
        name,
        method: None,
        has_body: false,
        relative_url: None,
        headers: Vec::new(),
        content_type: None,
        is_form_encoded: false,
        is_multipart: false,
        got_url: false,
        got_path: false,
        got_query: false,
        got_body: false,
        got_field: false,
        got_part: false,
        seen_paths: Vec::new(),
    }
    .compile()
}

struct Compiler<'a> {
    courier: &'a Courier,
    declaration: &'a MethodDeclaration,
    name: String,
    method: Option<Method>,
    has_body: bool,
    relative_url: Option<PathTemplate>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    is_form_encoded: bool,
    is_multipart: bool,
    got_url: bool,
    got_path: bool,
    got_query: bool,
    got_body: bool,
    got_field: bool,
    got_part: bool,
    seen_paths: Vec<String>,
}

impl Compiler<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        DeclarationError::new(&self.name, message).into()
    }

    fn parameter_error(&self, index: usize, message: impl Into<String>) -> Error {
        DeclarationError::new(&self.name, message)
            .at_parameter(index)
            .into()
    }

    fn compile(mut self) -> Result<MethodDescriptor> {
        let declaration = self.declaration;
        for annotation in declaration.annotations() {
            self.parse_method_annotation(annotation)?;
        }

        let Some(method) = self.method else {
            return Err(self.error("HTTP method annotation is required (e.g., GET, POST, etc.)."));
        };
        if !self.has_body {
            if self.is_multipart {
                return Err(self.error(
                    "Multipart can only be specified on HTTP methods with request body (e.g., POST).",
                ));
            }
            if self.is_form_encoded {
                return Err(self.error(
                    "FormUrlEncoded can only be specified on HTTP methods with request body (e.g., POST).",
                ));
            }
        }

        let return_type = declaration.return_type();
        let call_adapter = self
            .courier
            .call_adapter(return_type, declaration.annotations())
            .map_err(|e| {
                self.error(format!("Unable to create call adapter for {return_type}\n{e}"))
            })?;
        let response_type = call_adapter.response_type().clone();
        if method == Method::Head && !response_type.is_unit() {
            return Err(self.error("HEAD method must use () as response type."));
        }
        let response_converter = self
            .courier
            .response_body_converter(&response_type, declaration.annotations())
            .map_err(|e| {
                self.error(format!("Unable to create converter for {response_type}\n{e}"))
            })?;

        let mut handlers = Vec::with_capacity(declaration.parameters().len());
        for (index, parameter) in declaration.parameters().iter().enumerate() {
            let mut bindings = parameter.annotations().iter().filter(|a| a.is_binding());
            let Some(annotation) = bindings.next() else {
                return Err(self.parameter_error(index, "No binding annotation found."));
            };
            if bindings.next().is_some() {
                return Err(self.parameter_error(
                    index,
                    "Multiple binding annotations found, only one allowed.",
                ));
            }
            handlers.push(self.parse_parameter(
                index,
                parameter.ty(),
                parameter.annotations(),
                annotation,
            )?);
        }

        if self.relative_url.is_none() && !self.got_url {
            return Err(self.error(format!("Missing either @{method} URL or @Url parameter.")));
        }
        if !self.is_form_encoded && !self.is_multipart && !self.has_body && self.got_body {
            return Err(self.error("Non-body HTTP method cannot contain @Body."));
        }
        if self.is_form_encoded && !self.got_field {
            return Err(self.error("Form-encoded method must contain at least one @Field."));
        }
        if self.is_multipart && !self.got_part {
            return Err(self.error("Multipart method must contain at least one @Part."));
        }

        Ok(MethodDescriptor {
            name: self.name,
            method,
            relative_url: self.relative_url,
            headers: self.headers,
            content_type: self.content_type,
            has_body: self.has_body,
            is_form_encoded: self.is_form_encoded,
            is_multipart: self.is_multipart,
            handlers,
            response_converter,
            call_adapter,
            base_url: self.courier.base_url().clone(),
            transport: Arc::clone(self.courier.transport()),
        })
    }

    fn parse_method_annotation(&mut self, annotation: &MethodAnnotation) -> Result<()> {
        match annotation {
            MethodAnnotation::Http {
                method,
                path,
                has_body,
            } => {
                if let Some(previous) = self.method {
                    return Err(self.error(format!(
                        "Only one HTTP method is allowed. Found: {previous} and {method}."
                    )));
                }
                self.method = Some(*method);
                self.has_body = *has_body;
                if path.is_empty() {
                    return Ok(());
                }
                let template = PathTemplate::new(path.as_str());
                if let Some(query) = template.query()
                    && !template.query_placeholders().is_empty()
                {
                    return Err(self.error(format!(
                        "URL query string \"{query}\" must not have replace block. \
                         For dynamic query parameters use @Query."
                    )));
                }
                self.relative_url = Some(template);
            }
            MethodAnnotation::Headers(lines) => {
                if lines.is_empty() {
                    return Err(self.error("@Headers annotation is empty."));
                }
                for line in lines {
                    let Some((name, value)) = line.split_once(':') else {
                        return Err(self.error(format!(
                            "@Headers value must be in the form \"Name: Value\". Found: \"{line}\""
                        )));
                    };
                    let (name, value) = (name.trim(), value.trim());
                    if name.eq_ignore_ascii_case("Content-Type") {
                        self.content_type = Some(value.to_string());
                    } else {
                        self.headers.push((name.to_string(), value.to_string()));
                    }
                }
            }
            MethodAnnotation::FormUrlEncoded => {
                if self.is_multipart {
                    return Err(self.error("Only one encoding annotation is allowed."));
                }
                self.is_form_encoded = true;
            }
            MethodAnnotation::Multipart => {
                if self.is_form_encoded {
                    return Err(self.error("Only one encoding annotation is allowed."));
                }
                self.is_multipart = true;
            }
            MethodAnnotation::Other(_) => {}
        }
        Ok(())
    }

    fn string_converter(
        &self,
        index: usize,
        ty: &TypeToken,
        annotations: &[ParamAnnotation],
    ) -> Result<Arc<dyn StringConverter>> {
        self.courier
            .string_converter(ty, annotations)
            .map_err(|e| {
                self.parameter_error(
                    index,
                    format!("Unable to create string converter for {ty}\n{e}"),
                )
            })
    }

    fn request_converter(
        &self,
        index: usize,
        kind: &str,
        ty: &TypeToken,
        annotations: &[ParamAnnotation],
    ) -> Result<Arc<dyn RequestConverter>> {
        self.courier
            .request_body_converter(ty, annotations, self.declaration.annotations())
            .map_err(|e| {
                self.parameter_error(
                    index,
                    format!("Unable to create {kind} converter for {ty}\n{e}"),
                )
            })
    }

    /// Element token of a sequence parameter, or the parameter token itself.
    fn element_of(ty: &TypeToken) -> &TypeToken {
        ty.element().unwrap_or(ty)
    }

    fn map_value<'t>(&self, index: usize, kind: &str, ty: &'t TypeToken) -> Result<&'t TypeToken> {
        ty.map_value().ok_or_else(|| {
            self.parameter_error(
                index,
                format!("{kind} parameter type must be a string-keyed map."),
            )
        })
    }

    /// Expand the handler over elements when the parameter is a sequence.
    fn maybe_repeated(ty: &TypeToken, handler: ParameterHandler) -> ParameterHandler {
        if ty.element().is_some() {
            handler.repeated(ty)
        } else {
            handler
        }
    }

    #[allow(clippy::too_many_lines)]
    fn parse_parameter(
        &mut self,
        index: usize,
        ty: &TypeToken,
        annotations: &[ParamAnnotation],
        annotation: &ParamAnnotation,
    ) -> Result<ParameterHandler> {
        match annotation {
            ParamAnnotation::Url => {
                if self.got_url {
                    return Err(self.parameter_error(
                        index,
                        "Multiple @Url method annotations found.",
                    ));
                }
                if self.got_path {
                    return Err(self.parameter_error(
                        index,
                        "@Path parameters may not be used with @Url.",
                    ));
                }
                if self.got_query {
                    return Err(self.parameter_error(
                        index,
                        "A @Url parameter must not come after a @Query.",
                    ));
                }
                if self.relative_url.is_some() {
                    let method = self.method.map(|m| m.to_string()).unwrap_or_default();
                    return Err(self.parameter_error(
                        index,
                        format!("@Url cannot be used with @{method} URL"),
                    ));
                }
                if !ty.is::<String>() && !ty.is::<Url>() {
                    return Err(self.parameter_error(
                        index,
                        "@Url must be String or url::Url type.",
                    ));
                }
                self.got_url = true;
                Ok(ParameterHandler::RelativeUrl)
            }

            ParamAnnotation::Path { name, encoded } => {
                if self.got_query {
                    return Err(self.parameter_error(
                        index,
                        "A @Path parameter must not come after a @Query.",
                    ));
                }
                if self.got_url {
                    return Err(self.parameter_error(
                        index,
                        "@Path parameters may not be used with @Url.",
                    ));
                }
                let Some(template) = &self.relative_url else {
                    let method = self.method.map(|m| m.to_string()).unwrap_or_default();
                    return Err(self.parameter_error(
                        index,
                        format!("@Path can only be used with relative url on @{method}"),
                    ));
                };
                if !PathTemplate::is_valid_name(name) {
                    return Err(self.parameter_error(
                        index,
                        format!("@Path parameter name must match [a-zA-Z][a-zA-Z0-9_-]*. Found: {name}"),
                    ));
                }
                if !template.contains(name) {
                    return Err(self.parameter_error(
                        index,
                        format!("URL \"{template}\" does not contain \"{{{name}}}\"."),
                    ));
                }
                if self.seen_paths.contains(name) {
                    return Err(self.parameter_error(
                        index,
                        format!("Duplicate @Path parameter \"{name}\"."),
                    ));
                }
                self.seen_paths.push(name.clone());
                self.got_path = true;
                Ok(ParameterHandler::Path {
                    name: name.clone(),
                    converter: self.string_converter(index, ty, annotations)?,
                    encoded: *encoded,
                })
            }

            ParamAnnotation::Query { name, encoded } => {
                self.got_query = true;
                let converter = self.string_converter(index, Self::element_of(ty), annotations)?;
                let handler = ParameterHandler::Query {
                    name: name.clone(),
                    converter,
                    encoded: *encoded,
                };
                Ok(Self::maybe_repeated(ty, handler))
            }

            ParamAnnotation::QueryName { encoded } => {
                self.got_query = true;
                let converter = self.string_converter(index, Self::element_of(ty), annotations)?;
                let handler = ParameterHandler::QueryName {
                    converter,
                    encoded: *encoded,
                };
                Ok(Self::maybe_repeated(ty, handler))
            }

            ParamAnnotation::QueryMap { encoded } => {
                self.got_query = true;
                let value = self.map_value(index, "@QueryMap", ty)?;
                Ok(ParameterHandler::QueryMap {
                    map: ty.clone(),
                    converter: self.string_converter(index, value, annotations)?,
                    encoded: *encoded,
                })
            }

            ParamAnnotation::Header { name } => {
                let converter = self.string_converter(index, Self::element_of(ty), annotations)?;
                let handler = ParameterHandler::Header {
                    name: name.clone(),
                    converter,
                };
                Ok(Self::maybe_repeated(ty, handler))
            }

            ParamAnnotation::HeaderMap => {
                let value = self.map_value(index, "@HeaderMap", ty)?;
                Ok(ParameterHandler::HeaderMap {
                    map: ty.clone(),
                    converter: self.string_converter(index, value, annotations)?,
                })
            }

            ParamAnnotation::Field { name, encoded } => {
                if !self.is_form_encoded {
                    return Err(self.parameter_error(
                        index,
                        "@Field parameters can only be used with form encoding.",
                    ));
                }
                self.got_field = true;
                let converter = self.string_converter(index, Self::element_of(ty), annotations)?;
                let handler = ParameterHandler::Field {
                    name: name.clone(),
                    converter,
                    encoded: *encoded,
                };
                Ok(Self::maybe_repeated(ty, handler))
            }

            ParamAnnotation::FieldMap { encoded } => {
                if !self.is_form_encoded {
                    return Err(self.parameter_error(
                        index,
                        "@FieldMap parameters can only be used with form encoding.",
                    ));
                }
                let value = self.map_value(index, "@FieldMap", ty)?;
                self.got_field = true;
                Ok(ParameterHandler::FieldMap {
                    map: ty.clone(),
                    converter: self.string_converter(index, value, annotations)?,
                    encoded: *encoded,
                })
            }

            ParamAnnotation::Part { name, encoding } => {
                if !self.is_multipart {
                    return Err(self.parameter_error(
                        index,
                        "@Part parameters can only be used with multipart encoding.",
                    ));
                }
                self.got_part = true;
                let element = Self::element_of(ty);
                if name.is_empty() {
                    if !element.is::<courier_core::Part>() {
                        return Err(self.parameter_error(
                            index,
                            "@Part annotation must supply a name or use a Part parameter type.",
                        ));
                    }
                    return Ok(Self::maybe_repeated(ty, ParameterHandler::RawPart));
                }
                if element.is::<courier_core::Part>() {
                    return Err(self.parameter_error(
                        index,
                        "@Part parameters using the Part type must not include a part name in the annotation.",
                    ));
                }
                let converter = self.request_converter(index, "@Part", element, annotations)?;
                let handler = ParameterHandler::Part {
                    headers: part_headers(name, encoding),
                    converter,
                };
                Ok(Self::maybe_repeated(ty, handler))
            }

            ParamAnnotation::PartMap { encoding } => {
                if !self.is_multipart {
                    return Err(self.parameter_error(
                        index,
                        "@PartMap parameters can only be used with multipart encoding.",
                    ));
                }
                self.got_part = true;
                let value = self.map_value(index, "@PartMap", ty)?;
                if value.is::<courier_core::Part>() {
                    return Err(self.parameter_error(
                        index,
                        "@PartMap values cannot be Part. Use @Part with a sequence of Part or a different value type instead.",
                    ));
                }
                Ok(ParameterHandler::PartMap {
                    map: ty.clone(),
                    encoding: encoding.clone(),
                    converter: self.request_converter(index, "@PartMap", value, annotations)?,
                })
            }

            ParamAnnotation::Body => {
                if self.is_form_encoded || self.is_multipart {
                    return Err(self.parameter_error(
                        index,
                        "@Body parameters cannot be used with form or multi-part encoding.",
                    ));
                }
                if self.got_body {
                    return Err(self.parameter_error(
                        index,
                        "Multiple @Body method annotations found.",
                    ));
                }
                let converter = self.request_converter(index, "@Body", ty, annotations)?;
                self.got_body = true;
                Ok(ParameterHandler::Body { converter })
            }

            ParamAnnotation::Other(name) => {
                Err(self.parameter_error(index, format!("{name} is not a binding annotation.")))
            }
        }
    }
}
