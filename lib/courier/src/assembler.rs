//! Mutable accumulator turning bound arguments into a [`Request`].

use courier_core::{Error, Form, FormBody, Method, Part, Request, RequestBody, Result};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

/// Characters escaped in a path segment even when the value is pre-encoded.
const PATH_SEGMENT_ALWAYS_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'?')
    .add(b'#');

/// Characters escaped in a raw path segment value.
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &PATH_SEGMENT_ALWAYS_ENCODE_SET.add(b'/').add(b'%');

/// Characters escaped in a pre-encoded query component.
const QUERY_ENCODED_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'#');

/// Characters escaped in a raw query component.
const QUERY_COMPONENT_SET: &AsciiSet = &QUERY_ENCODED_SET
    .add(b'!')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'(')
    .add(b')')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'~');

/// Builds one request from a method descriptor and its bound arguments.
///
/// Path substitutions apply to the relative URL text. The first query
/// parameter resolves the relative URL against the base URL; path
/// parameters are rejected from then on.
#[derive(Debug)]
pub(crate) struct RequestAssembler<'a> {
    method: Method,
    base_url: &'a Url,
    relative_url: Option<String>,
    url: Option<Url>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    has_body: bool,
    form: Option<FormBody>,
    multipart: Option<Form>,
    body: Option<RequestBody>,
}

/// Static parts of a request, shared by every call of one method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestShape<'a> {
    pub(crate) method: Method,
    pub(crate) base_url: &'a Url,
    pub(crate) relative_url: Option<&'a str>,
    pub(crate) headers: &'a [(String, String)],
    pub(crate) content_type: Option<&'a str>,
    pub(crate) has_body: bool,
    pub(crate) is_form_encoded: bool,
    pub(crate) is_multipart: bool,
}

impl<'a> RequestAssembler<'a> {
    pub(crate) fn new(shape: RequestShape<'a>) -> Self {
        Self {
            method: shape.method,
            base_url: shape.base_url,
            relative_url: shape.relative_url.map(str::to_owned),
            url: None,
            headers: shape.headers.to_vec(),
            content_type: shape.content_type.map(str::to_owned),
            has_body: shape.has_body,
            form: shape.is_form_encoded.then(FormBody::new),
            multipart: shape.is_multipart.then(Form::new),
            body: None,
        }
    }

    pub(crate) fn set_relative_url(&mut self, relative_url: String) {
        self.relative_url = Some(relative_url);
    }

    /// A `Content-Type` header overrides the body content type.
    pub(crate) fn add_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Content-Type") {
            self.content_type = Some(value.to_string());
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub(crate) fn add_path_param(&mut self, name: &str, value: &str, encoded: bool) -> Result<()> {
        let relative_url = self.relative_url.as_mut().ok_or_else(|| {
            Error::invalid_request(format!(
                "path parameter {name} applied after the URL was resolved"
            ))
        })?;
        let placeholder = format!("{{{name}}}");
        *relative_url = relative_url.replace(&placeholder, &canonicalize_path(value, encoded));
        Ok(())
    }

    pub(crate) fn add_query_param(
        &mut self,
        name: &str,
        value: Option<&str>,
        encoded: bool,
    ) -> Result<()> {
        if let Some(relative_url) = self.relative_url.take() {
            self.url = Some(self.resolve(&relative_url)?);
        }
        let url = self
            .url
            .as_mut()
            .ok_or_else(|| Error::invalid_request("query parameter without a URL"))?;

        let set = if encoded {
            QUERY_ENCODED_SET
        } else {
            QUERY_COMPONENT_SET
        };
        let mut pair = utf8_percent_encode(name, set).to_string();
        if let Some(value) = value {
            pair.push('=');
            pair.extend(utf8_percent_encode(value, set));
        }

        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
            _ => pair,
        };
        url.set_query(Some(&query));
        Ok(())
    }

    pub(crate) fn add_form_field(&mut self, name: &str, value: &str, encoded: bool) -> Result<()> {
        let form = self
            .form
            .as_mut()
            .ok_or_else(|| {
                Error::invalid_request("form field on a request without form encoding")
            })?;
        if encoded {
            form.add_encoded(name, value);
        } else {
            form.add(name, value);
        }
        Ok(())
    }

    pub(crate) fn add_part(&mut self, part: Part) -> Result<()> {
        let form = self
            .multipart
            .as_mut()
            .ok_or_else(|| Error::invalid_request("part on a request without multipart encoding"))?;
        form.push(part);
        Ok(())
    }

    pub(crate) fn set_body(&mut self, body: RequestBody) {
        self.body = Some(body);
    }

    fn resolve(&self, relative_url: &str) -> Result<Url> {
        self.base_url.join(relative_url).map_err(|_| {
            Error::invalid_request(format!(
                "Malformed URL. Base: {}, Relative: {relative_url}",
                self.base_url
            ))
        })
    }

    pub(crate) fn build(self) -> Result<Request> {
        let url = match (&self.url, &self.relative_url) {
            (Some(url), _) => url.clone(),
            (None, Some(relative_url)) => self.resolve(relative_url)?,
            (None, None) => return Err(Error::invalid_request("request has no URL")),
        };

        let mut body = match (self.body, self.form, self.multipart) {
            (Some(body), _, _) => Some(body),
            (None, Some(form), _) => Some(form.into_body()),
            (None, None, Some(multipart)) => Some(multipart.into_body()?),
            (None, None, None) => self.has_body.then(RequestBody::empty),
        };

        let mut builder = Request::builder(self.method, url)
            .headers(self.headers.iter().map(|(name, value)| (name.as_str(), value.as_str())));

        if let Some(content_type) = self.content_type {
            match body.take() {
                Some(inner) => body = Some(inner.with_content_type(content_type)),
                None => builder = builder.header("Content-Type", &content_type),
            }
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.build()
    }
}

/// Percent-encode a path value.
///
/// Pre-encoded values keep `%` and `/`, but lose tabs and line breaks.
fn canonicalize_path(value: &str, encoded: bool) -> String {
    if encoded {
        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, '\t' | '\n' | '\u{c}' | '\r'))
            .collect();
        utf8_percent_encode(&cleaned, PATH_SEGMENT_ALWAYS_ENCODE_SET).to_string()
    } else {
        utf8_percent_encode(value, PATH_SEGMENT_ENCODE_SET).to_string()
    }
}
