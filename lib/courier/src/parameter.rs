//! Parameter handlers: one per declared parameter, applying its argument
//! to the request under assembly.

use std::sync::Arc;

use courier_core::{Error, Part, Result};
use url::Url;

use crate::assembler::RequestAssembler;
use crate::converter::{RequestConverter, StringConverter};
use crate::type_token::{DynValue, TypeToken};

/// Binding strategy of one parameter.
///
/// Absent values are skipped by optional bindings (query, header, field,
/// part) and rejected by required ones (path, URL, body, maps).
pub(crate) enum ParameterHandler {
    RelativeUrl,
    Path {
        name: String,
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    Query {
        name: String,
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    QueryName {
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    QueryMap {
        map: TypeToken,
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    Header {
        name: String,
        converter: Arc<dyn StringConverter>,
    },
    HeaderMap {
        map: TypeToken,
        converter: Arc<dyn StringConverter>,
    },
    Field {
        name: String,
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    FieldMap {
        map: TypeToken,
        converter: Arc<dyn StringConverter>,
        encoded: bool,
    },
    Part {
        headers: Vec<(String, String)>,
        converter: Arc<dyn RequestConverter>,
    },
    RawPart,
    PartMap {
        map: TypeToken,
        encoding: String,
        converter: Arc<dyn RequestConverter>,
    },
    Body {
        converter: Arc<dyn RequestConverter>,
    },
    /// Applies `each` to every element of a sequence value.
    Repeated {
        sequence: TypeToken,
        each: Box<ParameterHandler>,
    },
}

impl ParameterHandler {
    /// Wrap `self` so it applies to each element of `sequence` values.
    pub(crate) fn repeated(self, sequence: &TypeToken) -> Self {
        Self::Repeated {
            sequence: sequence.clone(),
            each: Box::new(self),
        }
    }

    pub(crate) fn apply(
        &self,
        assembler: &mut RequestAssembler<'_>,
        value: Option<&DynValue>,
    ) -> Result<()> {
        match self {
            Self::RelativeUrl => {
                let value = required(value, || "@Url parameter is null.".to_string())?;
                let url = if let Some(url) = value.downcast_ref::<String>() {
                    url.clone()
                } else if let Some(url) = value.downcast_ref::<Url>() {
                    url.to_string()
                } else {
                    return Err(Error::type_mismatch("String or url::Url"));
                };
                assembler.set_relative_url(url);
                Ok(())
            }
            Self::Path {
                name,
                converter,
                encoded,
            } => {
                let value = required(value, || {
                    format!("Path parameter \"{name}\" value must not be null.")
                })?;
                assembler.add_path_param(name, &converter.convert(value)?, *encoded)
            }
            Self::Query {
                name,
                converter,
                encoded,
            } => match value {
                Some(value) => {
                    assembler.add_query_param(name, Some(&converter.convert(value)?), *encoded)
                }
                None => Ok(()),
            },
            Self::QueryName { converter, encoded } => match value {
                Some(value) => {
                    assembler.add_query_param(&converter.convert(value)?, None, *encoded)
                }
                None => Ok(()),
            },
            Self::QueryMap {
                map,
                converter,
                encoded,
            } => {
                for (key, value) in entries(map, value, "Query map")? {
                    assembler.add_query_param(key, Some(&converter.convert(value)?), *encoded)?;
                }
                Ok(())
            }
            Self::Header { name, converter } => {
                if let Some(value) = value {
                    assembler.add_header(name, &converter.convert(value)?);
                }
                Ok(())
            }
            Self::HeaderMap { map, converter } => {
                for (key, value) in entries(map, value, "Header map")? {
                    assembler.add_header(key, &converter.convert(value)?);
                }
                Ok(())
            }
            Self::Field {
                name,
                converter,
                encoded,
            } => match value {
                Some(value) => assembler.add_form_field(name, &converter.convert(value)?, *encoded),
                None => Ok(()),
            },
            Self::FieldMap {
                map,
                converter,
                encoded,
            } => {
                for (key, value) in entries(map, value, "Field map")? {
                    assembler.add_form_field(key, &converter.convert(value)?, *encoded)?;
                }
                Ok(())
            }
            Self::Part { headers, converter } => match value {
                Some(value) => {
                    assembler.add_part(Part::new(headers.clone(), converter.convert(value)?))
                }
                None => Ok(()),
            },
            Self::RawPart => match value {
                Some(value) => {
                    let part = value
                        .downcast_ref::<Part>()
                        .ok_or_else(|| Error::type_mismatch("courier_core::Part"))?;
                    assembler.add_part(part.clone())
                }
                None => Ok(()),
            },
            Self::PartMap {
                map,
                encoding,
                converter,
            } => {
                for (key, value) in entries(map, value, "Part map")? {
                    let headers = part_headers(key, encoding);
                    assembler.add_part(Part::new(headers, converter.convert(value)?))?;
                }
                Ok(())
            }
            Self::Body { converter } => {
                let value = required(value, || {
                    "Body parameter value must not be null.".to_string()
                })?;
                assembler.set_body(converter.convert(value)?);
                Ok(())
            }
            Self::Repeated { sequence, each } => {
                let Some(value) = value else {
                    return Ok(());
                };
                let elements = sequence
                    .elements(value)
                    .ok_or_else(|| Error::type_mismatch(sequence.name()))?;
                for element in elements {
                    each.apply(assembler, Some(element))?;
                }
                Ok(())
            }
        }
    }
}

/// Headers of a named form-data part.
pub(crate) fn part_headers(name: &str, encoding: &str) -> Vec<(String, String)> {
    vec![
        (
            "Content-Disposition".to_string(),
            format!("form-data; name=\"{name}\""),
        ),
        ("Content-Transfer-Encoding".to_string(), encoding.to_string()),
    ]
}

fn required<'a>(
    value: Option<&'a DynValue>,
    message: impl FnOnce() -> String,
) -> Result<&'a DynValue> {
    value.ok_or_else(|| Error::invalid_request(message()))
}

fn entries<'a>(
    map: &TypeToken,
    value: Option<&'a DynValue>,
    what: &str,
) -> Result<Vec<(&'a str, &'a DynValue)>> {
    let value = required(value, || format!("{what} was null."))?;
    map.entries(value)
        .ok_or_else(|| Error::type_mismatch(map.name()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use courier_core::{Method, Request};

    use super::*;
    use crate::assembler::RequestShape;
    use crate::converter::ToStringConverter;

    fn assemble(
        relative_url: &str,
        is_multipart: bool,
        bindings: &[(&ParameterHandler, Option<&DynValue>)],
    ) -> Result<Request> {
        let base = Url::parse("https://api.example.com/").expect("valid");
        let mut assembler = RequestAssembler::new(RequestShape {
            method: Method::Post,
            base_url: &base,
            relative_url: Some(relative_url),
            headers: &[],
            content_type: None,
            has_body: true,
            is_form_encoded: false,
            is_multipart,
        });
        for (handler, value) in bindings {
            handler.apply(&mut assembler, *value)?;
        }
        assembler.build()
    }

    fn display(token: TypeToken) -> Arc<dyn StringConverter> {
        Arc::new(ToStringConverter(token))
    }

    #[test]
    fn null_path_is_rejected() {
        let handler = ParameterHandler::Path {
            name: "id".to_string(),
            converter: display(TypeToken::display::<u64>()),
            encoded: false,
        };
        let err = assemble("users/{id}", false, &[(&handler, None)]).expect_err("null path");
        assert_eq!(
            err.to_string(),
            "invalid request: Path parameter \"id\" value must not be null."
        );
    }

    #[test]
    fn null_query_is_skipped() {
        let handler = ParameterHandler::Query {
            name: "page".to_string(),
            converter: display(TypeToken::display::<u32>()),
            encoded: false,
        };
        let request = assemble("users", false, &[(&handler, None)]).expect("skipped");
        assert_eq!(request.url().as_str(), "https://api.example.com/users");
    }

    #[test]
    fn repeated_query_expands_elements() {
        let sequence = TypeToken::builder::<u32>().display().vec();
        let handler = ParameterHandler::Query {
            name: "id".to_string(),
            converter: display(TypeToken::display::<u32>()),
            encoded: false,
        }
        .repeated(&sequence);

        let ids = vec![1_u32, 2, 3];
        let request =
            assemble("users", false, &[(&handler, Some(&ids as &DynValue))]).expect("request");
        assert_eq!(request.url().as_str(), "https://api.example.com/users?id=1&id=2&id=3");
    }

    #[test]
    fn query_map_in_map_order() {
        let map = TypeToken::builder::<String>()
            .display()
            .string_map::<BTreeMap<String, String>>();
        let handler = ParameterHandler::QueryMap {
            map,
            converter: display(TypeToken::string()),
            encoded: false,
        };

        let filters: BTreeMap<String, String> =
            [("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())].into();
        let request =
            assemble("items", false, &[(&handler, Some(&filters as &DynValue))]).expect("request");
        assert_eq!(request.url().query(), Some("a=1&b=2"));

        let err = assemble("items", false, &[(&handler, None)]).expect_err("null map");
        assert!(err.to_string().contains("Query map was null."));
    }

    #[test]
    fn raw_url_accepts_string_and_url() {
        let handler = ParameterHandler::RelativeUrl;
        let url = Url::parse("https://other.example.com/x").expect("valid");

        let request = assemble("", false, &[(&handler, Some(&url as &DynValue))]).expect("request");
        assert_eq!(request.url().as_str(), "https://other.example.com/x");

        let relative = "files/1".to_string();
        let request =
            assemble("", false, &[(&handler, Some(&relative as &DynValue))]).expect("request");
        assert_eq!(request.url().as_str(), "https://api.example.com/files/1");
    }

    #[test]
    fn raw_parts_are_added_as_is() {
        let handler = ParameterHandler::RawPart;
        let part = Part::text("note", "hello");

        let request =
            assemble("upload", true, &[(&handler, Some(&part as &DynValue))]).expect("request");
        let body = request.body().expect("multipart body");
        let text = String::from_utf8_lossy(body.bytes());
        assert!(text.contains("form-data; name=\"note\""));
        assert!(text.contains("hello"));
    }

    #[test]
    fn part_headers_carry_encoding() {
        assert_eq!(
            part_headers("file", "binary"),
            vec![
                ("Content-Disposition".to_string(), "form-data; name=\"file\"".to_string()),
                ("Content-Transfer-Encoding".to_string(), "binary".to_string()),
            ]
        );
    }
}
