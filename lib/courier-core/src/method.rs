//! HTTP verbs.

use std::str::FromStr;

use derive_more::Display;

use crate::Error;

/// The verb of a declared method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[allow(missing_docs)]
pub enum Method {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("DELETE")]
    Delete,
    #[display("PATCH")]
    Patch,
    #[display("HEAD")]
    Head,
    #[display("OPTIONS")]
    Options,
}

impl Method {
    /// Every supported verb.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    /// Whether a declaration of this verb sends a body unless told otherwise.
    ///
    /// `POST`, `PUT` and `PATCH` do. A `DELETE` with a body has to be declared
    /// explicitly.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Upper-case name, as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == name)
            .ok_or_else(|| Error::invalid_request(format!("unsupported HTTP method: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        for method in Method::ALL {
            assert_eq!(method.to_string(), method.as_str());
            assert_eq!(http::Method::from(method).as_str(), method.as_str());
        }
    }

    #[test]
    fn body_defaults() {
        let with_body: Vec<_> = Method::ALL.into_iter().filter(|m| m.carries_body()).collect();
        assert_eq!(with_body, [Method::Post, Method::Put, Method::Patch]);
    }

    #[test]
    fn parse() {
        assert_eq!("DELETE".parse::<Method>().ok(), Some(Method::Delete));
        assert!("delete".parse::<Method>().is_err());
        assert!("TRACE".parse::<Method>().is_err());
    }
}
