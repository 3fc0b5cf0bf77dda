//! Runtime descriptions of declared Rust types.
//!
//! A service declaration is data, so every parameter and return type is
//! described by a [`TypeToken`]. Tokens are built while the type is still
//! known statically, and capture what the engine may later need to do with
//! an erased value of that type: render it, encode or decode it as JSON, walk
//! its elements, or wrap a call into it.
//!
//! ```
//! use courier::{Call, TypeToken};
//! use std::collections::HashMap;
//!
//! let ids = TypeToken::builder::<u64>().display().vec();
//! assert!(ids.element().is_some_and(|e| e.is::<u64>()));
//!
//! let filters = TypeToken::builder::<String>().display().string_map::<HashMap<String, String>>();
//! assert!(filters.map_value().is_some());
//!
//! let call = TypeToken::builder::<()>().call();
//! assert!(call.is::<Call<()>>());
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use courier_core::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::adapter::Single;
use crate::call::{Call, DynCall};

/// An erased argument value.
pub type DynValue = dyn Any + Send + Sync;

/// An erased decoded value or adapted call.
pub type AnyValue = Box<dyn Any + Send>;

/// Turns an erased call into the declared wrapper value.
pub type WrapFn = fn(Arc<dyn DynCall>) -> AnyValue;

type DisplayFn = fn(&DynValue) -> Option<String>;
type EncodeFn = fn(&DynValue) -> Option<Result<Bytes>>;
type DecodeFn = fn(&[u8]) -> Result<AnyValue>;
type ElementsFn = for<'a> fn(&'a DynValue) -> Option<Vec<&'a DynValue>>;
type EntriesFn = for<'a> fn(&'a DynValue) -> Option<Vec<(&'a str, &'a DynValue)>>;

// ============================================================================
// Raw Type
// ============================================================================

/// Identity of a generic wrapper, independent of its type argument.
///
/// `Call<User>` and `Call<()>` share the raw type of `Call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawType {
    id: TypeId,
    name: &'static str,
}

impl RawType {
    /// Raw type identified by `R`, usually the wrapper instantiated with `()`.
    #[must_use]
    pub fn of<R: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            id: TypeId::of::<R>(),
            name,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Raw type of [`Call`].
#[must_use]
pub fn call_raw_type() -> RawType {
    RawType::of::<Call<()>>("Call")
}

/// Raw type of [`Single`].
#[must_use]
pub fn single_raw_type() -> RawType {
    RawType::of::<Single<()>>("Single")
}

// ============================================================================
// Type Token
// ============================================================================

/// Runtime description of a Rust type and its capabilities.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct TypeToken(Arc<Inner>);

struct Inner {
    id: TypeId,
    name: &'static str,
    display: Option<DisplayFn>,
    encode: Option<EncodeFn>,
    decode: Option<DecodeFn>,
    shape: Shape,
}

enum Shape {
    Plain,
    Sequence {
        element: TypeToken,
        elements: ElementsFn,
    },
    Map {
        value: TypeToken,
        entries: EntriesFn,
    },
    Wrapper {
        raw: RawType,
        inner: TypeToken,
        wrap: WrapFn,
    },
}

impl TypeToken {
    /// Start describing `T`.
    #[must_use]
    pub fn builder<T: Send + Sync + 'static>() -> TokenBuilder<T> {
        TokenBuilder {
            display: None,
            encode: None,
            decode: None,
            _marker: PhantomData,
        }
    }

    /// A token for `T` without capabilities.
    #[must_use]
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::builder::<T>().build()
    }

    /// A token for a type rendered with [`fmt::Display`].
    #[must_use]
    pub fn display<T: fmt::Display + Send + Sync + 'static>() -> Self {
        Self::builder::<T>().display().build()
    }

    /// A token for a type carried as JSON.
    #[must_use]
    pub fn json<T: Serialize + DeserializeOwned + Send + Sync + 'static>() -> Self {
        Self::builder::<T>().json().build()
    }

    /// The unit type `()`, the "no value" response type.
    #[must_use]
    pub fn unit() -> Self {
        Self::of::<()>()
    }

    /// `String`, rendered as itself.
    #[must_use]
    pub fn string() -> Self {
        Self::display::<String>()
    }

    /// Raw response bytes.
    #[must_use]
    pub fn bytes() -> Self {
        Self::of::<Bytes>()
    }

    /// A ready-made request body.
    #[must_use]
    pub fn request_body() -> Self {
        Self::of::<courier_core::RequestBody>()
    }

    /// A ready-made multipart part.
    #[must_use]
    pub fn part() -> Self {
        Self::of::<courier_core::Part>()
    }

    /// A user-defined wrapper `W` around `inner`, recognized by its raw type.
    #[must_use]
    pub fn wrapper<W: Send + Sync + 'static>(raw: RawType, inner: Self, wrap: WrapFn) -> Self {
        Self::with_shape::<W>(Shape::Wrapper { raw, inner, wrap })
    }

    fn with_shape<T: 'static>(shape: Shape) -> Self {
        Self(Arc::new(Inner {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            display: None,
            encode: None,
            decode: None,
            shape,
        }))
    }

    /// Whether this token describes `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.0.id == TypeId::of::<T>()
    }

    /// Whether this is the unit type.
    #[must_use]
    pub fn is_unit(&self) -> bool {
        self.is::<()>()
    }

    /// Type identity.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.0.id
    }

    /// Type name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Raw type of a wrapper token.
    #[must_use]
    pub fn raw_type(&self) -> Option<RawType> {
        match &self.0.shape {
            Shape::Wrapper { raw, .. } => Some(*raw),
            _ => None,
        }
    }

    /// Type argument of a wrapper token.
    #[must_use]
    pub fn inner(&self) -> Option<&Self> {
        match &self.0.shape {
            Shape::Wrapper { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Constructor of a wrapper token.
    #[must_use]
    pub fn wrap_fn(&self) -> Option<WrapFn> {
        match &self.0.shape {
            Shape::Wrapper { wrap, .. } => Some(*wrap),
            _ => None,
        }
    }

    /// Element type of a sequence token.
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        match &self.0.shape {
            Shape::Sequence { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Value type of a string-keyed map token.
    #[must_use]
    pub fn map_value(&self) -> Option<&Self> {
        match &self.0.shape {
            Shape::Map { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether values can be rendered as strings.
    #[must_use]
    pub fn can_display(&self) -> bool {
        self.0.display.is_some()
    }

    /// Whether values can be encoded as JSON.
    #[must_use]
    pub fn can_encode_json(&self) -> bool {
        self.0.encode.is_some()
    }

    /// Whether values can be decoded from JSON.
    #[must_use]
    pub fn can_decode_json(&self) -> bool {
        self.0.decode.is_some()
    }

    /// Render a value; `None` without the capability or for a foreign value.
    #[must_use]
    pub fn render(&self, value: &DynValue) -> Option<String> {
        self.0.display.and_then(|display| display(value))
    }

    /// Encode a value as JSON; `None` without the capability or for a foreign value.
    #[must_use]
    pub fn encode_json(&self, value: &DynValue) -> Option<Result<Bytes>> {
        self.0.encode.and_then(|encode| encode(value))
    }

    /// Decode JSON into a boxed value of this type; `None` without the capability.
    #[must_use]
    pub fn decode_json(&self, bytes: &[u8]) -> Option<Result<AnyValue>> {
        self.0.decode.map(|decode| decode(bytes))
    }

    /// Elements of a sequence value, in iteration order.
    #[must_use]
    pub fn elements<'a>(&self, value: &'a DynValue) -> Option<Vec<&'a DynValue>> {
        match &self.0.shape {
            Shape::Sequence { elements, .. } => elements(value),
            _ => None,
        }
    }

    /// Entries of a map value, in iteration order.
    #[must_use]
    pub fn entries<'a>(&self, value: &'a DynValue) -> Option<Vec<(&'a str, &'a DynValue)>> {
        match &self.0.shape {
            Shape::Map { entries, .. } => entries(value),
            _ => None,
        }
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

// ============================================================================
// Token Builder
// ============================================================================

/// Builder capturing the capabilities of `T`.
pub struct TokenBuilder<T> {
    display: Option<DisplayFn>,
    encode: Option<EncodeFn>,
    decode: Option<DecodeFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for TokenBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBuilder")
            .field("type", &type_name::<T>())
            .field("display", &self.display.is_some())
            .field("encode", &self.encode.is_some())
            .field("decode", &self.decode.is_some())
            .finish()
    }
}

impl<T: Send + Sync + 'static> TokenBuilder<T> {
    /// Render values with [`fmt::Display`].
    #[must_use]
    pub fn display(mut self) -> Self
    where
        T: fmt::Display,
    {
        self.display = Some(|value| value.downcast_ref::<T>().map(ToString::to_string));
        self
    }

    /// Encode values as JSON.
    #[must_use]
    pub fn serialize(mut self) -> Self
    where
        T: Serialize,
    {
        self.encode = Some(|value| value.downcast_ref::<T>().map(courier_core::to_json));
        self
    }

    /// Decode values from JSON.
    #[must_use]
    pub fn deserialize(mut self) -> Self
    where
        T: DeserializeOwned,
    {
        self.decode = Some(|bytes| {
            courier_core::from_json::<T>(bytes).map(|value| Box::new(value) as AnyValue)
        });
        self
    }

    /// Encode and decode values as JSON.
    #[must_use]
    pub fn json(self) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.serialize().deserialize()
    }

    /// Finish the token for `T`.
    #[must_use]
    pub fn build(self) -> TypeToken {
        TypeToken(Arc::new(Inner {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            display: self.display,
            encode: self.encode,
            decode: self.decode,
            shape: Shape::Plain,
        }))
    }

    /// A token for `Vec<T>`, whose elements are described by this builder.
    #[must_use]
    pub fn vec(self) -> TypeToken {
        self.sequence::<Vec<T>>()
    }

    /// A token for a collection `C` of `T`.
    #[must_use]
    pub fn sequence<C>(self) -> TypeToken
    where
        C: Send + Sync + 'static,
        for<'a> &'a C: IntoIterator<Item = &'a T>,
    {
        TypeToken::with_shape::<C>(Shape::Sequence {
            element: self.build(),
            elements: |value| {
                let collection = value.downcast_ref::<C>()?;
                Some(
                    collection
                        .into_iter()
                        .map(|element| element as &DynValue)
                        .collect(),
                )
            },
        })
    }

    /// A token for a string-keyed map `M` with `T` values.
    #[must_use]
    pub fn string_map<M>(self) -> TypeToken
    where
        M: Send + Sync + 'static,
        for<'a> &'a M: IntoIterator<Item = (&'a String, &'a T)>,
    {
        TypeToken::with_shape::<M>(Shape::Map {
            value: self.build(),
            entries: |value| {
                let map = value.downcast_ref::<M>()?;
                Some(
                    map.into_iter()
                        .map(|(key, value)| (key.as_str(), value as &DynValue))
                        .collect(),
                )
            },
        })
    }

    /// A token for [`Call<T>`].
    #[must_use]
    pub fn call(self) -> TypeToken {
        TypeToken::with_shape::<Call<T>>(Shape::Wrapper {
            raw: call_raw_type(),
            inner: self.build(),
            wrap: |call| Box::new(Call::<T>::from_raw(call)) as AnyValue,
        })
    }

    /// A token for [`Single<T>`].
    #[must_use]
    pub fn single(self) -> TypeToken {
        TypeToken::with_shape::<Single<T>>(Shape::Wrapper {
            raw: single_raw_type(),
            inner: self.build(),
            wrap: |call| Box::new(Single::<T>::from_raw(call)) as AnyValue,
        })
    }
}

/// Type mismatch for a value that is not of the token's type.
pub(crate) fn mismatch(token: &TypeToken) -> Error {
    Error::type_mismatch(token.name())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn display_capability() {
        let token = TypeToken::display::<u32>();
        let value: Arc<DynValue> = Arc::new(42_u32);
        assert_eq!(token.render(value.as_ref()), Some("42".to_string()));

        let foreign: Arc<DynValue> = Arc::new("nope");
        assert_eq!(token.render(foreign.as_ref()), None);
        assert!(!TypeToken::of::<u32>().can_display());
    }

    #[test]
    fn json_capabilities() {
        let token = TypeToken::json::<Vec<u8>>();
        assert!(token.can_encode_json());
        assert!(token.can_decode_json());

        let value: Arc<DynValue> = Arc::new(vec![1_u8, 2]);
        let encoded = token.encode_json(value.as_ref()).expect("capability");
        assert_eq!(encoded.expect("encodes").as_ref(), b"[1,2]");

        let decoded = token.decode_json(b"[3]").expect("capability").expect("decodes");
        assert_eq!(decoded.downcast_ref::<Vec<u8>>(), Some(&vec![3]));
    }

    #[test]
    fn sequence_elements() {
        let token = TypeToken::builder::<String>().display().vec();
        assert!(token.is::<Vec<String>>());

        let value: Arc<DynValue> = Arc::new(vec!["a".to_string(), "b".to_string()]);
        let element = token.element().expect("element token");
        let rendered: Vec<_> = token
            .elements(value.as_ref())
            .expect("sequence")
            .into_iter()
            .filter_map(|e| element.render(e))
            .collect();
        assert_eq!(rendered, ["a", "b"]);
    }

    #[test]
    fn map_entries() {
        let token = TypeToken::builder::<i32>()
            .display()
            .string_map::<BTreeMap<String, i32>>();

        let map: BTreeMap<String, i32> = [("b".to_string(), 2), ("a".to_string(), 1)].into();
        let value: Arc<DynValue> = Arc::new(map);
        let keys: Vec<_> = token
            .entries(value.as_ref())
            .expect("map")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn wrapper_tokens() {
        let token = TypeToken::builder::<String>().call();
        assert_eq!(token.raw_type(), Some(call_raw_type()));
        assert!(token.inner().is_some_and(|inner| inner.is::<String>()));

        let single = TypeToken::builder::<String>().single();
        assert_eq!(single.raw_type(), Some(single_raw_type()));
        assert_ne!(single.raw_type(), token.raw_type());

        assert!(TypeToken::string().raw_type().is_none());
    }
}
