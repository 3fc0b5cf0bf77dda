//! Call-time argument lists.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::type_token::DynValue;

/// Ordered arguments of one method invocation.
///
/// An absent slot is the null argument: it is skipped by optional bindings
/// and rejected by required ones.
///
/// ```
/// use courier::Args;
///
/// let args = Args::new().arg(42_u64).none().arg("rust".to_string());
/// assert_eq!(args.len(), 3);
/// assert!(args.get(1).is_none());
/// ```
#[derive(Clone, Default)]
pub struct Args(Vec<Option<Arc<DynValue>>>);

impl Args {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    #[must_use]
    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.0.push(Some(Arc::new(value)));
        self
    }

    /// Append an already shared value.
    #[must_use]
    pub fn shared(mut self, value: Arc<DynValue>) -> Self {
        self.0.push(Some(value));
        self
    }

    /// Append an absent value.
    #[must_use]
    pub fn none(mut self) -> Self {
        self.0.push(None);
        self
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `index`, `None` when absent or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DynValue> {
        self.0.get(index).and_then(Option::as_deref)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Option<&DynValue>> {
        self.0.iter().map(Option::as_deref)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|slot| if slot.is_some() { "<value>" } else { "<none>" }))
            .finish()
    }
}
