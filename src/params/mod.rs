//! Declared parameter kinds, raw wire values and typed call parameters
//!
//! Parameters arrive as strings or raw JSON and are coerced into a
//! [`ParamValue`] according to the [`ParamKind`] declared on the method.
//! Coercion is lenient: a value that cannot be converted is simply absent
//! from the [`CallParams`] handed to the handler.

mod coerce;
mod types;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use coerce::{coerce, coerce_all};
pub use types::TypeRegistry;

/// Parameter kind declared on a method at registration time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// UTF-8 text, passed through unchanged
    Text,
    /// Signed 64-bit integer
    Integer,
    /// 64-bit floating point
    Float,
    /// `true` or `false`, case-sensitive
    Bool,
    /// Date/time, normalized to UTC
    Timestamp,
    /// Domain object decoded through the [`TypeRegistry`] under this name
    Object(String),
}

impl ParamKind {
    /// Domain object kind for the given registered type name
    #[must_use]
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Object(name) => write!(f, "object<{name}>"),
        }
    }
}

/// Declared schema of a single method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub nullable: bool,
}

impl ParamSpec {
    /// Non-nullable parameter of the given kind
    #[must_use]
    pub const fn required(kind: ParamKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// Nullable parameter of the given kind
    #[must_use]
    pub const fn nullable(kind: ParamKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

/// Raw parameter value as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum RawParam {
    /// Plain string form
    Text(String),
    /// Already-decoded structured payload
    Structured(serde_json::Value),
}

impl From<&str> for RawParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<serde_json::Value> for RawParam {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// A domain object produced by the [`TypeRegistry`]
#[derive(Clone)]
pub struct DecodedObject {
    type_name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl DecodedObject {
    pub(crate) fn new(type_name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// Registered type name this object was decoded as
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the decoded value as `T`, if it is one
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for DecodedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedObject")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A coerced, typed parameter value
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Explicit null for a nullable parameter
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Object(DecodedObject),
}

/// Typed parameters handed to a method handler
///
/// Only declared parameters that were present and coercible appear here.
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    values: HashMap<String, ParamValue>,
}

impl CallParams {
    /// Create an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    /// Raw access to a parameter value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Whether the parameter survived coercion
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of coerced parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameter survived coercion
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parameter names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParamValue::Float(n)) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.values.get(name) {
            Some(ParamValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    /// Borrow a decoded domain object as `T`
    #[must_use]
    pub fn object<T: Any>(&self, name: &str) -> Option<&T> {
        match self.values.get(name) {
            Some(ParamValue::Object(obj)) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether the parameter was sent as an explicit null
    #[must_use]
    pub fn is_null(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Null))
    }
}
