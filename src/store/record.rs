//! Record and key types for the indexed store
//!
//! Indexes are declared over named record fields. A record exposes its
//! fields through the `Record` trait; the store derives every index key
//! from those fields on each write.

use std::fmt;

/// Kind of a key component, used to type-check fields and query arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Int,
    Str,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Int => write!(f, "integer"),
            KeyKind::Str => write!(f, "string"),
        }
    }
}

/// A field value borrowed from a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Int(i64),
    Str(&'a str),
}

impl FieldValue<'_> {
    pub fn kind(&self) -> KeyKind {
        match self {
            FieldValue::Int(_) => KeyKind::Int,
            FieldValue::Str(_) => KeyKind::Str,
        }
    }

    /// Convert into an owned key component
    pub fn to_key(&self) -> KeyValue {
        match self {
            FieldValue::Int(i) => KeyValue::Int(*i),
            FieldValue::Str(s) => KeyValue::Str((*s).to_string()),
        }
    }
}

/// One component of an index key
///
/// Ordering is total: integers sort numerically, strings bytewise, and
/// integers sort before strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Int(i64),
    Str(String),
}

impl KeyValue {
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyValue::Int(_) => KeyKind::Int,
            KeyValue::Str(_) => KeyKind::Str,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for KeyValue {
    fn from(i: i64) -> Self {
        KeyValue::Int(i)
    }
}

impl From<i32> for KeyValue {
    fn from(i: i32) -> Self {
        KeyValue::Int(i64::from(i))
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Str(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Str(s)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A full (possibly compound) index key
pub type IndexKey = Vec<KeyValue>;

/// A row type that can live in an `IndexedStore`
///
/// `field` returns `None` when the record has no field with that name,
/// which the store reports as a structural error on write.
pub trait Record: Clone + Send + Sync + 'static {
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}
