//! Composite keys for kvorm
//!
//! A [`Key`] is an ordered sequence of [`KeyPart`] scalars. Keys order
//! lexicographically part by part, which is what prefix and range scans
//! rely on.
//!
//! ## Ordering
//!
//! Parts of different types order by type rank first:
//! `Bytes < String < Int < Float < Bool`. Parts of the same type order by
//! value; floats use IEEE-754 total ordering so every key is comparable.
//! A strict prefix orders before all of its extensions.
//!
//! ## Validation
//!
//! - Keys must not be empty
//! - Keys must not exceed `max_key_bytes` (default: 2048)

use crate::error::Error;
use crate::limits::Limits;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// One scalar component of a composite key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyPart {
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Bool(bool),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::Bool(_) => 4,
        }
    }

    /// Approximate encoded length in bytes (type tag included)
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            KeyPart::Bytes(b) => b.len(),
            KeyPart::String(s) => s.len(),
            KeyPart::Int(_) | KeyPart::Float(_) => 8,
            KeyPart::Bool(_) => 1,
        }
    }

    /// Convert back into a [`Value`]
    pub fn to_value(&self) -> Value {
        match self {
            KeyPart::Bytes(b) => Value::Bytes(b.clone()),
            KeyPart::String(s) => Value::String(s.clone()),
            KeyPart::Int(i) => Value::Int(*i),
            KeyPart::Float(f) => Value::Float(*f),
            KeyPart::Bool(b) => Value::Bool(*b),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.cmp(b),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows the total order so that Eq, Ord and Hash agree for floats.
impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyPart::Bytes(b) => b.hash(state),
            KeyPart::String(s) => s.hash(state),
            KeyPart::Int(i) => i.hash(state),
            KeyPart::Float(f) => f.to_bits().hash(state),
            KeyPart::Bool(b) => b.hash(state),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Float(x) => write!(f, "{:?}", x),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::String(s.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<f64> for KeyPart {
    fn from(f: f64) -> Self {
        KeyPart::Float(f)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        KeyPart::Bytes(b)
    }
}

impl TryFrom<&Value> for KeyPart {
    type Error = Error;

    /// Convert a scalar value into a key part
    ///
    /// Null, arrays, objects, NaN and unsigned values above `i64::MAX`
    /// cannot be key parts.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(KeyPart::String(s.clone())),
            Value::Int(i) => Ok(KeyPart::Int(*i)),
            Value::U64(n) => i64::try_from(*n)
                .map(KeyPart::Int)
                .map_err(|_| Error::malformed_key("", format!("{} does not fit a key part", n))),
            Value::Float(f) if f.is_nan() => {
                Err(Error::malformed_key("", "NaN cannot be used as a key part"))
            }
            Value::Float(f) => Ok(KeyPart::Float(*f)),
            Value::Bool(b) => Ok(KeyPart::Bool(*b)),
            Value::Bytes(b) => Ok(KeyPart::Bytes(b.clone())),
            other => Err(Error::malformed_key(
                "",
                format!("{} cannot be used as a key part", other.type_name()),
            )),
        }
    }
}

/// Composite key: an ordered sequence of scalar parts
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Create a key from its parts
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }

    /// The parts of this key, in order
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Consume the key, returning its parts
    pub fn into_parts(self) -> Vec<KeyPart> {
        self.0
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the key has no parts
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a part in place
    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    /// Return a new key with one more part appended
    pub fn with_part(&self, part: impl Into<KeyPart>) -> Key {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Key(parts)
    }

    /// Check whether `prefix` is a (non-strict) prefix of this key
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Approximate encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(KeyPart::encoded_len).sum()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }
}

impl<T: Into<KeyPart>, const N: usize> From<[T; N]> for Key {
    fn from(parts: [T; N]) -> Self {
        Key(parts.into_iter().map(Into::into).collect())
    }
}

/// Build a [`Key`] from a list of part expressions
///
/// ```
/// use kvorm_core::{key, Key, KeyPart};
///
/// let k: Key = key!["users", 42, true];
/// assert_eq!(k.len(), 3);
/// assert_eq!(k.parts()[1], KeyPart::Int(42));
/// ```
#[macro_export]
macro_rules! key {
    ($($part:expr),* $(,)?) => {
        $crate::Key::new(vec![$($crate::KeyPart::from($part)),*])
    };
}

/// Validate a key using default limits
pub fn validate_key(key: &Key) -> Result<(), KeyError> {
    validate_key_with_limits(key, &Limits::default())
}

/// Validate a key with custom limits
pub fn validate_key_with_limits(key: &Key, limits: &Limits) -> Result<(), KeyError> {
    // Rule 1: Key cannot be empty
    if key.is_empty() {
        return Err(KeyError::Empty);
    }

    // Rule 2: Key cannot exceed max length
    let len = key.encoded_len();
    if len > limits.max_key_bytes {
        return Err(KeyError::TooLong {
            actual: len,
            max: limits.max_key_bytes,
        });
    }

    Ok(())
}

/// Key validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key has no parts
    #[error("Key cannot be empty")]
    Empty,

    /// Key exceeds maximum length
    #[error("Key too long: {actual} bytes exceeds maximum {max}")]
    TooLong {
        /// Actual key length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },
}

impl KeyError {
    /// Get the reason code for logs and error reports
    pub fn reason_code(&self) -> &'static str {
        match self {
            KeyError::Empty => "empty_key",
            KeyError::TooLong { .. } => "key_too_long",
        }
    }
}
