//! Key schemas: deterministic construction of composite keys
//!
//! A [`KeySchema`] is an ordered list of segments. Literal segments are
//! namespace tokens copied verbatim into the key; field segments are filled
//! from the input value. The same schema and input always produce the same
//! key, which is what lets update and delete re-derive index keys from a
//! stored value.
//!
//! Three input shapes are accepted:
//! - an object: every field segment reads `value[field]`
//! - a scalar: every field segment takes the scalar itself (`find("u1")`)
//! - an array: field segments consume elements positionally

use kvorm_core::{Error, Key, KeyPart, Result, Value};

/// One segment of a key schema
#[derive(Debug, Clone, PartialEq)]
pub enum KeySegment {
    /// Fixed token
    Literal(KeyPart),
    /// Reference to a field of the input value
    Field(String),
}

/// Ordered list of literal and field segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySchema {
    segments: Vec<KeySegment>,
}

impl KeySchema {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a literal segment
    pub fn literal(mut self, part: impl Into<KeyPart>) -> Self {
        self.segments.push(KeySegment::Literal(part.into()));
        self
    }

    /// Append a field segment
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(KeySegment::Field(name.into()));
        self
    }

    /// All segments in order
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Names of the field segments in order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            KeySegment::Field(name) => Some(name.as_str()),
            KeySegment::Literal(_) => None,
        })
    }

    /// Number of field segments
    pub fn field_count(&self) -> usize {
        self.fields().count()
    }

    /// Key made of the leading literal segments
    ///
    /// Listing this prefix visits every key the schema can produce.
    pub fn literal_prefix(&self) -> Key {
        let parts = self
            .segments
            .iter()
            .map_while(|s| match s {
                KeySegment::Literal(part) => Some(part.clone()),
                KeySegment::Field(_) => None,
            })
            .collect();
        Key::new(parts)
    }

    /// Build a key from an input value
    ///
    /// # Errors
    ///
    /// `Error::MalformedKey` when an object lacks a referenced field, an
    /// array has too few elements, or a resolved value is not a usable
    /// key part (null, array, object, NaN).
    pub fn build(&self, value: &Value) -> Result<Key> {
        let mut key = Key::new(Vec::with_capacity(self.segments.len()));
        let mut position = 0usize;

        for segment in &self.segments {
            match segment {
                KeySegment::Literal(part) => key.push(part.clone()),
                KeySegment::Field(field) => {
                    let resolved = match value {
                        Value::Object(fields) => fields
                            .get(field)
                            .ok_or_else(|| Error::malformed_key(field, "field is missing"))?,
                        Value::Array(items) => items.get(position).ok_or_else(|| {
                            Error::malformed_key(
                                field,
                                format!("no positional value at index {}", position),
                            )
                        })?,
                        Value::Null => {
                            return Err(Error::malformed_key(field, "value is null"));
                        }
                        scalar => scalar,
                    };
                    position += 1;
                    key.push(to_part(field, resolved)?);
                }
            }
        }

        Ok(key)
    }
}

fn to_part(field: &str, value: &Value) -> Result<KeyPart> {
    KeyPart::try_from(value).map_err(|e| match e {
        Error::MalformedKey { reason, .. } => Error::malformed_key(field, reason),
        other => other,
    })
}
