//! Mutation intents
//!
//! A [`Mutation`] is one logical operation recorded by a
//! [`MutationBuilder`](crate::MutationBuilder). Entity intents
//! (create/update/delete) are expanded by the compiler into every key they
//! must maintain. Raw intents (set/check/sum/min/max) map one-to-one onto
//! store operations and bypass entity semantics.
//!
//! String tags only exist at the parsing edge: [`MutationKind::from_str`]
//! accepts legacy synonyms and [`RawMutation`] converts loosely-typed input
//! into a typed intent. Nothing past that edge looks at strings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use kvorm_core::{Key, KeyPart, Value, Versionstamp};
use kvorm_model::Entity;
use serde::Deserialize;

use crate::error::MutationError;

/// How an UPDATE or DELETE finds its record
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// By primary key: a scalar id or an object holding the key fields
    Primary(Value),
    /// Through a named secondary index
    Index {
        /// Index name
        index: String,
        /// Scalar or object the index key is built from
        value: Value,
    },
}

impl Lookup {
    /// Look up through a secondary index
    pub fn index(index: impl Into<String>, value: impl Into<Value>) -> Self {
        Lookup::Index {
            index: index.into(),
            value: value.into(),
        }
    }

    /// The value the key is derived from
    pub fn value(&self) -> &Value {
        match self {
            Lookup::Primary(value) | Lookup::Index { value, .. } => value,
        }
    }
}

impl From<Value> for Lookup {
    fn from(value: Value) -> Self {
        Lookup::Primary(value)
    }
}

impl From<&str> for Lookup {
    fn from(id: &str) -> Self {
        Lookup::Primary(Value::from(id))
    }
}

impl From<String> for Lookup {
    fn from(id: String) -> Self {
        Lookup::Primary(Value::from(id))
    }
}

impl From<i64> for Lookup {
    fn from(id: i64) -> Self {
        Lookup::Primary(Value::Int(id))
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Primary(value) => write!(f, "primary key {}", value.to_json()),
            Lookup::Index { index, value } => write!(f, "index '{}' = {}", index, value.to_json()),
        }
    }
}

/// One recorded intent
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert a new record; its primary key must be free
    Create {
        /// Target entity
        entity: Entity,
        /// Record value
        data: Value,
    },
    /// Change an existing record
    Update {
        /// Target entity
        entity: Entity,
        /// How to find the record
        key: Lookup,
        /// New fields (merge) or the whole new value (replace)
        data: Value,
        /// Shallow-merge `data` into the current value
        merge: bool,
    },
    /// Remove an existing record
    Delete {
        /// Target entity
        entity: Entity,
        /// How to find the record
        key: Lookup,
        /// Also remove relation entries and dependent records
        cascade: bool,
    },
    /// Write a raw key
    Set {
        /// Key
        key: Key,
        /// Value
        value: Value,
        /// Relative expiry
        expire_in: Option<Duration>,
    },
    /// Guard on a raw key's versionstamp (`None` = must be absent)
    Check {
        /// Key
        key: Key,
        /// Expected versionstamp
        versionstamp: Option<Versionstamp>,
    },
    /// Native unsigned add
    Sum {
        /// Key
        key: Key,
        /// Non-negative delta
        value: u64,
    },
    /// Native unsigned minimum
    Min {
        /// Key
        key: Key,
        /// Operand
        value: u64,
    },
    /// Native unsigned maximum
    Max {
        /// Key
        key: Key,
        /// Operand
        value: u64,
    },
}

impl Mutation {
    /// The intent's tag
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create { .. } => MutationKind::Create,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete { .. } => MutationKind::Delete,
            Mutation::Set { .. } => MutationKind::Set,
            Mutation::Check { .. } => MutationKind::Check,
            Mutation::Sum { .. } => MutationKind::Sum,
            Mutation::Min { .. } => MutationKind::Min,
            Mutation::Max { .. } => MutationKind::Max,
        }
    }

    /// Entity for create/update/delete intents
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Mutation::Create { entity, .. }
            | Mutation::Update { entity, .. }
            | Mutation::Delete { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Raw key for set/check/sum/min/max intents
    pub fn raw_key(&self) -> Option<&Key> {
        match self {
            Mutation::Set { key, .. }
            | Mutation::Check { key, .. }
            | Mutation::Sum { key, .. }
            | Mutation::Min { key, .. }
            | Mutation::Max { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.entity(), self) {
            (Some(entity), Mutation::Create { .. }) => write!(f, "create {}", entity.name()),
            (Some(entity), Mutation::Update { key, .. } | Mutation::Delete { key, .. }) => {
                write!(f, "{} {} by {}", self.kind(), entity.name(), key)
            }
            _ => match self.raw_key() {
                Some(key) => write!(f, "{} {}", self.kind(), key),
                None => write!(f, "{}", self.kind()),
            },
        }
    }
}

/// Intent tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// CREATE
    Create,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// SET
    Set,
    /// CHECK
    Check,
    /// SUM
    Sum,
    /// MIN
    Min,
    /// MAX
    Max,
}

impl MutationKind {
    /// Whether the intent works on an entity rather than a raw key
    pub fn is_entity(self) -> bool {
        matches!(
            self,
            MutationKind::Create | MutationKind::Update | MutationKind::Delete
        )
    }

    /// Lowercase tag
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
            MutationKind::Set => "set",
            MutationKind::Check => "check",
            MutationKind::Sum => "sum",
            MutationKind::Min => "min",
            MutationKind::Max => "max",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = MutationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(MutationKind::Create),
            "update" | "patch" | "modify" => Ok(MutationKind::Update),
            "delete" | "remove" | "destroy" => Ok(MutationKind::Delete),
            "set" | "put" | "write" => Ok(MutationKind::Set),
            "check" | "guard" | "cas" => Ok(MutationKind::Check),
            "sum" | "increment" | "incr" | "add" => Ok(MutationKind::Sum),
            "min" | "minimum" => Ok(MutationKind::Min),
            "max" | "maximum" => Ok(MutationKind::Max),
            other => Err(MutationError::malformed(format!(
                "unknown mutation type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Raw parsing edge
// ============================================================================

/// Loosely-typed raw intent, as read from JSON or another serde format
///
/// ```json
/// {"type": "increment", "key": ["counters", "views"], "value": 5}
/// {"type": "check", "key": ["locks", "a"], "versionstamp": null}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawMutation {
    /// Intent tag, legacy synonyms accepted
    #[serde(rename = "type")]
    pub kind: String,
    /// Key parts as JSON scalars
    pub key: Vec<serde_json::Value>,
    /// Value for set, operand for sum/min/max
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Expected versionstamp for check (20 hex digits, absent = must not exist)
    #[serde(default)]
    pub versionstamp: Option<String>,
    /// Expiry for set, in milliseconds
    #[serde(default)]
    pub expire_in_ms: Option<u64>,
}

impl TryFrom<RawMutation> for Mutation {
    type Error = MutationError;

    fn try_from(raw: RawMutation) -> Result<Self, Self::Error> {
        let kind: MutationKind = raw.kind.parse()?;

        let key = Key::new(
            raw.key
                .into_iter()
                .map(|part| KeyPart::try_from(&Value::from(part)))
                .collect::<Result<Vec<_>, _>>()?,
        );
        if key.is_empty() {
            return Err(MutationError::malformed("raw intent needs a non-empty key"));
        }

        let operand = |value: Option<serde_json::Value>| -> Result<u64, MutationError> {
            value.as_ref().and_then(serde_json::Value::as_u64).ok_or_else(|| {
                MutationError::malformed(format!(
                    "{} needs a non-negative integer operand",
                    kind
                ))
            })
        };

        Ok(match kind {
            MutationKind::Set => Mutation::Set {
                key,
                value: raw
                    .value
                    .map(Value::from)
                    .ok_or_else(|| MutationError::malformed("set needs a value"))?,
                expire_in: raw.expire_in_ms.map(Duration::from_millis),
            },
            MutationKind::Check => Mutation::Check {
                key,
                versionstamp: raw
                    .versionstamp
                    .map(|s| s.parse::<Versionstamp>())
                    .transpose()
                    .map_err(|e| MutationError::malformed(e.to_string()))?,
            },
            MutationKind::Sum => Mutation::Sum {
                key,
                value: operand(raw.value)?,
            },
            MutationKind::Min => Mutation::Min {
                key,
                value: operand(raw.value)?,
            },
            MutationKind::Max => Mutation::Max {
                key,
                value: operand(raw.value)?,
            },
            MutationKind::Create | MutationKind::Update | MutationKind::Delete => {
                return Err(MutationError::malformed(format!(
                    "{} intents need an entity and cannot be parsed from raw input",
                    kind
                )));
            }
        })
    }
}
