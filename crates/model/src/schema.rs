//! Declarative object schemas
//!
//! [`ObjectSchema`] is the stock [`Validator`] for entity documents. It
//! type-checks declared fields, fills defaults for absent optional fields,
//! and in strict mode rejects undeclared fields. Every problem is reported,
//! not just the first.

use std::collections::BTreeMap;

use kvorm_core::Value;

use crate::validator::{FieldError, Validator};

/// Accepted type for a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Any value
    Any,
    /// `Value::String`
    String,
    /// `Value::Int`
    Int,
    /// `Value::U64`
    U64,
    /// `Value::Float`
    Float,
    /// Int, U64 or Float
    Number,
    /// `Value::Bool`
    Bool,
    /// `Value::Bytes`
    Bytes,
    /// `Value::Array`
    Array,
    /// `Value::Object`
    Object,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => matches!(value, Value::String(_)),
            FieldType::Int => matches!(value, Value::Int(_)),
            FieldType::U64 => matches!(value, Value::U64(_)),
            FieldType::Float => matches!(value, Value::Float(_)),
            FieldType::Number => matches!(value, Value::Int(_) | Value::U64(_) | Value::Float(_)),
            FieldType::Bool => matches!(value, Value::Bool(_)),
            FieldType::Bytes => matches!(value, Value::Bytes(_)),
            FieldType::Array => matches!(value, Value::Array(_)),
            FieldType::Object => matches!(value, Value::Object(_)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::U64 => "u64",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Bytes => "bytes",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldSpec {
    ty: FieldType,
    required: bool,
    default: Option<Value>,
}

/// Schema for object-shaped entity values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    fields: BTreeMap<String, FieldSpec>,
    strict: bool,
}

impl ObjectSchema {
    /// Empty, non-strict schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field that must be present and non-null
    pub fn required(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                ty,
                required: true,
                default: None,
            },
        );
        self
    }

    /// Declare a field that may be absent or null
    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                ty,
                required: false,
                default: None,
            },
        );
        self
    }

    /// Declare an optional field filled with `default` when absent
    pub fn with_default(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                ty,
                required: false,
                default: Some(default.into()),
            },
        );
        self
    }

    /// Reject fields that were not declared
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl Validator for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        let Some(input) = value.as_object() else {
            return Err(vec![FieldError::new(
                "",
                format!("expected an object, got {}", value.type_name()),
            )]);
        };

        let mut errors = Vec::new();
        let mut output = input.clone();

        for (name, spec) in &self.fields {
            match input.get(name) {
                Some(v) if !v.is_null() => {
                    if !spec.ty.accepts(v) {
                        errors.push(FieldError::new(
                            name,
                            format!("expected {}, got {}", spec.ty.name(), v.type_name()),
                        ));
                    }
                }
                _ => {
                    if let Some(default) = &spec.default {
                        output.insert(name.clone(), default.clone());
                    } else if spec.required {
                        errors.push(FieldError::new(name, "is required"));
                    }
                }
            }
        }

        if self.strict {
            for name in input.keys() {
                if !self.fields.contains_key(name) {
                    errors.push(FieldError::new(name, "is not a declared field"));
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(errors)
        }
    }
}
