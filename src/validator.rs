//! Schema check for candidate identities coming out of the decoder.
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::records::{Embedding, Identity};

/// Untyped identity fields as read from a contract, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    fields: Map<String, Value>,
}

impl Candidate {
    /// Wrap raw fields.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Raw fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Set `createdAt`, overriding anything the contract supplied.
    pub fn stamp_created_at(&mut self, now: DateTime<Utc>) {
        self.fields
            .insert("createdAt".into(), Value::String(now.to_rfc3339()));
    }
}

/// A candidate field that failed the schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field absent (or null).
    #[error("field `{field}` is required")]
    Missing {
        /// Field name.
        field: &'static str,
    },
    /// Field present with the wrong shape.
    #[error("field `{field}` {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ValidationError {
    /// Name of the violated field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => *field,
        }
    }
}

/// Check `candidate` and build the identity stored under `id`.
///
/// `version` and `name` must be strings, `biometrics` (optional, default empty) a list
/// of numeric vectors, and `createdAt` an RFC 3339 timestamp or epoch milliseconds.
/// Fields outside the schema are ignored.
pub fn validate(candidate: &Candidate, id: &str) -> Result<Identity, ValidationError> {
    let fields = candidate.fields();
    let version = required_string(fields, "version")?;
    let name = required_string(fields, "name")?;
    let biometrics = parse_biometrics(fields.get("biometrics"))?;
    let created_at = parse_created_at(present(fields, "createdAt")?)?;

    Ok(Identity {
        id: id.to_string(),
        version,
        name,
        biometrics,
        created_at,
    })
}

fn present<'a>(fields: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::Missing { field }),
        Some(v) => Ok(v),
    }
}

fn required_string(fields: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match present(fields, field)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(ValidationError::Invalid {
            field,
            reason: format!("must be a string, got {other}"),
        }),
    }
}

fn parse_biometrics(value: Option<&Value>) -> Result<Vec<Embedding>, ValidationError> {
    const FIELD: &str = "biometrics";
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ValidationError::Invalid {
                field: FIELD,
                reason: format!("must be a list, got {other}"),
            })
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let row = item.as_array().ok_or_else(|| ValidationError::Invalid {
                field: FIELD,
                reason: format!("entry {i} is not a vector"),
            })?;
            row.iter()
                .map(|x| {
                    x.as_f64().ok_or_else(|| ValidationError::Invalid {
                        field: FIELD,
                        reason: format!("entry {i} holds a non-numeric value {x}"),
                    })
                })
                .collect::<Result<Embedding, _>>()
        })
        .collect()
}

fn parse_created_at(value: &Value) -> Result<DateTime<Utc>, ValidationError> {
    const FIELD: &str = "createdAt";
    let parsed = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    };
    parsed.ok_or_else(|| ValidationError::Invalid {
        field: FIELD,
        reason: format!("is not a valid timestamp: {value}"),
    })
}
