//! Module: value
//! Responsibility: the typed attribute value space and raw-to-typed coercion.
//! Does not own: property bookkeeping, schema metadata, or persistence.
//! Boundary: consumed by the property store and the persister conversion seam.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::OnceLock};
use thiserror::Error as ThisError;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime,
    format_description::{self, FormatItem, well_known::Rfc3339},
};

/// Raw, uncoerced persistence-layer value.
pub type RawValue = serde_json::Value;

static DATE_FORMAT: OnceLock<Vec<FormatItem<'static>>> = OnceLock::new();

fn date_format() -> &'static [FormatItem<'static>] {
    DATE_FORMAT.get_or_init(|| {
        format_description::parse("[year]-[month]-[day]").expect("valid date format description")
    })
}

///
/// CoercionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CoercionError {
    #[error("cannot coerce {found} into {data_type}")]
    Incompatible { data_type: DataType, found: String },

    #[error("cannot parse '{value}' as a date")]
    DateParse { value: String },
}

impl CoercionError {
    fn incompatible(data_type: DataType, raw: &RawValue) -> Self {
        Self::Incompatible {
            data_type,
            found: raw_kind(raw).to_string(),
        }
    }
}

const fn raw_kind(raw: &RawValue) -> &'static str {
    match raw {
        RawValue::Null => "null",
        RawValue::Bool(_) => "boolean",
        RawValue::Number(_) => "number",
        RawValue::String(_) => "string",
        RawValue::Array(_) => "array",
        RawValue::Object(_) => "object",
    }
}

///
/// DataType
///
/// Closed attribute data-type tags, resolved once at schema-build time and
/// switched exhaustively by the coercion paths.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum DataType {
    #[display("string")]
    String,
    #[display("integer")]
    Integer,
    #[display("float")]
    Float,
    #[display("boolean")]
    Boolean,
    #[display("date")]
    Date,
    #[display("array")]
    Array,
    #[display("object")]
    Object,
    #[display("mixed")]
    Mixed,
}

///
/// Timestamp
///
/// Unix seconds. Date attributes normalize to this so equality is always
/// timestamp equality, regardless of how the value was reconstructed.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    #[must_use]
    pub const fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    #[must_use]
    pub const fn seconds(self) -> i64 {
        self.0
    }

    /// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
    pub fn parse(value: &str) -> Result<Self, CoercionError> {
        if let Ok(odt) = OffsetDateTime::parse(value, &Rfc3339) {
            return Ok(Self(odt.unix_timestamp()));
        }
        if let Ok(date) = Date::parse(value, date_format()) {
            let odt = PrimitiveDateTime::new(date, time::Time::MIDNIGHT).assume_utc();
            return Ok(Self(odt.unix_timestamp()));
        }

        Err(CoercionError::DateParse {
            value: value.to_string(),
        })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match OffsetDateTime::from_unix_timestamp(self.0) {
            Ok(odt) => match odt.format(&Rfc3339) {
                Ok(s) => f.write_str(&s),
                Err(_) => write!(f, "@{}", self.0),
            },
            Err(_) => write!(f, "@{}", self.0),
        }
    }
}

///
/// Value
///
/// Converted, in-memory attribute value. `Mixed` carries the raw value
/// through untouched for schemaless payloads.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(Timestamp),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Mixed(RawValue),
}

impl Value {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_date(&self) -> Option<Timestamp> {
        match self {
            Self::Date(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Structural projection of an arbitrary raw value, used by the `array`
    /// and `object` coercions. Nulls survive as `Mixed` so container shapes
    /// round-trip without loss.
    #[must_use]
    pub fn from_raw(raw: &RawValue) -> Self {
        match raw {
            RawValue::Bool(b) => Self::Bool(*b),
            RawValue::Number(n) => n.as_i64().map_or_else(
                || Self::Float(n.as_f64().unwrap_or_default()),
                Self::Int,
            ),
            RawValue::String(s) => Self::Text(s.clone()),
            RawValue::Array(items) => Self::List(items.iter().map(Self::from_raw).collect()),
            RawValue::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_raw(v)))
                    .collect(),
            ),
            RawValue::Null => Self::Mixed(RawValue::Null),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Self::Date(ts)
    }
}

/// Coerce a raw persistence value into the typed value space.
///
/// This is the pure conversion behind the persister's
/// `convert_attribute_value` seam. `Ok(None)` means the raw value was null.
pub fn coerce(data_type: DataType, raw: &RawValue) -> Result<Option<Value>, CoercionError> {
    if raw.is_null() {
        return Ok(None);
    }

    let value = match data_type {
        DataType::String => match raw {
            RawValue::String(s) => Value::Text(s.clone()),
            RawValue::Number(n) => Value::Text(n.to_string()),
            RawValue::Bool(b) => Value::Text(b.to_string()),
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Integer => match raw {
            RawValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::Int)
                .ok_or_else(|| CoercionError::incompatible(data_type, raw))?,
            RawValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CoercionError::incompatible(data_type, raw))?,
            RawValue::Bool(b) => Value::Int(i64::from(*b)),
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Float => match raw {
            RawValue::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| CoercionError::incompatible(data_type, raw))?,
            RawValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| CoercionError::incompatible(data_type, raw))?,
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Boolean => match raw {
            RawValue::Bool(b) => Value::Bool(*b),
            RawValue::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            RawValue::String(s) => match s.trim() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" | "" => Value::Bool(false),
                _ => return Err(CoercionError::incompatible(data_type, raw)),
            },
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Date => match raw {
            RawValue::Number(n) => n
                .as_i64()
                .map(|secs| Value::Date(Timestamp::from_seconds(secs)))
                .ok_or_else(|| CoercionError::incompatible(data_type, raw))?,
            RawValue::String(s) => Value::Date(Timestamp::parse(s)?),
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Array => match raw {
            RawValue::Array(items) => Value::List(items.iter().map(Value::from_raw).collect()),
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Object => match raw {
            RawValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_raw(v)))
                    .collect(),
            ),
            _ => return Err(CoercionError::incompatible(data_type, raw)),
        },
        DataType::Mixed => Value::Mixed(raw.clone()),
    };

    Ok(Some(value))
}

/// Normalize an already-typed value against an attribute data type.
///
/// Applied to incoming `set` values so comparisons against materialized
/// originals are always like-for-like.
pub fn normalize(data_type: DataType, value: Value) -> Result<Value, CoercionError> {
    let incompatible = |value: &Value| CoercionError::Incompatible {
        data_type,
        found: format!("{value:?}"),
    };

    let normalized = match (data_type, value) {
        (DataType::String, Value::Text(s)) => Value::Text(s),
        (DataType::String, Value::Int(i)) => Value::Text(i.to_string()),
        (DataType::String, Value::Bool(b)) => Value::Text(b.to_string()),
        (DataType::Integer, Value::Int(i)) => Value::Int(i),
        (DataType::Integer, Value::Float(f)) => Value::Int(f as i64),
        (DataType::Integer, Value::Bool(b)) => Value::Int(i64::from(b)),
        (DataType::Float, Value::Float(f)) => Value::Float(f),
        (DataType::Float, Value::Int(i)) => Value::Float(i as f64),
        (DataType::Boolean, Value::Bool(b)) => Value::Bool(b),
        (DataType::Date, Value::Date(ts)) => Value::Date(ts),
        (DataType::Date, Value::Int(secs)) => Value::Date(Timestamp::from_seconds(secs)),
        (DataType::Date, Value::Text(s)) => Value::Date(Timestamp::parse(&s)?),
        (DataType::Array, Value::List(items)) => Value::List(items),
        (DataType::Object, Value::Object(map)) => Value::Object(map),
        (DataType::Mixed, value) => value,
        (_, value) => return Err(incompatible(&value)),
    };

    Ok(normalized)
}
