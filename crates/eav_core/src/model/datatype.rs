//! Attribute datatypes, canonical values and input coercion.
//!
//! # Responsibility
//! - Enumerate the value kinds an attribute may hold.
//! - Convert loosely-typed caller input (`RawValue`) into a canonical `Value`.
//!
//! # Invariants
//! - `String`, `Boolean` and `Time` accept only their exact input variant.
//! - `Number` accepts any integer or float input and normalizes to `f64`.
//! - Persisted datatype codes are stable: `1..=4`; `0` is never written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Value kind an attribute is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// UTF-8 text.
    String,
    /// Double-precision float. All numeric inputs normalize here.
    Number,
    /// True/false flag.
    Boolean,
    /// UTC timestamp.
    Time,
}

impl DataType {
    /// All supported datatypes in code order.
    pub const ALL: [DataType; 4] = [
        DataType::String,
        DataType::Number,
        DataType::Boolean,
        DataType::Time,
    ];

    /// Integer code stored in `eav_schema.datatype`.
    pub fn code(self) -> i64 {
        match self {
            Self::String => 1,
            Self::Number => 2,
            Self::Boolean => 3,
            Self::Time => 4,
        }
    }

    /// Resolves a persisted code. Unknown codes (including `0`) yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::String),
            2 => Some(Self::Number),
            3 => Some(Self::Boolean),
            4 => Some(Self::Time),
            _ => None,
        }
    }

    /// Lowercase display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Time => "time",
        }
    }

    /// Coerces caller input into the canonical value for this datatype.
    ///
    /// # Errors
    /// - Returns `CoercionError` when `raw` has no lossless mapping to `self`,
    ///   including NaN offered to `Number`.
    pub fn coerce(self, raw: RawValue) -> Result<Value, CoercionError> {
        let offered = raw.kind_name();
        let mismatch = || CoercionError {
            offered,
            expected: self,
        };

        match (self, raw) {
            (Self::String, RawValue::Text(text)) => Ok(Value::String(text)),
            (Self::Boolean, RawValue::Boolean(flag)) => Ok(Value::Boolean(flag)),
            (Self::Time, RawValue::Time(at)) => Ok(Value::Time(at)),
            (Self::Number, RawValue::Integer(number)) => Ok(Value::Number(number as f64)),
            (Self::Number, RawValue::Unsigned(number)) => Ok(Value::Number(number as f64)),
            // SQLite reads a stored NaN back as NULL.
            (Self::Number, RawValue::Float(number)) if number.is_nan() => Err(CoercionError {
                offered: "NaN",
                expected: self,
            }),
            (Self::Number, RawValue::Float(number)) => Ok(Value::Number(number)),
            _ => Err(mismatch()),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "time" => Ok(Self::Time),
            other => Err(format!(
                "unsupported datatype `{other}`; expected string|number|boolean|time"
            )),
        }
    }
}

/// Loosely-typed caller input, prior to coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
    Time(DateTime<Utc>),
}

impl RawValue {
    /// Short input-kind label used in coercion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Unsigned(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Time(_) => "time",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for RawValue {
    fn from(value: u32) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<f32> for RawValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Number(number) => Self::Float(number),
            Value::Boolean(flag) => Self::Boolean(flag),
            Value::Time(at) => Self::Time(at),
        }
    }
}

/// Canonical typed value of one datom.
///
/// Exactly one alternative exists per value, so a datom can never carry
/// zero or several populated slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Time(DateTime<Utc>),
}

impl Value {
    /// Datatype this value belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Number(_) => DataType::Number,
            Self::Boolean(_) => DataType::Boolean,
            Self::Time(_) => DataType::Time,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(at) => Some(*at),
            _ => None,
        }
    }
}

/// Input could not be converted to the declared datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoercionError {
    /// Kind label of the rejected input.
    pub offered: &'static str,
    /// Datatype the input was coerced against.
    pub expected: DataType,
}

impl Display for CoercionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot assign {} to {}", self.offered, self.expected)
    }
}

impl Error for CoercionError {}
