//! Result values and state-variable type coercion.

use std::collections::BTreeMap;
use std::fmt;

use crate::ModelError;

/// A single decoded result value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(untagged))]
pub enum Value {
    Str(String),
    Bool(bool),
    /// `ui1`/`ui2`/`ui4`; widened because devices report counters above 2^32.
    UInt(u64),
    Int(i64),
    /// Only produced by JSON backends.
    Float(f64),
}

/// Flat result of one action call, keyed by state-variable name.
pub type ResultRecord = BTreeMap<String, Value>;

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// Primitive type tag of a state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    Boolean,
    Ui1,
    Ui2,
    Ui4,
    I4,
    DateTime,
    Uuid,
    /// Tag not understood by this crate; coercion fails with the raw value.
    Other(String),
}

impl DataType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => DataType::String,
            "boolean" => DataType::Boolean,
            "ui1" => DataType::Ui1,
            "ui2" => DataType::Ui2,
            "ui4" => DataType::Ui4,
            "i4" => DataType::I4,
            "dateTime" => DataType::DateTime,
            "uuid" => DataType::Uuid,
            other => DataType::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Ui1 => "ui1",
            DataType::Ui2 => "ui2",
            DataType::Ui4 => "ui4",
            DataType::I4 => "i4",
            DataType::DateTime => "dateTime",
            DataType::Uuid => "uuid",
            DataType::Other(tag) => tag,
        }
    }

    /// Convert the raw element text of a response into a typed value.
    pub fn coerce(&self, raw: &str) -> Result<Value, ModelError> {
        match self {
            DataType::String | DataType::DateTime | DataType::Uuid => Ok(Value::Str(raw.into())),
            DataType::Boolean => Ok(Value::Bool(raw == "1")),
            DataType::Ui1 | DataType::Ui2 | DataType::Ui4 => raw
                .parse::<u64>()
                .map(Value::UInt)
                .map_err(|err| self.parse_error(raw, err)),
            DataType::I4 => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|err| self.parse_error(raw, err)),
            DataType::Other(tag) => Err(ModelError::UnknownDataType {
                data_type: tag.clone(),
                value: raw.to_string(),
            }),
        }
    }

    fn parse_error(&self, raw: &str, err: std::num::ParseIntError) -> ModelError {
        ModelError::Parse {
            data_type: self.tag().to_string(),
            value: raw.to_string(),
            reason: err.to_string(),
        }
    }
}
