use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dynamic value type for node inputs/outputs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Record(Record),
}

/// A domain struct carried through the graph, tagged with its kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub kind: String,
    pub data: serde_json::Value,
}

/// Implemented by domain types that travel as [`Value::Record`].
pub trait RecordType: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

impl Value {
    /// Encode a domain struct as a tagged record.
    pub fn record<T: RecordType>(value: &T) -> Result<Value, serde_json::Error> {
        Ok(Value::Record(Record {
            kind: T::KIND.to_string(),
            data: serde_json::to_value(value)?,
        }))
    }

    /// Decode a record of kind `T::KIND`; `None` for any other value.
    pub fn to_record<T: RecordType>(&self) -> Option<T> {
        match self {
            Value::Record(r) if r.kind == T::KIND => serde_json::from_value(r.data.clone()).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::Json(_) => "json".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(_) => "object".to_string(),
            Value::Record(r) => format!("record<{}>", r.kind),
        }
    }
}

/// Type tag a port declares for the values it holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Any,
    Bool,
    Number,
    String,
    Bytes,
    Json,
    Array,
    Object,
    Record(String),
}

impl ValueType {
    pub fn record<T: RecordType>() -> Self {
        ValueType::Record(T::KIND.to_string())
    }

    /// Whether `value` satisfies this tag. `Null` is only accepted by `Any`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_))
            | (ValueType::Number, Value::Number(_))
            | (ValueType::String, Value::String(_))
            | (ValueType::Bytes, Value::Bytes(_))
            | (ValueType::Json, Value::Json(_))
            | (ValueType::Array, Value::Array(_))
            | (ValueType::Object, Value::Object(_)) => true,
            (ValueType::Record(kind), Value::Record(r)) => *kind == r.kind,
            _ => false,
        }
    }

    /// Whether an output of this type may feed an input of type `target`.
    pub fn is_compatible_with(&self, target: &ValueType) -> bool {
        matches!(self, ValueType::Any) || matches!(target, ValueType::Any) || self == target
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Number => f.write_str("number"),
            ValueType::String => f.write_str("string"),
            ValueType::Bytes => f.write_str("bytes"),
            ValueType::Json => f.write_str("json"),
            ValueType::Array => f.write_str("array"),
            ValueType::Object => f.write_str("object"),
            ValueType::Record(kind) => write!(f, "record<{}>", kind),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
