//! Positional result rows.

use std::fmt;

use datafusion::scalar::ScalarValue;

/// A typed scalar from an executed plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

/// One result row; column order follows the plan's output columns.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; text is parsed, blank text is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Float(_) => None,
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
            }
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// JSON form; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(scalar: ScalarValue) -> Self {
        if scalar.is_null() {
            return Value::Null;
        }
        match scalar {
            ScalarValue::Int8(Some(v)) => Value::Int(v as i64),
            ScalarValue::Int16(Some(v)) => Value::Int(v as i64),
            ScalarValue::Int32(Some(v)) => Value::Int(v as i64),
            ScalarValue::Int64(Some(v)) => Value::Int(v),
            ScalarValue::UInt8(Some(v)) => Value::Int(v as i64),
            ScalarValue::UInt16(Some(v)) => Value::Int(v as i64),
            ScalarValue::UInt32(Some(v)) => Value::Int(v as i64),
            ScalarValue::UInt64(Some(v)) => i64::try_from(v)
                .map(Value::Int)
                .unwrap_or(Value::Float(v as f64)),
            ScalarValue::Float32(Some(v)) => Value::Float(v as f64),
            ScalarValue::Float64(Some(v)) => Value::Float(v),
            ScalarValue::Utf8(Some(s))
            | ScalarValue::LargeUtf8(Some(s))
            | ScalarValue::Utf8View(Some(s)) => Value::Text(s),
            ScalarValue::Boolean(Some(b)) => Value::Text(b.to_string()),
            other => match other.to_string().parse::<f64>() {
                // Decimals and the like
                Ok(v) => Value::Float(v),
                Err(_) => Value::Text(other.to_string()),
            },
        }
    }
}
