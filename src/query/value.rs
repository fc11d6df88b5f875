//! Runtime values for query evaluation.
//!
//! Comparison and arithmetic follow SQLite: NULL propagates through operators,
//! integers widen to floats when mixed, division by zero yields NULL, and the
//! sort order across types is NULL < numbers < text.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    /// Converts a stored JSON value. Arrays and objects become their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; text is parsed, booleans are 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_) | Value::Boolean(_))
    }

    /// Three-valued truth: `None` is SQL unknown.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Text(_) => Some(self.as_f64().is_some_and(|f| f != 0.0)),
        }
    }

    /// SQL comparison. `None` when either side is NULL.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sort_cmp(other))
    }

    /// Total order used by ORDER BY, MIN and MAX: NULL < numbers < text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = a.as_f64().unwrap_or(0.0);
                    let y = b.as_f64().unwrap_or(0.0);
                    x.total_cmp(&y)
                }
            },
        }
    }

    /// Key for grouping and DISTINCT; equal values produce equal keys.
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "n".to_string(),
            Value::Integer(i) => format!("i{i}"),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("i{}", *f as i64),
            Value::Float(f) => format!("f{f}"),
            Value::Boolean(b) => format!("i{}", i64::from(*b)),
            Value::Text(s) => format!("t{s}"),
        }
    }

    pub fn arithmetic(&self, op: Arithmetic, other: &Value) -> Value {
        if self.is_null() || other.is_null() {
            return Value::Null;
        }
        let coerce = |v: &Value| {
            if v.is_numeric() {
                v.clone()
            } else {
                // SQLite reads non-numeric text as 0
                match v.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Integer(f as i64),
                    Some(f) => Value::Float(f),
                    None => Value::Integer(0),
                }
            }
        };
        let (a, b) = (coerce(self), coerce(other));

        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            let result = match op {
                Arithmetic::Add => x.checked_add(y),
                Arithmetic::Subtract => x.checked_sub(y),
                Arithmetic::Multiply => x.checked_mul(y),
                Arithmetic::Divide if y == 0 => return Value::Null,
                Arithmetic::Divide => x.checked_div(y),
                Arithmetic::Modulo if y == 0 => return Value::Null,
                Arithmetic::Modulo => x.checked_rem(y),
            };
            if let Some(result) = result {
                return Value::Integer(result);
            }
        }

        let x = a.as_f64().unwrap_or(0.0);
        let y = b.as_f64().unwrap_or(0.0);
        match op {
            Arithmetic::Add => Value::Float(x + y),
            Arithmetic::Subtract => Value::Float(x - y),
            Arithmetic::Multiply => Value::Float(x * y),
            Arithmetic::Divide if y == 0.0 => Value::Null,
            Arithmetic::Divide => Value::Float(x / y),
            Arithmetic::Modulo if y == 0.0 => Value::Null,
            Arithmetic::Modulo => Value::Float(x % y),
        }
    }

    pub fn negate(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Integer(i) => i
                .checked_neg()
                .map_or(Value::Float(-(*i as f64)), Value::Integer),
            Value::Float(f) => Value::Float(-f),
            Value::Boolean(b) => Value::Integer(-i64::from(*b)),
            Value::Text(_) => Value::Float(-self.as_f64().unwrap_or(0.0)),
        }
    }

    /// Text rendering used by string functions and LIKE.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{}", i64::from(*b)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Option<bool>> for Value {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Value::Null, Value::Boolean)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}
