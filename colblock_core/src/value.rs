use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a [`FlexValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlexType {
    Null = 0,
    Integer = 1,
    Float = 2,
    String = 3,
    Vector = 4,
}

impl FlexType {
    pub fn from_u8(tag: u8) -> Option<FlexType> {
        match tag {
            0 => Some(FlexType::Null),
            1 => Some(FlexType::Integer),
            2 => Some(FlexType::Float),
            3 => Some(FlexType::String),
            4 => Some(FlexType::Vector),
            _ => None,
        }
    }
}

/// A single decoded column value.
///
/// Serializes untagged, so the JSON form of a value is just the value:
/// `null`, `42`, `1.5`, `"abc"` or `[1.0, 2.0]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexValue {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Vector(Vec<f64>),
}

impl FlexValue {
    pub fn flex_type(&self) -> FlexType {
        match self {
            FlexValue::Null => FlexType::Null,
            FlexValue::Integer(_) => FlexType::Integer,
            FlexValue::Float(_) => FlexType::Float,
            FlexValue::String(_) => FlexType::String,
            FlexValue::Vector(_) => FlexType::Vector,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FlexValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FlexValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FlexValue::Float(v) => Some(*v),
            FlexValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlexValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FlexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlexValue::Null => f.write_str("null"),
            FlexValue::Integer(v) => write!(f, "{v}"),
            FlexValue::Float(v) => write!(f, "{v}"),
            FlexValue::String(s) => write!(f, "{s:?}"),
            FlexValue::Vector(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for FlexValue {
    fn from(v: i64) -> Self {
        FlexValue::Integer(v)
    }
}

impl From<f64> for FlexValue {
    fn from(v: f64) -> Self {
        FlexValue::Float(v)
    }
}

impl From<&str> for FlexValue {
    fn from(v: &str) -> Self {
        FlexValue::String(v.to_string())
    }
}

impl From<String> for FlexValue {
    fn from(v: String) -> Self {
        FlexValue::String(v)
    }
}

impl From<Vec<f64>> for FlexValue {
    fn from(v: Vec<f64>) -> Self {
        FlexValue::Vector(v)
    }
}

impl<T: Into<FlexValue>> From<Option<T>> for FlexValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FlexValue::Null, Into::into)
    }
}
