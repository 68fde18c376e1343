use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Value of a global, group or variable attribute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AttrValue {
    Text(String),
    /// Byte string; read back as [AttrValue::Text].
    Bytes(Vec<u8>),
    Int(i64),
    Float(#[serde(with = "super::float::scalar")] f64),
    Texts(Vec<String>),
    Ints(Vec<i64>),
    Floats(#[serde(with = "super::float::vec")] Vec<f64>),
}

impl AttrValue {
    /// Byte strings become text, anything else is returned as is.
    #[must_use]
    pub fn decoded(self) -> AttrValue {
        match self {
            AttrValue::Bytes(b) => AttrValue::Text(String::from_utf8_lossy(&b).into_owned()),
            other => other,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{s}"),
            AttrValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Texts(v) => write!(f, "{}", v.join(", ")),
            AttrValue::Ints(v) => write!(f, "{v:?}"),
            AttrValue::Floats(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<&[u8]> for AttrValue {
    fn from(b: &[u8]) -> Self {
        AttrValue::Bytes(b.to_vec())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::Texts(v)
    }
}

impl From<&[&str]> for AttrValue {
    fn from(v: &[&str]) -> Self {
        AttrValue::Texts(v.iter().map(ToString::to_string).collect())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::Floats(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_decode_to_text() {
        let value = AttrValue::from(&b"SPEXone"[..]);
        assert_eq!(value.clone().decoded(), AttrValue::Text("SPEXone".into()));
        assert_eq!(value.to_string(), "SPEXone");
    }

    #[test]
    fn serialized_form() {
        let json = serde_json::to_string(&AttrValue::from(-1)).unwrap();
        assert_eq!(json, r#"{"int":-1}"#);
        let back: AttrValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_int(), Some(-1));
    }
}
