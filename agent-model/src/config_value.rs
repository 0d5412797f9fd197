#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A typed value retrievable from the Config Store by dotted path
/// (spec §3, §4.8). Mirrors the handful of shapes that actually appear in
/// the configuration surface rather than carrying a fully generic JSON
/// value, so that schema validation (spec §4.10) can check a concrete type
/// tag instead of duck-typing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    StringList(Vec<String>),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::StringList(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// The schema type tag surfaced by `/api/config/schema` (spec §6).
    pub fn type_tag(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::StringList(_) => "string_list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coerces_to_float() {
        let v = ConfigValue::Integer(5);
        assert_eq!(v.as_float(), Some(5.0));
    }

    #[test]
    fn wrong_variant_accessor_returns_none() {
        let v = ConfigValue::String("x".into());
        assert_eq!(v.as_bool(), None);
    }
}
