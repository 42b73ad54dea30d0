use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat normalized state of a device
pub type StateMap = BTreeMap<String, StateValue>;

/// A single scalar state value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Explicitly absent value
    Null,
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
}

impl StateValue {
    /// Convert a scalar JSON value; arrays and objects yield `None`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<StateValue>> From<Option<T>> for StateValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_json_converts() {
        assert_eq!(
            StateValue::from_json(&serde_json::json!("RINSING")),
            Some(StateValue::Text("RINSING".into()))
        );
        assert_eq!(StateValue::from_json(&serde_json::json!(12)), Some(StateValue::Int(12)));
        assert_eq!(StateValue::from_json(&serde_json::json!(null)), Some(StateValue::Null));
        assert_eq!(StateValue::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn untagged_serialization_is_plain_json() {
        let mut map = StateMap::new();
        map.insert("state".into(), "RUNNING".into());
        map.insert("remain_time_m".into(), 42i64.into());
        map.insert("remote_start".into(), true.into());
        map.insert("error".into(), StateValue::from(None::<String>));

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": null,
                "remain_time_m": 42,
                "remote_start": true,
                "state": "RUNNING",
            })
        );

        let back: StateMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn accessors_reject_other_variants() {
        let text = StateValue::from("x");
        assert_eq!(text.as_i64(), None);
        assert_eq!(text.as_bool(), None);
        assert_eq!(StateValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(StateValue::Int(3).as_str(), None);
    }
}
