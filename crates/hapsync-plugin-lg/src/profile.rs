//! Device capability profiles
//!
//! `GET /devices/{id}/profile` describes what each property of a device can
//! hold:
//!
//! ```json
//! {
//!   "deviceType": "DEVICE_WASHER",
//!   "property": {
//!     "state": { "type": "enum", "value": { "r": [{ "label": ["POWER_OFF", "RUNNING"] }] } },
//!     "reserveTime_H": { "type": "range", "range": { "min": 3, "max": 19, "step": 1 } }
//!   },
//!   "notification": { "push": ["WASHING_IS_COMPLETE"] }
//! }
//! ```

use hapsync_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Whether a value list describes what a device reports or what it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Parsed device profile
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub property: BTreeMap<String, Property>,
    #[serde(default)]
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Property {
    /// `enum`, `range`, `number`, `string` or `boolean`
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<PropertyValues>,
    #[serde(default)]
    pub range: Option<RangeValue>,
}

fn default_kind() -> String {
    "string".to_string()
}

/// Enum values, split by read and write access
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertyValues {
    #[serde(default)]
    pub r: Vec<EnumValue>,
    #[serde(default)]
    pub w: Vec<EnumValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnumValue {
    #[serde(default)]
    pub label: Vec<String>,
}

/// Numeric range; values listed in `except` are not valid
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangeValue {
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub max: i64,
    #[serde(default = "default_step")]
    pub step: i64,
    #[serde(default)]
    pub except: Vec<i64>,
}

fn default_step() -> i64 {
    1
}

impl RangeValue {
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min
            && value <= self.max
            && (self.step <= 1 || (value - self.min) % self.step == 0)
            && !self.except.contains(&value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub push: Vec<String>,
}

impl DeviceProfile {
    /// Parse the `response` object of a profile reply
    pub fn from_json(response: &Value) -> Result<Self> {
        if !response.is_object() {
            return Err(Error::malformed("profile is not an object", response));
        }
        serde_json::from_value(response.clone())
            .map_err(|e| Error::malformed(format!("profile does not parse: {}", e), response))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.property.get(name)
    }

    /// Labels an enum property may take, flattened in profile order
    ///
    /// Empty for unknown or non-enum properties.
    pub fn allowed_values(&self, name: &str, access: Access) -> Vec<&str> {
        let Some(values) = self.property(name).and_then(|p| p.value.as_ref()) else {
            return Vec::new();
        };

        let entries = match access {
            Access::Read => &values.r,
            Access::Write => &values.w,
        };
        entries
            .iter()
            .flat_map(|entry| entry.label.iter().map(String::as_str))
            .collect()
    }

    pub fn range(&self, name: &str) -> Option<&RangeValue> {
        self.property(name).and_then(|p| p.range.as_ref())
    }
}
