use serde::{Deserialize, Serialize};
use serde_json::Value;

// https://github.com/homebridge/HAP-NodeJS/blob/latest/src/lib/definitions/ServiceDefinitions.ts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HapService {
    AccessoryInformation,
    HumiditySensor,
    InputSource,
    OccupancySensor,
    Switch,
    Television,
}

// https://github.com/homebridge/HAP-NodeJS/blob/latest/src/lib/definitions/CharacteristicDefinitions.ts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HapCharacteristic {
    Active,
    ActiveIdentifier,
    ConfiguredName,
    CurrentRelativeHumidity,
    Identifier,
    Model,
    Name,
    OccupancyDetected,
    On,
    StatusActive,
    StatusTampered,
}

/// One characteristic of one named service, with its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub service_name: String,
    pub service: HapService,
    pub characteristic: HapCharacteristic,
    pub value: Value,
}

impl Characteristic {
    pub fn new(
        service_name: impl Into<String>,
        service: HapService,
        characteristic: HapCharacteristic,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service,
            characteristic,
            value: value.into(),
        }
    }
}

/// Find a characteristic by service and kind
pub fn find<'a>(
    characteristics: &'a [Characteristic],
    service: HapService,
    characteristic: HapCharacteristic,
) -> Option<&'a Value> {
    characteristics
        .iter()
        .find(|c| c.service == service && c.characteristic == characteristic)
        .map(|c| &c.value)
}
