//! Washer state parsing and command encoding
//!
//! ThinQ washer snapshots look like:
//!
//! ```json
//! {
//!   "runState": { "currentState": "RUNNING" },
//!   "remoteControlEnable": { "remoteControlEnabled": true },
//!   "timer": { "remainHour": 0, "remainMinute": 42, "totalHour": 1, "totalMinute": 10,
//!              "relativeHourToStart": 0, "relativeMinuteToStart": 0 },
//!   "cycle": { "cycleCount": 17 },
//!   "location": { "locationName": "MAIN" },
//!   "error": null
//! }
//! ```
//!
//! Only `runState.currentState` is required; every other block may be absent.

use hapsync_core::{Error, NormalizedCommand, Result, StateMap, StateValue};
use serde_json::{Value, json};

/// Run states reported while a cycle is in progress
const RUNNING_STATES: &[&str] = &[
    "RUNNING",
    "PREWASH",
    "WASH",
    "RINSE",
    "RINSING",
    "SPIN",
    "SPINNING",
    "DRYING",
    "SMART_WASH_MAIN",
    "SMART_RINSE",
    "SMART_SPINNING",
];

/// Largest accepted start delay, in hours
pub const MAX_DELAY_HOURS: u8 = 19;

pub mod keys {
    pub const STATE: &str = "state";
    pub const REMOTE_START: &str = "remote_start";
    pub const REMAIN_TIME_H: &str = "remain_time_h";
    pub const REMAIN_TIME_M: &str = "remain_time_m";
    pub const RESERVE_TIME_H: &str = "reserve_time_h";
    pub const RESERVE_TIME_M: &str = "reserve_time_m";
    pub const INITIAL_TIME_H: &str = "initial_time_h";
    pub const INITIAL_TIME_M: &str = "initial_time_m";
    pub const TCL_COUNT: &str = "tcl_count";
    pub const CURRENT_STATE: &str = "current_state";
    pub const ERROR: &str = "error";
}

/// Typed washer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasherState {
    /// Run state, e.g. `POWER_OFF`, `RUNNING`, `RINSING`
    pub state: String,
    pub remote_start: Option<bool>,
    pub remain_time_h: Option<i64>,
    pub remain_time_m: Option<i64>,
    pub reserve_time_h: Option<i64>,
    pub reserve_time_m: Option<i64>,
    pub initial_time_h: Option<i64>,
    pub initial_time_m: Option<i64>,
    pub tcl_count: Option<i64>,
    /// Location name of the drum (`MAIN` or `MINI`)
    pub current_state: Option<String>,
    pub error: Option<String>,
}

impl WasherState {
    /// Parse a raw ThinQ snapshot
    ///
    /// Fails with `MalformedPayload` when the snapshot is not an object or
    /// `runState.currentState` is missing or not a string.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        if !snapshot.is_object() {
            return Err(Error::malformed("washer snapshot is not an object", snapshot));
        }

        let state = snapshot
            .pointer("/runState/currentState")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("missing runState.currentState", snapshot))?
            .to_string();

        let timer = |field: &str| {
            snapshot
                .get("timer")
                .and_then(|t| t.get(field))
                .and_then(Value::as_i64)
        };

        Ok(Self {
            state,
            remote_start: snapshot
                .pointer("/remoteControlEnable/remoteControlEnabled")
                .and_then(parse_flag),
            remain_time_h: timer("remainHour"),
            remain_time_m: timer("remainMinute"),
            reserve_time_h: timer("relativeHourToStart"),
            reserve_time_m: timer("relativeMinuteToStart"),
            initial_time_h: timer("totalHour"),
            initial_time_m: timer("totalMinute"),
            tcl_count: snapshot.pointer("/cycle/cycleCount").and_then(Value::as_i64),
            current_state: snapshot
                .pointer("/location/locationName")
                .and_then(Value::as_str)
                .map(str::to_string),
            error: match snapshot.get("error") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            },
        })
    }

    /// Rebuild the typed view from a normalized state map
    ///
    /// Returns `None` if the map carries no `state` key.
    pub fn from_state_map(map: &StateMap) -> Option<Self> {
        let int = |key: &str| map.get(key).and_then(StateValue::as_i64);
        let text = |key: &str| map.get(key).and_then(StateValue::as_str).map(str::to_string);

        Some(Self {
            state: text(keys::STATE)?,
            remote_start: map.get(keys::REMOTE_START).and_then(StateValue::as_bool),
            remain_time_h: int(keys::REMAIN_TIME_H),
            remain_time_m: int(keys::REMAIN_TIME_M),
            reserve_time_h: int(keys::RESERVE_TIME_H),
            reserve_time_m: int(keys::RESERVE_TIME_M),
            initial_time_h: int(keys::INITIAL_TIME_H),
            initial_time_m: int(keys::INITIAL_TIME_M),
            tcl_count: int(keys::TCL_COUNT),
            current_state: text(keys::CURRENT_STATE),
            error: text(keys::ERROR),
        })
    }

    /// Flatten into the normalized state map; absent fields become `Null`
    pub fn to_state_map(&self) -> StateMap {
        let mut map = StateMap::new();
        map.insert(keys::STATE.into(), self.state.as_str().into());
        map.insert(keys::REMOTE_START.into(), self.remote_start.into());
        map.insert(keys::REMAIN_TIME_H.into(), self.remain_time_h.into());
        map.insert(keys::REMAIN_TIME_M.into(), self.remain_time_m.into());
        map.insert(keys::RESERVE_TIME_H.into(), self.reserve_time_h.into());
        map.insert(keys::RESERVE_TIME_M.into(), self.reserve_time_m.into());
        map.insert(keys::INITIAL_TIME_H.into(), self.initial_time_h.into());
        map.insert(keys::INITIAL_TIME_M.into(), self.initial_time_m.into());
        map.insert(keys::TCL_COUNT.into(), self.tcl_count.into());
        map.insert(keys::CURRENT_STATE.into(), self.current_state.clone().into());
        map.insert(keys::ERROR.into(), self.error.clone().into());
        map
    }

    pub fn is_running(&self) -> bool {
        RUNNING_STATES.contains(&self.state.as_str())
    }

    /// Whether the washer is powered on, in any phase
    pub fn is_powered(&self) -> bool {
        self.state != "POWER_OFF"
    }

    pub fn is_paused(&self) -> bool {
        self.state == "PAUSE"
    }

    /// Whether the washer is in the rinse phase
    pub fn is_rinsing(&self) -> bool {
        self.state == "RINSING"
    }

    pub fn is_complete(&self) -> bool {
        self.state == "COMPLETE"
    }

    pub fn has_error(&self) -> bool {
        self.state == "ERROR" || self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Remaining cycle time in minutes
    pub fn remaining_minutes(&self) -> i64 {
        self.remain_time_h.unwrap_or(0) * 60 + self.remain_time_m.unwrap_or(0)
    }

    pub fn is_remote_start_enabled(&self) -> bool {
        self.remote_start == Some(true)
    }
}

/// ThinQ reports the remote-control flag either as a bool or as "ON"/"OFF"
fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("ON") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("OFF") => Some(false),
        _ => None,
    }
}

/// Drum selected by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasherLocation {
    Main,
    Mini,
}

impl WasherLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Mini => "MINI",
        }
    }
}

/// Operation requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasherOperation {
    Start,
    Stop,
    PowerOff,
}

impl WasherOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::PowerOff => "POWER_OFF",
        }
    }
}

/// Validated washer command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WasherCommand {
    pub location: Option<WasherLocation>,
    pub operation: Option<WasherOperation>,
    /// Start delay in hours, 0..=19
    pub delay_hours: Option<u8>,
}

impl WasherCommand {
    /// Validate a normalized command
    ///
    /// Accepted keys: `location` (MAIN|MINI), `operation`
    /// (START|STOP|POWER_OFF), `delay_hours` (0..=19). Anything else fails
    /// with `InvalidCommand`.
    pub fn from_normalized(command: &NormalizedCommand) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::invalid_command("empty command"));
        }

        let mut parsed = Self::default();
        for (key, value) in command.iter() {
            match key {
                "location" => {
                    parsed.location = Some(match value.as_str() {
                        Some("MAIN") => WasherLocation::Main,
                        Some("MINI") => WasherLocation::Mini,
                        _ => {
                            return Err(Error::invalid_command(format!(
                                "location must be MAIN or MINI, got {}",
                                value
                            )));
                        }
                    });
                }
                "operation" => {
                    parsed.operation = Some(match value.as_str() {
                        Some("START") => WasherOperation::Start,
                        Some("STOP") => WasherOperation::Stop,
                        Some("POWER_OFF") => WasherOperation::PowerOff,
                        _ => {
                            return Err(Error::invalid_command(format!(
                                "operation must be START, STOP or POWER_OFF, got {}",
                                value
                            )));
                        }
                    });
                }
                "delay_hours" => {
                    let hours = value
                        .as_u64()
                        .filter(|h| *h <= u64::from(MAX_DELAY_HOURS))
                        .ok_or_else(|| {
                            Error::invalid_command(format!(
                                "delay_hours must be between 0 and {}, got {}",
                                MAX_DELAY_HOURS, value
                            ))
                        })?;
                    parsed.delay_hours = Some(hours as u8);
                }
                other => {
                    return Err(Error::invalid_command(format!("unknown washer key: {}", other)));
                }
            }
        }

        Ok(parsed)
    }

    /// Encode as a ThinQ control payload; unset fields are omitted
    pub fn to_api_format(&self) -> Value {
        let mut payload = serde_json::Map::new();
        if let Some(location) = self.location {
            payload.insert("location".into(), json!({ "locationName": location.as_str() }));
        }
        if let Some(operation) = self.operation {
            payload.insert(
                "operation".into(),
                json!({ "washerOperationMode": operation.as_str() }),
            );
        }
        if let Some(hours) = self.delay_hours {
            payload.insert("timer".into(), json!({ "relativeHourToStart": hours }));
        }
        Value::Object(payload)
    }
}
