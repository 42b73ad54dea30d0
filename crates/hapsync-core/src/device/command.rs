use serde_json::Value;

/// Brand-agnostic command built by callers and encoded by the owning plugin
///
/// Keys keep insertion order; setting an existing key replaces its value in
/// place.
///
/// ```rust
/// use hapsync_core::NormalizedCommand;
///
/// let cmd = NormalizedCommand::new()
///     .with("location", "MAIN")
///     .with("operation", "START")
///     .with("delay_hours", 2);
/// assert_eq!(cmd.get("operation").and_then(|v| v.as_str()), Some("START"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedCommand {
    entries: Vec<(String, Value)>,
}

impl NormalizedCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Add or replace a key in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object, for logging
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_without_reordering() {
        let cmd = NormalizedCommand::new()
            .with("operation", "START")
            .with("delay_hours", 1)
            .with("operation", "STOP");

        let keys: Vec<_> = cmd.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["operation", "delay_hours"]);
        assert_eq!(cmd.get("operation"), Some(&Value::from("STOP")));
        assert_eq!(cmd.len(), 2);
    }
}
