// Localized string lookup

use std::collections::HashMap;

/// Localized string provider
pub trait Localizer: Send + Sync {
    /// Look up the string for a key. Unknown keys echo the key itself.
    fn t(&self, key: &str) -> String;
}

/// String catalog with built-in English strings.
/// Additional or overriding strings can be merged from a JSON object map.
pub struct Catalog {
    strings: HashMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        let mut strings = HashMap::new();
        for (key, value) in [
            ("chat.status.connecting", "Connecting to relay..."),
            ("chat.status.connected", "Connected"),
            ("chat.status.closed", "Connection closed"),
            ("chat.errors.socket", "Relay connection error"),
            ("chat.errors.not-connected", "Not connected to a relay"),
            ("chat.errors.send-timeout", "Message send timed out"),
        ] {
            strings.insert(key.to_string(), value.to_string());
        }
        Self { strings }
    }

    /// Merge strings from a JSON object map, overriding built-ins
    pub fn merge_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let map: HashMap<String, String> = serde_json::from_str(json)?;
        self.strings.extend(map);
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Localizer for Catalog {
    fn t(&self, key: &str) -> String {
        match self.strings.get(key) {
            Some(value) => value.clone(),
            None => key.to_string(),
        }
    }
}
