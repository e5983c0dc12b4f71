use serde::{Deserialize, Serialize};

/// Unique identifier for a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WorkId(pub String);

impl WorkId {
    /// Generates a new random UUID v4-based WorkId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

/// The definition of a unit of work.
///
/// Work travels between nodes by value, so it names a registered handler
/// rather than carrying code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    #[serde(default)]
    pub id: WorkId,
    /// The name of the registered handler to invoke.
    pub handler: String,
    /// Arbitrary JSON payload passed to the handler function.
    #[serde(default, with = "json_payload")]
    pub payload: serde_json::Value,
    /// Whether the work may leave the submitting node at all.
    #[serde(default)]
    pub distributable: bool,
    /// Selects the long-running worker pool instead of the short-running one.
    #[serde(default)]
    pub long_running: bool,
}

impl Work {
    pub fn new(handler: &str, payload: serde_json::Value) -> Self {
        Self {
            id: WorkId::new(),
            handler: handler.to_string(),
            payload,
            distributable: false,
            long_running: false,
        }
    }

    pub fn distributable(mut self) -> Self {
        self.distributable = true;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }
}

/// Binary formats carry the payload as JSON text, since decoding a
/// `serde_json::Value` needs a self-describing format.
mod json_payload {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            return value.serialize(serializer);
        }
        let text = serde_json::to_string(value).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        if deserializer.is_human_readable() {
            return Value::deserialize(deserializer);
        }
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
