use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{WireBody, WireError};

/// Key of the serializer every registry starts with.
pub const DEFAULT_SERIALIZER: &str = "default";

/// Converts frame bodies to and from payload bytes. Framing treats the bytes as opaque.
pub trait Serializer: Send + Sync {
    fn serialize(&self, body: &WireBody) -> Result<Vec<u8>, WireError>;
    fn deserialize(&self, payload: &[u8]) -> Result<WireBody, WireError>;
}

/// The `"default"` serializer: `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, body: &WireBody) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(body).map_err(|e| WireError::Serialization(e.to_string()))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<WireBody, WireError> {
        serde_json::from_slice(payload).map_err(|e| WireError::Serialization(e.to_string()))
    }
}

/// Serializers selectable by string key from [`RemoteSettings`](crate::remote::RemoteSettings).
///
/// Cloning shares the table.
#[derive(Clone)]
pub struct SerializerRegistry {
    serializers: Arc<RwLock<HashMap<String, Arc<dyn Serializer>>>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        let mut serializers: HashMap<String, Arc<dyn Serializer>> = HashMap::new();
        serializers.insert(DEFAULT_SERIALIZER.to_string(), Arc::new(JsonSerializer));
        Self {
            serializers: Arc::new(RwLock::new(serializers)),
        }
    }

    /// Adds or replaces the serializer under `key`.
    pub fn register(&self, key: impl Into<String>, serializer: Arc<dyn Serializer>) {
        self.serializers.write().insert(key.into(), serializer);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Serializer>, WireError> {
        self.serializers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| WireError::UnknownSerializer(key.to_string()))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.serializers.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_registered() {
        let registry = SerializerRegistry::new();
        assert!(registry.get(DEFAULT_SERIALIZER).is_ok());
        assert_eq!(
            registry.get("msgpack").err(),
            Some(WireError::UnknownSerializer("msgpack".into()))
        );
    }

    #[test]
    fn test_registries_are_isolated() {
        let a = SerializerRegistry::new();
        let b = SerializerRegistry::new();
        a.register("json2", Arc::new(JsonSerializer));
        assert!(a.get("json2").is_ok());
        assert!(b.get("json2").is_err());
        assert!(a.clone().get("json2").is_ok());
    }
}
