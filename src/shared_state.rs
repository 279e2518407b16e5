// =============================================================================
// Shared State Map — process-wide belief-state store
// =============================================================================
//
// A flat key -> JSON-blob store. Concurrent writes are last-writer-wins;
// readers may observe stale values. No caller requires read-modify-write
// atomicity, so a single `RwLock<HashMap<..>>` is sufficient.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub struct SharedState {
    inner: RwLock<HashMap<String, serde_json::Value>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Overwrite `key` with `value`.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        if let Ok(json) = serde_json::to_value(value) {
            self.inner.write().insert(key.into(), json);
        }
    }

    /// Read and deserialize the value at `key`, if present and well-formed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let guard = self.inner.read();
        let value = guard.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn delete(&self, key: &str) {
        self.inner.write().remove(key);
    }

    /// Keys whose name starts with `prefix`, in arbitrary order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let s = SharedState::new();
        s.set("policy:a", &42i32);
        assert_eq!(s.get::<i32>("policy:a"), Some(42));
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let s = SharedState::new();
        s.set("k", &1i32);
        s.set("k", &2i32);
        assert_eq!(s.get::<i32>("k"), Some(2));
    }

    #[test]
    fn get_missing_key_is_none() {
        let s = SharedState::new();
        assert_eq!(s.get::<i32>("missing"), None);
    }

    #[test]
    fn keys_with_prefix_filters() {
        let s = SharedState::new();
        s.set("policy:a", &1i32);
        s.set("policy:b", &2i32);
        s.set("other:c", &3i32);
        let mut keys = s.keys_with_prefix("policy:");
        keys.sort();
        assert_eq!(keys, vec!["policy:a".to_string(), "policy:b".to_string()]);
    }

    #[test]
    fn delete_removes_key() {
        let s = SharedState::new();
        s.set("k", &1i32);
        s.delete("k");
        assert_eq!(s.get::<i32>("k"), None);
    }
}
