//! Key/value persistence seam.
//!
//! The engine persists JSON documents through this trait; the host decides
//! where they live. [`MemoryKv`] backs tests and the simulator,
//! [`super::SqliteKv`] backs a durable installation.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store with sessionStorage-like semantics.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_round_trips() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("missing").await.unwrap(), None);

        kv.set("swt-status", "{}").await.unwrap();
        assert_eq!(kv.get("swt-status").await.unwrap().as_deref(), Some("{}"));

        kv.set("swt-status", "{\"id\":\"x\"}").await.unwrap();
        assert_eq!(
            kv.get("swt-status").await.unwrap().as_deref(),
            Some("{\"id\":\"x\"}")
        );
    }
}
