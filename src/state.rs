//! Durable string-keyed state slots.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// A durable key-value store. Last write wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a slot.
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one slot pre-populated.
    #[must_use]
    pub fn with_slot(key: &str, value: &str) -> Self {
        let mut slots = HashMap::new();
        slots.insert(key.to_string(), value.to_string());
        Self {
            slots: RwLock::new(slots),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.slots
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
