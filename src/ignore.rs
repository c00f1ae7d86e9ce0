//! Ledger of post numbers already acted upon by the filter watcher.
//!
//! The set is global across sites and boards. It is bounded: an addition that
//! would push it past capacity clears it first.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::constants::IGNORE_SET_KEY;
use crate::state::StateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreSet {
    ids: HashSet<u64>,
    capacity: usize,
}

impl IgnoreSet {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            capacity,
        }
    }

    /// Decode a persisted JSON array of post numbers.
    ///
    /// Missing, corrupt or oversized data yields an empty set.
    #[must_use]
    pub fn from_json(raw: Option<&str>, capacity: usize) -> Self {
        let mut set = Self::new(capacity);
        let Some(raw) = raw else {
            return set;
        };
        match serde_json::from_str::<Vec<u64>>(raw) {
            Ok(ids) if ids.len() <= capacity => set.ids.extend(ids),
            Ok(ids) => {
                warn!(
                    len = ids.len(),
                    capacity, "Persisted ignore set over capacity, starting empty"
                );
            }
            Err(e) => warn!("Persisted ignore set is corrupt, starting empty: {e}"),
        }
        set
    }

    /// Encode as a JSON array, sorted for stable output.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut ids: Vec<u64> = self.ids.iter().copied().collect();
        ids.sort_unstable();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Clear the whole set if adding `pending` more entries would exceed
    /// capacity. Returns whether it cleared.
    pub fn clear_if_over_capacity(&mut self, pending: usize) -> bool {
        if self.ids.len().saturating_add(pending) > self.capacity {
            debug!(
                current = self.ids.len(),
                pending,
                capacity = self.capacity,
                "Ignore set over capacity, clearing"
            );
            self.ids.clear();
            true
        } else {
            false
        }
    }

    /// Add post numbers, clearing first if the addition would overflow.
    ///
    /// Only numbers not already present count toward the overflow check. If
    /// the new numbers alone exceed capacity, the first `capacity` are kept.
    pub fn add_all(&mut self, ids: impl IntoIterator<Item = u64>) {
        let new: Vec<u64> = {
            let mut seen = HashSet::new();
            ids.into_iter()
                .filter(|id| !self.ids.contains(id) && seen.insert(*id))
                .collect()
        };
        if new.is_empty() {
            return;
        }
        self.clear_if_over_capacity(new.len());
        self.ids.extend(new.into_iter().take(self.capacity));
    }

    /// Keep only the numbers present in `ids`.
    pub fn retain_all(&mut self, ids: &HashSet<u64>) {
        self.ids.retain(|id| ids.contains(id));
    }

    /// Iterate over the stored numbers in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }
}

/// An [`IgnoreSet`] bound to its durable slot.
pub struct IgnoreLedger {
    set: IgnoreSet,
    store: Arc<dyn StateStore>,
}

impl IgnoreLedger {
    /// Load the set from the store. A read failure degrades to an empty set.
    pub async fn load(store: Arc<dyn StateStore>, capacity: usize) -> Self {
        let raw = match store.get(IGNORE_SET_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read persisted ignore set, starting empty: {e:#}");
                None
            }
        };
        let set = IgnoreSet::from_json(raw.as_deref(), capacity);
        debug!(len = set.len(), "Loaded ignore set");
        Self { set, store }
    }

    #[must_use]
    pub fn set(&self) -> &IgnoreSet {
        &self.set
    }

    pub fn set_mut(&mut self) -> &mut IgnoreSet {
        &mut self.set
    }

    /// Write the current set to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails or panics.
    pub async fn persist(&self) -> Result<()> {
        let json = self.set.to_json();
        AssertUnwindSafe(self.store.put(IGNORE_SET_KEY, &json))
            .catch_unwind()
            .await
            .map_err(|_| anyhow!("State store panicked"))
            .and_then(|result| result)
            .context("Failed to persist ignore set")
    }
}
