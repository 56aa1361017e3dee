use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{planner, store::KeyValueStore};

/// Store key holding the delivered-marker set.
pub const DELIVERED_KEY: &str = "larder.expiry.delivered.v1";

/// Durable set of notification ids that have already fired and been shown.
///
/// Markers stop a reminder from being re-sent for the same `(item, offset)`
/// and are cleared only when the item is deleted. There is no age-based
/// pruning; the set grows with the lifetime of the pantry.
pub struct DeliveredLog {
    store: Arc<dyn KeyValueStore>,
}

impl DeliveredLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn all(&self) -> Result<HashSet<String>> {
        let Some(raw) = self.store.get_string(DELIVERED_KEY)? else {
            return Ok(HashSet::new());
        };
        let ids: Vec<String> =
            serde_json::from_str(&raw).context("parsing delivered-marker set")?;
        Ok(ids.into_iter().collect())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.all()?.contains(id))
    }

    pub fn mark(&self, id: &str) -> Result<()> {
        let mut ids = self.all()?;
        if ids.insert(id.to_string()) {
            self.persist(&ids)?;
        }
        Ok(())
    }

    /// Drops every marker belonging to the item. Deletion is the only event
    /// that clears markers; updates leave them untouched.
    pub fn purge_item(&self, item_id: &str) -> Result<()> {
        let prefix = planner::item_id_prefix(item_id);
        let ids = self.all()?;
        let retained: HashSet<String> = ids
            .iter()
            .filter(|id| !id.starts_with(&prefix))
            .cloned()
            .collect();
        if retained.len() != ids.len() {
            self.persist(&retained)?;
        }
        Ok(())
    }

    fn persist(&self, ids: &HashSet<String>) -> Result<()> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let raw = serde_json::to_string(&sorted)?;
        self.store.set_string(DELIVERED_KEY, &raw)
    }
}
