use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::policy;

/// A tracked pantry item as reported by the backing inventory store.
///
/// This core never mutates items; it only reads snapshots of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            expires_at,
        }
    }

    /// Whole calendar days until expiry, negative once the item has expired.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        policy::days_until(self.expires_at, now)
    }
}

/// Read-only view of the current inventory. Backed by the cloud store in the
/// real application; any failure here is transient and the cycle retries on
/// the next trigger.
pub trait InventorySource: Send + Sync {
    fn all_items(&self) -> Result<Vec<InventoryItem>>;

    fn expiring_within(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<InventoryItem>> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|item| {
                let remaining = item.days_until_expiry(now);
                (0..=days).contains(&remaining)
            })
            .collect())
    }
}

/// In-memory source used by tests and host shells.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    items: RwLock<Vec<InventoryItem>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<InventoryItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn upsert(&self, item: InventoryItem) {
        let mut items = self.items.write();
        if let Some(existing) = items.iter_mut().find(|candidate| candidate.id == item.id) {
            *existing = item;
        } else {
            items.push(item);
        }
    }

    pub fn remove(&self, id: &str) {
        self.items.write().retain(|item| item.id != id);
    }
}

impl InventorySource for MemoryInventory {
    fn all_items(&self) -> Result<Vec<InventoryItem>> {
        Ok(self.items.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item_expiring(id: &str, days_out: i64, now: DateTime<Utc>) -> InventoryItem {
        InventoryItem::new(id, format!("item {id}"), now + chrono::Duration::days(days_out))
    }

    #[test]
    fn expiring_within_filters_by_calendar_days() {
        let now = Utc.with_ymd_and_hms(2025, 11, 7, 8, 0, 0).unwrap();
        let source = MemoryInventory::with_items(vec![
            item_expiring("soon", 2, now),
            item_expiring("later", 9, now),
            item_expiring("gone", -1, now),
        ]);

        let expiring = source.expiring_within(3, now).expect("filter");
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, "soon");
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let now = Utc.with_ymd_and_hms(2025, 11, 7, 8, 0, 0).unwrap();
        let source = MemoryInventory::new();
        source.upsert(item_expiring("milk", 4, now));
        source.upsert(InventoryItem::new("milk", "whole milk", now));

        let items = source.all_items().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "whole milk");
    }
}
