use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use larder_core::{
    inventory::{InventoryItem, InventorySource},
    notifications::{MemoryScheduler, NotificationScheduler},
    store::{FileKeyValueStore, KeyValueStore},
    ExpiryService,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the persisted expiry state.
    pub data_dir: PathBuf,
    /// JSON array of inventory items to run the cycle against.
    pub inventory_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("larder-data"),
            inventory_path: PathBuf::from("inventory.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Option<Self> {
        let data_dir = env::var_os("LARDER_DATA_DIR")?;
        let inventory_path = env::var_os("LARDER_INVENTORY")?;
        Some(Self {
            data_dir: PathBuf::from(data_dir),
            inventory_path: PathBuf::from(inventory_path),
        })
    }
}

/// Inventory snapshot read from a JSON file; the host-side stand-in for the
/// cloud inventory backend.
pub struct JsonFileInventory {
    path: PathBuf,
}

impl JsonFileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl InventorySource for JsonFileInventory {
    fn all_items(&self) -> Result<Vec<InventoryItem>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading inventory {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing inventory {}", self.path.display()))
    }
}

/// Runs one dry-run expiry cycle against the configured inventory snapshot
/// and logs what the platform would be asked to schedule.
pub fn run(config: AppConfig) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::open(
        config.data_dir.join("expiry-state.json"),
    )?);
    let scheduler = Arc::new(MemoryScheduler::new());
    let service = ExpiryService::builder()
        .with_inventory(Arc::new(JsonFileInventory::new(config.inventory_path)))
        .with_scheduler(Arc::clone(&scheduler) as Arc<dyn NotificationScheduler>)
        .with_store(store)
        .build()?;

    let report = service.run_full_cycle(Utc::now())?;
    info!(
        scheduled = report.scheduled,
        cancelled = report.cancelled,
        displaced = report.displaced,
        dropped = report.dropped,
        failed = report.failed,
        "expiry cycle complete"
    );
    for entry in scheduler.list_scheduled()? {
        info!(
            id = %entry.id,
            fire_at = %entry.fire_at,
            item = %entry.payload.item_name,
            "would schedule"
        );
    }
    Ok(())
}
