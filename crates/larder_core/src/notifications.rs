use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::planner::NotificationPayload;

/// A rendered reminder ready to hand to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

/// One entry of the platform's live scheduled list. Queried fresh each cycle;
/// this core never caches it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

/// Platform-specific notification adapters implement this trait. The platform
/// enforces a hard ceiling on outstanding entries; the core stays under a
/// configured margin of it.
pub trait NotificationScheduler: Send + Sync {
    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>>;
    fn schedule(&self, request: NotificationRequest) -> Result<()>;
    fn cancel(&self, id: &str) -> Result<()>;
}

/// Localized string lookup for notification titles and bodies.
pub trait Localizer: Send + Sync {
    fn text(&self, key: &str, item_name: &str) -> String;
}

/// English fallback used when the host provides no translations.
#[derive(Debug, Default)]
pub struct PlainLocalizer;

impl Localizer for PlainLocalizer {
    fn text(&self, key: &str, item_name: &str) -> String {
        match key {
            "notification.expires_today.title" => "Expires today".to_string(),
            "notification.expires_today.body" => {
                format!("{item_name} expires today. Use it or lose it!")
            }
            "notification.expires_tomorrow.title" => "Expires tomorrow".to_string(),
            "notification.expires_tomorrow.body" => {
                format!("{item_name} expires tomorrow.")
            }
            "notification.expires_soon.title" => "Expires in 3 days".to_string(),
            "notification.expires_soon.body" => {
                format!("{item_name} expires in 3 days.")
            }
            _ => item_name.to_string(),
        }
    }
}

/// In-memory scheduler used by tests and host shells.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    entries: RwLock<Vec<ScheduledNotification>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the platform firing an entry: removes it from the scheduled
    /// list and hands its id back so the caller can mark it delivered.
    pub fn fire(&self, id: &str) -> Option<ScheduledNotification> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|entry| entry.id == id)?;
        Some(entries.remove(index))
    }
}

impl NotificationScheduler for MemoryScheduler {
    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.entries.read().clone())
    }

    fn schedule(&self, request: NotificationRequest) -> Result<()> {
        let mut entries = self.entries.write();
        entries.retain(|entry| entry.id != request.id);
        entries.push(ScheduledNotification {
            id: request.id,
            fire_at: request.fire_at,
            payload: request.payload,
        });
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<()> {
        self.entries.write().retain(|entry| entry.id != id);
        Ok(())
    }
}
