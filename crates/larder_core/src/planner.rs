use std::collections::HashSet;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{inventory::InventoryItem, policy};

/// Payload `kind` marking a scheduled notification as owned by this core.
pub const EXPIRY_KIND: &str = "expiry-alert";

/// Hour of day at which reminders fire.
pub const FIRE_HOUR: u32 = 9;

/// Grace applied when the 09:00 slot already passed but the day is still right.
pub const IMMEDIATE_FIRE_DELAY_SECS: i64 = 5;

/// Deterministic notification id for an `(item, offset)` pair. Never derived
/// from the clock, so repeated cycles converge on the same id.
pub fn plan_id(item_id: &str, offset: u32) -> String {
    format!("expiry-{item_id}-{offset}")
}

/// Prefix shared by every notification id belonging to one item.
pub fn item_id_prefix(item_id: &str) -> String {
    format!("expiry-{item_id}-")
}

pub fn title_key(offset: u32) -> &'static str {
    match offset {
        0 => "notification.expires_today.title",
        1 => "notification.expires_tomorrow.title",
        _ => "notification.expires_soon.title",
    }
}

pub fn body_key(offset: u32) -> &'static str {
    match offset {
        0 => "notification.expires_today.body",
        1 => "notification.expires_tomorrow.body",
        _ => "notification.expires_soon.body",
    }
}

/// Rides inside the platform scheduler; read back each cycle for dedupe,
/// eviction ranking and item-wise cancellation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub item_id: String,
    pub item_name: String,
    pub offset_days: u32,
    pub kind: String,
}

impl NotificationPayload {
    pub fn is_expiry_alert(&self) -> bool {
        self.kind == EXPIRY_KIND
    }
}

/// A computed, not-yet-committed reminder. Ephemeral: rebuilt fresh each
/// cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPlan {
    pub id: String,
    pub item_id: String,
    pub item_name: String,
    pub offset_days: u32,
    pub fire_at: DateTime<Utc>,
    pub priority: u8,
    pub title_key: &'static str,
    pub body_key: &'static str,
}

impl NotificationPlan {
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            item_id: self.item_id.clone(),
            item_name: self.item_name.clone(),
            offset_days: self.offset_days,
            kind: EXPIRY_KIND.to_string(),
        }
    }
}

/// Builds the batch of reminders that still need scheduling.
///
/// Per item: classify due offsets, derive the deterministic id, skip anything
/// already pending in the platform scheduler or already shown, then place the
/// fire time. Output carries at most one plan per `(item, offset)` and the
/// plans are independent of each other.
pub fn build_plans(
    items: &[InventoryItem],
    now: DateTime<Utc>,
    scheduled_ids: &HashSet<String>,
    delivered_ids: &HashSet<String>,
) -> Vec<NotificationPlan> {
    let mut plans = Vec::new();
    for item in items {
        let days_until = item.days_until_expiry(now);
        for offset in policy::due_offsets(days_until) {
            let id = plan_id(&item.id, offset);
            if scheduled_ids.contains(&id) || delivered_ids.contains(&id) {
                continue;
            }
            let Some(fire_at) = fire_time(item.expires_at, offset, now) else {
                // Target day already passed; silently stale.
                continue;
            };
            plans.push(NotificationPlan {
                id,
                item_id: item.id.clone(),
                item_name: item.name.clone(),
                offset_days: offset,
                fire_at,
                priority: policy::priority(offset),
                title_key: title_key(offset),
                body_key: body_key(offset),
            });
        }
    }
    plans
}

/// Calendar day on which the reminder for `offset` should fire.
pub fn target_day(expires_at: DateTime<Utc>, offset: u32) -> Option<NaiveDate> {
    expires_at
        .date_naive()
        .checked_sub_days(Days::new(u64::from(offset)))
}

/// 09:00 on the calendar day `expires_at - offset`, or a few seconds from now
/// when that slot passed earlier today, or `None` when the day itself passed.
pub fn fire_time(
    expires_at: DateTime<Utc>,
    offset: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let target_day = target_day(expires_at, offset)?;
    let slot = NaiveTime::from_hms_opt(FIRE_HOUR, 0, 0).unwrap();
    let target = Utc.from_utc_datetime(&target_day.and_time(slot));
    if target > now {
        return Some(target);
    }
    if target_day == now.date_naive() {
        return Some(now + Duration::seconds(IMMEDIATE_FIRE_DELAY_SECS));
    }
    None
}
