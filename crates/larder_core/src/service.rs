use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use crate::{
    delivered::DeliveredLog,
    error::NotifyError,
    eviction,
    inventory::{InventoryItem, InventorySource},
    notifications::{
        Localizer, NotificationRequest, NotificationScheduler, PlainLocalizer,
        ScheduledNotification,
    },
    planner::{self, NotificationPlan},
    policy,
    store::{KeyValueStore, MemoryKeyValueStore},
};

/// Store key holding the RFC 3339 timestamp of the last completed full cycle.
pub const LAST_FULL_CYCLE_KEY: &str = "larder.expiry.last_full_cycle.v1";

/// Tuning knobs for the coordinator. Defaults match the platform margins the
/// mobile app ships with.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Maximum outstanding scheduled notifications, kept under the real
    /// platform limit as safety margin.
    pub ceiling: usize,
    /// Cap on eviction substitutions per cycle, to avoid thrashing.
    pub max_replacements_per_cycle: usize,
    /// Advisory minimum gap between foreground-triggered full cycles.
    pub foreground_min_interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            ceiling: 60,
            max_replacements_per_cycle: 10,
            foreground_min_interval: Duration::hours(4),
        }
    }
}

/// What one cycle actually did; used for logging and assertions, never for
/// control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Plans handed to the platform scheduler.
    pub scheduled: usize,
    /// Stale or superseded entries cancelled.
    pub cancelled: usize,
    /// Entries displaced by more urgent plans at the ceiling.
    pub displaced: usize,
    /// Plans dropped for this cycle because no slot could be won or freed.
    pub dropped: usize,
    /// Individual platform calls that failed and were skipped.
    pub failed: usize,
}

/// Orchestrates the expiry-reminder lifecycle: classify, plan, dedupe,
/// evict, commit. Constructed once at process start and shared by reference;
/// overlapping invocations converge through deterministic plan ids rather
/// than locking.
pub struct ExpiryService {
    inventory: Arc<dyn InventorySource>,
    scheduler: Arc<dyn NotificationScheduler>,
    localizer: Arc<dyn Localizer>,
    store: Arc<dyn KeyValueStore>,
    delivered: DeliveredLog,
    config: ExpiryConfig,
}

pub struct ExpiryServiceBuilder {
    inventory: Option<Arc<dyn InventorySource>>,
    scheduler: Option<Arc<dyn NotificationScheduler>>,
    localizer: Option<Arc<dyn Localizer>>,
    store: Option<Arc<dyn KeyValueStore>>,
    config: ExpiryConfig,
}

impl ExpiryServiceBuilder {
    pub fn new() -> Self {
        Self {
            inventory: None,
            scheduler: None,
            localizer: None,
            store: None,
            config: ExpiryConfig::default(),
        }
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: ExpiryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> anyhow::Result<ExpiryService> {
        let inventory = self
            .inventory
            .ok_or_else(|| anyhow!("expiry service requires an inventory source"))?;
        let scheduler = self
            .scheduler
            .ok_or_else(|| anyhow!("expiry service requires a notification scheduler"))?;
        let localizer = self
            .localizer
            .unwrap_or_else(|| Arc::new(PlainLocalizer));
        let store: Arc<dyn KeyValueStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
        Ok(ExpiryService {
            inventory,
            scheduler,
            localizer,
            delivered: DeliveredLog::new(Arc::clone(&store)),
            store,
            config: self.config,
        })
    }
}

impl Default for ExpiryServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryService {
    pub fn builder() -> ExpiryServiceBuilder {
        ExpiryServiceBuilder::new()
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// Full check/refresh pass over the whole inventory.
    ///
    /// Reads the live scheduled list, prunes feature-owned entries whose item
    /// vanished or fully expired, plans reminders for everything still
    /// qualifying, and commits under the ceiling. Fetch failures abort with
    /// nothing mutated; the next trigger retries.
    #[instrument(skip(self))]
    pub fn run_full_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, NotifyError> {
        let snapshot = self
            .scheduler
            .list_scheduled()
            .map_err(NotifyError::transient)?;
        let items = self.inventory.all_items().map_err(NotifyError::transient)?;
        let delivered = self.delivered.all().map_err(NotifyError::transient)?;

        let mut report = CycleReport::default();
        let live: HashMap<&str, &InventoryItem> =
            items.iter().map(|item| (item.id.as_str(), item)).collect();

        let mut remaining = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            if entry.payload.is_expiry_alert() && self.entry_is_stale(&entry, &live, now) {
                self.cancel_entry(&entry.id, &mut report);
                continue;
            }
            remaining.push(entry);
        }

        let scheduled_ids: HashSet<String> =
            remaining.iter().map(|entry| entry.id.clone()).collect();
        let plans = planner::build_plans(&items, now, &scheduled_ids, &delivered);
        self.commit(plans, &remaining, &mut report);

        self.record_full_cycle(now);
        debug!(?report, "full expiry cycle finished");
        Ok(report)
    }

    /// Incremental pass for a single added or updated item. Pending plans for
    /// the item are cancelled first so edits reschedule cleanly; delivered
    /// markers are left alone, so an already-shown reminder is not re-sent
    /// for the same offset.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub fn run_for_item(
        &self,
        item: &InventoryItem,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, NotifyError> {
        let snapshot = self
            .scheduler
            .list_scheduled()
            .map_err(NotifyError::transient)?;
        let delivered = self.delivered.all().map_err(NotifyError::transient)?;

        let mut report = CycleReport::default();
        let mut remaining = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            if entry.payload.is_expiry_alert() && entry.payload.item_id == item.id {
                self.cancel_entry(&entry.id, &mut report);
                continue;
            }
            remaining.push(entry);
        }

        let scheduled_ids: HashSet<String> =
            remaining.iter().map(|entry| entry.id.clone()).collect();
        let items = [item.clone()];
        let plans = planner::build_plans(&items, now, &scheduled_ids, &delivered);
        self.commit(plans, &remaining, &mut report);

        debug!(item_id = %item.id, ?report, "single-item cycle finished");
        Ok(report)
    }

    /// Removal pass: cancels every pending plan for the item and purges its
    /// delivered markers. Deletion is the only event that clears markers, so
    /// a later item with the same name but a fresh id starts clean.
    #[instrument(skip(self))]
    pub fn cancel_for_item(&self, item_id: &str) -> Result<CycleReport, NotifyError> {
        let snapshot = self
            .scheduler
            .list_scheduled()
            .map_err(NotifyError::transient)?;

        let mut report = CycleReport::default();
        for entry in &snapshot {
            if entry.payload.is_expiry_alert() && entry.payload.item_id == item_id {
                self.cancel_entry(&entry.id, &mut report);
            }
        }
        self.delivered
            .purge_item(item_id)
            .map_err(NotifyError::transient)?;
        Ok(report)
    }

    /// Foreground variant of the full cycle, throttled by the persisted
    /// last-run timestamp. Returns `Ok(None)` when the minimum interval has
    /// not elapsed. Advisory only; correctness comes from idempotent ids.
    pub fn run_foreground_cycle(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<CycleReport>, NotifyError> {
        if let Some(last) = self.last_full_cycle() {
            if now - last < self.config.foreground_min_interval {
                debug!(%last, "foreground cycle throttled");
                return Ok(None);
            }
        }
        self.run_full_cycle(now).map(Some)
    }

    /// Marks a notification as shown. Called when the platform reports the
    /// entry fired.
    pub fn on_notification_delivered(&self, id: &str) {
        if let Err(error) = self.delivered.mark(id) {
            warn!(%id, %error, "failed to persist delivered marker");
        }
    }

    // Lifecycle hooks for the rest of the application. Best-effort reminder
    // semantics: failures are logged, never surfaced.

    pub fn on_item_added(&self, item: &InventoryItem) {
        self.swallow(self.run_for_item(item, Utc::now()), "item added");
    }

    pub fn on_item_updated(&self, item: &InventoryItem) {
        self.swallow(self.run_for_item(item, Utc::now()), "item updated");
    }

    pub fn on_item_deleted(&self, item_id: &str) {
        self.swallow(self.cancel_for_item(item_id), "item deleted");
    }

    pub fn on_periodic_trigger(&self) {
        self.swallow(self.run_full_cycle(Utc::now()), "periodic trigger");
    }

    pub fn on_app_foreground(&self) {
        if let Err(error) = self.run_foreground_cycle(Utc::now()) {
            warn!(%error, "expiry cycle failed on foreground; will retry on next trigger");
        }
    }

    fn swallow(&self, result: Result<CycleReport, NotifyError>, trigger: &str) {
        if let Err(error) = result {
            warn!(trigger, %error, "expiry cycle failed; will retry on next trigger");
        }
    }

    /// Schedules as many plans as the ceiling allows: free headroom goes to
    /// the most urgent plans first, then eviction trades the rest against the
    /// least urgent scheduled entries. Per-plan platform failures are logged
    /// and skipped without aborting the batch.
    fn commit(
        &self,
        mut plans: Vec<NotificationPlan>,
        snapshot: &[ScheduledNotification],
        report: &mut CycleReport,
    ) {
        if plans.is_empty() {
            return;
        }
        let outstanding = snapshot.len();
        if outstanding + plans.len() <= self.config.ceiling {
            for plan in plans {
                self.schedule_plan(plan, report);
            }
            return;
        }

        plans.sort_by_key(|plan| plan.priority);
        let headroom = self.config.ceiling.saturating_sub(outstanding);
        let overflow = plans.split_off(headroom.min(plans.len()));
        for plan in plans {
            self.schedule_plan(plan, report);
        }

        let outcome = eviction::plan_evictions(
            &overflow,
            snapshot,
            self.config.max_replacements_per_cycle,
        );
        report.dropped += overflow.len() - outcome.accepted.len();
        // A replacement only goes out once its victim is gone, so a failed
        // cancel cannot push the outstanding count over the ceiling.
        for (plan, victim) in outcome.accepted.into_iter().zip(outcome.displaced.iter()) {
            match self.scheduler.cancel(victim) {
                Ok(()) => {
                    report.displaced += 1;
                    self.schedule_plan(plan, report);
                }
                Err(error) => {
                    warn!(id = %victim, %error, "failed to cancel displaced notification");
                    report.failed += 1;
                    // The slot was never freed, so the replacement is dropped
                    // like any other plan that could not win one.
                    report.dropped += 1;
                }
            }
        }
    }

    fn schedule_plan(&self, plan: NotificationPlan, report: &mut CycleReport) {
        let request = NotificationRequest {
            id: plan.id.clone(),
            title: self.localizer.text(plan.title_key, &plan.item_name),
            body: self.localizer.text(plan.body_key, &plan.item_name),
            fire_at: plan.fire_at,
            payload: plan.payload(),
        };
        match self.scheduler.schedule(request) {
            Ok(()) => report.scheduled += 1,
            Err(source) => {
                let error = NotifyError::Scheduling {
                    id: plan.id,
                    source,
                };
                warn!(%error, "skipping plan");
                report.failed += 1;
            }
        }
    }

    fn cancel_entry(&self, id: &str, report: &mut CycleReport) {
        match self.scheduler.cancel(id) {
            Ok(()) => report.cancelled += 1,
            Err(error) => {
                warn!(%id, %error, "failed to cancel scheduled notification");
                report.failed += 1;
            }
        }
    }

    /// An entry is stale when its item vanished or expired, when its offset
    /// is no longer due, or when its fire day drifted away from the item's
    /// current expiry. The last two catch expiry dates edited behind the
    /// update hook, e.g. through the shared backend on another device.
    fn entry_is_stale(
        &self,
        entry: &ScheduledNotification,
        live: &HashMap<&str, &InventoryItem>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(item) = live.get(entry.payload.item_id.as_str()) else {
            return true;
        };
        let days_until = item.days_until_expiry(now);
        if days_until < 0 {
            return true;
        }
        let offset = entry.payload.offset_days;
        if !policy::due_offsets(days_until).contains(&offset) {
            return true;
        }
        planner::target_day(item.expires_at, offset) != Some(entry.fire_at.date_naive())
    }

    fn last_full_cycle(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get_string(LAST_FULL_CYCLE_KEY).ok()??;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|stamp| stamp.with_timezone(&Utc))
    }

    fn record_full_cycle(&self, now: DateTime<Utc>) {
        if let Err(error) = self.store.set_string(LAST_FULL_CYCLE_KEY, &now.to_rfc3339()) {
            warn!(%error, "failed to persist last-cycle timestamp");
        }
    }
}
