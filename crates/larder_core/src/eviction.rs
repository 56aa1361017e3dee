use crate::{
    notifications::ScheduledNotification,
    planner::NotificationPlan,
    policy,
};

/// Outcome of one eviction pass: plans that won a slot and the ids of the
/// scheduled entries they displace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    pub accepted: Vec<NotificationPlan>,
    pub displaced: Vec<String>,
}

/// Priority of an already-scheduled entry, derived from its payload offset.
/// Unknown offsets rank with the defensive default and give way first.
fn entry_priority(entry: &ScheduledNotification) -> u8 {
    policy::priority(entry.payload.offset_days)
}

/// Picks which incoming plans replace scheduled entries when the ceiling is
/// already reached.
///
/// Incoming plans are tried most urgent first. Each one displaces the least
/// urgent remaining entry, but only when strictly more urgent than it; ties
/// keep the existing entry. Among equally least-urgent entries the first in
/// snapshot order gives way, which keeps a single pass deterministic. Stops
/// after `max_replacements` substitutions or at the first plan that cannot
/// win a slot; everything left over is dropped and reconsidered next cycle.
pub fn plan_evictions(
    incoming: &[NotificationPlan],
    snapshot: &[ScheduledNotification],
    max_replacements: usize,
) -> EvictionOutcome {
    let mut outcome = EvictionOutcome::default();
    if max_replacements == 0 {
        return outcome;
    }

    // Only entries this feature owns may be displaced; whatever else the app
    // has scheduled is off limits.
    let mut candidates: Vec<&ScheduledNotification> = snapshot
        .iter()
        .filter(|entry| entry.payload.is_expiry_alert())
        .collect();
    let mut incoming: Vec<&NotificationPlan> = incoming.iter().collect();
    incoming.sort_by_key(|plan| plan.priority);

    for plan in incoming {
        if outcome.accepted.len() >= max_replacements {
            break;
        }
        let Some(victim_index) = least_urgent(&candidates) else {
            break;
        };
        if plan.priority >= entry_priority(candidates[victim_index]) {
            // Sorted ascending, so nothing after this plan can win either.
            break;
        }
        let victim = candidates.remove(victim_index);
        outcome.displaced.push(victim.id.clone());
        outcome.accepted.push(plan.clone());
    }

    outcome
}

fn least_urgent(candidates: &[&ScheduledNotification]) -> Option<usize> {
    let mut worst: Option<(usize, u8)> = None;
    for (index, entry) in candidates.iter().enumerate() {
        let rank = entry_priority(entry);
        match worst {
            Some((_, current)) if rank <= current => {}
            _ => worst = Some((index, rank)),
        }
    }
    worst.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{plan_id, NotificationPayload, EXPIRY_KIND};
    use chrono::{TimeZone, Utc};

    fn plan(item_id: &str, offset: u32) -> NotificationPlan {
        NotificationPlan {
            id: plan_id(item_id, offset),
            item_id: item_id.to_string(),
            item_name: item_id.to_string(),
            offset_days: offset,
            fire_at: Utc.with_ymd_and_hms(2025, 11, 7, 9, 0, 0).unwrap(),
            priority: policy::priority(offset),
            title_key: crate::planner::title_key(offset),
            body_key: crate::planner::body_key(offset),
        }
    }

    fn entry(item_id: &str, offset: u32) -> ScheduledNotification {
        ScheduledNotification {
            id: plan_id(item_id, offset),
            fire_at: Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap(),
            payload: NotificationPayload {
                item_id: item_id.to_string(),
                item_name: item_id.to_string(),
                offset_days: offset,
                kind: EXPIRY_KIND.to_string(),
            },
        }
    }

    #[test]
    fn urgent_plan_displaces_one_least_urgent_entry() {
        let snapshot = vec![entry("a", 3), entry("b", 3), entry("c", 3)];
        let incoming = vec![plan("x", 0)];

        let outcome = plan_evictions(&incoming, &snapshot, 10);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].id, "expiry-x-0");
        assert_eq!(outcome.displaced, vec!["expiry-a-3".to_string()]);
    }

    #[test]
    fn equal_priority_never_displaces() {
        let snapshot = vec![entry("a", 0), entry("b", 0)];
        let incoming = vec![plan("x", 0)];

        let outcome = plan_evictions(&incoming, &snapshot, 10);
        assert!(outcome.accepted.is_empty());
        assert!(outcome.displaced.is_empty());
    }

    #[test]
    fn replacement_quota_bounds_the_pass() {
        let snapshot = vec![entry("a", 3), entry("b", 3), entry("c", 3)];
        let incoming = vec![plan("x", 0), plan("y", 0), plan("z", 0)];

        let outcome = plan_evictions(&incoming, &snapshot, 2);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.displaced.len(), 2);
    }

    #[test]
    fn most_urgent_incoming_wins_the_scarce_slot() {
        let snapshot = vec![entry("a", 1), entry("b", 0)];
        let incoming = vec![plan("x", 1), plan("y", 0)];

        // Only the offset-1 entry can lose its slot, and only to the
        // offset-0 plan.
        let outcome = plan_evictions(&incoming, &snapshot, 10);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].id, "expiry-y-0");
        assert_eq!(outcome.displaced, vec!["expiry-a-1".to_string()]);
    }

    #[test]
    fn foreign_entries_are_never_displaced() {
        let mut foreign = entry("other", 3);
        foreign.id = "someone-elses".to_string();
        foreign.payload.kind = "geo-fence".to_string();
        let snapshot = vec![foreign];
        let incoming = vec![plan("x", 0)];

        let outcome = plan_evictions(&incoming, &snapshot, 10);
        assert!(outcome.accepted.is_empty());
        assert!(outcome.displaced.is_empty());
    }

    #[test]
    fn unknown_offsets_give_way_first() {
        let snapshot = vec![entry("a", 3), entry("weird", 9)];
        let incoming = vec![plan("x", 1)];

        let outcome = plan_evictions(&incoming, &snapshot, 10);
        assert_eq!(outcome.displaced, vec![plan_id("weird", 9)]);
    }
}
