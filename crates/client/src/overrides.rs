//! Bounded-duration velocity overrides
//!
//! A timed speed change only lasts for its duration inside the simulator.
//! Each pending override remembers when it expires and which speed to
//! reassert once it does. There is at most one override per vehicle; a newer
//! one replaces the older.

use std::collections::BTreeMap;

/// Speed to reassert for a vehicle once its timed change expires
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOverride {
    pub vehicle_id: String,
    /// Absolute simulated time in milliseconds
    pub expiry_ms: u64,
    pub restore_speed: f64,
}

#[derive(Debug, Default)]
pub struct OverrideScheduler {
    pending: BTreeMap<String, PendingOverride>,
}

impl OverrideScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the override for `vehicle_id`, returning the replaced one
    pub fn schedule(
        &mut self,
        vehicle_id: &str,
        expiry_ms: u64,
        restore_speed: f64,
    ) -> Option<PendingOverride> {
        self.pending.insert(
            vehicle_id.to_string(),
            PendingOverride {
                vehicle_id: vehicle_id.to_string(),
                expiry_ms,
                restore_speed,
            },
        )
    }

    pub fn cancel(&mut self, vehicle_id: &str) -> Option<PendingOverride> {
        self.pending.remove(vehicle_id)
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&PendingOverride> {
        self.pending.get(vehicle_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns the expired override (`expiry_ms <= now_ms`) with the lowest vehicle id
    ///
    /// Overrides not yet popped stay scheduled, so a caller that stops early
    /// picks them up again on a later call.
    pub fn pop_expired(&mut self, now_ms: u64) -> Option<PendingOverride> {
        let vehicle_id = self
            .pending
            .values()
            .find(|o| o.expiry_ms <= now_ms)?
            .vehicle_id
            .clone();
        self.pending.remove(&vehicle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_expired(scheduler: &mut OverrideScheduler, now_ms: u64) -> Vec<PendingOverride> {
        std::iter::from_fn(|| scheduler.pop_expired(now_ms)).collect()
    }

    #[test]
    fn test_pending_until_expiry() {
        let mut scheduler = OverrideScheduler::new();
        scheduler.schedule("v1", 2000, 10.0);

        assert!(scheduler.pop_expired(1000).is_none());
        assert!(scheduler.get("v1").is_some());

        let expired = drain_expired(&mut scheduler, 2000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].restore_speed, 10.0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let mut scheduler = OverrideScheduler::new();
        scheduler.schedule("v1", 2000, 10.0);
        let replaced = scheduler.schedule("v1", 5000, 4.0);

        assert_eq!(replaced.map(|o| o.expiry_ms), Some(2000));
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.pop_expired(3000).is_none());
        assert_eq!(scheduler.get("v1").map(|o| o.restore_speed), Some(4.0));
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = OverrideScheduler::new();
        scheduler.schedule("v1", 2000, 10.0);

        assert!(scheduler.cancel("v1").is_some());
        assert!(scheduler.cancel("v1").is_none());
        assert!(scheduler.pop_expired(u64::MAX).is_none());
    }

    #[test]
    fn test_expired_in_vehicle_order() {
        let mut scheduler = OverrideScheduler::new();
        scheduler.schedule("veh_b", 1000, 1.0);
        scheduler.schedule("veh_c", 9000, 3.0);
        scheduler.schedule("veh_a", 500, 2.0);

        let ids: Vec<_> = drain_expired(&mut scheduler, 1000)
            .into_iter()
            .map(|o| o.vehicle_id)
            .collect();
        assert_eq!(ids, vec!["veh_a", "veh_b"]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_unpopped_overrides_stay_scheduled() {
        let mut scheduler = OverrideScheduler::new();
        scheduler.schedule("veh_a", 500, 2.0);
        scheduler.schedule("veh_b", 1000, 1.0);

        let first = scheduler.pop_expired(1000).unwrap();
        assert_eq!(first.vehicle_id, "veh_a");

        // veh_b is still due on a later step
        assert!(scheduler.get("veh_b").is_some());
        assert_eq!(
            scheduler.pop_expired(2000).map(|o| o.vehicle_id),
            Some("veh_b".to_string())
        );
        assert!(scheduler.is_empty());
    }
}
