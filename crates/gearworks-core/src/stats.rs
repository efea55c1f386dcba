//! Collection and production counters for the management UI.
//!
//! Totals accumulate forever. Rates count what was recorded in the current
//! window; the first record after the window has elapsed starts a new one.

use crate::fixed::Millis;
use crate::id::ResourceTypeId;
use std::collections::BTreeMap;

/// Default rate window: one minute.
pub const RATE_WINDOW_MS: Millis = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MachineStatistics {
    collected: BTreeMap<ResourceTypeId, u64>,
    items_produced: u64,
    window: BTreeMap<ResourceTypeId, u64>,
    window_start_ms: Millis,
    window_ms: Millis,
}

impl MachineStatistics {
    pub fn new(now: Millis) -> Self {
        Self::with_window(now, RATE_WINDOW_MS)
    }

    pub fn with_window(now: Millis, window_ms: Millis) -> Self {
        Self {
            collected: BTreeMap::new(),
            items_produced: 0,
            window: BTreeMap::new(),
            window_start_ms: now,
            window_ms: window_ms.max(1),
        }
    }

    /// Resources moved out of harvesters.
    pub fn record_resource_collection(&mut self, resource: ResourceTypeId, amount: u32, now: Millis) {
        *self.collected.entry(resource).or_default() += u64::from(amount);
        self.record_rate(resource, amount, now);
    }

    /// Crafted items moved out of factories.
    pub fn record_item_production(&mut self, resource: ResourceTypeId, amount: u32, now: Millis) {
        self.items_produced += u64::from(amount);
        self.record_rate(resource, amount, now);
    }

    fn record_rate(&mut self, resource: ResourceTypeId, amount: u32, now: Millis) {
        if now.saturating_sub(self.window_start_ms) >= self.window_ms {
            self.window.clear();
            self.window_start_ms = now;
        }
        *self.window.entry(resource).or_default() += u64::from(amount);
    }

    pub fn total_resources_collected(&self) -> u64 {
        self.collected.values().sum()
    }

    pub fn resource_breakdown(&self) -> &BTreeMap<ResourceTypeId, u64> {
        &self.collected
    }

    pub fn total_items_produced(&self) -> u64 {
        self.items_produced
    }

    pub fn production_rate_per_minute(&self, resource: ResourceTypeId) -> f64 {
        self.window.get(&resource).copied().unwrap_or(0) as f64 * self.per_minute()
    }

    pub fn total_production_rate_per_minute(&self) -> f64 {
        self.window.values().sum::<u64>() as f64 * self.per_minute()
    }

    fn per_minute(&self) -> f64 {
        60_000.0 / self.window_ms as f64
    }

    pub fn reset(&mut self, now: Millis) {
        self.collected.clear();
        self.window.clear();
        self.items_produced = 0;
        self.window_start_ms = now;
    }
}
