//! Wear, breakdowns and maintenance.
//!
//! Every machine carries a [`Maintenance`] record built from its type's
//! [`MaintenanceProfile`]. Counted operations accumulate until the
//! threshold; from then on each new operation count gets exactly one
//! breakdown roll. A successful roll latches `needs_maintenance` until
//! [`Maintenance::perform`] clears it.

use crate::catalog::MachineType;
use crate::config::MaintenanceConfig;
use crate::fixed::{Fixed64, Millis, f64_to_fixed64, fixed64_to_f64};
use crate::rng::SimRng;

/// Per-type maintenance policy.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceProfile {
    pub threshold: u32,
    pub base_chance: Fixed64,
    pub fragile: bool,
    pub max_chance: Fixed64,
    pub operation_cooldown_ms: Millis,
    pub wear_onset: Fixed64,
    pub max_efficiency_loss: Fixed64,
}

impl MaintenanceProfile {
    pub fn for_type(machine_type: &MachineType, config: &MaintenanceConfig) -> Self {
        let fragile = machine_type.is_fragile();
        Self {
            threshold: if fragile {
                config.fragile_threshold
            } else {
                config.standard_threshold
            },
            base_chance: machine_type.breakdown_chance,
            fragile,
            max_chance: config.max_breakdown_chance,
            operation_cooldown_ms: config.operation_cooldown_ms,
            wear_onset: config.wear_onset,
            max_efficiency_loss: config.max_efficiency_loss,
        }
    }

    /// Breakdown chance after `operations` counted operations. Zero below
    /// the threshold. Fragile machines scale the base chance by
    /// `1 + ln(1 + excess)`, capped at `max_chance`.
    pub fn breakdown_chance(&self, operations: u32) -> Fixed64 {
        if operations < self.threshold {
            return Fixed64::ZERO;
        }
        if !self.fragile {
            return self.base_chance;
        }
        let excess = f64::from(operations - self.threshold);
        let scaled = fixed64_to_f64(self.base_chance) * (1.0 + excess.ln_1p());
        f64_to_fixed64(scaled).min(self.max_chance)
    }

    /// Throughput factor in `[1 - max_efficiency_loss, 1]`. Drops linearly
    /// from the wear onset to the threshold.
    pub fn efficiency_multiplier(&self, operations: u32) -> Fixed64 {
        let one = Fixed64::from_num(1);
        let threshold = Fixed64::from_num(self.threshold);
        let onset = threshold * self.wear_onset;
        let ops = Fixed64::from_num(operations);
        if ops <= onset {
            return one;
        }
        let span = threshold - onset;
        let wear = if span <= Fixed64::ZERO {
            one
        } else {
            ((ops - onset) / span).min(one)
        };
        one - self.max_efficiency_loss * wear
    }
}

/// Runtime maintenance counters of one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Maintenance {
    profile: MaintenanceProfile,
    needs_maintenance: bool,
    operations: u32,
    last_operation_ms: Option<Millis>,
    last_rolled_at: Option<u32>,
}

impl Maintenance {
    pub fn new(profile: MaintenanceProfile) -> Self {
        Self {
            profile,
            needs_maintenance: false,
            operations: 0,
            last_operation_ms: None,
            last_rolled_at: None,
        }
    }

    pub fn profile(&self) -> &MaintenanceProfile {
        &self.profile
    }

    pub fn needs_maintenance(&self) -> bool {
        self.needs_maintenance
    }

    pub fn operations_since_maintenance(&self) -> u32 {
        self.operations
    }

    /// Count one operation unless the previous one was less than the
    /// cooldown ago. Returns whether it counted.
    pub fn record_operation(&mut self, now: Millis) -> bool {
        if let Some(last) = self.last_operation_ms
            && now.saturating_sub(last) < self.profile.operation_cooldown_ms
        {
            return false;
        }
        self.operations = self.operations.saturating_add(1);
        self.last_operation_ms = Some(now);
        true
    }

    /// Returns true if the machine is (now) broken down. Rolls at most once
    /// per operation count at or past the threshold.
    pub fn check(&mut self, rng: &mut SimRng) -> bool {
        if self.needs_maintenance {
            return true;
        }
        if self.operations < self.profile.threshold || self.last_rolled_at == Some(self.operations)
        {
            return false;
        }
        self.last_rolled_at = Some(self.operations);
        if rng.chance(self.breakdown_chance()) {
            self.needs_maintenance = true;
        }
        self.needs_maintenance
    }

    pub fn breakdown_chance(&self) -> Fixed64 {
        self.profile.breakdown_chance(self.operations)
    }

    pub fn efficiency_multiplier(&self) -> Fixed64 {
        self.profile.efficiency_multiplier(self.operations)
    }

    /// Clear the breakdown flag and zero the operation counter.
    pub fn perform(&mut self) {
        self.needs_maintenance = false;
        self.operations = 0;
        self.last_rolled_at = None;
    }
}
