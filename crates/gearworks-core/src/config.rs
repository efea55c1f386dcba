//! Injected simulation configuration.
//!
//! Every tunable the machine tick and the crafting engine consult lives in
//! [`SimConfig`]. Values are deserializable with per-field defaults, so a
//! data file only needs to name what it overrides.

use crate::fixed::{Fixed64, Millis};
use serde::{Deserialize, Serialize};

/// Maintenance and breakdown tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Operations before fragile machines start rolling for breakdowns.
    pub fragile_threshold: u32,
    /// Operations before sturdy machines start rolling for breakdowns.
    pub standard_threshold: u32,
    /// Upper bound on the scaled breakdown chance of fragile machines.
    pub max_breakdown_chance: Fixed64,
    /// Minimum spacing between two counted operations.
    pub operation_cooldown_ms: Millis,
    /// Fraction of the threshold after which efficiency starts to drop.
    pub wear_onset: Fixed64,
    /// Efficiency lost once the threshold is reached.
    pub max_efficiency_loss: Fixed64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            fragile_threshold: 3,
            standard_threshold: 10,
            max_breakdown_chance: Fixed64::from_num(0.5),
            operation_cooldown_ms: 1_000,
            wear_onset: Fixed64::from_num(0.7),
            max_efficiency_loss: Fixed64::from_num(0.3),
        }
    }
}

/// Harvester tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Interval between harvest passes at processing speed 1.
    pub base_interval_ms: Millis,
    /// Fill ratio at which a harvester reports it is nearly full.
    pub nearly_full_ratio: Fixed64,
    /// Regrowth time of a resource node per unit of harvest time.
    pub regrowth_per_harvest_time_ms: Millis,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 1_000,
            nearly_full_ratio: Fixed64::from_num(0.9),
            regrowth_per_harvest_time_ms: 2_000,
        }
    }
}

/// Crafting engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftingConfig {
    /// Longest the scheduler sleeps before re-checking the clock.
    pub max_poll_ms: Millis,
    /// How long `shutdown` waits for the scheduler thread to exit.
    pub shutdown_timeout_ms: Millis,
}

impl Default for CraftingConfig {
    fn default() -> Self {
        Self {
            max_poll_ms: 50,
            shutdown_timeout_ms: 2_000,
        }
    }
}

/// Starting state of the player's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub capacity: u32,
    pub starting_money: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            starting_money: 100,
        }
    }
}

/// Top-level configuration injected into the registry and crafting engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub maintenance: MaintenanceConfig,
    pub harvest: HarvestConfig,
    pub crafting: CraftingConfig,
    pub player: PlayerConfig,
}
