//! Serde data file structs for game content and tuning.
//!
//! These structs define the on-disk format for resources, machines,
//! recipes, and simulation config. They are deserialized from RON, JSON,
//! or TOML data files and then resolved into engine types by the loader.
//! Probabilities and multipliers are written as plain decimals and
//! converted to fixed-point during resolution.

use serde::Deserialize;

// ===========================================================================
// Resources
// ===========================================================================

/// A resource type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceData {
    pub name: String,
    pub base_price: u32,
    /// Zero marks a crafted, non-harvestable resource.
    #[serde(default)]
    pub harvest_time: u32,
}

// ===========================================================================
// Machines
// ===========================================================================

/// Work strategy of a machine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyData {
    Harvester,
    Factory,
}

/// A machine type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineData {
    pub name: String,
    pub family: FamilyData,
    pub base_price: u32,
    #[serde(default = "default_speed")]
    pub processing_speed: u32,
    #[serde(default = "default_capacity")]
    pub inventory_capacity: u32,
    /// Zero means unlimited.
    #[serde(default)]
    pub configuration_limit: u32,
    #[serde(default)]
    pub breakdown_chance: f64,
    #[serde(default)]
    pub description: String,
}

fn default_speed() -> u32 {
    1
}

fn default_capacity() -> u32 {
    50
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe definition in a data file. Entries are `(resource, quantity)`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub ingredients: Vec<(String, u32)>,
    pub results: Vec<(String, u32)>,
    #[serde(default)]
    pub crafting_time_ms: u64,
    #[serde(default)]
    pub instant: bool,
}

// ===========================================================================
// Simulation config
// ===========================================================================

/// Overrides for the simulation config. Every field is optional; anything
/// left out keeps the engine default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub maintenance: MaintenanceData,
    pub harvest: HarvestData,
    pub crafting: CraftingData,
    pub player: PlayerData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaintenanceData {
    pub fragile_threshold: Option<u32>,
    pub standard_threshold: Option<u32>,
    pub max_breakdown_chance: Option<f64>,
    pub operation_cooldown_ms: Option<u64>,
    pub wear_onset: Option<f64>,
    pub max_efficiency_loss: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestData {
    pub base_interval_ms: Option<u64>,
    pub nearly_full_ratio: Option<f64>,
    pub regrowth_per_harvest_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CraftingData {
    pub max_poll_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerData {
    pub capacity: Option<u32>,
    pub starting_money: Option<u64>,
}
