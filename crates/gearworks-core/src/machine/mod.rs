//! Per-machine state machines.
//!
//! A [`Machine`] composes three policies: the [`Maintenance`] record built
//! from its type, a [`Work`] strategy picked by the type's family, and the
//! configuration budget. [`Machine::update`] evaluates them in a fixed
//! priority order each tick:
//!
//! 1. Unconfigured machines report `NeedsConfig` (or `ConfigLimitReached`).
//! 2. A broken machine reports `NeedsMaintenance` and does nothing else.
//!    Past the threshold a breakdown roll may break it right here.
//! 3. The work strategy checks capacity, availability, and does its unit
//!    of work.
//! 4. A completed harvest pass or craft counts one operation.

pub mod factory;
pub mod harvester;
pub mod maintenance;

pub use factory::{Factory, FactoryCraft};
pub use harvester::Harvester;
pub use maintenance::{Maintenance, MaintenanceProfile};

use crate::catalog::{Catalog, MachineFamily, MachineType, Recipe, RecipeEntry};
use crate::config::SimConfig;
use crate::fixed::{Fixed64, Millis};
use crate::grid::Grid;
use crate::id::{Position, RecipeId, ResourceTypeId};
use crate::ledger::Ledger;
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Machine status as shown to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    #[default]
    Idle,
    NeedsConfig,
    ConfigLimitReached,
    Working,
    InventoryFull,
    /// Harvesters only: at or above the nearly-full ratio.
    InventoryNearlyFull,
    InsufficientResources,
    NoResources,
    NeedsMaintenance,
}

/// Result of one work-strategy tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOutcome {
    /// New status, or `None` to keep the current one.
    pub status: Option<MachineStatus>,
    /// A harvest pass or craft finished and may count as an operation.
    pub completed_operation: bool,
}

impl WorkOutcome {
    pub fn status(status: MachineStatus) -> Self {
        Self {
            status: Some(status),
            completed_operation: false,
        }
    }

    pub fn unchanged() -> Self {
        Self {
            status: None,
            completed_operation: false,
        }
    }
}

/// What a machine has been configured to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Configuration {
    TargetResource(ResourceTypeId),
    Recipe(RecipeId),
}

/// Family-specific work strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Work {
    Harvester(Harvester),
    Factory(Factory),
}

impl Work {
    fn for_type(machine_type: &MachineType, config: &SimConfig) -> Self {
        match machine_type.family {
            MachineFamily::Harvester => {
                Work::Harvester(Harvester::new(machine_type.processing_speed, &config.harvest))
            }
            MachineFamily::Factory => Work::Factory(Factory::new(machine_type.processing_speed)),
        }
    }

    fn is_configured(&self) -> bool {
        match self {
            Work::Harvester(h) => h.target().is_some(),
            Work::Factory(f) => f.recipe().is_some(),
        }
    }
}

/// A placed machine with its own ledger.
#[derive(Debug, Clone)]
pub struct Machine {
    position: Position,
    machine_type: Arc<MachineType>,
    catalog: Arc<Catalog>,
    ledger: Ledger,
    status: MachineStatus,
    maintenance: Maintenance,
    times_configured: u32,
    work: Work,
    rng: SimRng,
    last_update_ms: Millis,
}

impl Machine {
    pub fn new(
        machine_type: Arc<MachineType>,
        catalog: Arc<Catalog>,
        position: Position,
        config: &SimConfig,
        rng: SimRng,
    ) -> Self {
        let maintenance = Maintenance::new(MaintenanceProfile::for_type(
            &machine_type,
            &config.maintenance,
        ));
        Self {
            position,
            ledger: Ledger::new(machine_type.inventory_capacity),
            work: Work::for_type(&machine_type, config),
            machine_type,
            catalog,
            status: MachineStatus::Idle,
            maintenance,
            times_configured: 0,
            rng,
            last_update_ms: 0,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn machine_type(&self) -> &Arc<MachineType> {
        &self.machine_type
    }

    pub fn family(&self) -> MachineFamily {
        self.machine_type.family
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn work(&self) -> &Work {
        &self.work
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    fn set_status(&mut self, status: MachineStatus) {
        if self.status != status {
            tracing::debug!(position = %self.position, from = ?self.status, to = ?status, "machine status");
            self.status = status;
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one tick. Not reentrant; the registry calls this from a single
    /// driver thread.
    pub fn update(&mut self, grid: &mut dyn Grid, now: Millis) {
        self.last_update_ms = now;

        if !self.work.is_configured() {
            let status = if self.can_be_reconfigured() {
                MachineStatus::NeedsConfig
            } else {
                MachineStatus::ConfigLimitReached
            };
            self.set_status(status);
            return;
        }

        let was_broken = self.maintenance.needs_maintenance();
        if self.maintenance.check(&mut self.rng) {
            if !was_broken {
                tracing::warn!(
                    position = %self.position,
                    machine = %self.machine_type.name,
                    operations = self.maintenance.operations_since_maintenance(),
                    "machine broke down"
                );
            }
            self.set_status(MachineStatus::NeedsMaintenance);
            return;
        }

        let position = self.position;
        let outcome = match &mut self.work {
            Work::Harvester(h) => h.tick(position, &self.ledger, grid, now),
            Work::Factory(f) => f.tick(position, &self.ledger, now),
        };
        if let Some(status) = outcome.status {
            self.set_status(status);
        }
        if outcome.completed_operation {
            self.maintenance.record_operation(now);
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// True while the configuration budget allows another change.
    pub fn can_be_reconfigured(&self) -> bool {
        let limit = self.machine_type.configuration_limit;
        limit == 0 || self.times_configured < limit
    }

    /// Configurations left, or `None` when the type is unlimited.
    pub fn remaining_configurations(&self) -> Option<u32> {
        match self.machine_type.configuration_limit {
            0 => None,
            limit => Some(limit.saturating_sub(self.times_configured)),
        }
    }

    pub fn times_configured(&self) -> u32 {
        self.times_configured
    }

    /// Apply a configuration. Returns false and changes nothing if the
    /// budget is spent, the configuration does not fit the machine family,
    /// or it names something the catalog does not know.
    pub fn configure(&mut self, configuration: Configuration) -> bool {
        if !self.can_be_reconfigured() {
            return false;
        }
        if !self.apply(configuration) {
            return false;
        }
        self.times_configured += 1;
        tracing::debug!(
            position = %self.position,
            ?configuration,
            times_configured = self.times_configured,
            "machine configured"
        );
        true
    }

    pub fn set_target_resource(&mut self, resource: ResourceTypeId) -> bool {
        self.configure(Configuration::TargetResource(resource))
    }

    pub fn set_recipe(&mut self, recipe: RecipeId) -> bool {
        self.configure(Configuration::Recipe(recipe))
    }

    /// Re-apply a persisted configuration without touching the budget, then
    /// restore the persisted counter.
    pub fn restore_configuration(
        &mut self,
        configuration: Option<Configuration>,
        times_configured: u32,
    ) -> bool {
        let applied = configuration.is_none_or(|c| self.apply(c));
        self.times_configured = times_configured;
        applied
    }

    fn apply(&mut self, configuration: Configuration) -> bool {
        match (&mut self.work, configuration) {
            (Work::Harvester(h), Configuration::TargetResource(resource)) => {
                if !self
                    .catalog
                    .resource(resource)
                    .is_some_and(|r| r.is_harvestable())
                {
                    return false;
                }
                h.set_target(resource);
            }
            (Work::Factory(f), Configuration::Recipe(recipe)) => {
                let Some(recipe) = self.catalog.recipe(recipe).cloned() else {
                    return false;
                };
                for entry in f.set_recipe(recipe) {
                    if !self.ledger.add_resource(entry.resource, entry.quantity) {
                        tracing::warn!(
                            position = %self.position,
                            resource = ?entry.resource,
                            quantity = entry.quantity,
                            "reserved ingredients did not fit on refund"
                        );
                    }
                }
            }
            _ => return false,
        }
        self.status = MachineStatus::Idle;
        true
    }

    /// Current configuration, if any.
    pub fn configuration(&self) -> Option<Configuration> {
        match &self.work {
            Work::Harvester(h) => h.target().map(Configuration::TargetResource),
            Work::Factory(f) => f.recipe().map(|r| Configuration::Recipe(r.id)),
        }
    }

    pub fn target_resource(&self) -> Option<ResourceTypeId> {
        match &self.work {
            Work::Harvester(h) => h.target(),
            Work::Factory(_) => None,
        }
    }

    pub fn selected_recipe(&self) -> Option<&Arc<Recipe>> {
        match &self.work {
            Work::Harvester(_) => None,
            Work::Factory(f) => f.recipe(),
        }
    }

    /// Ingredients held back by an in-flight factory craft.
    pub fn reserved(&self) -> &[RecipeEntry] {
        match &self.work {
            Work::Harvester(_) => &[],
            Work::Factory(f) => f.reserved(),
        }
    }

    /// Progress of the in-flight craft at the last update, 0 when idle.
    pub fn crafting_progress(&self) -> f64 {
        self.crafting_progress_at(self.last_update_ms)
    }

    pub fn crafting_progress_at(&self, now: Millis) -> f64 {
        match &self.work {
            Work::Factory(f) => f.current_craft().map_or(0.0, |c| c.progress(now)),
            Work::Harvester(_) => 0.0,
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    pub fn needs_maintenance(&self) -> bool {
        self.maintenance.needs_maintenance()
    }

    pub fn operations_since_maintenance(&self) -> u32 {
        self.maintenance.operations_since_maintenance()
    }

    pub fn maintenance_threshold(&self) -> u32 {
        self.maintenance.profile().threshold
    }

    pub fn is_fragile(&self) -> bool {
        self.machine_type.is_fragile()
    }

    pub fn breakdown_chance(&self) -> Fixed64 {
        self.maintenance.breakdown_chance()
    }

    /// Informational wear signal; throughput does not depend on it.
    pub fn efficiency_multiplier(&self) -> Fixed64 {
        self.maintenance.efficiency_multiplier()
    }

    /// Clear the breakdown flag and the operation counter.
    pub fn perform_maintenance(&mut self) {
        tracing::info!(
            position = %self.position,
            operations = self.maintenance.operations_since_maintenance(),
            "maintenance performed"
        );
        self.maintenance.perform();
        self.set_status(MachineStatus::Idle);
    }

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    pub fn status_message(&self) -> String {
        match self.status {
            MachineStatus::Idle => "Idle".to_string(),
            MachineStatus::NeedsMaintenance => "Needs maintenance".to_string(),
            MachineStatus::ConfigLimitReached => "Configuration limit reached".to_string(),
            status => match &self.work {
                Work::Harvester(h) => self.harvester_message(h, status),
                Work::Factory(f) => self.factory_message(f, status),
            },
        }
    }

    fn harvester_message(&self, harvester: &Harvester, status: MachineStatus) -> String {
        let target = harvester
            .target()
            .map_or("?", |r| self.catalog.resource_name(r));
        let used = self.ledger.total_items();
        let capacity = self.ledger.capacity();
        match status {
            MachineStatus::NeedsConfig => "Needs target resource".to_string(),
            MachineStatus::InventoryFull => format!("Inventory full! ({used}/{capacity})"),
            MachineStatus::InventoryNearlyFull => {
                format!("Inventory almost full! ({used}/{capacity})")
            }
            MachineStatus::NoResources => format!("No harvestable {target} nearby"),
            _ => format!("Harvesting {target}"),
        }
    }

    fn factory_message(&self, factory: &Factory, status: MachineStatus) -> String {
        match status {
            MachineStatus::NeedsConfig => "Needs recipe configuration".to_string(),
            MachineStatus::InventoryFull => "Output inventory full".to_string(),
            MachineStatus::InsufficientResources => "Missing required resources".to_string(),
            _ => {
                let name = factory.recipe().map_or("?", |r| r.name.as_str());
                match factory.current_craft() {
                    Some(craft) => format!(
                        "Crafting {name} ({:.0}%)",
                        craft.progress(self.last_update_ms) * 100.0
                    ),
                    None => format!("Crafting {name}"),
                }
            }
        }
    }
}
