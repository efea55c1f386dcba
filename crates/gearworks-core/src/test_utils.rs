//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::catalog::{Catalog, CatalogBuilder, MachineFamily, MachineSpec, Recipe, RecipeEntry};
use crate::clock::ManualClock;
use crate::config::SimConfig;
use crate::crafting::{CraftFailure, CraftingListener};
use crate::fixed::{Fixed64, Millis};
use crate::grid::{ResourceNode, TileMap};
use crate::id::*;
use crate::registry::MachineRegistry;
use crate::rng::SimRng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Standard catalog ids (registration order of `Catalog::standard`)
// ===========================================================================

pub fn wood() -> ResourceTypeId {
    ResourceTypeId(0)
}
pub fn stone() -> ResourceTypeId {
    ResourceTypeId(1)
}
pub fn iron() -> ResourceTypeId {
    ResourceTypeId(2)
}
pub fn gold() -> ResourceTypeId {
    ResourceTypeId(3)
}
pub fn food() -> ResourceTypeId {
    ResourceTypeId(4)
}
pub fn wooden_planks() -> ResourceTypeId {
    ResourceTypeId(5)
}
pub fn stone_tools() -> ResourceTypeId {
    ResourceTypeId(6)
}
pub fn preserved_food() -> ResourceTypeId {
    ResourceTypeId(8)
}

pub fn basic_harvester() -> MachineTypeId {
    MachineTypeId(0)
}
pub fn advanced_harvester() -> MachineTypeId {
    MachineTypeId(1)
}
pub fn fragile_harvester() -> MachineTypeId {
    MachineTypeId(2)
}
pub fn basic_factory() -> MachineTypeId {
    MachineTypeId(3)
}
pub fn advanced_factory() -> MachineTypeId {
    MachineTypeId(4)
}
pub fn fragile_factory() -> MachineTypeId {
    MachineTypeId(5)
}

pub fn wooden_planks_recipe() -> RecipeId {
    RecipeId(0)
}
pub fn stone_tools_recipe() -> RecipeId {
    RecipeId(1)
}
pub fn preserved_food_recipe() -> RecipeId {
    RecipeId(3)
}
pub fn quick_planks_recipe() -> RecipeId {
    RecipeId(6)
}

// ===========================================================================
// Catalogs
// ===========================================================================

pub fn standard_catalog() -> Arc<Catalog> {
    Arc::new(Catalog::standard())
}

pub fn recipe(catalog: &Catalog, id: RecipeId) -> Arc<Recipe> {
    catalog.recipe(id).expect("recipe exists").clone()
}

/// WOOD and WOODEN_PLANKS, a harvester and a factory that always break once
/// past the threshold, and the planks recipe. Pair with
/// [`certain_breakdown_config`].
pub fn doomed_catalog() -> Arc<Catalog> {
    let mut b = CatalogBuilder::new();
    let wood = b.register_resource("WOOD", 10, 2);
    let planks = b.register_resource("WOODEN_PLANKS", 20, 0);
    for (name, family) in [
        ("DOOMED_HARVESTER", MachineFamily::Harvester),
        ("DOOMED_FACTORY", MachineFamily::Factory),
    ] {
        b.register_machine(MachineSpec {
            name,
            family,
            base_price: 100,
            processing_speed: 1,
            inventory_capacity: 50,
            configuration_limit: 0,
            breakdown_chance: fixed(1.0),
            description: "breaks down as soon as it can",
        });
    }
    b.register_recipe(
        "Wooden Planks",
        vec![RecipeEntry::new(wood, 2)],
        vec![RecipeEntry::new(planks, 1)],
        2_000,
        false,
    );
    Arc::new(b.build().expect("doomed catalog is valid"))
}

/// Default config with the breakdown cap lifted to 1.
pub fn certain_breakdown_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.maintenance.max_breakdown_chance = fixed(1.0);
    config
}

// ===========================================================================
// Registries and grids
// ===========================================================================

/// A seeded registry on a manual clock starting at 0.
pub fn manual_registry(catalog: Arc<Catalog>, config: SimConfig, seed: u64) -> (MachineRegistry, ManualClock) {
    let clock = ManualClock::new(0);
    let registry =
        MachineRegistry::with_rng(catalog, config, Arc::new(clock.clone()), SimRng::new(seed));
    (registry, clock)
}

/// An empty grid with resource nodes at the given positions.
pub fn grid_with_nodes(
    width: i32,
    height: i32,
    nodes: &[(Position, ResourceTypeId, Millis)],
) -> TileMap {
    let mut grid = TileMap::new(width, height);
    for &(pos, resource, cooldown_ms) in nodes {
        grid.place_resource(pos, ResourceNode::new(resource, cooldown_ms));
    }
    grid
}

// ===========================================================================
// Crafting
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CraftEvent {
    Started(ProcessId),
    Completed(ProcessId),
    Failed(ProcessId, CraftFailure),
}

/// Listener that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<CraftEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CraftEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn push(&self, event: CraftEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

impl CraftingListener for RecordingListener {
    fn on_crafting_started(&self, process: &ProcessId, _recipe: &Recipe) {
        self.push(CraftEvent::Started(process.clone()));
    }

    fn on_crafting_completed(&self, process: &ProcessId, _recipe: &Recipe) {
        self.push(CraftEvent::Completed(process.clone()));
    }

    fn on_crafting_failed(&self, process: &ProcessId, _recipe: &Recipe, reason: &CraftFailure) {
        self.push(CraftEvent::Failed(process.clone(), reason.clone()));
    }
}

/// Poll `cond` until it holds or `timeout` passes. Returns the final value.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
