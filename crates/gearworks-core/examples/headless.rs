//! Headless run: a harvester feeds wood to the player, who hand-crafts
//! planks while a factory turns stone into tools.
//!
//! The simulation runs on a manual clock, so ten simulated seconds take
//! no real time. Set `RUST_LOG=gearworks_core=debug` to see every
//! transition.
//!
//! Run with: `cargo run -p gearworks-core --example headless`

use gearworks_core::catalog::{Catalog, Recipe};
use gearworks_core::clock::{Clock, ManualClock};
use gearworks_core::config::SimConfig;
use gearworks_core::crafting::{CraftFailure, CraftingEngine, CraftingListener};
use gearworks_core::grid::{ResourceNode, TileMap};
use gearworks_core::id::*;
use gearworks_core::ledger::Ledger;
use gearworks_core::machine::Configuration;
use gearworks_core::registry::MachineRegistry;
use gearworks_core::rng::SimRng;
use gearworks_core::snapshot;
use gearworks_core::stats::MachineStatistics;
use gearworks_core::upkeep;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Prints crafting callbacks as they arrive.
struct PrintListener;

impl CraftingListener for PrintListener {
    fn on_crafting_started(&self, process: &ProcessId, recipe: &Recipe) {
        println!("  [craft] {process}: started {}", recipe.name);
    }

    fn on_crafting_completed(&self, process: &ProcessId, recipe: &Recipe) {
        println!("  [craft] {process}: finished {}", recipe.name);
    }

    fn on_crafting_failed(&self, process: &ProcessId, recipe: &Recipe, reason: &CraftFailure) {
        println!("  [craft] {process}: {} failed: {reason}", recipe.name);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let catalog = Arc::new(Catalog::standard());
    let config = SimConfig::default();
    let clock = ManualClock::new(0);
    let mut registry = MachineRegistry::with_rng(
        catalog.clone(),
        config.clone(),
        Arc::new(clock.clone()),
        SimRng::new(2024),
    );
    let engine = CraftingEngine::manual(Arc::new(clock.clone()), &config.crafting);
    engine.add_crafting_listener(Arc::new(PrintListener));

    let player =
        Ledger::with_money(config.player.capacity, config.player.starting_money).shared();
    let wood = catalog.resource_id("WOOD").ok_or("no WOOD")?;
    let stone = catalog.resource_id("STONE").ok_or("no STONE")?;
    let planks = catalog
        .recipe_id("Wooden Planks")
        .and_then(|id| catalog.recipe(id))
        .ok_or("no planks recipe")?
        .clone();

    // --- World: wood on both sides of the harvester ---

    let mut grid = TileMap::new(8, 8);
    for pos in [Position::new(1, 2), Position::new(3, 2), Position::new(2, 1)] {
        grid.place_resource(pos, ResourceNode::from_catalog(&catalog, wood, &config.harvest));
    }

    let harvester = Position::new(2, 2);
    let factory = Position::new(5, 5);
    registry
        .place_machine_named(&mut grid, "ADVANCED_HARVESTER", harvester)
        .ok_or("harvester placement failed")?;
    registry
        .place_machine_named(&mut grid, "BASIC_FACTORY", factory)
        .ok_or("factory placement failed")?;
    registry.configure_at(harvester, Configuration::TargetResource(wood));
    let tools = catalog.recipe_id("Stone Tools").ok_or("no tools recipe")?;
    registry.configure_at(factory, Configuration::Recipe(tools));
    if let Some(machine) = registry.get_machine_at(factory) {
        let _ = machine.ledger().add_resource(stone, 6);
        let _ = machine.ledger().add_resource(wood, 3);
    }

    // --- Run ten simulated seconds at 250 ms per tick ---

    let mut stats = MachineStatistics::new(clock.now_ms());
    let mut crafts = 0;
    for tick in 0..40 {
        registry.update_machines(&mut grid);
        clock.advance(250);
        engine.run_due_completions();

        if let Some(machine) = registry.get_machine_at(harvester) {
            upkeep::collect_output(machine, &player, &mut stats, clock.now_ms());
        }
        if let Some(machine) = registry.get_machine_at(factory) {
            upkeep::collect_output(machine, &player, &mut stats, clock.now_ms());
        }
        if player.resource_count(wood) >= 2
            && engine.start_crafting(&planks, &player, format!("planks-{crafts}"))
        {
            crafts += 1;
        }

        if tick % 8 == 7 {
            println!("t={:>5} ms", clock.now_ms());
            for machine in registry.all_machines() {
                println!("  {:<20} {}", machine.machine_type().name, machine.status_message());
            }
        }
    }
    clock.advance(2_000);
    engine.run_due_completions();

    println!("\nPlayer inventory:\n{}", player.inventory_display(&catalog));
    println!(
        "Collected {} resources, produced {} items",
        stats.total_resources_collected(),
        stats.total_items_produced()
    );

    let json = snapshot::capture(&registry, &player).to_json()?;
    println!("\nSnapshot is {} bytes of JSON", json.len());
    Ok(())
}
