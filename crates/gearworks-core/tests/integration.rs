//! End-to-end scenarios across the registry, machines, ledgers and the
//! crafting engine.

use gearworks_core::clock::{Clock, ManualClock};
use gearworks_core::config::{CraftingConfig, SimConfig};
use gearworks_core::crafting::{CraftFailure, CraftingEngine};
use gearworks_core::grid::Grid;
use gearworks_core::id::*;
use gearworks_core::ledger::Ledger;
use gearworks_core::machine::{Configuration, MachineStatus};
use gearworks_core::snapshot::{self, WorldSnapshot};
use gearworks_core::stats::MachineStatistics;
use gearworks_core::test_utils::*;
use gearworks_core::upkeep::{self, UpkeepError};
use std::sync::Arc;
use std::time::Duration;

// ===========================================================================
// Crafting engine
// ===========================================================================

#[test]
fn planks_craft_reserves_then_delivers() {
    let catalog = standard_catalog();
    let clock = ManualClock::new(0);
    let engine = CraftingEngine::manual(Arc::new(clock.clone()), &CraftingConfig::default());
    let listener = RecordingListener::new();
    engine.add_crafting_listener(listener.clone());

    let player = Ledger::new(100).shared();
    assert!(player.add_resource(wood(), 4));
    let planks = recipe(&catalog, wooden_planks_recipe());

    assert!(engine.can_craft(&planks, &player));
    assert!(engine.start_crafting(&planks, &player, "craft-1"));
    assert_eq!(player.resource_count(wood()), 2);

    clock.advance(1_999);
    assert_eq!(engine.run_due_completions(), 0);
    clock.advance(1);
    assert_eq!(engine.run_due_completions(), 1);

    assert_eq!(player.resource_count(wooden_planks()), 1);
    assert_eq!(player.resource_count(wood()), 2);
    assert_eq!(
        listener.events(),
        vec![
            CraftEvent::Started("craft-1".into()),
            CraftEvent::Completed("craft-1".into()),
        ]
    );
    assert_eq!(engine.crafting_progress(&"craft-1".into()), 1.0);
}

#[test]
fn craft_without_ingredients_fails_cleanly() {
    let catalog = standard_catalog();
    let engine =
        CraftingEngine::manual(Arc::new(ManualClock::new(0)), &CraftingConfig::default());
    let listener = RecordingListener::new();
    engine.add_crafting_listener(listener.clone());

    let player = Ledger::with_money(100, 40).shared();
    let before = player.contents();
    let planks = recipe(&catalog, wooden_planks_recipe());
    assert!(!engine.can_craft(&planks, &player));
    assert!(!engine.start_crafting(&planks, &player, "craft-1"));
    assert_eq!(player.contents(), before);
    assert_eq!(
        listener.events(),
        vec![CraftEvent::Failed(
            "craft-1".into(),
            CraftFailure::MissingIngredients {
                recipe: "Wooden Planks".into()
            }
        )]
    );
}

#[test]
fn scheduler_thread_delivers_on_its_own() {
    let catalog = standard_catalog();
    let clock = ManualClock::new(0);
    let engine = CraftingEngine::new(Arc::new(clock.clone()), &CraftingConfig::default())
        .expect("spawn scheduler");
    let listener = RecordingListener::new();
    engine.add_crafting_listener(listener.clone());

    let player = Ledger::new(100).shared();
    assert!(player.add_resource(food(), 6));
    let preserved = recipe(&catalog, preserved_food_recipe());
    assert!(engine.start_crafting(&preserved, &player, "a"));
    assert!(engine.start_crafting(&preserved, &player, "b"));
    assert_eq!(player.resource_count(food()), 0);

    clock.advance(1_500);
    assert!(wait_until(Duration::from_secs(5), || {
        player.resource_count(preserved_food()) == 4
    }));
    assert!(engine.active_processes().is_empty());
    let completed = listener
        .events()
        .into_iter()
        .filter(|e| matches!(e, CraftEvent::Completed(_)))
        .count();
    assert_eq!(completed, 2);
    engine.shutdown();
}

#[test]
fn machine_tick_and_crafting_share_the_player_ledger() {
    let catalog = standard_catalog();
    let (mut registry, clock) = manual_registry(catalog.clone(), SimConfig::default(), 1);
    let engine = CraftingEngine::new(Arc::new(clock.clone()), &CraftingConfig::default())
        .expect("spawn scheduler");
    let player = Ledger::new(100).shared();

    let mut grid = grid_with_nodes(
        3,
        3,
        &[
            (Position::new(1, 0), wood(), 0),
            (Position::new(0, 1), wood(), 0),
        ],
    );
    let pos = Position::new(1, 1);
    registry.create_machine(advanced_harvester(), pos).unwrap();
    assert!(registry.configure_at(pos, Configuration::TargetResource(wood())));

    let mut stats = MachineStatistics::new(0);
    let planks = recipe(&catalog, wooden_planks_recipe());
    for round in 0..10 {
        registry.update_machines(&mut grid);
        clock.advance(500);
        let harvester = registry.get_machine_at(pos).unwrap();
        upkeep::collect_output(harvester, &player, &mut stats, clock.now_ms());
        if player.resource_count(wood()) >= 2 {
            assert!(engine.start_crafting(&planks, &player, format!("craft-{round}")));
        }
    }
    clock.advance(2_000);
    assert!(wait_until(Duration::from_secs(5), || engine
        .active_processes()
        .is_empty()));

    // Every harvested unit ended up either as wood or inside a plank.
    let wood_left = u64::from(player.resource_count(wood()));
    let planks_made = u64::from(player.resource_count(wooden_planks()));
    assert_eq!(wood_left + 2 * planks_made, stats.total_resources_collected());
    assert!(planks_made > 0);
}

// ===========================================================================
// Machines
// ===========================================================================

#[test]
fn harvester_takes_one_wood_then_waits_for_regrowth() {
    let catalog = standard_catalog();
    let (mut registry, clock) = manual_registry(catalog, SimConfig::default(), 7);
    let source = Position::new(2, 1);
    let mut grid = grid_with_nodes(4, 4, &[(source, wood(), 4_000)]);
    let pos = Position::new(1, 1);
    registry.create_machine(basic_harvester(), pos).unwrap();
    assert!(registry.configure_at(pos, Configuration::TargetResource(wood())));

    registry.update_machines(&mut grid);
    clock.set(1_000);
    registry.update_machines(&mut grid);

    let machine = registry.get_machine_at(pos).unwrap();
    assert_eq!(machine.ledger().resource_count(wood()), 1);
    let node = grid.tile(source).unwrap().resource.as_ref().unwrap();
    assert!(!node.can_harvest(1_000));
    assert!(!node.can_harvest(4_999));
    assert!(node.can_harvest(5_000));

    clock.set(2_000);
    registry.update_machines(&mut grid);
    let machine = registry.get_machine_at(pos).unwrap();
    assert_eq!(machine.ledger().resource_count(wood()), 1);
    assert_eq!(machine.status(), MachineStatus::NoResources);
}

#[test]
fn basic_factory_rejects_second_recipe() {
    let (mut registry, _) = manual_registry(standard_catalog(), SimConfig::default(), 7);
    let pos = Position::new(0, 0);
    registry.create_machine(basic_factory(), pos).unwrap();
    assert!(registry.configure_at(pos, Configuration::Recipe(wooden_planks_recipe())));
    assert!(!registry.configure_at(pos, Configuration::Recipe(stone_tools_recipe())));

    let mut grid = grid_with_nodes(1, 1, &[]);
    registry.update_machines(&mut grid);
    let machine = registry.get_machine_at(pos).unwrap();
    assert_eq!(machine.selected_recipe().unwrap().id, wooden_planks_recipe());
    assert_eq!(machine.times_configured(), 1);
    assert_eq!(machine.remaining_configurations(), Some(0));
}

#[test]
fn broken_harvester_stops_until_serviced() {
    let (mut registry, clock) =
        manual_registry(doomed_catalog(), certain_breakdown_config(), 3);
    let doomed_wood = registry.catalog().resource_id("WOOD").unwrap();
    let pos = Position::new(1, 1);
    let mut grid = grid_with_nodes(3, 3, &[(Position::new(1, 0), doomed_wood, 0)]);
    registry
        .create_machine_named("DOOMED_HARVESTER", pos)
        .unwrap();
    assert!(registry.configure_at(pos, Configuration::TargetResource(doomed_wood)));

    // Three counted harvest passes reach the fragile threshold.
    for t in [0, 1_000, 2_000, 3_000] {
        clock.set(t);
        registry.update_machines(&mut grid);
    }
    assert_eq!(
        registry.get_machine_at(pos).unwrap().operations_since_maintenance(),
        3
    );
    clock.set(4_000);
    registry.update_machines(&mut grid);
    let machine = registry.get_machine_at(pos).unwrap();
    assert_eq!(machine.status(), MachineStatus::NeedsMaintenance);
    let held = machine.ledger().resource_count(doomed_wood);

    clock.set(5_000);
    registry.update_machines(&mut grid);
    assert_eq!(
        registry.get_machine_at(pos).unwrap().ledger().resource_count(doomed_wood),
        held
    );

    let poor = Ledger::with_money(10, 5);
    assert_eq!(
        upkeep::service_at(&mut registry, pos, &poor),
        Err(UpkeepError::InsufficientFunds {
            cost: 16,
            available: 5
        })
    );
    let payer = Ledger::with_money(10, 100);
    assert_eq!(upkeep::service_at(&mut registry, pos, &payer), Ok(16));
    assert_eq!(payer.money(), 84);

    let machine = registry.get_machine_at(pos).unwrap();
    assert_eq!(machine.status(), MachineStatus::Idle);
    assert_eq!(machine.operations_since_maintenance(), 0);
    assert_eq!(
        upkeep::service_at(&mut registry, Position::new(9, 9), &payer),
        Err(UpkeepError::NoMachine(Position::new(9, 9)))
    );
}

// ===========================================================================
// Persistence
// ===========================================================================

#[test]
fn snapshot_survives_binary_round_trip_and_restore() {
    let catalog = standard_catalog();
    let (mut registry, _) = manual_registry(catalog.clone(), SimConfig::default(), 11);
    let factory = Position::new(3, 3);
    registry.create_machine(fragile_factory(), factory).unwrap();
    assert!(registry.configure_at(factory, Configuration::Recipe(stone_tools_recipe())));
    assert!(registry
        .get_machine_at(factory)
        .unwrap()
        .ledger()
        .add_resource(stone(), 4));
    let player = Ledger::with_money(100, 75);

    let bytes = snapshot::capture(&registry, &player).to_bytes().unwrap();
    let decoded = WorldSnapshot::from_bytes(&bytes).unwrap();

    let (mut restored, _) = manual_registry(catalog, SimConfig::default(), 12);
    let restored_player = Ledger::new(100);
    snapshot::restore(&decoded, &mut restored, &restored_player).unwrap();

    let machine = restored.get_machine_at(factory).unwrap();
    assert_eq!(machine.machine_type().id, fragile_factory());
    assert_eq!(machine.selected_recipe().unwrap().id, stone_tools_recipe());
    assert_eq!(machine.ledger().resource_count(stone()), 4);
    assert_eq!(restored_player.money(), 75);
}
