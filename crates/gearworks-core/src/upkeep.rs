//! Paying for maintenance and emptying machine inventories.
//!
//! The machine itself only tracks wear. What maintenance costs, who pays,
//! and where a machine's output goes are decided here.

use crate::catalog::MachineFamily;
use crate::fixed::Millis;
use crate::id::{Position, ResourceTypeId};
use crate::ledger::{Ledger, transfer};
use crate::machine::Machine;
use crate::registry::MachineRegistry;
use crate::stats::MachineStatistics;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpkeepError {
    #[error("no machine at {0}")]
    NoMachine(Position),
    #[error("machine at {0} does not need maintenance")]
    NotNeeded(Position),
    #[error("maintenance costs {cost} but only {available} is available")]
    InsufficientFunds { cost: u64, available: u64 },
}

/// 10% of the base price plus 2 per operation since the last maintenance.
pub fn maintenance_cost(machine: &Machine) -> u64 {
    u64::from(machine.machine_type().base_price) / 10
        + 2 * u64::from(machine.operations_since_maintenance())
}

/// Charge `payer` and repair the machine. Returns the amount paid.
pub fn service(machine: &mut Machine, payer: &Ledger) -> Result<u64, UpkeepError> {
    if !machine.needs_maintenance() {
        return Err(UpkeepError::NotNeeded(machine.position()));
    }
    let cost = maintenance_cost(machine);
    if !payer.remove_money(cost) {
        return Err(UpkeepError::InsufficientFunds {
            cost,
            available: payer.money(),
        });
    }
    machine.perform_maintenance();
    Ok(cost)
}

/// [`service`] for the machine at `position`.
pub fn service_at(
    registry: &mut MachineRegistry,
    position: Position,
    payer: &Ledger,
) -> Result<u64, UpkeepError> {
    let machine = registry
        .get_machine_at_mut(position)
        .ok_or(UpkeepError::NoMachine(position))?;
    service(machine, payer)
}

/// Move a machine's output into the player's ledger, one resource type at
/// a time, stopping at the first type that does not fit. Harvesters hand
/// over everything; factories hand over only their recipe's results.
/// Returns the number of items moved.
pub fn collect_output(
    machine: &Machine,
    player: &Ledger,
    stats: &mut MachineStatistics,
    now: Millis,
) -> u32 {
    let outputs: Option<Vec<ResourceTypeId>> = match machine.family() {
        MachineFamily::Harvester => None,
        MachineFamily::Factory => machine
            .selected_recipe()
            .map(|r| r.results.iter().map(|e| e.resource).collect()),
    };

    let mut moved = 0;
    for (resource, count) in machine.ledger().resources() {
        if outputs.as_ref().is_some_and(|o| !o.contains(&resource)) {
            continue;
        }
        if !transfer(machine.ledger(), player, resource, count) {
            break;
        }
        match machine.family() {
            MachineFamily::Harvester => stats.record_resource_collection(resource, count, now),
            MachineFamily::Factory => stats.record_item_production(resource, count, now),
        }
        moved += count;
    }
    if moved > 0 {
        tracing::debug!(position = %machine.position(), moved, "machine output collected");
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::SimConfig;
    use crate::fixed::Fixed64;
    use crate::rng::SimRng;
    use std::sync::Arc;

    fn machine(name: &str) -> Machine {
        let catalog = Arc::new(Catalog::standard());
        let ty = catalog
            .machine_type(catalog.machine_type_id(name).unwrap())
            .unwrap()
            .clone();
        let mut config = SimConfig::default();
        config.maintenance.max_breakdown_chance = Fixed64::from_num(1);
        Machine::new(ty, catalog, Position::new(0, 0), &config, SimRng::new(1))
    }

    #[test]
    fn cost_formula() {
        let m = machine("FRAGILE_HARVESTER");
        assert_eq!(maintenance_cost(&m), 6);
        let m = machine("ADVANCED_FACTORY");
        assert_eq!(maintenance_cost(&m), 30);
    }

    #[test]
    fn service_requires_a_breakdown() {
        let mut m = machine("FRAGILE_HARVESTER");
        let payer = Ledger::with_money(10, 100);
        assert_eq!(
            service(&mut m, &payer),
            Err(UpkeepError::NotNeeded(Position::new(0, 0)))
        );
        assert_eq!(payer.money(), 100);
    }

    #[test]
    fn harvester_output_moves_until_player_is_full() {
        let m = machine("BASIC_HARVESTER");
        let catalog = Catalog::standard();
        let wood = catalog.resource_id("WOOD").unwrap();
        let stone = catalog.resource_id("STONE").unwrap();
        assert!(m.ledger().add_resource(wood, 3));
        assert!(m.ledger().add_resource(stone, 5));

        let player = Ledger::new(6);
        let mut stats = MachineStatistics::new(0);
        assert_eq!(collect_output(&m, &player, &mut stats, 10), 3);
        assert_eq!(player.resource_count(wood), 3);
        assert_eq!(m.ledger().resource_count(stone), 5);
        assert_eq!(stats.total_resources_collected(), 3);
    }

    #[test]
    fn factory_keeps_its_ingredients() {
        let mut m = machine("ADVANCED_FACTORY");
        let catalog = Catalog::standard();
        let wood = catalog.resource_id("WOOD").unwrap();
        let planks = catalog.resource_id("WOODEN_PLANKS").unwrap();
        assert!(m.set_recipe(catalog.recipe_id("Wooden Planks").unwrap()));
        assert!(m.ledger().add_resource(wood, 4));
        assert!(m.ledger().add_resource(planks, 2));

        let player = Ledger::new(100);
        let mut stats = MachineStatistics::new(0);
        assert_eq!(collect_output(&m, &player, &mut stats, 10), 2);
        assert_eq!(m.ledger().resource_count(wood), 4);
        assert_eq!(stats.total_items_produced(), 2);
    }
}
