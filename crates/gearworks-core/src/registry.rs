//! The live machine collection.
//!
//! [`MachineRegistry`] owns every placed [`Machine`], keyed by a slotmap
//! [`MachineId`] and addressed by position. [`MachineRegistry::update_machines`]
//! is the tick pass: it reads the clock once and updates every machine in
//! insertion order.

use crate::catalog::Catalog;
use crate::clock::SharedClock;
use crate::config::SimConfig;
use crate::fixed::Millis;
use crate::grid::Grid;
use crate::id::{MachineId, MachineTypeId, Position};
use crate::machine::{Configuration, Machine};
use crate::rng::SimRng;
use slotmap::SlotMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct MachineRegistry {
    machines: SlotMap<MachineId, Machine>,
    /// Insertion order; drives the update pass.
    order: Vec<MachineId>,
    catalog: Arc<Catalog>,
    config: SimConfig,
    clock: SharedClock,
    rng: SimRng,
}

impl MachineRegistry {
    /// A registry whose breakdown rolls are seeded from the wall clock.
    pub fn new(catalog: Arc<Catalog>, config: SimConfig, clock: SharedClock) -> Self {
        Self::with_rng(catalog, config, clock, SimRng::from_entropy())
    }

    pub fn with_rng(
        catalog: Arc<Catalog>,
        config: SimConfig,
        clock: SharedClock,
        rng: SimRng,
    ) -> Self {
        Self {
            machines: SlotMap::with_key(),
            order: Vec::new(),
            catalog,
            config,
            clock,
            rng,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Place a machine of the given type. Returns `None` for a type the
    /// catalog does not know or a position that already holds a machine.
    pub fn create_machine(
        &mut self,
        machine_type: MachineTypeId,
        position: Position,
    ) -> Option<MachineId> {
        let machine_type = self.catalog.machine_type(machine_type)?.clone();
        if self.machine_id_at(position).is_some() {
            tracing::debug!(%position, "position already holds a machine");
            return None;
        }
        let machine = Machine::new(
            machine_type,
            Arc::clone(&self.catalog),
            position,
            &self.config,
            self.rng.fork(),
        );
        tracing::info!(
            %position,
            machine = %machine.machine_type().name,
            family = ?machine.family(),
            "machine created"
        );
        let id = self.machines.insert(machine);
        self.order.push(id);
        Some(id)
    }

    /// [`create_machine`](Self::create_machine) by type name.
    pub fn create_machine_named(&mut self, name: &str, position: Position) -> Option<MachineId> {
        let id = self.catalog.machine_type_id(name)?;
        self.create_machine(id, position)
    }

    /// Remove the machine at `position`, handing it back to the caller.
    pub fn remove_machine(&mut self, position: Position) -> Option<Machine> {
        let id = self.machine_id_at(position)?;
        self.order.retain(|&o| o != id);
        let machine = self.machines.remove(id)?;
        tracing::info!(
            %position,
            machine = %machine.machine_type().name,
            "machine removed"
        );
        Some(machine)
    }

    /// Place a machine on `grid`. The tile must exist, be walkable and hold
    /// no machine; it is marked occupied once the machine is created.
    pub fn place_machine(
        &mut self,
        grid: &mut dyn Grid,
        machine_type: MachineTypeId,
        position: Position,
    ) -> Option<MachineId> {
        let now = self.clock.now_ms();
        let free = grid
            .tile(position)
            .is_some_and(|tile| !tile.has_machine() && tile.is_walkable(now));
        if !free {
            tracing::debug!(%position, "tile cannot take a machine");
            return None;
        }
        let id = self.create_machine(machine_type, position)?;
        grid.set_occupied(position, true);
        Some(id)
    }

    /// [`place_machine`](Self::place_machine) by type name.
    pub fn place_machine_named(
        &mut self,
        grid: &mut dyn Grid,
        name: &str,
        position: Position,
    ) -> Option<MachineId> {
        let id = self.catalog.machine_type_id(name)?;
        self.place_machine(grid, id, position)
    }

    /// Remove the machine at `position` and free its tile.
    pub fn remove_placed_machine(
        &mut self,
        grid: &mut dyn Grid,
        position: Position,
    ) -> Option<Machine> {
        let machine = self.remove_machine(position)?;
        grid.set_occupied(position, false);
        Some(machine)
    }

    /// Remove every machine.
    pub fn clear(&mut self) {
        self.machines.clear();
        self.order.clear();
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Update every machine once, in insertion order.
    pub fn update_machines(&mut self, grid: &mut dyn Grid) {
        let now = self.clock.now_ms();
        for &id in &self.order {
            if let Some(machine) = self.machines.get_mut(id) {
                machine.update(grid, now);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn machine_id_at(&self, position: Position) -> Option<MachineId> {
        self.order
            .iter()
            .copied()
            .find(|&id| self.machines.get(id).is_some_and(|m| m.position() == position))
    }

    pub fn get_machine_at(&self, position: Position) -> Option<&Machine> {
        self.machines.get(self.machine_id_at(position)?)
    }

    pub fn get_machine_at_mut(&mut self, position: Position) -> Option<&mut Machine> {
        let id = self.machine_id_at(position)?;
        self.machines.get_mut(id)
    }

    pub fn get_machine(&self, id: MachineId) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn get_machine_mut(&mut self, id: MachineId) -> Option<&mut Machine> {
        self.machines.get_mut(id)
    }

    /// Every machine in insertion order, collected into a fresh `Vec`.
    pub fn all_machines(&self) -> Vec<&Machine> {
        self.iter().map(|(_, m)| m).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MachineId, &Machine)> {
        self.order
            .iter()
            .filter_map(|&id| self.machines.get(id).map(|m| (id, m)))
    }

    /// Configure the machine at `position`. False if there is none or the
    /// machine rejects the configuration.
    pub fn configure_at(&mut self, position: Position, configuration: Configuration) -> bool {
        self.get_machine_at_mut(position)
            .is_some_and(|m| m.configure(configuration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::grid::{ResourceNode, TileKind, TileMap};
    use crate::machine::MachineStatus;

    fn registry() -> (MachineRegistry, ManualClock) {
        let clock = ManualClock::new(0);
        let reg = MachineRegistry::with_rng(
            Arc::new(Catalog::standard()),
            SimConfig::default(),
            Arc::new(clock.clone()),
            SimRng::new(42),
        );
        (reg, clock)
    }

    #[test]
    fn create_rejects_unknown_type_and_occupied_tile() {
        let (mut reg, _) = registry();
        let pos = Position::new(2, 2);
        assert!(reg.create_machine(MachineTypeId(999), pos).is_none());
        assert!(reg.create_machine_named("BASIC_FACTORY", pos).is_some());
        assert!(reg.create_machine_named("BASIC_HARVESTER", pos).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn family_follows_type() {
        let (mut reg, _) = registry();
        let h = reg.create_machine_named("FRAGILE_HARVESTER", Position::new(0, 0)).unwrap();
        let f = reg.create_machine_named("FRAGILE_FACTORY", Position::new(1, 0)).unwrap();
        assert_eq!(reg.get_machine(h).unwrap().family(), crate::catalog::MachineFamily::Harvester);
        assert_eq!(reg.get_machine(f).unwrap().family(), crate::catalog::MachineFamily::Factory);
        assert!(reg.get_machine(h).unwrap().is_fragile());
    }

    #[test]
    fn all_machines_keeps_insertion_order() {
        let (mut reg, _) = registry();
        for x in [5, 1, 3] {
            reg.create_machine_named("BASIC_HARVESTER", Position::new(x, 0)).unwrap();
        }
        let xs: Vec<i32> = reg.all_machines().iter().map(|m| m.position().x).collect();
        assert_eq!(xs, vec![5, 1, 3]);

        assert!(reg.remove_machine(Position::new(1, 0)).is_some());
        assert!(reg.remove_machine(Position::new(1, 0)).is_none());
        let xs: Vec<i32> = reg.all_machines().iter().map(|m| m.position().x).collect();
        assert_eq!(xs, vec![5, 3]);
    }

    #[test]
    fn update_pass_drives_every_machine() {
        let (mut reg, clock) = registry();
        let catalog = reg.catalog().clone();
        let wood = catalog.resource_id("WOOD").unwrap();
        let mut grid = TileMap::new(5, 5);
        grid.place_resource(Position::new(1, 0), ResourceNode::new(wood, 4_000));

        let pos = Position::new(1, 1);
        reg.create_machine_named("BASIC_HARVESTER", pos).unwrap();
        reg.create_machine_named("BASIC_FACTORY", Position::new(4, 4)).unwrap();
        assert!(reg.configure_at(pos, Configuration::TargetResource(wood)));

        reg.update_machines(&mut grid);
        clock.advance(1_000);
        reg.update_machines(&mut grid);

        assert_eq!(reg.get_machine_at(pos).unwrap().ledger().resource_count(wood), 1);
        assert_eq!(
            reg.get_machine_at(Position::new(4, 4)).unwrap().status(),
            MachineStatus::NeedsConfig
        );
    }

    #[test]
    fn placement_respects_tiles() {
        let (mut reg, _) = registry();
        let wood = reg.catalog().resource_id("WOOD").unwrap();
        let mut grid = TileMap::new(4, 1);
        grid.set_kind(Position::new(1, 0), TileKind::Blocked);
        grid.place_resource(Position::new(2, 0), ResourceNode::new(wood, 4_000));

        assert!(reg.place_machine_named(&mut grid, "BASIC_FACTORY", Position::new(1, 0)).is_none());
        assert!(reg.place_machine_named(&mut grid, "BASIC_FACTORY", Position::new(2, 0)).is_none());
        assert!(reg.place_machine_named(&mut grid, "BASIC_FACTORY", Position::new(9, 0)).is_none());
        assert!(reg.place_machine(&mut grid, MachineTypeId(999), Position::new(0, 0)).is_none());
        assert!(!grid.tile(Position::new(0, 0)).unwrap().has_machine());
        assert!(reg.is_empty());

        let pos = Position::new(0, 0);
        assert!(reg.place_machine_named(&mut grid, "BASIC_FACTORY", pos).is_some());
        assert!(grid.tile(pos).unwrap().has_machine());
        assert!(!grid.tile(pos).unwrap().is_walkable(reg.now_ms()));
        assert!(reg.place_machine_named(&mut grid, "BASIC_HARVESTER", pos).is_none());

        let removed = reg.remove_placed_machine(&mut grid, pos).unwrap();
        assert_eq!(removed.position(), pos);
        assert!(!grid.tile(pos).unwrap().has_machine());
        assert!(reg.remove_placed_machine(&mut grid, pos).is_none());
        assert!(reg.place_machine_named(&mut grid, "BASIC_HARVESTER", pos).is_some());
    }
}
