use crate::config::HarvestConfig;
use crate::fixed::{Fixed64, Millis};
use crate::grid::Grid;
use crate::id::{Position, ResourceTypeId};
use crate::ledger::Ledger;

use super::{MachineStatus, WorkOutcome};

/// Harvester work strategy: pull one unit from each adjacent matching
/// resource node per harvest pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Harvester {
    target: Option<ResourceTypeId>,
    interval_ms: Millis,
    nearly_full_ratio: Fixed64,
    next_pass_ms: Option<Millis>,
}

impl Harvester {
    pub(crate) fn new(processing_speed: u32, config: &HarvestConfig) -> Self {
        Self {
            target: None,
            interval_ms: config.base_interval_ms / Millis::from(processing_speed.max(1)),
            nearly_full_ratio: config.nearly_full_ratio,
            next_pass_ms: None,
        }
    }

    pub fn target(&self) -> Option<ResourceTypeId> {
        self.target
    }

    /// Time between two harvest passes.
    pub fn interval_ms(&self) -> Millis {
        self.interval_ms
    }

    pub(crate) fn set_target(&mut self, target: ResourceTypeId) {
        self.target = Some(target);
        self.next_pass_ms = None;
    }

    fn nearly_full(&self, ledger: &Ledger) -> bool {
        let capacity = ledger.capacity();
        capacity > 0
            && Fixed64::from_num(ledger.total_items())
                >= self.nearly_full_ratio * Fixed64::from_num(capacity)
    }

    pub(crate) fn tick(
        &mut self,
        position: Position,
        ledger: &Ledger,
        grid: &mut dyn Grid,
        now: Millis,
    ) -> WorkOutcome {
        let Some(target) = self.target else {
            return WorkOutcome::status(MachineStatus::NeedsConfig);
        };

        if !ledger.has_space(1) {
            return WorkOutcome::status(MachineStatus::InventoryFull);
        }

        // The first pass waits one full interval after (re)configuration.
        let due = *self.next_pass_ms.get_or_insert(now + self.interval_ms);
        if now < due {
            return if self.nearly_full(ledger) {
                WorkOutcome::status(MachineStatus::InventoryNearlyFull)
            } else {
                WorkOutcome::unchanged()
            };
        }
        self.next_pass_ms = Some(now + self.interval_ms);

        let mut harvested = 0u32;
        for pos in position.adjacent() {
            let Some(node) = grid.tile_mut(pos).and_then(|t| t.resource.as_mut()) else {
                continue;
            };
            if node.resource_type() != target || !node.can_harvest(now) {
                continue;
            }
            if !ledger.has_space(1) {
                break;
            }
            if ledger.add_resource(target, 1) && node.harvest(now) {
                harvested += 1;
            }
        }

        let status = if !ledger.has_space(1) {
            MachineStatus::InventoryFull
        } else if self.nearly_full(ledger) {
            MachineStatus::InventoryNearlyFull
        } else if harvested > 0 {
            MachineStatus::Working
        } else {
            MachineStatus::NoResources
        };

        if harvested > 0 {
            tracing::debug!(%position, harvested, "harvest pass");
        }

        WorkOutcome {
            status: Some(status),
            completed_operation: harvested > 0,
        }
    }
}
