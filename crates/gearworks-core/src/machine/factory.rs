use crate::catalog::{Recipe, RecipeEntry};
use crate::fixed::Millis;
use crate::id::Position;
use crate::ledger::Ledger;
use std::sync::Arc;

use super::{MachineStatus, WorkOutcome};

/// An in-flight factory craft. Ingredients have already left the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryCraft {
    pub started_ms: Millis,
    pub duration_ms: Millis,
    pub reserved: Vec<RecipeEntry>,
}

impl FactoryCraft {
    pub fn progress(&self, now: Millis) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (now.saturating_sub(self.started_ms) as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self, now: Millis) -> bool {
        now.saturating_sub(self.started_ms) >= self.duration_ms
    }
}

/// Factory work strategy: reserve ingredients, wait out the scaled recipe
/// duration, deposit results.
#[derive(Debug, Clone, PartialEq)]
pub struct Factory {
    recipe: Option<Arc<Recipe>>,
    processing_speed: u32,
    current: Option<FactoryCraft>,
}

impl Factory {
    pub(crate) fn new(processing_speed: u32) -> Self {
        Self {
            recipe: None,
            processing_speed: processing_speed.max(1),
            current: None,
        }
    }

    pub fn recipe(&self) -> Option<&Arc<Recipe>> {
        self.recipe.as_ref()
    }

    pub fn current_craft(&self) -> Option<&FactoryCraft> {
        self.current.as_ref()
    }

    /// Ingredients held back for the in-flight craft.
    pub fn reserved(&self) -> &[RecipeEntry] {
        self.current.as_ref().map_or(&[], |c| c.reserved.as_slice())
    }

    /// Swap the recipe, discarding any in-flight craft. Returns the
    /// reserved ingredients that must go back to the ledger.
    pub(crate) fn set_recipe(&mut self, recipe: Arc<Recipe>) -> Vec<RecipeEntry> {
        self.recipe = Some(recipe);
        self.current
            .take()
            .map(|craft| craft.reserved)
            .unwrap_or_default()
    }

    pub(crate) fn tick(&mut self, position: Position, ledger: &Ledger, now: Millis) -> WorkOutcome {
        let Some(recipe) = self.recipe.clone() else {
            return WorkOutcome::status(MachineStatus::NeedsConfig);
        };

        if !ledger.has_space(recipe.result_count()) {
            return WorkOutcome::status(MachineStatus::InventoryFull);
        }

        if self.current.is_none() {
            if !ledger.remove_all(&recipe.ingredients) {
                return WorkOutcome::status(MachineStatus::InsufficientResources);
            }
            let duration_ms = recipe.crafting_time_ms / Millis::from(self.processing_speed);
            tracing::debug!(%position, recipe = %recipe.name, duration_ms, "factory craft started");
            self.current = Some(FactoryCraft {
                started_ms: now,
                duration_ms,
                reserved: recipe.ingredients.clone(),
            });
        }

        let complete = self.current.as_ref().is_some_and(|c| c.is_complete(now));
        if !complete {
            return WorkOutcome::status(MachineStatus::Working);
        }

        // The space check at the top of this tick guarantees room for every
        // result, so this only logs. A full ledger holds the craft there.
        for result in &recipe.results {
            if !ledger.add_resource(result.resource, result.quantity) {
                tracing::warn!(
                    %position,
                    recipe = %recipe.name,
                    resource = ?result.resource,
                    quantity = result.quantity,
                    "factory output did not fit"
                );
            }
        }
        self.current = None;
        tracing::debug!(%position, recipe = %recipe.name, "factory craft completed");

        WorkOutcome {
            status: Some(MachineStatus::Working),
            completed_operation: true,
        }
    }
}
