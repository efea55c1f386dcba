//! Gearworks Core -- machine simulation and crafting for an automated
//! production economy.
//!
//! Harvesters pull resources from neighbouring tiles, factories turn them
//! into crafted goods, and both wear out over time. The player crafts by
//! hand alongside them, on a ledger the machine tick and the crafting
//! scheduler share.
//!
//! # Two timing domains
//!
//! 1. **Machine tick** -- an external driver calls
//!    [`registry::MachineRegistry::update_machines`] at a fixed interval.
//!    Each [`machine::Machine`] evaluates configuration, maintenance,
//!    capacity and availability in a fixed priority order, then does one
//!    unit of work.
//! 2. **Crafting scheduler** -- [`crafting::CraftingEngine`] completes timed
//!    recipes on its own thread, rolling back on failure and notifying
//!    [`crafting::CraftingListener`]s.
//!
//! Both domains may touch the player's [`ledger::Ledger`], which is
//! internally synchronized.
//!
//! # Key Types
//!
//! - [`catalog::Catalog`] -- Immutable resource types, machine types and
//!   recipes (frozen at startup).
//! - [`ledger::Ledger`] -- Capacity-limited resource and currency store.
//! - [`machine::Machine`] -- Per-machine state machine with a harvester or
//!   factory work strategy and a maintenance profile.
//! - [`registry::MachineRegistry`] -- Owns placed machines and drives ticks.
//! - [`crafting::CraftingEngine`] -- Player crafting with reservation,
//!   rollback and scheduled completion.
//! - [`grid::Grid`] -- What machines need from the tile grid.
//! - [`snapshot`] -- Versioned world snapshots (JSON and bitcode).

pub mod catalog;
pub mod clock;
pub mod config;
pub mod crafting;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod ledger;
pub mod machine;
pub mod registry;
pub mod rng;
pub mod snapshot;
pub mod stats;
pub mod upkeep;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
