//! File-based game content and tuning for gearworks.
//!
//! Loads resource types, machine types, recipes and the simulation config
//! from RON, TOML or JSON files. A copy of the standard content lives in
//! this crate's `data/` directory.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, GameData, load_catalog, load_game_data, load_sim_config};
