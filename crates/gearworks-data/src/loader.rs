//! Resolution pipeline: reads data files, resolves name references, builds
//! the catalog and the simulation config.
//!
//! A data directory holds `resources`, `machines` and `recipes` files plus
//! an optional `config` file, each in RON, TOML or JSON (detected from the
//! extension). Recipes name resources by string; the loader resolves them
//! to typed ids before handing everything to [`CatalogBuilder`].

use gearworks_core::catalog::{
    Catalog, CatalogBuilder, CatalogError, MachineFamily, MachineSpec, RecipeEntry,
};
use gearworks_core::config::SimConfig;
use gearworks_core::fixed::{Fixed64, f64_to_fixed64};
use gearworks_core::id::{MachineTypeId, RecipeId, ResourceTypeId};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::schema::*;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A value parsed but is out of range.
    #[error("invalid {field} for '{owner}' in {file}: {value}")]
    InvalidValue {
        file: PathBuf,
        owner: String,
        field: &'static str,
        value: f64,
    },

    /// The resolved content failed catalog validation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    const ALL: [(Format, &'static str); 3] =
        [(Format::Ron, "ron"), (Format::Toml, "toml"), (Format::Json, "json")];
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .iter()
        .find(|(_, known)| ext == Some(*known))
        .map(|&(format, _)| format)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find `{base_name}.ron`, `.toml` or `.json` in `dir`.
///
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for (_, ext) in Format::ALL {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, err: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: err.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. TOML has no top-level arrays, so there
/// the list is read from the array of tables under `toml_key`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name, returning an `UnresolvedRef` error if it is unknown.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Fail with `DuplicateName` if `name` is already registered.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        return Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Convert a decimal in `[0, 1]` to fixed-point.
fn ratio(
    value: f64,
    file: &Path,
    owner: &str,
    field: &'static str,
) -> Result<Fixed64, DataLoadError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DataLoadError::InvalidValue {
            file: file.to_path_buf(),
            owner: owner.to_string(),
            field,
            value,
        });
    }
    Ok(f64_to_fixed64(value))
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Everything a data directory describes.
#[derive(Debug)]
pub struct GameData {
    pub catalog: Catalog,
    pub config: SimConfig,
}

/// Load the catalog and config from a data directory. A missing `config`
/// file means engine defaults.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let catalog = load_catalog(dir)?;
    let config = match find_data_file(dir, "config")? {
        Some(path) => load_sim_config(&path)?,
        None => SimConfig::default(),
    };
    tracing::info!(
        dir = %dir.display(),
        resources = catalog.resource_count(),
        machines = catalog.machine_type_count(),
        recipes = catalog.recipe_count(),
        "game data loaded"
    );
    Ok(GameData { catalog, config })
}

/// Build a catalog from the `resources`, `machines` and `recipes` files
/// in `dir`.
pub fn load_catalog(dir: &Path) -> Result<Catalog, DataLoadError> {
    let resources_path = require_data_file(dir, "resources")?;
    let machines_path = require_data_file(dir, "machines")?;
    let recipes_path = require_data_file(dir, "recipes")?;

    let resources: Vec<ResourceData> = deserialize_list(&resources_path, "resources")?;
    let machines: Vec<MachineData> = deserialize_list(&machines_path, "machines")?;
    let recipes: Vec<RecipeData> = deserialize_list(&recipes_path, "recipes")?;

    let mut builder = CatalogBuilder::new();

    let mut resource_ids: HashMap<String, ResourceTypeId> = HashMap::new();
    for r in &resources {
        check_duplicate(&resource_ids, &r.name, &resources_path)?;
        let id = builder.register_resource(&r.name, r.base_price, r.harvest_time);
        resource_ids.insert(r.name.clone(), id);
    }

    let mut machine_ids: HashMap<String, MachineTypeId> = HashMap::new();
    for m in &machines {
        check_duplicate(&machine_ids, &m.name, &machines_path)?;
        let breakdown_chance =
            ratio(m.breakdown_chance, &machines_path, &m.name, "breakdown_chance")?;
        let id = builder.register_machine(MachineSpec {
            name: &m.name,
            family: match m.family {
                FamilyData::Harvester => MachineFamily::Harvester,
                FamilyData::Factory => MachineFamily::Factory,
            },
            base_price: m.base_price,
            processing_speed: m.processing_speed,
            inventory_capacity: m.inventory_capacity,
            configuration_limit: m.configuration_limit,
            breakdown_chance,
            description: &m.description,
        });
        machine_ids.insert(m.name.clone(), id);
    }

    let resolve_entries = |entries: &[(String, u32)]| -> Result<Vec<RecipeEntry>, DataLoadError> {
        entries
            .iter()
            .map(|(name, quantity)| {
                let id = resolve_name(&resource_ids, name, &recipes_path, "resource")?;
                Ok(RecipeEntry::new(*id, *quantity))
            })
            .collect()
    };

    let mut recipe_ids: HashMap<String, RecipeId> = HashMap::new();
    for r in &recipes {
        check_duplicate(&recipe_ids, &r.name, &recipes_path)?;
        let id = builder.register_recipe(
            &r.name,
            resolve_entries(&r.ingredients)?,
            resolve_entries(&r.results)?,
            r.crafting_time_ms,
            r.instant,
        );
        recipe_ids.insert(r.name.clone(), id);
    }

    let catalog = builder.build()?;
    tracing::debug!(dir = %dir.display(), "catalog resolved");
    Ok(catalog)
}

/// Read a config file and apply its overrides on top of the defaults.
pub fn load_sim_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    let data: ConfigData = deserialize_file(path)?;
    let mut config = SimConfig::default();

    let m = &mut config.maintenance;
    let d = data.maintenance;
    override_with(&mut m.fragile_threshold, d.fragile_threshold);
    override_with(&mut m.standard_threshold, d.standard_threshold);
    override_with(&mut m.operation_cooldown_ms, d.operation_cooldown_ms);
    override_ratio(&mut m.max_breakdown_chance, d.max_breakdown_chance, path, "max_breakdown_chance")?;
    override_ratio(&mut m.wear_onset, d.wear_onset, path, "wear_onset")?;
    override_ratio(&mut m.max_efficiency_loss, d.max_efficiency_loss, path, "max_efficiency_loss")?;

    let h = &mut config.harvest;
    let d = data.harvest;
    override_with(&mut h.base_interval_ms, d.base_interval_ms);
    override_with(&mut h.regrowth_per_harvest_time_ms, d.regrowth_per_harvest_time_ms);
    override_ratio(&mut h.nearly_full_ratio, d.nearly_full_ratio, path, "nearly_full_ratio")?;

    override_with(&mut config.crafting.max_poll_ms, data.crafting.max_poll_ms);
    override_with(&mut config.crafting.shutdown_timeout_ms, data.crafting.shutdown_timeout_ms);
    override_with(&mut config.player.capacity, data.player.capacity);
    override_with(&mut config.player.starting_money, data.player.starting_money);

    Ok(config)
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn override_ratio(
    slot: &mut Fixed64,
    value: Option<f64>,
    path: &Path,
    field: &'static str,
) -> Result<(), DataLoadError> {
    if let Some(v) = value {
        *slot = ratio(v, path, "config", field)?;
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
