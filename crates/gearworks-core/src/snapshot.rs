//! Persisted world state.
//!
//! A [`WorldSnapshot`] records the player's ledger and, per machine, its
//! type, position, configuration, inventory and configuration counter. Every
//! catalog reference is stored by name, so a snapshot survives catalog
//! reordering. Maintenance counters are not persisted; restored machines
//! start fresh.
//!
//! Two encodings are supported: pretty JSON for inspection and save files,
//! and compact `bitcode` binary. Both carry a [`SnapshotHeader`] that is
//! validated on decode.

use crate::catalog::Catalog;
use crate::fixed::Millis;
use crate::id::{MachineTypeId, Position, ResourceTypeId};
use crate::ledger::{Ledger, LedgerContents};
use crate::machine::{Configuration, Machine};
use crate::registry::MachineRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a gearworks world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x6EA7_0001;

/// Current format version. Increment when breaking the format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("unknown machine type '{0}'")]
    UnknownMachineType(String),
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),
    #[error("two machines at {0}")]
    DuplicatePosition(Position),
    #[error("{owner} inventory holds {held} items but fits only {capacity}")]
    InventoryOverflow {
        owner: String,
        held: u32,
        capacity: u32,
    },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Clock reading when the snapshot was captured.
    pub saved_at_ms: Millis,
}

impl SnapshotHeader {
    pub fn new(saved_at_ms: Millis) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            saved_at_ms,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// A configuration by catalog name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationRecord {
    TargetResource(String),
    Recipe(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub money: u64,
    pub resources: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub machine_type: String,
    pub position: Position,
    pub configuration: Option<ConfigurationRecord>,
    pub inventory: BTreeMap<String, u32>,
    #[serde(default)]
    pub times_configured: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    pub player: InventoryRecord,
    pub machines: Vec<MachineRecord>,
}

fn named_resources(catalog: &Catalog, contents: &LedgerContents) -> BTreeMap<String, u32> {
    contents
        .resources
        .iter()
        .map(|(&id, &qty)| (catalog.resource_name(id).to_string(), qty))
        .collect()
}

fn machine_record(catalog: &Catalog, machine: &Machine) -> MachineRecord {
    let configuration = machine.configuration().map(|c| match c {
        Configuration::TargetResource(r) => {
            ConfigurationRecord::TargetResource(catalog.resource_name(r).to_string())
        }
        Configuration::Recipe(r) => ConfigurationRecord::Recipe(
            catalog.recipe(r).map_or_else(|| "?".to_string(), |r| r.name.clone()),
        ),
    });
    MachineRecord {
        machine_type: machine.machine_type().name.clone(),
        position: machine.position(),
        configuration,
        inventory: named_resources(catalog, &machine.ledger().contents()),
        times_configured: machine.times_configured(),
    }
}

/// Snapshot the registry and the player's ledger.
pub fn capture(registry: &MachineRegistry, player: &Ledger) -> WorldSnapshot {
    let catalog = registry.catalog();
    let contents = player.contents();
    WorldSnapshot {
        header: SnapshotHeader::new(registry.now_ms()),
        player: InventoryRecord {
            money: contents.money,
            resources: named_resources(catalog, &contents),
        },
        machines: registry
            .all_machines()
            .into_iter()
            .map(|m| machine_record(catalog, m))
            .collect(),
    }
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: WorldSnapshot = serde_json::from_str(json)?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: WorldSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

struct ResolvedMachine {
    machine_type: MachineTypeId,
    position: Position,
    configuration: Option<Configuration>,
    inventory: Vec<(ResourceTypeId, u32)>,
    times_configured: u32,
}

fn resolve_inventory(
    catalog: &Catalog,
    owner: String,
    inventory: &BTreeMap<String, u32>,
    capacity: u32,
) -> Result<Vec<(ResourceTypeId, u32)>, SnapshotError> {
    let resolved = inventory
        .iter()
        .filter(|(_, qty)| **qty > 0)
        .map(|(name, &qty)| {
            catalog
                .resource_id(name)
                .map(|id| (id, qty))
                .ok_or_else(|| SnapshotError::UnknownResource(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let held: u64 = resolved.iter().map(|(_, qty)| u64::from(*qty)).sum();
    if held > u64::from(capacity) {
        return Err(SnapshotError::InventoryOverflow {
            owner,
            held: u32::try_from(held).unwrap_or(u32::MAX),
            capacity,
        });
    }
    Ok(resolved)
}

fn resolve_machine(
    catalog: &Catalog,
    record: &MachineRecord,
) -> Result<ResolvedMachine, SnapshotError> {
    let machine_type = catalog
        .machine_type_id(&record.machine_type)
        .ok_or_else(|| SnapshotError::UnknownMachineType(record.machine_type.clone()))?;
    let capacity = catalog
        .machine_type(machine_type)
        .map_or(0, |t| t.inventory_capacity);
    let configuration = match &record.configuration {
        None => None,
        Some(ConfigurationRecord::TargetResource(name)) => Some(Configuration::TargetResource(
            catalog
                .resource_id(name)
                .ok_or_else(|| SnapshotError::UnknownResource(name.clone()))?,
        )),
        Some(ConfigurationRecord::Recipe(name)) => Some(Configuration::Recipe(
            catalog
                .recipe_id(name)
                .ok_or_else(|| SnapshotError::UnknownRecipe(name.clone()))?,
        )),
    };
    Ok(ResolvedMachine {
        machine_type,
        position: record.position,
        configuration,
        inventory: resolve_inventory(
            catalog,
            format!("machine {}", record.position),
            &record.inventory,
            capacity,
        )?,
        times_configured: record.times_configured,
    })
}

/// Replace the registry's machines and the player's holdings with the
/// snapshot's. Every name is resolved before anything is touched, so an
/// error leaves both unchanged. The player's ledger keeps its own capacity.
pub fn restore(
    snapshot: &WorldSnapshot,
    registry: &mut MachineRegistry,
    player: &Ledger,
) -> Result<(), SnapshotError> {
    snapshot.header.validate()?;
    let catalog = registry.catalog().clone();

    let player_resources = resolve_inventory(
        &catalog,
        "player".to_string(),
        &snapshot.player.resources,
        player.capacity(),
    )?;
    let mut seen = HashSet::new();
    let mut machines = Vec::with_capacity(snapshot.machines.len());
    for record in &snapshot.machines {
        if !seen.insert(record.position) {
            return Err(SnapshotError::DuplicatePosition(record.position));
        }
        machines.push(resolve_machine(&catalog, record)?);
    }

    player.clear_resources();
    player.set_money(snapshot.player.money);
    for (resource, qty) in player_resources {
        if !player.add_resource(resource, qty) {
            tracing::warn!(?resource, qty, "player inventory did not fit on restore");
        }
    }

    registry.clear();
    for resolved in machines {
        let Some(id) = registry.create_machine(resolved.machine_type, resolved.position) else {
            return Err(SnapshotError::DuplicatePosition(resolved.position));
        };
        let Some(machine) = registry.get_machine_mut(id) else {
            continue;
        };
        if !machine.restore_configuration(resolved.configuration, resolved.times_configured) {
            tracing::warn!(position = %resolved.position, "persisted configuration rejected");
        }
        for (resource, qty) in resolved.inventory {
            if !machine.ledger().add_resource(resource, qty) {
                tracing::warn!(position = %resolved.position, ?resource, qty, "inventory did not fit on restore");
            }
        }
    }
    tracing::info!(machines = registry.len(), "world restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SimConfig;
    use crate::rng::SimRng;
    use std::sync::Arc;

    fn registry() -> MachineRegistry {
        MachineRegistry::with_rng(
            Arc::new(Catalog::standard()),
            SimConfig::default(),
            Arc::new(ManualClock::new(5_000)),
            SimRng::new(3),
        )
    }

    fn populated() -> (MachineRegistry, Ledger) {
        let mut reg = registry();
        let catalog = reg.catalog().clone();
        let wood = catalog.resource_id("WOOD").unwrap();
        let h = Position::new(1, 1);
        let f = Position::new(4, 2);
        reg.create_machine_named("BASIC_HARVESTER", h).unwrap();
        reg.create_machine_named("ADVANCED_FACTORY", f).unwrap();
        assert!(reg.configure_at(h, Configuration::TargetResource(wood)));
        assert!(reg.get_machine_at(h).unwrap().ledger().add_resource(wood, 7));
        let player = Ledger::with_money(100, 250);
        assert!(player.add_resource(wood, 3));
        (reg, player)
    }

    #[test]
    fn capture_uses_catalog_names() {
        let (reg, player) = populated();
        let snap = capture(&reg, &player);
        assert_eq!(snap.header.saved_at_ms, 5_000);
        assert_eq!(snap.player.money, 250);
        assert_eq!(snap.player.resources.get("WOOD"), Some(&3));
        assert_eq!(snap.machines.len(), 2);
        let harvester = &snap.machines[0];
        assert_eq!(harvester.machine_type, "BASIC_HARVESTER");
        assert_eq!(
            harvester.configuration,
            Some(ConfigurationRecord::TargetResource("WOOD".into()))
        );
        assert_eq!(harvester.inventory.get("WOOD"), Some(&7));
        assert_eq!(harvester.times_configured, 1);
        assert_eq!(snap.machines[1].configuration, None);
    }

    #[test]
    fn restore_rebuilds_world() {
        let (reg, player) = populated();
        let snap = capture(&reg, &player);

        let mut fresh = registry();
        let other = Ledger::with_money(100, 1);
        restore(&snap, &mut fresh, &other).unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(other.money(), 250);
        let wood = fresh.catalog().resource_id("WOOD").unwrap();
        assert_eq!(other.resource_count(wood), 3);
        let h = fresh.get_machine_at(Position::new(1, 1)).unwrap();
        assert_eq!(h.target_resource(), Some(wood));
        assert_eq!(h.times_configured(), 1);
        assert!(!h.can_be_reconfigured());
        assert_eq!(h.ledger().resource_count(wood), 7);
        assert_eq!(h.operations_since_maintenance(), 0);
    }

    #[test]
    fn bad_names_leave_everything_untouched() {
        let (reg, player) = populated();
        let mut snap = capture(&reg, &player);
        snap.machines[1].configuration = Some(ConfigurationRecord::Recipe("Gold Bars".into()));

        let mut target = registry();
        target.create_machine_named("BASIC_FACTORY", Position::new(9, 9)).unwrap();
        let other = Ledger::with_money(100, 1);
        let err = restore(&snap, &mut target, &other).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownRecipe(name) if name == "Gold Bars"));
        assert_eq!(target.len(), 1);
        assert_eq!(other.money(), 1);
    }

    #[test]
    fn binary_header_is_checked() {
        let (reg, player) = populated();
        let mut snap = capture(&reg, &player);
        let bytes = snap.to_bytes().unwrap();
        assert_eq!(WorldSnapshot::from_bytes(&bytes).unwrap(), snap);

        snap.header.version = FORMAT_VERSION + 1;
        let bytes = snap.to_bytes().unwrap();
        assert!(matches!(
            WorldSnapshot::from_bytes(&bytes),
            Err(SnapshotError::FutureVersion(v)) if v == FORMAT_VERSION + 1
        ));
        assert!(WorldSnapshot::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn json_is_readable() {
        let (reg, player) = populated();
        let json = capture(&reg, &player).to_json().unwrap();
        assert!(json.contains("\"target_resource\": \"WOOD\""));
        let back = WorldSnapshot::from_json(&json).unwrap();
        assert_eq!(back.machines.len(), 2);

        let tampered = json.replace(&SNAPSHOT_MAGIC.to_string(), "7");
        assert!(matches!(
            WorldSnapshot::from_json(&tampered),
            Err(SnapshotError::InvalidMagic(7))
        ));
    }
}
