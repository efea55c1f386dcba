//! The tile grid as seen by machines.
//!
//! Rendering and pathing live outside this crate. Machines only need tile
//! lookup by position, resource nodes they can harvest, and occupancy,
//! which is what the [`Grid`] trait exposes. [`TileMap`] is a plain
//! in-memory implementation for headless drivers and tests.

use crate::catalog::Catalog;
use crate::config::HarvestConfig;
use crate::fixed::Millis;
use crate::id::{Position, ResourceTypeId};
use crate::rng::SimRng;

/// A harvestable resource sitting on a tile. After a harvest it regrows
/// for `cooldown_ms` before it can be harvested again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    resource: ResourceTypeId,
    cooldown_ms: Millis,
    last_harvest_ms: Option<Millis>,
}

impl ResourceNode {
    pub fn new(resource: ResourceTypeId, cooldown_ms: Millis) -> Self {
        Self {
            resource,
            cooldown_ms,
            last_harvest_ms: None,
        }
    }

    /// A node whose cooldown follows the catalog harvest time.
    pub fn from_catalog(
        catalog: &Catalog,
        resource: ResourceTypeId,
        config: &HarvestConfig,
    ) -> Self {
        let harvest_time = catalog.resource(resource).map_or(0, |r| r.harvest_time);
        Self::new(
            resource,
            Millis::from(harvest_time) * config.regrowth_per_harvest_time_ms,
        )
    }

    pub fn resource_type(&self) -> ResourceTypeId {
        self.resource
    }

    pub fn can_harvest(&self, now: Millis) -> bool {
        match self.last_harvest_ms {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.cooldown_ms,
        }
    }

    /// Take the resource. Returns false if it is still regrowing.
    pub fn harvest(&mut self, now: Millis) -> bool {
        if !self.can_harvest(now) {
            return false;
        }
        self.last_harvest_ms = Some(now);
        true
    }

    /// Regrowth progress in `[0, 1]`; 1 when harvestable.
    pub fn harvest_progress(&self, now: Millis) -> f64 {
        match self.last_harvest_ms {
            None => 1.0,
            Some(_) if self.cooldown_ms == 0 => 1.0,
            Some(last) => {
                (now.saturating_sub(last) as f64 / self.cooldown_ms as f64).min(1.0)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileKind {
    #[default]
    Empty,
    Resource,
    Blocked,
    Market,
    Starting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tile {
    pub kind: TileKind,
    pub resource: Option<ResourceNode>,
    pub occupied: bool,
}

impl Tile {
    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    pub fn has_machine(&self) -> bool {
        self.occupied
    }

    /// Machines and blocked tiles always block. Resource tiles can be
    /// crossed only while their resource is regrowing.
    pub fn is_walkable(&self, now: Millis) -> bool {
        if self.occupied || self.kind == TileKind::Blocked {
            return false;
        }
        match (&self.kind, &self.resource) {
            (TileKind::Resource, Some(node)) => !node.can_harvest(now),
            _ => true,
        }
    }
}

/// Tile lookup consumed by machine updates and placement.
pub trait Grid {
    fn tile(&self, pos: Position) -> Option<&Tile>;
    fn tile_mut(&mut self, pos: Position) -> Option<&mut Tile>;

    /// Mark whether a machine stands on `pos`. False if the tile does not
    /// exist.
    fn set_occupied(&mut self, pos: Position, occupied: bool) -> bool {
        match self.tile_mut(pos) {
            Some(tile) => {
                tile.occupied = occupied;
                true
            }
            None => false,
        }
    }
}

/// A rectangular in-memory grid.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            tiles: vec![Tile::default(); (width * height) as usize],
        }
    }

    /// A map with the starting tile top-left, the market bottom-right, and
    /// roughly a quarter of the remaining tiles seeded with random
    /// harvestable resources.
    pub fn generate(
        width: i32,
        height: i32,
        catalog: &Catalog,
        config: &HarvestConfig,
        rng: &mut SimRng,
    ) -> Self {
        let mut map = Self::new(width, height);
        if width == 0 || height == 0 {
            return map;
        }
        map.set_kind(Position::new(0, 0), TileKind::Starting);
        map.set_kind(Position::new(width - 1, height - 1), TileKind::Market);

        let harvestable: Vec<ResourceTypeId> = catalog
            .resources()
            .filter(|r| r.is_harvestable())
            .map(|r| r.id)
            .collect();
        if harvestable.is_empty() {
            return map;
        }
        for _ in 0..(width * height / 4) {
            let pos = Position::new(
                (rng.next_u64() % width as u64) as i32,
                (rng.next_u64() % height as u64) as i32,
            );
            let resource = harvestable[(rng.next_u64() % harvestable.len() as u64) as usize];
            if map.tile(pos).is_some_and(|t| t.kind == TileKind::Empty) {
                map.place_resource(pos, ResourceNode::from_catalog(catalog, resource, config));
            }
        }
        map
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    pub fn set_kind(&mut self, pos: Position, kind: TileKind) {
        if let Some(tile) = self.tile_mut(pos) {
            tile.kind = kind;
        }
    }

    pub fn place_resource(&mut self, pos: Position, node: ResourceNode) {
        if let Some(tile) = self.tile_mut(pos) {
            tile.kind = TileKind::Resource;
            tile.resource = Some(node);
        }
    }
}

impl Grid for TileMap {
    fn tile(&self, pos: Position) -> Option<&Tile> {
        self.index(pos).map(|i| &self.tiles[i])
    }

    fn tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.index(pos).map(move |i| &mut self.tiles[i])
    }
}
