use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies a live machine in the [`MachineRegistry`](crate::registry::MachineRegistry).
    pub struct MachineId;
}

/// Identifies a resource type in the catalog. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceTypeId(pub u32);

/// Identifies a machine type in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineTypeId(pub u32);

/// Identifies a recipe in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Caller-supplied handle correlating a `start_crafting` call with later
/// progress queries and listener callbacks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tile coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The 4-neighborhood in fixed order: up, down, left, right.
    pub fn adjacent(self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1),
            Position::new(self.x, self.y + 1),
            Position::new(self.x - 1, self.y),
            Position::new(self.x + 1, self.y),
        ]
    }

    /// True if `other` shares an edge with this position.
    pub fn is_adjacent(self, other: Position) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        (dx == 1 && dy == 0) || (dx == 0 && dy == 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_id_equality() {
        let a = ResourceTypeId(0);
        let b = ResourceTypeId(0);
        let c = ResourceTypeId(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ResourceTypeId(0), "wood");
        map.insert(ResourceTypeId(1), "stone");
        assert_eq!(map[&ResourceTypeId(0)], "wood");
    }

    #[test]
    fn adjacent_order_is_up_down_left_right() {
        let p = Position::new(3, 3);
        assert_eq!(
            p.adjacent(),
            [
                Position::new(3, 2),
                Position::new(3, 4),
                Position::new(2, 3),
                Position::new(4, 3),
            ]
        );
    }

    #[test]
    fn adjacency_excludes_diagonals_and_self() {
        let p = Position::new(0, 0);
        assert!(p.is_adjacent(Position::new(1, 0)));
        assert!(p.is_adjacent(Position::new(0, -1)));
        assert!(!p.is_adjacent(Position::new(1, 1)));
        assert!(!p.is_adjacent(p));
    }

    #[test]
    fn process_id_display() {
        let id = ProcessId::from("craft_1");
        assert_eq!(id.to_string(), "craft_1");
        assert_eq!(id.as_str(), "craft_1");
    }
}
