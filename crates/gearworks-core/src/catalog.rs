//! Static game content: resource types, machine types and recipes.
//!
//! A [`Catalog`] is built once through [`CatalogBuilder`] and frozen. It is
//! shared behind an `Arc` by the registry, every machine and the crafting
//! engine; nothing mutates it after `build()`.

use crate::fixed::{Fixed64, Millis};
use crate::id::*;
use std::collections::HashMap;
use std::sync::Arc;

/// A resource type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceType {
    pub id: ResourceTypeId,
    pub name: String,
    pub base_price: u32,
    /// Regrowth multiplier for resource nodes. Zero means the resource
    /// only comes from crafting and cannot be harvested.
    pub harvest_time: u32,
}

impl ResourceType {
    pub fn is_harvestable(&self) -> bool {
        self.harvest_time > 0
    }
}

/// Which work strategy a machine type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineFamily {
    Harvester,
    Factory,
}

/// A machine type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineType {
    pub id: MachineTypeId,
    pub name: String,
    pub family: MachineFamily,
    pub base_price: u32,
    /// Throughput multiplier. Divides harvest intervals and craft durations.
    pub processing_speed: u32,
    pub inventory_capacity: u32,
    /// How many times a machine may be configured. Zero means unlimited.
    pub configuration_limit: u32,
    pub breakdown_chance: Fixed64,
    pub description: String,
}

impl MachineType {
    /// Fragile machines break down and need periodic maintenance.
    pub fn is_fragile(&self) -> bool {
        self.breakdown_chance > Fixed64::ZERO
    }
}

/// One ingredient or result line of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecipeEntry {
    pub resource: ResourceTypeId,
    pub quantity: u32,
}

impl RecipeEntry {
    pub fn new(resource: ResourceTypeId, quantity: u32) -> Self {
        Self { resource, quantity }
    }
}

/// An immutable recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub ingredients: Vec<RecipeEntry>,
    pub results: Vec<RecipeEntry>,
    pub crafting_time_ms: Millis,
    pub instant: bool,
}

impl Recipe {
    /// Total number of items the results occupy.
    pub fn result_count(&self) -> u32 {
        self.results.iter().map(|e| e.quantity).sum()
    }
}

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    resources: Vec<ResourceType>,
    resource_name_to_id: HashMap<String, ResourceTypeId>,
    machines: Vec<MachineType>,
    machine_name_to_id: HashMap<String, MachineTypeId>,
    recipes: Vec<Recipe>,
    recipe_name_to_id: HashMap<String, RecipeId>,
    duplicates: Vec<String>,
}

/// Arguments for [`CatalogBuilder::register_machine`].
#[derive(Debug, Clone)]
pub struct MachineSpec<'a> {
    pub name: &'a str,
    pub family: MachineFamily,
    pub base_price: u32,
    pub processing_speed: u32,
    pub inventory_capacity: u32,
    pub configuration_limit: u32,
    pub breakdown_chance: Fixed64,
    pub description: &'a str,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type. Returns its ID.
    pub fn register_resource(
        &mut self,
        name: &str,
        base_price: u32,
        harvest_time: u32,
    ) -> ResourceTypeId {
        let id = ResourceTypeId(self.resources.len() as u32);
        self.resources.push(ResourceType {
            id,
            name: name.to_string(),
            base_price,
            harvest_time,
        });
        if self.resource_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Register a machine type. Returns its ID.
    pub fn register_machine(&mut self, spec: MachineSpec<'_>) -> MachineTypeId {
        let id = MachineTypeId(self.machines.len() as u32);
        self.machines.push(MachineType {
            id,
            name: spec.name.to_string(),
            family: spec.family,
            base_price: spec.base_price,
            processing_speed: spec.processing_speed,
            inventory_capacity: spec.inventory_capacity,
            configuration_limit: spec.configuration_limit,
            breakdown_chance: spec.breakdown_chance,
            description: spec.description.to_string(),
        });
        if self.machine_name_to_id.insert(spec.name.to_string(), id).is_some() {
            self.duplicates.push(spec.name.to_string());
        }
        id
    }

    /// Register a recipe. Returns its ID.
    pub fn register_recipe(
        &mut self,
        name: &str,
        ingredients: Vec<RecipeEntry>,
        results: Vec<RecipeEntry>,
        crafting_time_ms: Millis,
        instant: bool,
    ) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(Recipe {
            id,
            name: name.to_string(),
            ingredients,
            results,
            crafting_time_ms,
            instant,
        });
        if self.recipe_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Lookup resource type ID by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceTypeId> {
        self.resource_name_to_id.get(name).copied()
    }

    /// Finalize and build the immutable catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(CatalogError::DuplicateName(name));
        }

        for machine in &self.machines {
            if machine.processing_speed == 0 {
                return Err(CatalogError::ZeroSpeed(machine.name.clone()));
            }
        }

        for recipe in &self.recipes {
            for list in [&recipe.ingredients, &recipe.results] {
                for (i, entry) in list.iter().enumerate() {
                    if entry.resource.0 as usize >= self.resources.len() {
                        return Err(CatalogError::InvalidResourceRef {
                            recipe: recipe.name.clone(),
                            resource: entry.resource,
                        });
                    }
                    if entry.quantity == 0 {
                        return Err(CatalogError::ZeroQuantity(recipe.name.clone()));
                    }
                    if list[..i].iter().any(|e| e.resource == entry.resource) {
                        return Err(CatalogError::DuplicateEntry {
                            recipe: recipe.name.clone(),
                            resource: entry.resource,
                        });
                    }
                }
            }
        }

        Ok(Catalog {
            resources: self.resources,
            resource_name_to_id: self.resource_name_to_id,
            machines: self.machines.into_iter().map(Arc::new).collect(),
            machine_name_to_id: self.machine_name_to_id,
            recipes: self.recipes.into_iter().map(Arc::new).collect(),
            recipe_name_to_id: self.recipe_name_to_id,
        })
    }
}

/// Immutable catalog. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct Catalog {
    resources: Vec<ResourceType>,
    resource_name_to_id: HashMap<String, ResourceTypeId>,
    machines: Vec<Arc<MachineType>>,
    machine_name_to_id: HashMap<String, MachineTypeId>,
    recipes: Vec<Arc<Recipe>>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl Catalog {
    pub fn resource(&self, id: ResourceTypeId) -> Option<&ResourceType> {
        self.resources.get(id.0 as usize)
    }

    pub fn machine_type(&self, id: MachineTypeId) -> Option<&Arc<MachineType>> {
        self.machines.get(id.0 as usize)
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Arc<Recipe>> {
        self.recipes.get(id.0 as usize)
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceTypeId> {
        self.resource_name_to_id.get(name).copied()
    }

    pub fn machine_type_id(&self, name: &str) -> Option<MachineTypeId> {
        self.machine_name_to_id.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    /// Resource name, or `"?"` for ids outside this catalog.
    pub fn resource_name(&self, id: ResourceTypeId) -> &str {
        self.resource(id).map(|r| r.name.as_str()).unwrap_or("?")
    }

    /// Resource types in registration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceType> {
        self.resources.iter()
    }

    pub fn machine_types(&self) -> impl Iterator<Item = &Arc<MachineType>> {
        self.machines.iter()
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Arc<Recipe>> {
        self.recipes.iter()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn machine_type_count(&self) -> usize {
        self.machines.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// The default game content.
    pub fn standard() -> Catalog {
        let mut b = CatalogBuilder::new();
        let wood = b.register_resource("WOOD", 10, 2);
        let stone = b.register_resource("STONE", 15, 3);
        let iron = b.register_resource("IRON", 25, 4);
        let gold = b.register_resource("GOLD", 50, 5);
        let food = b.register_resource("FOOD", 5, 1);
        let planks = b.register_resource("WOODEN_PLANKS", 20, 0);
        let tools = b.register_resource("STONE_TOOLS", 40, 0);
        let alloy = b.register_resource("METAL_ALLOY", 70, 0);
        let preserved = b.register_resource("PRESERVED_FOOD", 15, 0);
        let materials = b.register_resource("BUILDING_MATERIALS", 45, 0);
        let luxury = b.register_resource("LUXURY_ITEMS", 150, 0);

        let machines = [
            ("BASIC_HARVESTER", MachineFamily::Harvester, 100, 1, 50, 1, 0.0,
             "Automatically harvests resources from adjacent tiles"),
            ("ADVANCED_HARVESTER", MachineFamily::Harvester, 200, 2, 100, 0, 0.0,
             "Faster harvesting speed and larger storage"),
            ("FRAGILE_HARVESTER", MachineFamily::Harvester, 60, 2, 50, 0, 0.15,
             "Cheap and fast, but breaks down without regular maintenance"),
            ("BASIC_FACTORY", MachineFamily::Factory, 150, 1, 50, 1, 0.0,
             "Automatically crafts items using basic recipes"),
            ("ADVANCED_FACTORY", MachineFamily::Factory, 300, 2, 100, 0, 0.0,
             "Faster crafting speed and can handle complex recipes"),
            ("FRAGILE_FACTORY", MachineFamily::Factory, 90, 2, 50, 0, 0.15,
             "Cheap and fast, but breaks down without regular maintenance"),
        ];
        for (name, family, price, speed, capacity, limit, chance, description) in machines {
            b.register_machine(MachineSpec {
                name,
                family,
                base_price: price,
                processing_speed: speed,
                inventory_capacity: capacity,
                configuration_limit: limit,
                breakdown_chance: Fixed64::from_num(chance),
                description,
            });
        }

        let e = RecipeEntry::new;
        b.register_recipe("Wooden Planks", vec![e(wood, 2)], vec![e(planks, 1)], 2_000, false);
        b.register_recipe(
            "Stone Tools",
            vec![e(stone, 2), e(wood, 1)],
            vec![e(tools, 1)],
            3_000,
            false,
        );
        b.register_recipe(
            "Metal Alloy",
            vec![e(iron, 2), e(stone, 1)],
            vec![e(alloy, 1)],
            5_000,
            false,
        );
        b.register_recipe("Preserved Food", vec![e(food, 3)], vec![e(preserved, 2)], 1_500, false);
        b.register_recipe(
            "Building Materials",
            vec![e(stone, 2), e(wood, 2)],
            vec![e(materials, 1)],
            4_000,
            false,
        );
        b.register_recipe(
            "Luxury Items",
            vec![e(gold, 1), e(iron, 1)],
            vec![e(luxury, 1)],
            6_000,
            false,
        );
        b.register_recipe("Quick Planks", vec![e(wood, 1)], vec![e(planks, 1)], 0, true);

        // The standard content is static and validated by the tests below.
        match b.build() {
            Ok(catalog) => catalog,
            Err(err) => unreachable!("standard catalog is invalid: {err}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("recipe '{recipe}' references unknown resource {resource:?}")]
    InvalidResourceRef {
        recipe: String,
        resource: ResourceTypeId,
    },
    #[error("recipe '{recipe}' lists resource {resource:?} more than once")]
    DuplicateEntry {
        recipe: String,
        resource: ResourceTypeId,
    },
    #[error("recipe '{0}' has a zero-quantity entry")]
    ZeroQuantity(String),
    #[error("machine type '{0}' has zero processing speed")]
    ZeroSpeed(String),
}
