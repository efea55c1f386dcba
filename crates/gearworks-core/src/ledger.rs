//! Resource ledgers: typed resource counts plus currency under a hard cap.
//!
//! A [`Ledger`] is internally synchronized. The player's ledger is shared
//! (`Arc<Ledger>`) between the machine tick and the crafting scheduler
//! thread, so every mutation is a single check-and-mutate under one lock.
//! Machine ledgers use the same type even though one thread touches them.

use crate::catalog::{Catalog, RecipeEntry};
use crate::id::ResourceTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

/// Plain ledger state. Keys are present only while their quantity is > 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerContents {
    pub capacity: u32,
    pub money: u64,
    pub resources: BTreeMap<ResourceTypeId, u32>,
}

impl LedgerContents {
    pub fn total_items(&self) -> u32 {
        self.resources.values().sum()
    }

    fn count(&self, resource: ResourceTypeId) -> u32 {
        self.resources.get(&resource).copied().unwrap_or(0)
    }

    fn fits(&self, quantity: u32) -> bool {
        u64::from(self.total_items()) + u64::from(quantity) <= u64::from(self.capacity)
    }

    fn decrement(&mut self, resource: ResourceTypeId, quantity: u32) {
        if let Some(held) = self.resources.get_mut(&resource) {
            *held -= quantity;
            if *held == 0 {
                self.resources.remove(&resource);
            }
        }
    }
}

/// A capacity-limited resource and currency store.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerContents>,
}

/// Ledger shared between the machine tick and the crafting engine.
pub type SharedLedger = Arc<Ledger>;

impl Clone for Ledger {
    fn clone(&self) -> Self {
        Self::from_contents(self.contents())
    }
}

impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        self.contents() == other.contents()
    }
}

impl Ledger {
    /// An empty ledger with no money.
    pub fn new(capacity: u32) -> Self {
        Self::with_money(capacity, 0)
    }

    pub fn with_money(capacity: u32, money: u64) -> Self {
        Self::from_contents(LedgerContents {
            capacity,
            money,
            resources: BTreeMap::new(),
        })
    }

    /// Rebuild a ledger from persisted contents. Zero entries are dropped.
    pub fn from_contents(mut contents: LedgerContents) -> Self {
        contents.resources.retain(|_, qty| *qty > 0);
        Self {
            state: Mutex::new(contents),
        }
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerContents> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    /// Add `quantity` of a resource. Fails without mutation if the total
    /// would exceed capacity.
    #[must_use = "false means nothing was added"]
    pub fn add_resource(&self, resource: ResourceTypeId, quantity: u32) -> bool {
        let mut state = self.lock();
        if !state.fits(quantity) {
            return false;
        }
        if quantity > 0 {
            *state.resources.entry(resource).or_insert(0) += quantity;
        }
        true
    }

    /// Remove `quantity` of a resource. Fails without mutation if fewer
    /// are held.
    #[must_use = "false means nothing was removed"]
    pub fn remove_resource(&self, resource: ResourceTypeId, quantity: u32) -> bool {
        let mut state = self.lock();
        if state.count(resource) < quantity {
            return false;
        }
        state.decrement(resource, quantity);
        true
    }

    /// Remove every entry at once, or nothing if any is short.
    #[must_use = "false means nothing was removed"]
    pub fn remove_all(&self, entries: &[RecipeEntry]) -> bool {
        let mut state = self.lock();
        if entries.iter().any(|e| state.count(e.resource) < e.quantity) {
            return false;
        }
        for e in entries {
            state.decrement(e.resource, e.quantity);
        }
        true
    }

    /// True if at least `quantity` of the resource is held.
    pub fn has_resource(&self, resource: ResourceTypeId, quantity: u32) -> bool {
        self.lock().count(resource) >= quantity
    }

    /// True if every entry is held in full.
    pub fn has_all(&self, entries: &[RecipeEntry]) -> bool {
        let state = self.lock();
        entries.iter().all(|e| state.count(e.resource) >= e.quantity)
    }

    /// True if `quantity` more items would fit.
    pub fn has_space(&self, quantity: u32) -> bool {
        self.lock().fits(quantity)
    }

    pub fn resource_count(&self, resource: ResourceTypeId) -> u32 {
        self.lock().count(resource)
    }

    pub fn total_items(&self) -> u32 {
        self.lock().total_items()
    }

    pub fn capacity(&self) -> u32 {
        self.lock().capacity
    }

    pub fn is_empty(&self) -> bool {
        self.lock().resources.is_empty()
    }

    /// Held resources in id order.
    pub fn resources(&self) -> Vec<(ResourceTypeId, u32)> {
        self.lock()
            .resources
            .iter()
            .map(|(&id, &qty)| (id, qty))
            .collect()
    }

    /// A consistent copy of the whole ledger.
    pub fn contents(&self) -> LedgerContents {
        self.lock().clone()
    }

    /// Drop every held resource. Money is untouched.
    pub fn clear_resources(&self) {
        self.lock().resources.clear();
    }

    // -----------------------------------------------------------------------
    // Money
    // -----------------------------------------------------------------------

    pub fn add_money(&self, amount: u64) {
        let mut state = self.lock();
        state.money = state.money.saturating_add(amount);
    }

    /// Debit `amount`. Fails without a partial debit if the balance is short.
    #[must_use = "false means nothing was debited"]
    pub fn remove_money(&self, amount: u64) -> bool {
        let mut state = self.lock();
        if state.money < amount {
            return false;
        }
        state.money -= amount;
        true
    }

    pub fn money(&self) -> u64 {
        self.lock().money
    }

    /// Overwrite the balance. Used when loading saved state.
    pub fn set_money(&self, amount: u64) {
        self.lock().money = amount;
    }

    // -----------------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------------

    /// Held resources one per line in catalog order, then the used space.
    pub fn inventory_display(&self, catalog: &Catalog) -> String {
        let state = self.lock();
        let mut out = String::new();
        for resource in catalog.resources() {
            let count = state.count(resource.id);
            if count > 0 {
                if !out.is_empty() {
                    out.push('\n');
                }
                let _ = write!(out, "{:<10}: {}", resource.name, count);
            }
        }
        if out.is_empty() {
            out.push_str("Empty");
        }
        let _ = write!(out, "\nSpace: {}/{}", state.total_items(), state.capacity);
        out
    }
}

/// Move `quantity` of a resource between ledgers. The two ledgers are
/// never locked together; if the destination rejects the items they are
/// returned to the source.
#[must_use = "false means nothing moved"]
pub fn transfer(from: &Ledger, to: &Ledger, resource: ResourceTypeId, quantity: u32) -> bool {
    if !from.remove_resource(resource, quantity) {
        return false;
    }
    if to.add_resource(resource, quantity) {
        return true;
    }
    if !from.add_resource(resource, quantity) {
        tracing::warn!(?resource, quantity, "transfer refund did not fit; items lost");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood() -> ResourceTypeId {
        ResourceTypeId(0)
    }

    fn stone() -> ResourceTypeId {
        ResourceTypeId(1)
    }

    #[test]
    fn add_and_remove() {
        let ledger = Ledger::new(100);
        assert!(ledger.add_resource(wood(), 50));
        assert_eq!(ledger.resource_count(wood()), 50);
        assert!(ledger.remove_resource(wood(), 30));
        assert_eq!(ledger.resource_count(wood()), 20);
    }

    #[test]
    fn add_over_capacity_is_rejected_whole() {
        let ledger = Ledger::new(10);
        assert!(ledger.add_resource(wood(), 8));
        assert!(!ledger.add_resource(stone(), 3));
        assert_eq!(ledger.total_items(), 8);
        assert_eq!(ledger.resource_count(stone()), 0);
    }

    #[test]
    fn remove_more_than_held_is_rejected() {
        let ledger = Ledger::new(100);
        assert!(ledger.add_resource(wood(), 5));
        assert!(!ledger.remove_resource(wood(), 10));
        assert_eq!(ledger.resource_count(wood()), 5);
    }

    #[test]
    fn emptied_keys_are_dropped() {
        let ledger = Ledger::new(100);
        assert!(ledger.add_resource(wood(), 3));
        assert!(ledger.remove_resource(wood(), 3));
        assert!(ledger.is_empty());
        assert!(ledger.contents().resources.is_empty());
    }

    #[test]
    fn predicates_agree_with_mutations() {
        let ledger = Ledger::new(10);
        assert!(ledger.add_resource(wood(), 7));
        assert!(ledger.has_space(3));
        assert!(!ledger.has_space(4));
        assert!(ledger.has_resource(wood(), 7));
        assert!(!ledger.has_resource(wood(), 8));
    }

    #[test]
    fn remove_all_is_all_or_nothing() {
        let ledger = Ledger::new(100);
        assert!(ledger.add_resource(wood(), 4));
        assert!(ledger.add_resource(stone(), 1));
        let entries = [RecipeEntry::new(wood(), 2), RecipeEntry::new(stone(), 2)];
        assert!(!ledger.has_all(&entries));
        assert!(!ledger.remove_all(&entries));
        assert_eq!(ledger.resource_count(wood()), 4);

        let entries = [RecipeEntry::new(wood(), 2), RecipeEntry::new(stone(), 1)];
        assert!(ledger.remove_all(&entries));
        assert_eq!(ledger.resources(), vec![(wood(), 2)]);
    }

    #[test]
    fn money_never_goes_negative() {
        let ledger = Ledger::with_money(10, 50);
        assert!(!ledger.remove_money(60));
        assert_eq!(ledger.money(), 50);
        assert!(ledger.remove_money(50));
        assert_eq!(ledger.money(), 0);
        ledger.add_money(7);
        assert_eq!(ledger.money(), 7);
    }

    #[test]
    fn transfer_moves_and_refunds() {
        let from = Ledger::new(100);
        let to = Ledger::new(5);
        assert!(from.add_resource(wood(), 10));

        assert!(transfer(&from, &to, wood(), 4));
        assert_eq!(from.resource_count(wood()), 6);
        assert_eq!(to.resource_count(wood()), 4);

        assert!(!transfer(&from, &to, wood(), 2));
        assert_eq!(from.resource_count(wood()), 6);
        assert_eq!(to.resource_count(wood()), 4);
    }

    #[test]
    fn inventory_display_lists_in_catalog_order() {
        let catalog = Catalog::standard();
        let ledger = Ledger::new(100);
        let wood = catalog.resource_id("WOOD").unwrap();
        let gold = catalog.resource_id("GOLD").unwrap();
        assert!(ledger.add_resource(gold, 2));
        assert!(ledger.add_resource(wood, 5));
        assert_eq!(
            ledger.inventory_display(&catalog),
            "WOOD      : 5\nGOLD      : 2\nSpace: 7/100"
        );
    }

    #[test]
    fn inventory_display_empty() {
        let catalog = Catalog::standard();
        let ledger = Ledger::new(40);
        assert_eq!(ledger.inventory_display(&catalog), "Empty\nSpace: 0/40");
    }

    #[test]
    fn concurrent_adds_respect_capacity() {
        let ledger = Ledger::new(100).shared();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut added = 0;
                    for _ in 0..50 {
                        if ledger.add_resource(ResourceTypeId(0), 1) {
                            added += 1;
                        }
                    }
                    added
                })
            })
            .collect();
        let added: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(added, 100);
        assert_eq!(ledger.total_items(), 100);
    }
}
