//! Ordered item bag with incrementally maintained totals.

use serde::{Deserialize, Serialize};

use lotsync_core::{DomainError, DomainResult, LotId};

use crate::item::{Item, Price};

/// An ordered, append-mostly collection of lots.
///
/// `total_quantity` and `total_value` always reflect the live (non-deleted)
/// items. Every mutation goes through a method here so the totals can be
/// adjusted in O(1); deleted items stay in place as tombstones until
/// [`Inventory::compact`] is called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Item>", into = "Vec<Item>")]
pub struct Inventory {
    items: Vec<Item>,
    total_quantity: i64,
    total_value: i64,
    tombstones: usize,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Number of non-deleted items.
    pub fn live_len(&self) -> usize {
        self.items.len() - self.tombstones
    }

    /// `true` when there is no live item.
    pub fn is_empty(&self) -> bool {
        self.live_len() == 0
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    /// Sum of `quantity * price` over live items, in thousandths.
    pub fn total_value(&self) -> i64 {
        self.total_value
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    /// Live items with their slot index.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Item)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_deleted())
    }

    pub fn find_by_lot_id(&self, lot_id: LotId) -> Option<usize> {
        self.live()
            .find(|(_, item)| item.lot_id() == Some(lot_id))
            .map(|(index, _)| index)
    }

    /// Append an item and return its slot index.
    pub fn push(&mut self, item: Item) -> usize {
        self.account(&item);
        self.items.push(item);
        self.items.len() - 1
    }

    /// Apply an arbitrary edit to one item, keeping the totals consistent.
    pub fn modify<R>(&mut self, index: usize, edit: impl FnOnce(&mut Item) -> R) -> DomainResult<R> {
        let item = self.items.get(index).ok_or_else(DomainError::not_found)?;
        if item.is_deleted() {
            return Err(DomainError::invariant(format!("item {index} is deleted")));
        }
        let (old_qty, old_value) = (item.quantity(), item.value());

        let item = &mut self.items[index];
        let result = edit(item);
        let (new_qty, new_value) = (item.quantity(), item.value());

        self.total_quantity = self
            .total_quantity
            .saturating_sub(old_qty)
            .saturating_add(new_qty);
        self.total_value = self
            .total_value
            .saturating_sub(old_value)
            .saturating_add(new_value);
        Ok(result)
    }

    pub fn set_quantity(&mut self, index: usize, quantity: i64) -> DomainResult<()> {
        self.modify(index, |item| item.set_quantity(quantity))
    }

    pub fn add_quantity(&mut self, index: usize, delta: i64) -> DomainResult<i64> {
        self.modify(index, |item| {
            let quantity = item.quantity().saturating_add(delta);
            item.set_quantity(quantity);
            quantity
        })
    }

    pub fn set_price(&mut self, index: usize, price: Price) -> DomainResult<()> {
        self.modify(index, |item| item.set_price(price))
    }

    /// Mark an item deleted in place. Deleting a tombstone is a no-op.
    pub fn tombstone(&mut self, index: usize) -> DomainResult<()> {
        let item = self.items.get(index).ok_or_else(DomainError::not_found)?;
        if item.is_deleted() {
            return Ok(());
        }
        let (qty, value) = (item.quantity(), item.value());
        self.total_quantity = self.total_quantity.saturating_sub(qty);
        self.total_value = self.total_value.saturating_sub(value);
        self.tombstones += 1;
        self.items[index].set_deleted(true);
        Ok(())
    }

    /// Drop tombstones, preserving the order of live items.
    ///
    /// Slot indices are invalidated.
    pub fn compact(&mut self) {
        if self.tombstones == 0 {
            return;
        }
        self.items.retain(|item| !item.is_deleted());
        self.tombstones = 0;
    }

    /// Stable reorder of the slots. Totals are unaffected.
    pub fn sort_by(&mut self, compare: impl FnMut(&Item, &Item) -> core::cmp::Ordering) {
        self.items.sort_by(compare);
    }

    /// Copy of the live items with every quantity negated.
    pub fn negated(&self) -> Inventory {
        let mut out = Inventory::with_capacity(self.live_len());
        for (_, item) in self.live() {
            let mut item = item.clone();
            item.set_quantity(item.quantity().saturating_neg());
            item.clear_update_flags();
            out.push(item);
        }
        out
    }

    /// Recount the totals from scratch and compare with the incremental ones.
    pub fn totals_consistent(&self) -> bool {
        let mut recount = Inventory::default();
        recount.recount(&self.items);
        recount.total_quantity == self.total_quantity
            && recount.total_value == self.total_value
            && recount.tombstones == self.tombstones
    }

    fn recount(&mut self, items: &[Item]) {
        self.total_quantity = 0;
        self.total_value = 0;
        self.tombstones = 0;
        for item in items {
            self.account(item);
        }
    }

    /// Totals saturate at the `i64` bounds instead of overflowing.
    fn account(&mut self, item: &Item) {
        if item.is_deleted() {
            self.tombstones += 1;
        } else {
            self.total_quantity = self.total_quantity.saturating_add(item.quantity());
            self.total_value = self.total_value.saturating_add(item.value());
        }
    }
}

impl From<Vec<Item>> for Inventory {
    fn from(items: Vec<Item>) -> Self {
        let mut inventory = Inventory::default();
        inventory.recount(&items);
        inventory.items = items;
        inventory
    }
}

impl From<Inventory> for Vec<Item> {
    fn from(value: Inventory) -> Self {
        value.items
    }
}

impl FromIterator<Item> for Inventory {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for item in iter {
            inventory.push(item);
        }
        inventory
    }
}
