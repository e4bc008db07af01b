//! Identity matching between lots of two inventories.
//!
//! Resolution order, first match wins:
//! 1. `lot_id` (authoritative once the marketplace assigned it),
//! 2. `external_id` (correlation key of the current pass),
//! 3. the composite natural key, unless both lots carry different lot ids.
//!
//! Tombstoned lots never match.

use std::collections::HashMap;

use lotsync_core::{ExternalId, LotId};

use crate::inventory::Inventory;
use crate::item::{Item, ItemKey};

/// Which identity rule produced a match.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchRule {
    LotId,
    ExternalId,
    NaturalKey,
}

fn key_compatible(candidate: &Item, item: &Item) -> bool {
    match (candidate.lot_id(), item.lot_id()) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Linear-scan match of `item` against `inventory`.
pub fn find_match(inventory: &Inventory, item: &Item) -> Option<(usize, MatchRule)> {
    if let Some(lot_id) = item.lot_id() {
        if let Some((index, _)) = inventory.live().find(|(_, c)| c.lot_id() == Some(lot_id)) {
            return Some((index, MatchRule::LotId));
        }
    }
    if let Some(external_id) = item.external_id() {
        if let Some((index, _)) = inventory
            .live()
            .find(|(_, c)| c.external_id() == Some(external_id))
        {
            return Some((index, MatchRule::ExternalId));
        }
    }
    inventory
        .live()
        .find(|(_, c)| c.key() == item.key() && key_compatible(c, item))
        .map(|(index, _)| (index, MatchRule::NaturalKey))
}

/// Hash index over one inventory, giving the same answers as [`find_match`]
/// in O(1) expected time per lookup.
///
/// Each bucket keeps slot indices in ascending order so the first live entry
/// is the one a linear scan would have found. The index must be told about
/// appended items through [`MatchIndex::insert`]; tombstones are filtered at
/// lookup time.
#[derive(Debug, Default)]
pub struct MatchIndex {
    by_lot: HashMap<LotId, Vec<usize>>,
    by_external: HashMap<ExternalId, Vec<usize>>,
    by_key: HashMap<ItemKey, Vec<usize>>,
}

impl MatchIndex {
    pub fn build(inventory: &Inventory) -> Self {
        let mut index = Self::default();
        for (slot, item) in inventory.live() {
            index.insert(slot, item);
        }
        index
    }

    /// Register `item` at `slot`. Slots must be inserted in ascending order.
    pub fn insert(&mut self, slot: usize, item: &Item) {
        if let Some(lot_id) = item.lot_id() {
            self.by_lot.entry(lot_id).or_default().push(slot);
        }
        if let Some(external_id) = item.external_id() {
            self.by_external.entry(external_id).or_default().push(slot);
        }
        self.by_key.entry(item.key().clone()).or_default().push(slot);
    }

    pub fn find(&self, inventory: &Inventory, item: &Item) -> Option<(usize, MatchRule)> {
        let live = |slot: &&usize| inventory.get(**slot).is_some_and(|c| !c.is_deleted());

        if let Some(slots) = item.lot_id().and_then(|id| self.by_lot.get(&id)) {
            if let Some(&slot) = slots.iter().find(live) {
                return Some((slot, MatchRule::LotId));
            }
        }
        if let Some(slots) = item.external_id().and_then(|id| self.by_external.get(&id)) {
            if let Some(&slot) = slots.iter().find(live) {
                return Some((slot, MatchRule::ExternalId));
            }
        }
        self.by_key.get(item.key()).and_then(|slots| {
            slots
                .iter()
                .filter(live)
                .find(|slot| inventory.get(**slot).is_some_and(|c| key_compatible(c, item)))
                .map(|&slot| (slot, MatchRule::NaturalKey))
        })
    }
}
