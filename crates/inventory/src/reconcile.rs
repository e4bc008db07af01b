//! Diff, merge and consolidation of item bags.
//!
//! All operations match lots with the rules in [`crate::matching`] and run
//! in O(n + m) through a [`MatchIndex`].

use tracing::debug;

use lotsync_core::DomainResult;

use crate::inventory::Inventory;
use crate::item::Item;
use crate::matching::MatchIndex;

/// Compute the delta that turns `src` into `dst`.
///
/// - a `src` lot with no match in `dst` is emitted with its quantity negated;
/// - a matched pair with different quantities is emitted with
///   `dst.quantity - src.quantity`, carrying the `dst` lot's attributes;
/// - every `dst` lot no `src` lot matched is emitted as-is (positive).
///
/// Merging the result into a copy of `src` reproduces `dst`.
pub fn diff(dst: &Inventory, src: &Inventory) -> Inventory {
    let index = MatchIndex::build(dst);
    let mut visited = vec![false; dst.len()];
    let mut delta = Inventory::new();

    for (_, item) in src.live() {
        match index.find(dst, item) {
            None => {
                delta.push(delta_item(item, item.quantity().saturating_neg()));
            }
            Some((slot, _)) => {
                visited[slot] = true;
                let theirs = &dst.items()[slot];
                let change = theirs.quantity().saturating_sub(item.quantity());
                if change != 0 {
                    delta.push(delta_item(theirs, change));
                }
            }
        }
    }

    for (slot, item) in dst.live() {
        if !visited[slot] {
            delta.push(delta_item(item, item.quantity()));
        }
    }

    debug!(
        dst = dst.live_len(),
        src = src.live_len(),
        delta = delta.live_len(),
        total_quantity = delta.total_quantity(),
        "inventory diff computed"
    );
    delta
}

fn delta_item(item: &Item, quantity: i64) -> Item {
    let mut item = item.clone();
    item.set_quantity(quantity);
    item.clear_update_flags();
    item
}

/// Counts of what a [`merge`] did to the destination.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub updated: usize,
    pub added: usize,
    pub removed: usize,
}

/// Add every lot of `src` into `dst`.
///
/// A matched lot has its quantity increased by the `src` quantity and is
/// tombstoned when the result is zero; an unmatched lot is appended.
pub fn merge(dst: &mut Inventory, src: &Inventory) -> DomainResult<MergeReport> {
    let mut index = MatchIndex::build(dst);
    let mut report = MergeReport::default();

    for (_, item) in src.live() {
        match index.find(dst, item) {
            Some((slot, _)) => {
                let quantity = dst.add_quantity(slot, item.quantity())?;
                if quantity == 0 {
                    dst.tombstone(slot)?;
                    report.removed += 1;
                } else {
                    report.updated += 1;
                }
            }
            None => {
                let slot = dst.push(item.clone());
                index.insert(slot, item);
                report.added += 1;
            }
        }
    }

    debug!(
        updated = report.updated,
        added = report.added,
        removed = report.removed,
        "inventory merge applied"
    );
    Ok(report)
}

/// What lots are considered duplicates of each other by [`consolidate`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsolidateKey {
    /// Composite natural key (type, id, color, condition).
    NaturalKey,
    /// Marketplace lot id; lots without one are never consolidated.
    LotId,
}

/// Sort by `key`, then fold each run of equal-key lots into its first lot.
///
/// Quantities of a run are summed into the first lot and the remaining lots
/// are tombstoned. Existing tombstones are compacted first. Returns the
/// number of lots tombstoned.
pub fn consolidate(inventory: &mut Inventory, key: ConsolidateKey) -> DomainResult<usize> {
    inventory.compact();
    match key {
        ConsolidateKey::NaturalKey => inventory.sort_by(|a, b| a.key().cmp(b.key())),
        // Lots without an id sort last and stay apart.
        ConsolidateKey::LotId => inventory.sort_by(|a, b| match (a.lot_id(), b.lot_id()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => core::cmp::Ordering::Less,
            (None, Some(_)) => core::cmp::Ordering::Greater,
            (None, None) => core::cmp::Ordering::Equal,
        }),
    }

    let same = |a: &Item, b: &Item| match key {
        ConsolidateKey::NaturalKey => a.key() == b.key(),
        ConsolidateKey::LotId => a.lot_id().is_some() && a.lot_id() == b.lot_id(),
    };

    let mut folded = 0;
    let mut head = 0;
    for slot in 1..inventory.len() {
        if same(&inventory.items()[head], &inventory.items()[slot]) {
            let quantity = inventory.items()[slot].quantity();
            inventory.add_quantity(head, quantity)?;
            inventory.tombstone(slot)?;
            folded += 1;
        } else {
            head = slot;
        }
    }

    if folded > 0 {
        debug!(folded, ?key, "inventory consolidated");
    }
    Ok(folded)
}
