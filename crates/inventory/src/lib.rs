//! Inventory data model and reconciliation.
//!
//! This crate contains the item-bag model shared by both marketplaces and the
//! identity-matching operations used to compare and combine inventories,
//! implemented purely as deterministic logic (no IO, no transport).

pub mod inventory;
pub mod item;
pub mod matching;
pub mod reconcile;

pub use inventory::Inventory;
pub use item::{
    Condition, Item, ItemFlags, ItemKey, ItemType, MAX_TIERS, Price, PriceGuide, TierPrice,
    normalize_tiers,
};
pub use matching::{MatchIndex, MatchRule, find_match};
pub use reconcile::{ConsolidateKey, MergeReport, consolidate, diff, merge};
