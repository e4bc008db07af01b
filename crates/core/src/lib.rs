//! `lotsync-core`: shared building blocks for the inventory sync engine.
//!
//! This crate contains **pure domain** primitives (no IO, no transport).

pub mod entity;
pub mod error;
pub mod id;
pub mod marketplace;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ExternalId, ForeignLotId, LotId, OrderId};
pub use marketplace::Marketplace;
