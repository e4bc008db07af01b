//! Marketplace orders domain module.
//!
//! Orders are read-only records fetched from a marketplace. The order list
//! carries the logical clock used to fence inventory snapshots.

pub mod order;

pub use order::{Order, OrderFence, OrderList, OrderStatus};
