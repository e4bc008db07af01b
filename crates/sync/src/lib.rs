//! Marketplace synchronization: configuration, the per-endpoint marketplace
//! client, consistent order/inventory snapshots and cross-marketplace id
//! resolution.
//!
//! Everything here talks to the outside world only through
//! [`lotsync_fetch::Transport`]; wire formats live behind [`MarketplaceApi`].

pub mod config;
pub mod error;
pub mod marketplace;
pub mod resolve;
pub mod snapshot;

pub use config::{ConfigError, EndpointConfig, SnapshotConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use marketplace::{JsonMarketplaceApi, MarketplaceApi, MarketplaceClient, OrderQuery, order_decrements};
pub use resolve::{IdResolver, ResolveReport, TranslationCache};
pub use snapshot::{Snapshot, SnapshotError, SnapshotSource, capture_snapshot};
