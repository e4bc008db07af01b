//! Consistent (order list, inventory) capture from a marketplace without
//! transactions.
//!
//! The order list's `(top_date, top_date_count)` pair is read before and
//! after the inventory capture. If it moved, an order landed mid-capture
//! and the inventory may or may not reflect it, so the whole attempt is
//! thrown away and repeated.

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use lotsync_fetch::FetchError;
use lotsync_inventory::Inventory;
use lotsync_orders::OrderList;

use crate::config::SnapshotConfig;
use crate::marketplace::{MarketplaceApi, MarketplaceClient};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// A fetch failed; not retried by the snapshot protocol.
    #[error("snapshot fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("order list kept changing during capture ({attempts} attempts)")]
    Inconsistent { attempts: u32 },
}

/// Something that can list orders and capture the full inventory.
#[async_trait::async_trait]
pub trait SnapshotSource: Send {
    async fn fetch_orders(&mut self) -> Result<OrderList, FetchError>;
    async fn fetch_inventory(&mut self) -> Result<Inventory, FetchError>;
}

#[async_trait::async_trait]
impl<A: MarketplaceApi> SnapshotSource for MarketplaceClient<A> {
    async fn fetch_orders(&mut self) -> Result<OrderList, FetchError> {
        let queries = self.order_queries().to_vec();
        self.fetch_order_list(&queries).await
    }

    async fn fetch_inventory(&mut self) -> Result<Inventory, FetchError> {
        MarketplaceClient::fetch_inventory(self).await
    }
}

/// A captured pair no order slipped through.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub orders: OrderList,
    pub inventory: Inventory,
    /// Attempts it took, starting at 1.
    pub attempts: u32,
}

/// Capture orders and inventory such that no order arrived in between.
///
/// An empty inventory is returned as-is with a warning; the caller decides
/// whether a store without lots is plausible.
pub async fn capture_snapshot<S>(
    source: &mut S,
    config: &SnapshotConfig,
) -> Result<Snapshot, SnapshotError>
where
    S: SnapshotSource + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        info!(attempt, max_attempts, "capturing snapshot");

        let orders = source.fetch_orders().await?;
        let fence = orders.fence();

        let started = Instant::now();
        let inventory = source.fetch_inventory().await?;
        if started.elapsed() < config.fence_window() {
            sleep(config.settle_delay()).await;
        }

        let check = source.fetch_orders().await?;
        if check.fence() == fence {
            if inventory.is_empty() {
                warn!(attempt, "captured inventory is empty");
            }
            info!(
                attempt,
                orders = orders.len(),
                lots = inventory.live_len(),
                %fence,
                "snapshot captured"
            );
            return Ok(Snapshot {
                orders,
                inventory,
                attempts: attempt,
            });
        }

        warn!(
            attempt,
            before = %fence,
            after = %check.fence(),
            "order list changed during capture"
        );
    }

    Err(SnapshotError::Inconsistent {
        attempts: max_attempts,
    })
}
