//! Engine configuration.
//!
//! Defaults match production behavior; `from_env` overlays `LOTSYNC_*`
//! variables on top of them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use lotsync_core::Marketplace;
use lotsync_fetch::QueryFlags;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("pipeline queue size for {0} must be at least 1")]
    ZeroPipelineDepth(Marketplace),

    #[error("snapshot max attempts must be at least 1")]
    ZeroSnapshotAttempts,
}

/// Per-marketplace request budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Maximum requests in flight against the endpoint.
    pub pipeline_queue_size: usize,
    /// Retry transient (HTTP/transport) failures.
    pub retry_transient: bool,
    /// Per-item dispatch cap; unbounded when unset.
    pub max_item_attempts: Option<u32>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            pipeline_queue_size: 8,
            retry_transient: true,
            max_item_attempts: None,
        }
    }
}

impl EndpointConfig {
    pub fn flags(&self) -> QueryFlags {
        let flags = QueryFlags::default();
        if self.retry_transient { flags } else { flags.no_retry() }
    }
}

/// Fencing parameters of the snapshot protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub max_attempts: u32,
    /// Extra wait before re-reading the order list.
    pub settle_delay_ms: u64,
    /// Captures faster than this get the settle delay.
    pub fence_window_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            settle_delay_ms: 2_000,
            fence_window_ms: 2_500,
        }
    }
}

impl SnapshotConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn fence_window(&self) -> Duration {
        Duration::from_millis(self.fence_window_ms)
    }

    /// No settle delay; for in-memory marketplaces.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            settle_delay_ms: 0,
            fence_window_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub primary: EndpointConfig,
    pub secondary: EndpointConfig,
    pub snapshot: SnapshotConfig,
}

impl SyncConfig {
    /// Defaults overlaid with `LOTSYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`SyncConfig::from_env`], reading variables through `lookup`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        overlay(&lookup, "LOTSYNC_PIPELINE_QUEUE_SIZE_A", &mut config.primary.pipeline_queue_size);
        overlay(&lookup, "LOTSYNC_PIPELINE_QUEUE_SIZE_B", &mut config.secondary.pipeline_queue_size);
        overlay(&lookup, "LOTSYNC_SNAPSHOT_MAX_ATTEMPTS", &mut config.snapshot.max_attempts);
        overlay(&lookup, "LOTSYNC_SNAPSHOT_SETTLE_DELAY_MS", &mut config.snapshot.settle_delay_ms);
        overlay(&lookup, "LOTSYNC_SNAPSHOT_FENCE_WINDOW_MS", &mut config.snapshot.fence_window_ms);
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for marketplace in [Marketplace::Primary, Marketplace::Secondary] {
            if self.endpoint(marketplace).pipeline_queue_size == 0 {
                return Err(ConfigError::ZeroPipelineDepth(marketplace));
            }
        }
        if self.snapshot.max_attempts == 0 {
            return Err(ConfigError::ZeroSnapshotAttempts);
        }
        Ok(())
    }

    pub fn endpoint(&self, marketplace: Marketplace) -> &EndpointConfig {
        match marketplace {
            Marketplace::Primary => &self.primary,
            Marketplace::Secondary => &self.secondary,
        }
    }

    pub fn endpoint_mut(&mut self, marketplace: Marketplace) -> &mut EndpointConfig {
        match marketplace {
            Marketplace::Primary => &mut self.primary,
            Marketplace::Secondary => &mut self.secondary,
        }
    }

    pub fn with_pipeline_queue_size(mut self, marketplace: Marketplace, size: usize) -> Self {
        self.endpoint_mut(marketplace).pipeline_queue_size = size;
        self
    }

    pub fn with_max_item_attempts(mut self, marketplace: Marketplace, max: Option<u32>) -> Self {
        self.endpoint_mut(marketplace).max_item_attempts = max;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotConfig) -> Self {
        self.snapshot = snapshot;
        self
    }
}

fn overlay<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(variable = name, value = %raw, "ignoring unparsable config value"),
    }
}
