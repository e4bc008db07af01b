//! The two remote marketplaces the ledger is kept consistent with.

use serde::{Deserialize, Serialize};

/// Which remote marketplace a record or endpoint belongs to.
///
/// The primary marketplace assigns the authoritative [`crate::LotId`]; the
/// secondary one has its own catalog and lot numbering, reached through a
/// translation cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Primary,
    Secondary,
}

impl Marketplace {
    pub fn as_str(self) -> &'static str {
        match self {
            Marketplace::Primary => "primary",
            Marketplace::Secondary => "secondary",
        }
    }
}

impl core::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
