//! Strongly-typed identifiers used across the domain.
//!
//! Marketplace identifiers are plain integers assigned by the remote side.
//! [`ExternalId`] is the only identifier minted locally.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Lot identifier assigned by marketplace A. Authoritative once present.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(u64);

/// Lot identifier assigned by marketplace B.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForeignLotId(u64);

/// Order identifier, unique within one marketplace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

/// Ephemeral correlation id, valid for a single reconciliation pass.
///
/// Never persisted; regenerated whenever a pass needs to correlate an item
/// with its counterpart before the marketplace has assigned a lot id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(Uuid);

macro_rules! impl_numeric_id {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if raw == 0 {
                    return Err(DomainError::invalid_id(format!("{}: zero is reserved", $name)));
                }
                Ok(Self(raw))
            }
        }
    };
}

impl_numeric_id!(LotId, "LotId");
impl_numeric_id!(ForeignLotId, "ForeignLotId");
impl_numeric_id!(OrderId, "OrderId");

impl ExternalId {
    /// Mint a fresh correlation id (UUIDv7, time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExternalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse_and_display() {
        let lot: LotId = " 123456 ".parse().unwrap();
        assert_eq!(lot.get(), 123456);
        assert_eq!(lot.to_string(), "123456");
    }

    #[test]
    fn zero_lot_id_is_rejected() {
        let err = "0".parse::<LotId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.contains("LotId")));
    }

    #[test]
    fn garbage_order_id_is_rejected() {
        assert!("abc".parse::<OrderId>().is_err());
    }

    #[test]
    fn external_ids_are_unique() {
        assert_ne!(ExternalId::new(), ExternalId::new());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ForeignLotId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
