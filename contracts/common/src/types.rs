//! Core Types for the Silo Ledger
//!
//! Data model shared by every ledger component: accounts, positions,
//! per-asset ledger state, flood bookkeeping and genesis configuration.

use crate::errors::{SiloError, SiloResult};
use crate::BTreeMap;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Type alias for account addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for position identifiers handed to indexers
pub type PositionId = [u8; 32];

/// Epoch ("season") number
pub type Epoch = u64;

/// Per-asset accrual index. Signed: legacy positions live below zero.
pub type AccrualIndex = i128;

/// Derive the stable identifier of the position `(account, asset, index)`
pub fn position_id(account: &Address, asset: &AssetId, index: AccrualIndex) -> PositionId {
    let mut hasher = Sha256::new();
    hasher.update(account);
    hasher.update(asset);
    hasher.update(index.to_be_bytes());
    hasher.finalize().into()
}

// ============ Position Types ============

/// A deposit: quantity of an asset and its value fixed at deposit time
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Position {
    /// Amount of the asset held
    pub quantity: u128,
    /// Value in the common denomination (BDV)
    pub value: u128,
}

impl Position {
    /// Creates a position, rejecting empty ones
    pub fn new(asset: &AssetId, quantity: u128, value: u128) -> SiloResult<Self> {
        if quantity == 0 || value == 0 {
            return Err(SiloError::InvalidPosition {
                asset: *asset,
                quantity,
                value,
            });
        }
        Ok(Self { quantity, value })
    }

    /// Adds another position stored under the same key
    pub fn merge(&mut self, other: Position) -> SiloResult<()> {
        self.quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or(SiloError::Overflow)?;
        self.value = self.value.checked_add(other.value).ok_or(SiloError::Overflow)?;
        Ok(())
    }

    /// Returns true if nothing is held
    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

/// A lookup key after range resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionKey {
    /// Key in the accrual-indexed store
    Current(AccrualIndex),
    /// Key derived from a pre-migration epoch
    Legacy { index: AccrualIndex, epoch: Epoch },
}

impl PositionKey {
    /// The accrual index the key was resolved from
    pub fn index(&self) -> AccrualIndex {
        match self {
            Self::Current(index) => *index,
            Self::Legacy { index, .. } => *index,
        }
    }

    /// Returns true for legacy-range keys
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }
}

// ============ Asset Types ============

/// Legacy format parameters of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LegacyConfig {
    /// Accrual-index distance between consecutive legacy epochs (> 0)
    pub rate_per_epoch: i128,
    /// Legacy storage also records an excess beyond the current format,
    /// so removals may fall through to it
    pub grandfathered_excess: bool,
}

/// Parameters supplied when an asset is whitelisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AssetConfig {
    /// Stalk minted per unit of value on deposit
    pub stalk_per_value: u128,
    /// Accrual-index growth per epoch
    pub accrual_rate: i128,
    /// Legacy format, if the asset predates migration
    pub legacy: Option<LegacyConfig>,
}

impl AssetConfig {
    /// Config without a legacy format
    pub fn new(stalk_per_value: u128, accrual_rate: i128) -> Self {
        Self {
            stalk_per_value,
            accrual_rate,
            legacy: None,
        }
    }

    /// Attach a legacy format
    pub fn with_legacy(mut self, rate_per_epoch: i128, grandfathered_excess: bool) -> Self {
        self.legacy = Some(LegacyConfig {
            rate_per_epoch,
            grandfathered_excess,
        });
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> SiloResult<()> {
        if self.stalk_per_value == 0 {
            return Err(SiloError::InvalidConfig {
                reason: "stalk per value must be positive",
            });
        }
        if self.accrual_rate < 0 {
            return Err(SiloError::InvalidConfig {
                reason: "accrual rate must not be negative",
            });
        }
        if let Some(legacy) = self.legacy {
            if legacy.rate_per_epoch <= 0 {
                return Err(SiloError::InvalidConfig {
                    reason: "legacy rate must be positive",
                });
            }
        }
        Ok(())
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::new(
            crate::constants::stalk::DEFAULT_STALK_PER_VALUE,
            crate::constants::stalk::DEFAULT_ACCRUAL_RATE,
        )
    }
}

/// Per-asset ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AssetSettings {
    /// Stalk minted per unit of value, fixed at whitelist time
    pub stalk_per_value: u128,
    /// Accrual-index growth per epoch
    pub accrual_rate: i128,
    /// Current accrual index (non-decreasing)
    pub accrual_index: AccrualIndex,
    /// Legacy format
    pub legacy: Option<LegacyConfig>,
    /// Quantity deposited across all accounts and both stores
    pub total_quantity: u128,
    /// Value deposited across all accounts and both stores
    pub total_value: u128,
    /// Whether new deposits are accepted
    pub deposits_enabled: bool,
    /// Epoch the asset was whitelisted
    pub whitelisted_at: Epoch,
}

impl AssetSettings {
    /// Fresh ledger state for a newly whitelisted asset
    pub fn new(config: AssetConfig, epoch: Epoch) -> Self {
        Self {
            stalk_per_value: config.stalk_per_value,
            accrual_rate: config.accrual_rate,
            accrual_index: 0,
            legacy: config.legacy,
            total_quantity: 0,
            total_value: 0,
            deposits_enabled: true,
            whitelisted_at: epoch,
        }
    }
}

// ============ Account Types ============

/// Per-account, per-asset realization checkpoint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct MowStatus {
    /// Accrual index through which grown reward has been realized
    pub last_index: AccrualIndex,
    /// Total value the account holds in the asset
    pub value: u128,
}

/// Per-account flood bookkeeping
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct AccountFlood {
    /// Start epoch of the flood the account is snapshotted into
    pub tracked_flood: Option<Epoch>,
    /// Roots locked when the tracked flood began
    pub roots_snapshot: u128,
    /// Cumulative payout-per-root already settled
    pub checkpoint: u128,
    /// Settled, unclaimed payout
    pub claimable: u128,
}

/// Account state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccountState {
    /// Realized stalk
    pub stalk: u128,
    /// Roots
    pub roots: u128,
    /// Last epoch the account was realized in
    pub last_update: Epoch,
    /// Realization checkpoint per asset
    pub mow_status: BTreeMap<AssetId, MowStatus>,
    /// Flood bookkeeping
    pub flood: AccountFlood,
}

// ============ Global Types ============

/// Silo-wide balances
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct SiloTotals {
    /// Total stalk, including stalk backing the earned pool
    pub stalk: u128,
    /// Total roots
    pub roots: u128,
    /// Base-asset reward waiting to be planted
    pub earned_pool: u128,
}

/// History of one flood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FloodRecord {
    /// Cumulative payout-per-root when the flood began
    pub start_index: u128,
    /// Cumulative payout-per-root after the latest payout of this flood
    pub end_index: u128,
    /// Total roots when the flood began
    pub roots: u128,
    /// Total paid out during this flood
    pub paid: u128,
    /// Epoch the flood ended
    pub ended_at: Option<Epoch>,
}

/// Global flood state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FloodState {
    /// Start epoch of the flood in progress
    pub active: Option<Epoch>,
    /// Cumulative payout per root since genesis (scaled by FLOOD_PRECISION)
    pub payout_per_root: u128,
    /// Floods keyed by start epoch
    pub records: BTreeMap<Epoch, FloodRecord>,
    /// Total paid in by the epoch source
    pub total_paid: u128,
    /// Paid in but not yet spread over roots. Rounding dust and payouts
    /// arriving with no roots locked wait here for the next payout.
    pub unallocated: u128,
    /// Total claimed out
    pub total_claimed: u128,
}

/// Genesis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SiloConfig {
    /// Epoch the ledger starts at
    pub genesis_epoch: Epoch,
    /// First epoch of the accrual-indexed format
    pub migration_epoch: Epoch,
    /// Base reward asset (value == quantity); earned reward is planted in it
    pub base_asset: AssetId,
    /// Asset paid out during floods
    pub flood_asset: AssetId,
}

impl SiloConfig {
    /// Validate configuration
    pub fn validate(&self) -> SiloResult<()> {
        if self.migration_epoch > self.genesis_epoch {
            return Err(SiloError::InvalidConfig {
                reason: "migration epoch after genesis",
            });
        }
        Ok(())
    }
}

/// What the epoch source reports when the epoch advances
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct EpochReport {
    /// New epoch number
    pub epoch: Epoch,
    /// Whether the flood condition holds in this epoch
    pub flooding: bool,
    /// Flood asset paid to root holders this epoch
    pub flood_payout: u128,
    /// Base-asset reward entering the earned pool this epoch
    pub earned_reward: u128,
}

impl EpochReport {
    /// A plain epoch tick
    pub fn tick(epoch: Epoch) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rejects_empty() {
        let asset = [7u8; 32];
        assert!(Position::new(&asset, 0, 10).is_err());
        assert!(Position::new(&asset, 10, 0).is_err());
        assert_eq!(
            Position::new(&asset, 10, 5).unwrap(),
            Position {
                quantity: 10,
                value: 5
            }
        );
    }

    #[test]
    fn test_position_id_depends_on_index() {
        let a = position_id(&[1u8; 32], &[2u8; 32], 10);
        let b = position_id(&[1u8; 32], &[2u8; 32], -10);
        assert_ne!(a, b);
        assert_eq!(a, position_id(&[1u8; 32], &[2u8; 32], 10));
    }

    #[test]
    fn test_asset_config_validation() {
        assert!(AssetConfig::default().validate().is_ok());
        assert!(AssetConfig::new(0, 1).validate().is_err());
        assert!(AssetConfig::new(1, -1).validate().is_err());
        assert!(AssetConfig::new(1, 1).with_legacy(0, false).validate().is_err());
    }
}
