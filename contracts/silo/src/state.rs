//! Root ledger state
//!
//! One explicit structure holds everything the ledger mutates. Components
//! receive it by `&mut` reference; nothing lives in statics.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use silo_common::{
    errors::{SiloError, SiloResult},
    types::{
        AccountState, AccrualIndex, Address, AssetId, AssetSettings, Epoch, FloodState, Position,
        SiloConfig, SiloTotals,
    },
};

/// Key of the accrual-indexed store
pub type DepositKey = (Address, AssetId, AccrualIndex);

/// Key of the epoch-indexed legacy store
pub type LegacyKey = (Address, AssetId, Epoch);

/// Everything the ledger owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SiloState {
    /// Genesis configuration
    pub config: SiloConfig,
    /// Current epoch
    pub epoch: Epoch,
    /// Per-asset ledger state
    pub assets: BTreeMap<AssetId, AssetSettings>,
    /// Accounts
    pub accounts: BTreeMap<Address, AccountState>,
    /// Positions keyed by accrual index
    pub deposits: BTreeMap<DepositKey, Position>,
    /// Pre-migration positions keyed by epoch
    pub legacy_deposits: BTreeMap<LegacyKey, Position>,
    /// Silo-wide balances
    pub totals: SiloTotals,
    /// Flood bookkeeping
    pub flood: FloodState,
}

impl SiloState {
    /// Genesis construction
    pub fn genesis(config: SiloConfig) -> SiloResult<Self> {
        config.validate()?;
        Ok(Self {
            epoch: config.genesis_epoch,
            config,
            assets: BTreeMap::new(),
            accounts: BTreeMap::new(),
            deposits: BTreeMap::new(),
            legacy_deposits: BTreeMap::new(),
            totals: SiloTotals::default(),
            flood: FloodState::default(),
        })
    }

    /// Ledger state of a whitelisted asset
    pub fn asset(&self, asset: &AssetId) -> SiloResult<&AssetSettings> {
        self.assets
            .get(asset)
            .ok_or(SiloError::UnknownAsset { asset: *asset })
    }

    /// Mutable ledger state of a whitelisted asset
    pub fn asset_mut(&mut self, asset: &AssetId) -> SiloResult<&mut AssetSettings> {
        self.assets
            .get_mut(asset)
            .ok_or(SiloError::UnknownAsset { asset: *asset })
    }

    /// Current accrual index of an asset
    pub fn accrual_index(&self, asset: &AssetId) -> SiloResult<AccrualIndex> {
        Ok(self.asset(asset)?.accrual_index)
    }

    /// Account state, created on first touch
    pub fn account_mut(&mut self, account: &Address) -> &mut AccountState {
        self.accounts.entry(*account).or_default()
    }

    /// Account state if the account was ever touched
    pub fn account(&self, account: &Address) -> Option<&AccountState> {
        self.accounts.get(account)
    }

    /// Positions of `account` in `asset` in the current store, by index
    pub fn positions_of(&self, account: &Address, asset: &AssetId) -> Vec<(AccrualIndex, Position)> {
        self.deposits
            .range((*account, *asset, AccrualIndex::MIN)..=(*account, *asset, AccrualIndex::MAX))
            .map(|((_, _, index), position)| (*index, *position))
            .collect()
    }

    /// Legacy positions of `account` in `asset`, by epoch
    pub fn legacy_positions_of(&self, account: &Address, asset: &AssetId) -> Vec<(Epoch, Position)> {
        self.legacy_deposits
            .range((*account, *asset, Epoch::MIN)..=(*account, *asset, Epoch::MAX))
            .map(|((_, _, epoch), position)| (*epoch, *position))
            .collect()
    }

    /// Sum of live position values of an asset over both stores
    pub fn stored_value(&self, asset: &AssetId) -> u128 {
        let current = self
            .deposits
            .iter()
            .filter(|((_, a, _), _)| a == asset)
            .map(|(_, p)| p.value);
        let legacy = self
            .legacy_deposits
            .iter()
            .filter(|((_, a, _), _)| a == asset)
            .map(|(_, p)| p.value);
        current.chain(legacy).sum()
    }

    /// Sum of live position quantities of an asset over both stores
    pub fn stored_quantity(&self, asset: &AssetId) -> u128 {
        let current = self
            .deposits
            .iter()
            .filter(|((_, a, _), _)| a == asset)
            .map(|(_, p)| p.quantity);
        let legacy = self
            .legacy_deposits
            .iter()
            .filter(|((_, a, _), _)| a == asset)
            .map(|(_, p)| p.quantity);
        current.chain(legacy).sum()
    }

    /// Serialize the whole state
    pub fn to_bytes(&self) -> SiloResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|_| SiloError::InvalidConfig {
            reason: "state serialization failed",
        })
    }

    /// Restore a serialized state
    pub fn from_bytes(bytes: &[u8]) -> SiloResult<Self> {
        borsh::from_slice(bytes).map_err(|_| SiloError::InvalidConfig {
            reason: "state bytes are malformed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SiloConfig {
        SiloConfig {
            genesis_epoch: 10,
            migration_epoch: 5,
            base_asset: [1u8; 32],
            flood_asset: [2u8; 32],
        }
    }

    #[test]
    fn test_genesis_rejects_late_migration() {
        let mut bad = config();
        bad.migration_epoch = 11;
        assert!(SiloState::genesis(bad).is_err());

        let state = SiloState::genesis(config()).unwrap();
        assert_eq!(state.epoch, 10);
        assert!(state.asset(&[1u8; 32]).is_err());
    }

    #[test]
    fn test_positions_of_is_scoped() {
        let mut state = SiloState::genesis(config()).unwrap();
        let alice = [3u8; 32];
        let bob = [4u8; 32];
        let asset = [5u8; 32];
        let position = Position {
            quantity: 1,
            value: 1,
        };
        state.deposits.insert((alice, asset, -3), position);
        state.deposits.insert((alice, asset, 7), position);
        state.deposits.insert((bob, asset, 0), position);
        state.deposits.insert((alice, [6u8; 32], 0), position);

        let indices: Vec<_> = state.positions_of(&alice, &asset).iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![-3, 7]);
        assert_eq!(state.stored_value(&asset), 3);
    }
}
