//! Silo Ledger
//!
//! Indexed deposit ledger with lazy reward accrual.
//!
//! Deposits are keyed by the per-asset accrual index current when they were
//! made. An account's reward balance ("stalk") grows by
//! `(index - index_at_deposit) * value` and is realized lazily by mowing,
//! which every mutating entry point does before it touches positions.
//! Positions can be withdrawn, transferred with their history, and converted
//! into another asset without creating or destroying grown reward.
//!
//! ## Execution Model
//!
//! - One [`SiloState`] holds everything; components borrow it mutably
//! - Each public call runs against a working copy and commits only on success
//! - Token payouts run after the commit and roll it back if they fail
//! - A second mutating call while one is running fails with `Reentrancy`
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`deposit_store`] | Positions, partial removal, transfers |
//! | [`accrual`] | Mow, plant, stalk and roots |
//! | [`convert`] | Cross-asset conversion |
//! | [`flood`] | Flood payouts over locked roots |
//! | [`legacy`] | Epoch-keyed positions from before migration |
//! | [`epoch`] | Index growth and the flood state machine |

use core::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use log::warn;

pub mod accrual;
pub mod assets;
pub mod convert;
pub mod deposit_store;
pub mod epoch;
pub mod flood;
pub mod legacy;
pub mod state;
pub mod valuation;

#[cfg(test)]
mod property_tests;

pub use accrual::PlantReceipt;
pub use convert::{ConvertReceipt, ConvertRequest};
pub use deposit_store::{DepositReceipt, RemovalSummary, TransferReceipt, WithdrawReceipt};
pub use flood::FloodStatus;
pub use state::SiloState;
pub use valuation::{AssetTransfer, RatioValuation, UnitValuation, Valuation};

use silo_common::{
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    types::{
        AccountState, AccrualIndex, Address, AssetConfig, AssetId, AssetSettings, Epoch,
        EpochReport, Position, SiloConfig, SiloTotals,
    },
};

// ============ Entry Guard ============

/// Held for the duration of a mutating call
struct EntryGuard<'a> {
    entered: &'a Cell<bool>,
}

impl<'a> EntryGuard<'a> {
    fn enter(entered: &'a Cell<bool>) -> SiloResult<Self> {
        if entered.replace(true) {
            return Err(SiloError::Reentrancy);
        }
        Ok(Self { entered })
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.entered.set(false);
    }
}

fn pay_out(
    transfer: &mut dyn AssetTransfer,
    asset: &AssetId,
    to: &Address,
    quantity: u128,
) -> SiloResult<()> {
    if quantity == 0 || transfer.transfer(asset, to, quantity) {
        return Ok(());
    }
    Err(SiloError::TransferFailed {
        asset: *asset,
        to: *to,
        quantity,
    })
}

// ============ Silo ============

/// The ledger
pub struct Silo {
    state: RefCell<SiloState>,
    valuations: BTreeMap<AssetId, Box<dyn Valuation>>,
    events: RefCell<EventLog>,
    entered: Cell<bool>,
}

impl Silo {
    /// Genesis construction
    pub fn genesis(config: SiloConfig) -> SiloResult<Self> {
        Ok(Self::with_state(SiloState::genesis(config)?))
    }

    /// Resume from a state snapshot. Valuations must be registered again.
    pub fn from_state(state: SiloState) -> SiloResult<Self> {
        state.config.validate()?;
        Ok(Self::with_state(state))
    }

    /// Resume from bytes produced by [`Silo::export_state`]
    pub fn import_state(bytes: &[u8]) -> SiloResult<Self> {
        Self::from_state(SiloState::from_bytes(bytes)?)
    }

    fn with_state(state: SiloState) -> Self {
        Self {
            state: RefCell::new(state),
            valuations: BTreeMap::new(),
            events: RefCell::new(EventLog::new()),
            entered: Cell::new(false),
        }
    }

    /// Run `op` against a working copy and commit it on success.
    ///
    /// The working copy is a full clone of [`SiloState`], so every mutating
    /// call costs time and memory linear in the ledger size. Hosts with large
    /// ledgers should keep one `Silo` per shard of accounts.
    // TODO: replace the clone with an undo log of touched store entries
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut SiloState, &mut EventLog) -> SiloResult<T>,
    ) -> SiloResult<T> {
        self.transact_then(op, |_| Ok(()))
    }

    /// Like [`Silo::transact`], then run `after` with the guard still held.
    /// If `after` fails the commit is undone and the call's events dropped.
    fn transact_then<T>(
        &self,
        op: impl FnOnce(&mut SiloState, &mut EventLog) -> SiloResult<T>,
        after: impl FnOnce(&T) -> SiloResult<()>,
    ) -> SiloResult<T> {
        let _entry = EntryGuard::enter(&self.entered)?;

        let mut working = self.state.borrow().clone();
        let mut log = EventLog::new();
        let output = op(&mut working, &mut log)?;
        let previous = self.state.replace(working);

        if let Err(err) = after(&output) {
            warn!("rolling back after external failure: {err}");
            *self.state.borrow_mut() = previous;
            return Err(err);
        }

        self.events.borrow_mut().append(log);
        Ok(output)
    }

    fn value_of(&self, asset: &AssetId, quantity: u128) -> SiloResult<u128> {
        self.valuations
            .get(asset)
            .ok_or(SiloError::UnknownAsset { asset: *asset })?
            .value_of(quantity)
    }

    // ============ Asset Registry ============

    /// Whitelist an asset with its valuation capability
    pub fn whitelist_asset(
        &mut self,
        asset: AssetId,
        config: AssetConfig,
        valuation: impl Valuation + 'static,
    ) -> SiloResult<()> {
        self.transact(|state, log| assets::whitelist(state, &asset, config, log))?;
        self.valuations.insert(asset, Box::new(valuation));
        Ok(())
    }

    /// Attach a valuation to an asset restored from a snapshot
    pub fn register_valuation(
        &mut self,
        asset: AssetId,
        valuation: impl Valuation + 'static,
    ) -> SiloResult<()> {
        self.state.borrow().asset(&asset)?;
        self.valuations.insert(asset, Box::new(valuation));
        Ok(())
    }

    /// Stop deposits into an asset and freeze its index
    pub fn dewhitelist_asset(&self, asset: &AssetId) -> SiloResult<()> {
        self.transact(|state, log| assets::dewhitelist(state, asset, log))
    }

    /// Change an asset's per-epoch index growth
    pub fn set_accrual_rate(&self, asset: &AssetId, rate: i128) -> SiloResult<()> {
        self.transact(|state, log| assets::set_accrual_rate(state, asset, rate, log))
    }

    // ============ Epoch ============

    /// Apply an epoch report. Returns false if the epoch was already reached.
    pub fn advance_epoch(&self, report: &EpochReport) -> SiloResult<bool> {
        self.transact(|state, log| epoch::advance_epoch(state, report, log))
    }

    /// Add base-asset reward to the earned pool
    pub fn receive_earned_reward(&self, quantity: u128) -> SiloResult<()> {
        self.transact(|state, log| accrual::receive_earned_reward(state, quantity, log))
    }

    // ============ Positions ============

    /// Deposit `quantity` of `asset`, valued by the asset's valuation
    pub fn deposit(
        &self,
        account: &Address,
        asset: &AssetId,
        quantity: u128,
    ) -> SiloResult<DepositReceipt> {
        self.transact(|state, log| {
            let value = self.value_of(asset, quantity)?;
            deposit_store::deposit(state, account, asset, quantity, value, log)
        })
    }

    /// Withdraw from one position and pay the quantity out
    pub fn withdraw(
        &self,
        account: &Address,
        asset: &AssetId,
        index: AccrualIndex,
        amount: u128,
        transfer: &mut dyn AssetTransfer,
    ) -> SiloResult<WithdrawReceipt> {
        self.withdraw_multiple(account, asset, &[index], &[amount], transfer)
    }

    /// Withdraw from several positions and pay the total out
    pub fn withdraw_multiple(
        &self,
        account: &Address,
        asset: &AssetId,
        indices: &[AccrualIndex],
        amounts: &[u128],
        transfer: &mut dyn AssetTransfer,
    ) -> SiloResult<WithdrawReceipt> {
        self.transact_then(
            |state, log| deposit_store::withdraw(state, account, asset, indices, amounts, log),
            |receipt| pay_out(transfer, asset, account, receipt.quantity),
        )
    }

    /// Convert positions of one asset into a position of another
    pub fn convert(&self, request: &ConvertRequest) -> SiloResult<ConvertReceipt> {
        self.transact(|state, log| {
            convert::convert(
                state,
                request,
                |quantity| self.value_of(&request.to_asset, quantity),
                log,
            )
        })
    }

    /// Move part of one position to another account
    pub fn transfer_position(
        &self,
        from: &Address,
        to: &Address,
        asset: &AssetId,
        index: AccrualIndex,
        amount: u128,
    ) -> SiloResult<TransferReceipt> {
        self.transfer_positions(from, to, asset, &[index], &[amount])
    }

    /// Move several positions to another account
    pub fn transfer_positions(
        &self,
        from: &Address,
        to: &Address,
        asset: &AssetId,
        indices: &[AccrualIndex],
        amounts: &[u128],
    ) -> SiloResult<TransferReceipt> {
        self.transact(|state, log| {
            deposit_store::transfer(state, from, to, asset, indices, amounts, log)
        })
    }

    /// Seed a pre-migration position
    pub fn import_legacy_position(
        &self,
        account: &Address,
        asset: &AssetId,
        legacy_epoch: Epoch,
        quantity: u128,
        value: u128,
    ) -> SiloResult<AccrualIndex> {
        self.transact(|state, log| {
            legacy::import_position(state, account, asset, legacy_epoch, quantity, value, log)
        })
    }

    /// Move legacy positions into the current store
    pub fn migrate_legacy(
        &self,
        account: &Address,
        asset: &AssetId,
        epochs: &[Epoch],
    ) -> SiloResult<Vec<AccrualIndex>> {
        self.transact(|state, log| legacy::migrate_positions(state, account, asset, epochs, log))
    }

    // ============ Rewards ============

    /// Realize pending reward in `asset`. Returns grown stalk credited.
    pub fn mow(&self, account: &Address, asset: &AssetId) -> SiloResult<u128> {
        self.transact(|state, log| accrual::mow(state, account, asset, log))
    }

    /// Plant the account's share of earned reward
    pub fn plant(&self, account: &Address) -> SiloResult<PlantReceipt> {
        self.transact(|state, log| accrual::plant(state, account, log))
    }

    /// Claim settled flood payout and pay it out in the flood asset
    pub fn claim_flood_payout(
        &self,
        account: &Address,
        transfer: &mut dyn AssetTransfer,
    ) -> SiloResult<u128> {
        let flood_asset = self.state.borrow().config.flood_asset;
        self.transact_then(
            |state, log| flood::claim(state, account, log),
            |amount| pay_out(transfer, &flood_asset, account, *amount),
        )
    }

    // ============ Queries ============

    /// Current epoch
    pub fn epoch(&self) -> Epoch {
        self.state.borrow().epoch
    }

    /// Current accrual index of an asset
    pub fn accrual_index(&self, asset: &AssetId) -> SiloResult<AccrualIndex> {
        self.state.borrow().accrual_index(asset)
    }

    /// Ledger state of an asset
    pub fn asset_settings(&self, asset: &AssetId) -> SiloResult<AssetSettings> {
        self.state.borrow().asset(asset).cloned()
    }

    /// Quantity of an asset held by the silo
    pub fn total_deposited(&self, asset: &AssetId) -> SiloResult<u128> {
        Ok(self.state.borrow().asset(asset)?.total_quantity)
    }

    /// Value of an asset held by the silo
    pub fn total_value(&self, asset: &AssetId) -> SiloResult<u128> {
        Ok(self.state.borrow().asset(asset)?.total_value)
    }

    /// Position at `index`, looked up through the legacy adapter
    pub fn position_of(
        &self,
        account: &Address,
        asset: &AssetId,
        index: AccrualIndex,
    ) -> SiloResult<Option<Position>> {
        deposit_store::resolved_position_of(&self.state.borrow(), account, asset, index)
    }

    /// Current-store positions of an account in an asset
    pub fn positions_of(&self, account: &Address, asset: &AssetId) -> Vec<(AccrualIndex, Position)> {
        self.state.borrow().positions_of(account, asset)
    }

    /// Legacy-store position of an account at a legacy epoch
    pub fn legacy_position_of(
        &self,
        account: &Address,
        asset: &AssetId,
        epoch: Epoch,
    ) -> Option<Position> {
        legacy::legacy_position(&self.state.borrow(), account, asset, epoch)
    }

    /// Account state; untouched accounts are empty
    pub fn account(&self, account: &Address) -> AccountState {
        self.state
            .borrow()
            .account(account)
            .cloned()
            .unwrap_or_default()
    }

    /// Realized stalk
    pub fn balance_of_stalk(&self, account: &Address) -> u128 {
        self.account(account).stalk
    }

    /// Roots
    pub fn balance_of_roots(&self, account: &Address) -> u128 {
        self.account(account).roots
    }

    /// Base-asset quantity the account could plant
    pub fn balance_of_earned(&self, account: &Address) -> SiloResult<u128> {
        accrual::balance_of_earned(&self.state.borrow(), account)
    }

    /// Stalk the account could mow in an asset
    pub fn balance_of_grown(&self, account: &Address, asset: &AssetId) -> SiloResult<u128> {
        accrual::balance_of_grown(&self.state.borrow(), account, asset)
    }

    /// Flood payout the account could claim
    pub fn balance_of_flood_payout(&self, account: &Address) -> SiloResult<u128> {
        flood::balance_of_payout(&self.state.borrow(), account)
    }

    /// Flood bookkeeping summary
    pub fn flood_status(&self) -> FloodStatus {
        flood::status(&self.state.borrow())
    }

    /// Silo-wide stalk, roots and earned pool
    pub fn totals(&self) -> SiloTotals {
        self.state.borrow().totals
    }

    // ============ Events and Snapshots ============

    /// Events of committed calls, oldest first
    pub fn events(&self) -> Vec<SiloEvent> {
        self.events.borrow().events().to_vec()
    }

    /// Take the events of committed calls
    pub fn drain_events(&self) -> Vec<SiloEvent> {
        self.events.borrow_mut().drain()
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> SiloState {
        self.state.borrow().clone()
    }

    /// Serialize the whole state
    pub fn export_state(&self) -> SiloResult<Vec<u8>> {
        self.state.borrow().to_bytes()
    }
}
