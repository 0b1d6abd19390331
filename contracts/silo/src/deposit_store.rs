//! Deposit Store
//!
//! Positions keyed by `(account, asset, accrual index at deposit)`. Every
//! insert and removal moves the asset totals in the same step, and every
//! mutation requires the account to be realized in that asset first.
//!
//! ## Partial removal
//!
//! Removing `amount` out of `quantity` returns `value * amount / quantity`,
//! rounded down, and leaves the rest in place. Removing the remaining
//! quantity returns the remaining value, so the sum of removed values never
//! exceeds what was deposited.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use silo_common::{
    constants::limits::MAX_POSITIONS_PER_CALL,
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    math::{grown_reward, proportional_value, safe_add, safe_mul, safe_sub},
    types::{position_id, AccrualIndex, Address, AssetId, Position, PositionId, PositionKey},
};

use crate::accrual;
use crate::legacy;
use crate::state::SiloState;

// ============ Receipts ============

/// Totals of a multi-position removal
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub total_value: u128,
    pub total_quantity: u128,
    /// Value removed per requested entry, in request order
    pub values: Vec<u128>,
}

/// Result of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub position_id: PositionId,
    pub index: AccrualIndex,
    pub quantity: u128,
    pub value: u128,
    pub stalk: u128,
    pub roots: u128,
}

/// Result of a withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub asset: AssetId,
    pub quantity: u128,
    pub value: u128,
    pub stalk_removed: u128,
    pub roots_removed: u128,
}

/// Result of moving positions between accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub quantity: u128,
    pub value: u128,
    pub stalk: u128,
    pub roots: u128,
}

// ============ Store Primitives ============

/// Take `amount` out of the entry at `key`, returning the value removed.
/// The caller has checked that the entry holds at least `amount`.
pub(crate) fn take<K: Ord>(
    store: &mut BTreeMap<K, Position>,
    key: K,
    amount: u128,
) -> SiloResult<u128> {
    let Some(position) = store.get_mut(&key) else {
        return Err(SiloError::Underflow);
    };
    if amount > position.quantity {
        return Err(SiloError::Underflow);
    }
    if amount == position.quantity {
        let value = position.value;
        store.remove(&key);
        return Ok(value);
    }

    let value = proportional_value(position.value, amount, position.quantity)?;
    position.quantity -= amount;
    position.value = safe_sub(position.value, value)?;
    Ok(value)
}

fn check_lengths(indices: usize, amounts: usize) -> SiloResult<()> {
    if indices != amounts {
        return Err(SiloError::LengthMismatch { indices, amounts });
    }
    if indices > MAX_POSITIONS_PER_CALL {
        return Err(SiloError::TooManyPositions {
            count: indices,
            maximum: MAX_POSITIONS_PER_CALL,
        });
    }
    Ok(())
}

/// Current-store position of `account` at `index`
pub fn position_of(
    state: &SiloState,
    account: &Address,
    asset: &AssetId,
    index: AccrualIndex,
) -> Option<Position> {
    state.deposits.get(&(*account, *asset, index)).copied()
}

/// Position at `index` as seen through the legacy adapter: current store
/// first, the legacy store if the index is legacy and nothing is stored
/// under it in the current format.
pub fn resolved_position_of(
    state: &SiloState,
    account: &Address,
    asset: &AssetId,
    index: AccrualIndex,
) -> SiloResult<Option<Position>> {
    if let Some(position) = position_of(state, account, asset, index) {
        return Ok(Some(position));
    }
    match legacy::resolve(&state.config, state.asset(asset)?, index) {
        PositionKey::Legacy { epoch, .. } => {
            Ok(legacy::legacy_position(state, account, asset, epoch))
        }
        PositionKey::Current(_) => Ok(None),
    }
}

/// Add a position at the asset's current accrual index
pub fn add_position(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    value: u128,
    quantity: u128,
    log: &mut EventLog,
) -> SiloResult<AccrualIndex> {
    let index = state.accrual_index(asset)?;
    add_position_at(state, account, asset, index, value, quantity, log)?;
    Ok(index)
}

/// Add a position at an explicit index, merging into an existing one
pub fn add_position_at(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    index: AccrualIndex,
    value: u128,
    quantity: u128,
    log: &mut EventLog,
) -> SiloResult<()> {
    let position = Position::new(asset, quantity, value)?;
    accrual::ensure_current(state, account, asset)?;

    state
        .deposits
        .entry((*account, *asset, index))
        .or_default()
        .merge(position)?;

    let settings = state.asset_mut(asset)?;
    settings.total_quantity = safe_add(settings.total_quantity, quantity)?;
    settings.total_value = safe_add(settings.total_value, value)?;

    log.emit(SiloEvent::PositionAdded {
        position_id: position_id(account, asset, index),
        account: *account,
        asset: *asset,
        index,
        quantity,
        value,
        epoch: state.epoch,
    });
    Ok(())
}

/// Remove `amount` from the position at `index`, returning the value removed.
///
/// Legacy-range indices are served from the current store when it holds
/// enough, otherwise from the legacy store. For assets whose legacy storage
/// records an excess, a shortfall in the current store is taken from the
/// legacy store and the two values are summed.
pub fn remove_position(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    index: AccrualIndex,
    amount: u128,
    log: &mut EventLog,
) -> SiloResult<u128> {
    accrual::ensure_current(state, account, asset)?;
    if amount == 0 {
        return Ok(0);
    }

    let settings = state.asset(asset)?;
    let key = legacy::resolve(&state.config, settings, index);
    let grandfathered = settings.legacy.is_some_and(|l| l.grandfathered_excess);
    let current_key = (*account, *asset, index);
    let in_current = position_of(state, account, asset, index)
        .map(|p| p.quantity)
        .unwrap_or(0);

    let insufficient = |available: u128| SiloError::InsufficientBalance {
        account: *account,
        asset: *asset,
        index,
        available,
        requested: amount,
    };

    let value = match key {
        _ if amount <= in_current => take(&mut state.deposits, current_key, amount)?,
        PositionKey::Current(_) => return Err(insufficient(in_current)),
        PositionKey::Legacy { epoch, .. } => {
            let in_legacy = legacy::legacy_quantity(state, account, asset, epoch);
            if in_current == 0 {
                if amount > in_legacy {
                    return Err(insufficient(in_legacy));
                }
                legacy::take_legacy(state, account, asset, epoch, amount)?
            } else if grandfathered {
                let shortfall = amount - in_current;
                if shortfall > in_legacy {
                    return Err(insufficient(safe_add(in_current, in_legacy)?));
                }
                debug!("removal at legacy index {index} falls through by {shortfall}");
                let from_current = take(&mut state.deposits, current_key, in_current)?;
                let from_legacy = legacy::take_legacy(state, account, asset, epoch, shortfall)?;
                safe_add(from_current, from_legacy)?
            } else {
                return Err(insufficient(in_current));
            }
        }
    };

    let settings = state.asset_mut(asset)?;
    settings.total_quantity = safe_sub(settings.total_quantity, amount)?;
    settings.total_value = safe_sub(settings.total_value, value)?;

    log.emit(SiloEvent::PositionRemoved {
        position_id: position_id(account, asset, index),
        account: *account,
        asset: *asset,
        index,
        quantity: amount,
        value,
        epoch: state.epoch,
    });
    Ok(value)
}

/// Remove several positions of one asset, all or nothing
pub fn remove_multiple(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    indices: &[AccrualIndex],
    amounts: &[u128],
    log: &mut EventLog,
) -> SiloResult<RemovalSummary> {
    check_lengths(indices.len(), amounts.len())?;

    let mut summary = RemovalSummary {
        values: Vec::with_capacity(indices.len()),
        ..RemovalSummary::default()
    };
    for (&index, &amount) in indices.iter().zip(amounts) {
        let value = remove_position(state, account, asset, index, amount, log)?;
        summary.total_value = safe_add(summary.total_value, value)?;
        summary.total_quantity = safe_add(summary.total_quantity, amount)?;
        summary.values.push(value);
    }
    Ok(summary)
}

/// Stalk carried by removed positions: base stalk plus what they grew
/// between their index and the tip.
pub(crate) fn stalk_of_removed(
    state: &SiloState,
    asset: &AssetId,
    indices: &[AccrualIndex],
    summary: &RemovalSummary,
) -> SiloResult<(u128, u128)> {
    let settings = state.asset(asset)?;
    let mut grown: u128 = 0;
    for (&index, &value) in indices.iter().zip(&summary.values) {
        // zero entries may name any index, even one past the tip
        if value == 0 {
            continue;
        }
        grown = safe_add(grown, grown_reward(settings.accrual_index, index, value)?)?;
    }
    let base = safe_mul(summary.total_value, settings.stalk_per_value)?;
    Ok((safe_add(base, grown)?, grown))
}

/// Move one position between accounts at the same index
pub fn transfer_position(
    state: &mut SiloState,
    from: &Address,
    to: &Address,
    asset: &AssetId,
    index: AccrualIndex,
    amount: u128,
    log: &mut EventLog,
) -> SiloResult<TransferReceipt> {
    transfer_multiple(state, from, to, asset, &[index], &[amount], log)
}

/// Move several positions between accounts, all or nothing.
///
/// Positions keep their index, so the recipient inherits their grown reward.
/// The stalk they carry moves with them. Legacy positions land in the
/// recipient's current store.
pub fn transfer_multiple(
    state: &mut SiloState,
    from: &Address,
    to: &Address,
    asset: &AssetId,
    indices: &[AccrualIndex],
    amounts: &[u128],
    log: &mut EventLog,
) -> SiloResult<TransferReceipt> {
    check_lengths(indices.len(), amounts.len())?;
    accrual::ensure_current(state, to, asset)?;

    let summary = remove_multiple(state, from, asset, indices, amounts, log)?;
    for ((&index, &amount), &value) in indices.iter().zip(amounts).zip(&summary.values) {
        if amount == 0 {
            continue;
        }
        add_position_at(state, to, asset, index, value, amount, log)?;
        log.emit(SiloEvent::PositionTransferred {
            from: *from,
            to: *to,
            asset: *asset,
            index,
            quantity: amount,
            value,
            epoch: state.epoch,
        });
    }

    let (stalk, _) = stalk_of_removed(state, asset, indices, &summary)?;
    accrual::debit_value(state, from, asset, summary.total_value)?;
    accrual::credit_value(state, to, asset, summary.total_value)?;
    let roots = accrual::transfer_stalk(state, from, to, stalk, log)?;

    Ok(TransferReceipt {
        quantity: summary.total_quantity,
        value: summary.total_value,
        stalk,
        roots,
    })
}

// ============ Flows ============

/// Deposit `quantity` worth `value` at the current index
pub fn deposit(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    quantity: u128,
    value: u128,
    log: &mut EventLog,
) -> SiloResult<DepositReceipt> {
    if !state.asset(asset)?.deposits_enabled {
        return Err(SiloError::DepositsDisabled { asset: *asset });
    }

    // 1. Realize before touching positions
    accrual::mow(state, account, asset, log)?;

    // 2. Store the position
    let index = add_position(state, account, asset, value, quantity, log)?;
    accrual::credit_value(state, account, asset, value)?;

    // 3. Base stalk for the new value
    let stalk = safe_mul(value, state.asset(asset)?.stalk_per_value)?;
    let roots = accrual::mint_stalk(state, account, stalk, log)?;

    Ok(DepositReceipt {
        position_id: position_id(account, asset, index),
        index,
        quantity,
        value,
        stalk,
        roots,
    })
}

/// Withdraw positions, burning the stalk they carry. The caller pays out
/// the quantity.
pub fn withdraw(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    indices: &[AccrualIndex],
    amounts: &[u128],
    log: &mut EventLog,
) -> SiloResult<WithdrawReceipt> {
    accrual::mow(state, account, asset, log)?;

    let summary = remove_multiple(state, account, asset, indices, amounts, log)?;
    let (stalk, _) = stalk_of_removed(state, asset, indices, &summary)?;
    accrual::debit_value(state, account, asset, summary.total_value)?;
    let roots = accrual::burn_stalk(state, account, stalk, log)?;

    Ok(WithdrawReceipt {
        asset: *asset,
        quantity: summary.total_quantity,
        value: summary.total_value,
        stalk_removed: stalk,
        roots_removed: roots,
    })
}

/// Move positions to another account after realizing both sides
pub fn transfer(
    state: &mut SiloState,
    from: &Address,
    to: &Address,
    asset: &AssetId,
    indices: &[AccrualIndex],
    amounts: &[u128],
    log: &mut EventLog,
) -> SiloResult<TransferReceipt> {
    accrual::mow(state, from, asset, log)?;
    accrual::mow(state, to, asset, log)?;
    transfer_multiple(state, from, to, asset, indices, amounts, log)
}
