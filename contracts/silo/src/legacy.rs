//! Legacy Adapter
//!
//! Positions recorded before the migration epoch are keyed by epoch, not by
//! accrual index. Each legacy epoch maps to a synthetic index
//! `(epoch - migration_epoch) * rate_per_epoch`, which is negative for every
//! legacy epoch and therefore disjoint from indices stamped by deposits
//! (those start at zero). Lookups resolve a raw index into a
//! [`PositionKey`] first and only then pick a backing store.

use core::ops::Range;

use log::{debug, trace};
use silo_common::{
    constants::legacy::MIGRATION_HORIZON_EPOCHS,
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    math::{grown_reward, safe_add, safe_mul},
    types::{
        AccrualIndex, Address, AssetId, AssetSettings, Epoch, LegacyConfig, Position, PositionKey,
        SiloConfig,
    },
};

use crate::accrual;
use crate::deposit_store::take;
use crate::state::SiloState;

/// Epochs whose positions may live in the legacy store
pub fn legacy_range(config: &SiloConfig) -> Range<Epoch> {
    config.migration_epoch.saturating_sub(MIGRATION_HORIZON_EPOCHS)..config.migration_epoch
}

/// Returns true if `epoch` predates migration and lies inside the horizon
pub fn is_legacy_epoch(config: &SiloConfig, epoch: Epoch) -> bool {
    legacy_range(config).contains(&epoch)
}

/// Synthetic accrual index of a legacy epoch
pub fn synthetic_index(
    config: &SiloConfig,
    legacy: &LegacyConfig,
    epoch: Epoch,
) -> SiloResult<AccrualIndex> {
    let steps = i128::from(epoch) - i128::from(config.migration_epoch);
    steps
        .checked_mul(legacy.rate_per_epoch)
        .ok_or(SiloError::Overflow)
}

/// Resolve a raw index into the store it belongs to.
///
/// An index is legacy only if the asset has a legacy format, the index is an
/// exact negative multiple of the legacy rate, and the epoch it maps back to
/// is inside the legacy range. Everything else is a current-store key.
pub fn resolve(config: &SiloConfig, settings: &AssetSettings, index: AccrualIndex) -> PositionKey {
    let Some(legacy) = settings.legacy else {
        return PositionKey::Current(index);
    };
    if index >= 0 || index % legacy.rate_per_epoch != 0 {
        return PositionKey::Current(index);
    }

    let epoch = i128::from(config.migration_epoch) + index / legacy.rate_per_epoch;
    match Epoch::try_from(epoch) {
        Ok(epoch) if is_legacy_epoch(config, epoch) => PositionKey::Legacy { index, epoch },
        _ => PositionKey::Current(index),
    }
}

fn legacy_format(state: &SiloState, asset: &AssetId) -> SiloResult<LegacyConfig> {
    state
        .asset(asset)?
        .legacy
        .ok_or(SiloError::NoLegacyFormat { asset: *asset })
}

fn ensure_legacy_epoch(state: &SiloState, asset: &AssetId, epoch: Epoch) -> SiloResult<()> {
    if !is_legacy_epoch(&state.config, epoch) {
        return Err(SiloError::NotLegacyEpoch {
            asset: *asset,
            epoch,
        });
    }
    Ok(())
}

/// Seed a pre-migration position into the legacy store.
///
/// The account is credited with the base stalk of the position plus what it
/// grew between its synthetic index and the current tip, as if it had been
/// held in the silo all along.
pub fn import_position(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    legacy_epoch: Epoch,
    quantity: u128,
    value: u128,
    log: &mut EventLog,
) -> SiloResult<AccrualIndex> {
    let legacy = legacy_format(state, asset)?;
    ensure_legacy_epoch(state, asset, legacy_epoch)?;
    let position = Position::new(asset, quantity, value)?;
    let index = synthetic_index(&state.config, &legacy, legacy_epoch)?;

    accrual::mow(state, account, asset, log)?;
    accrual::ensure_current(state, account, asset)?;

    state
        .legacy_deposits
        .entry((*account, *asset, legacy_epoch))
        .or_default()
        .merge(position)?;

    let settings = state.asset_mut(asset)?;
    settings.total_quantity = safe_add(settings.total_quantity, quantity)?;
    settings.total_value = safe_add(settings.total_value, value)?;
    let stalk_per_value = settings.stalk_per_value;
    let tip = settings.accrual_index;

    accrual::credit_value(state, account, asset, value)?;
    let stalk = safe_add(
        safe_mul(value, stalk_per_value)?,
        grown_reward(tip, index, value)?,
    )?;
    accrual::mint_stalk(state, account, stalk, log)?;

    debug!("imported legacy position: epoch {legacy_epoch} index {index} value {value}");
    log.emit(SiloEvent::LegacyPositionImported {
        account: *account,
        asset: *asset,
        legacy_epoch,
        index,
        quantity,
        value,
        epoch: state.epoch,
    });

    Ok(index)
}

/// Legacy position of `account` at `epoch`, if any
pub fn legacy_position(
    state: &SiloState,
    account: &Address,
    asset: &AssetId,
    epoch: Epoch,
) -> Option<Position> {
    state.legacy_deposits.get(&(*account, *asset, epoch)).copied()
}

/// Quantity held in the legacy store at `epoch`
pub fn legacy_quantity(state: &SiloState, account: &Address, asset: &AssetId, epoch: Epoch) -> u128 {
    legacy_position(state, account, asset, epoch)
        .map(|p| p.quantity)
        .unwrap_or(0)
}

/// Take `amount` out of the legacy store, returning the value removed.
/// The caller checks availability and maintains asset totals.
pub(crate) fn take_legacy(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    epoch: Epoch,
    amount: u128,
) -> SiloResult<u128> {
    take(&mut state.legacy_deposits, (*account, *asset, epoch), amount)
}

/// Move legacy positions into the current store at their synthetic index.
///
/// Balances, totals and stalk are unchanged; only the backing store moves.
/// Epochs without a legacy position are skipped.
pub fn migrate_positions(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    epochs: &[Epoch],
    log: &mut EventLog,
) -> SiloResult<Vec<AccrualIndex>> {
    let legacy = legacy_format(state, asset)?;
    accrual::mow(state, account, asset, log)?;

    let mut migrated = Vec::with_capacity(epochs.len());
    for &legacy_epoch in epochs {
        ensure_legacy_epoch(state, asset, legacy_epoch)?;
        let Some(position) = state
            .legacy_deposits
            .remove(&(*account, *asset, legacy_epoch))
        else {
            trace!("no legacy position at epoch {legacy_epoch}");
            continue;
        };

        let index = synthetic_index(&state.config, &legacy, legacy_epoch)?;
        state
            .deposits
            .entry((*account, *asset, index))
            .or_default()
            .merge(position)?;

        log.emit(SiloEvent::LegacyPositionMigrated {
            account: *account,
            asset: *asset,
            legacy_epoch,
            index,
            quantity: position.quantity,
            value: position.value,
            epoch: state.epoch,
        });
        migrated.push(index);
    }

    Ok(migrated)
}
