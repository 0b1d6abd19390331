//! Balance Accrual Engine
//!
//! Stalk grows lazily. Each account keeps, per asset, the accrual index it
//! was last realized through and the total value it holds; mowing credits
//! `(tip - last_index) * value` and moves the checkpoint to the tip. This
//! equals summing `(tip - index) * value` over the account's positions since
//! every position stored at or below the checkpoint was already realized up
//! to it.
//!
//! Mowing also runs the once-per-epoch account update, which settles flood
//! payouts before any roots change.
//!
//! ## Roots
//!
//! Roots are minted in proportion to the silo's root/stalk ratio, so a late
//! depositor buys roots at the current ratio instead of diluting earlier
//! holders. Earned reward adds stalk without adding roots, which is what lets
//! an account's roots claim a share of it later through `plant`.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use silo_common::{
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    math::{grown_reward, mul_div, roots_for_burn, roots_for_mint, safe_add, safe_mul, safe_sub},
    types::{AccrualIndex, Address, AssetId},
};

use crate::deposit_store;
use crate::flood;
use crate::state::SiloState;

/// Result of planting earned reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlantReceipt {
    /// Base-asset quantity (== value) of the new position
    pub quantity: u128,
    /// Index the position was stamped at
    pub index: AccrualIndex,
    /// Stalk credited for the new position
    pub stalk: u128,
}

// ============ Realization ============

/// Realize everything pending for `account` in `asset`. Returns the grown
/// stalk credited.
pub fn mow(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    log: &mut EventLog,
) -> SiloResult<u128> {
    update_account(state, account)?;
    mow_grown(state, account, asset, log)
}

/// Once-per-epoch account update: settle flood payouts and stamp the epoch.
pub fn update_account(state: &mut SiloState, account: &Address) -> SiloResult<()> {
    let epoch = state.epoch;
    if state.account_mut(account).last_update >= epoch {
        return Ok(());
    }

    flood::settle(state, account)?;
    state.account_mut(account).last_update = epoch;
    trace!("account updated at epoch {epoch}");
    Ok(())
}

fn mow_grown(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    log: &mut EventLog,
) -> SiloResult<u128> {
    let tip = state.accrual_index(asset)?;
    let status = state
        .account_mut(account)
        .mow_status
        .entry(*asset)
        .or_default();
    if status.last_index == tip {
        return Ok(0);
    }

    let grown = grown_reward(tip, status.last_index, status.value)?;
    status.last_index = tip;

    if grown > 0 {
        mint_stalk(state, account, grown, log)?;
        debug!("mowed {grown} grown stalk");
    }
    Ok(grown)
}

/// Fails if `account` has pending reward in `asset`. Every position mutation
/// checks this first.
pub fn ensure_current(state: &SiloState, account: &Address, asset: &AssetId) -> SiloResult<()> {
    let tip = state.accrual_index(asset)?;
    let realized = state
        .account(account)
        .filter(|a| a.last_update >= state.epoch)
        .and_then(|a| a.mow_status.get(asset))
        .map(|s| s.last_index);

    match realized {
        Some(index) if index == tip => Ok(()),
        other => Err(SiloError::StaleAccrual {
            account: *account,
            asset: *asset,
            realized_index: other.unwrap_or(AccrualIndex::MIN),
            current_index: tip,
        }),
    }
}

/// Stalk `account` could mow in `asset` right now
pub fn balance_of_grown(state: &SiloState, account: &Address, asset: &AssetId) -> SiloResult<u128> {
    let tip = state.accrual_index(asset)?;
    match state.account(account).and_then(|a| a.mow_status.get(asset)) {
        Some(status) => grown_reward(tip, status.last_index, status.value),
        None => Ok(0),
    }
}

// ============ Value Tracking ============

/// Record value added to `account`'s holdings in `asset`
pub fn credit_value(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    value: u128,
) -> SiloResult<()> {
    let status = state
        .account_mut(account)
        .mow_status
        .entry(*asset)
        .or_default();
    status.value = safe_add(status.value, value)?;
    Ok(())
}

/// Record value removed from `account`'s holdings in `asset`
pub fn debit_value(
    state: &mut SiloState,
    account: &Address,
    asset: &AssetId,
    value: u128,
) -> SiloResult<()> {
    let status = state
        .account_mut(account)
        .mow_status
        .entry(*asset)
        .or_default();
    status.value = safe_sub(status.value, value)?;
    Ok(())
}

// ============ Stalk and Roots ============

fn emit_stalk_changed(
    state: &SiloState,
    account: &Address,
    stalk_delta: i128,
    roots_delta: i128,
    log: &mut EventLog,
) {
    let (stalk, roots) = state
        .account(account)
        .map(|a| (a.stalk, a.roots))
        .unwrap_or_default();
    log.emit(SiloEvent::StalkChanged {
        account: *account,
        stalk_delta,
        roots_delta,
        stalk,
        roots,
        epoch: state.epoch,
    });
}

fn signed(amount: u128) -> SiloResult<i128> {
    i128::try_from(amount).map_err(|_| SiloError::Overflow)
}

/// Mint stalk and the matching roots. Returns roots minted.
pub fn mint_stalk(
    state: &mut SiloState,
    account: &Address,
    stalk: u128,
    log: &mut EventLog,
) -> SiloResult<u128> {
    if stalk == 0 {
        return Ok(0);
    }
    let roots = roots_for_mint(state.totals.roots, state.totals.stalk, stalk)?;

    state.totals.stalk = safe_add(state.totals.stalk, stalk)?;
    state.totals.roots = safe_add(state.totals.roots, roots)?;
    let acct = state.account_mut(account);
    acct.stalk = safe_add(acct.stalk, stalk)?;
    acct.roots = safe_add(acct.roots, roots)?;

    emit_stalk_changed(state, account, signed(stalk)?, signed(roots)?, log);
    Ok(roots)
}

/// Burn stalk and the matching roots. Returns roots burned.
pub fn burn_stalk(
    state: &mut SiloState,
    account: &Address,
    stalk: u128,
    log: &mut EventLog,
) -> SiloResult<u128> {
    if stalk == 0 {
        return Ok(0);
    }
    let account_roots = state.account(account).map(|a| a.roots).unwrap_or(0);
    let roots = roots_for_burn(state.totals.roots, state.totals.stalk, stalk, account_roots)?;

    state.totals.stalk = safe_sub(state.totals.stalk, stalk)?;
    state.totals.roots = safe_sub(state.totals.roots, roots)?;
    let acct = state.account_mut(account);
    acct.stalk = safe_sub(acct.stalk, stalk)?;
    acct.roots = safe_sub(acct.roots, roots)?;

    emit_stalk_changed(state, account, -signed(stalk)?, -signed(roots)?, log);
    Ok(roots)
}

/// Move stalk and its roots between accounts. Totals are unchanged.
pub fn transfer_stalk(
    state: &mut SiloState,
    from: &Address,
    to: &Address,
    stalk: u128,
    log: &mut EventLog,
) -> SiloResult<u128> {
    if stalk == 0 {
        return Ok(0);
    }
    let from_roots = state.account(from).map(|a| a.roots).unwrap_or(0);
    let roots = roots_for_burn(state.totals.roots, state.totals.stalk, stalk, from_roots)?;

    let sender = state.account_mut(from);
    sender.stalk = safe_sub(sender.stalk, stalk)?;
    sender.roots = safe_sub(sender.roots, roots)?;
    emit_stalk_changed(state, from, -signed(stalk)?, -signed(roots)?, log);

    let recipient = state.account_mut(to);
    recipient.stalk = safe_add(recipient.stalk, stalk)?;
    recipient.roots = safe_add(recipient.roots, roots)?;
    emit_stalk_changed(state, to, signed(stalk)?, signed(roots)?, log);

    Ok(roots)
}

// ============ Earned Reward ============

/// Add base-asset reward to the earned pool. The matching stalk joins the
/// silo total without roots; root holders claim it by planting.
pub fn receive_earned_reward(
    state: &mut SiloState,
    quantity: u128,
    log: &mut EventLog,
) -> SiloResult<()> {
    if quantity == 0 {
        return Ok(());
    }
    let base = state.config.base_asset;
    let stalk_per_value = state.asset(&base)?.stalk_per_value;
    if state.totals.roots == 0 {
        warn!("earned reward of {quantity} received with no roots outstanding");
    }

    state.totals.earned_pool = safe_add(state.totals.earned_pool, quantity)?;
    state.totals.stalk = safe_add(state.totals.stalk, safe_mul(quantity, stalk_per_value)?)?;

    log.emit(SiloEvent::EarnedRewardReceived {
        amount: quantity,
        pool: state.totals.earned_pool,
        epoch: state.epoch,
    });
    Ok(())
}

/// Base-asset quantity `account` would plant right now
pub fn balance_of_earned(state: &SiloState, account: &Address) -> SiloResult<u128> {
    let Some(acct) = state.account(account) else {
        return Ok(0);
    };
    if acct.roots == 0 || state.totals.roots == 0 {
        return Ok(0);
    }

    let stalk_from_roots = mul_div(state.totals.stalk, acct.roots, state.totals.roots)?;
    let earned_stalk = stalk_from_roots.saturating_sub(acct.stalk);
    let stalk_per_value = state.asset(&state.config.base_asset)?.stalk_per_value;
    Ok((earned_stalk / stalk_per_value).min(state.totals.earned_pool))
}

/// Realize-earned: claim the account's share of the earned pool as a new
/// base-asset position stamped at the current index.
///
/// Returns an empty receipt when the share is zero.
pub fn plant(state: &mut SiloState, account: &Address, log: &mut EventLog) -> SiloResult<PlantReceipt> {
    let base = state.config.base_asset;

    // 1. Catch up on the base asset first
    mow(state, account, &base, log)?;

    // 2. Share of the pool, in base-asset units
    let quantity = balance_of_earned(state, account)?;
    let tip = state.accrual_index(&base)?;
    if quantity == 0 {
        trace!("nothing to plant");
        return Ok(PlantReceipt {
            index: tip,
            ..PlantReceipt::default()
        });
    }

    // 3. Base asset has unit value
    let stalk = safe_mul(quantity, state.asset(&base)?.stalk_per_value)?;
    state.totals.earned_pool = safe_sub(state.totals.earned_pool, quantity)?;
    let index = deposit_store::add_position(state, account, &base, quantity, quantity, log)?;
    credit_value(state, account, &base, quantity)?;

    // 4. The stalk already counts in the total; only the account gains it
    let acct = state.account_mut(account);
    acct.stalk = safe_add(acct.stalk, stalk)?;
    emit_stalk_changed(state, account, signed(stalk)?, 0, log);

    log.emit(SiloEvent::Planted {
        account: *account,
        index,
        quantity,
        stalk,
        epoch: state.epoch,
    });
    debug!("planted {quantity} at index {index}");

    Ok(PlantReceipt {
        quantity,
        index,
        stalk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_common::constants::roots::ROOTS_BASE;
    use silo_common::types::{AssetConfig, AssetSettings, SiloConfig};

    const BASE: AssetId = [1u8; 32];
    const ALICE: Address = [10u8; 32];
    const BOB: Address = [11u8; 32];

    fn state() -> SiloState {
        let mut state = SiloState::genesis(SiloConfig {
            genesis_epoch: 1,
            migration_epoch: 1,
            base_asset: BASE,
            flood_asset: [2u8; 32],
        })
        .unwrap();
        state
            .assets
            .insert(BASE, AssetSettings::new(AssetConfig::new(1, 1), 1));
        state
    }

    #[test]
    fn test_first_mint_uses_roots_base() {
        let mut state = state();
        let mut log = EventLog::new();
        let roots = mint_stalk(&mut state, &ALICE, 100, &mut log).unwrap();
        assert_eq!(roots, 100 * ROOTS_BASE);

        // same ratio for the second holder
        let roots = mint_stalk(&mut state, &BOB, 50, &mut log).unwrap();
        assert_eq!(roots, 50 * ROOTS_BASE);
        assert_eq!(state.totals.stalk, 150);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_burn_never_leaves_dust_roots() {
        let mut state = state();
        let mut log = EventLog::new();
        mint_stalk(&mut state, &ALICE, 3, &mut log).unwrap();
        mint_stalk(&mut state, &BOB, 3, &mut log).unwrap();

        for _ in 0..3 {
            burn_stalk(&mut state, &ALICE, 1, &mut log).unwrap();
        }
        let alice = state.account(&ALICE).unwrap();
        assert_eq!(alice.stalk, 0);
        assert_eq!(alice.roots, 0);
        assert_eq!(state.totals.roots, state.account(&BOB).unwrap().roots);
    }

    #[test]
    fn test_mow_is_idempotent_within_epoch() {
        let mut state = state();
        let mut log = EventLog::new();
        mow(&mut state, &ALICE, &BASE, &mut log).unwrap();
        credit_value(&mut state, &ALICE, &BASE, 10).unwrap();

        state.epoch = 4;
        state.asset_mut(&BASE).unwrap().accrual_index = 3;

        assert_eq!(mow(&mut state, &ALICE, &BASE, &mut log).unwrap(), 30);
        let after_first = state.account(&ALICE).cloned();
        assert_eq!(mow(&mut state, &ALICE, &BASE, &mut log).unwrap(), 0);
        assert_eq!(state.account(&ALICE).cloned(), after_first);
        assert!(ensure_current(&state, &ALICE, &BASE).is_ok());
    }

    #[test]
    fn test_stale_account_is_rejected() {
        let mut state = state();
        let mut log = EventLog::new();
        mow(&mut state, &ALICE, &BASE, &mut log).unwrap();
        state.asset_mut(&BASE).unwrap().accrual_index = 5;

        assert!(matches!(
            ensure_current(&state, &ALICE, &BASE),
            Err(SiloError::StaleAccrual {
                realized_index: 0,
                current_index: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_plant_claims_root_share_of_pool() {
        let mut state = state();
        let mut log = EventLog::new();
        mow(&mut state, &ALICE, &BASE, &mut log).unwrap();
        mow(&mut state, &BOB, &BASE, &mut log).unwrap();
        mint_stalk(&mut state, &ALICE, 300, &mut log).unwrap();
        mint_stalk(&mut state, &BOB, 100, &mut log).unwrap();

        receive_earned_reward(&mut state, 40, &mut log).unwrap();
        assert_eq!(balance_of_earned(&state, &ALICE).unwrap(), 30);
        assert_eq!(balance_of_earned(&state, &BOB).unwrap(), 10);

        let receipt = plant(&mut state, &ALICE, &mut log).unwrap();
        assert_eq!(receipt.quantity, 30);
        assert_eq!(state.totals.earned_pool, 10);
        assert_eq!(state.account(&ALICE).unwrap().stalk, 330);
        assert_eq!(state.positions_of(&ALICE, &BASE).len(), 1);

        // planting again yields nothing
        assert_eq!(plant(&mut state, &ALICE, &mut log).unwrap().quantity, 0);
        assert_eq!(balance_of_earned(&state, &BOB).unwrap(), 10);
    }
}
