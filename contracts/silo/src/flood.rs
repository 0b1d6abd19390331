//! Flood Distributor
//!
//! While a flood is active the epoch source reports payouts of the flood
//! asset. Each payout raises a cumulative payout-per-root index by
//! `payout * FLOOD_PRECISION / roots_at_flood_start`. Every flood keeps a
//! record of the index when it began and after its latest payout, so an
//! account settling late is paid for every flood it missed:
//!
//! - on roots it held before the flood, up to the flood's start index
//! - on the roots snapshot locked at flood start, from start to end index
//!
//! Roots minted or burned while a flood is active never change what the
//! account earns from that flood.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use silo_common::{
    constants::precision::FLOOD_PRECISION,
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    math::{mul_div, mul_div_ceil, safe_add, safe_sub},
    types::{AccountFlood, Address, Epoch, FloodRecord, FloodState},
};

use crate::accrual;
use crate::state::SiloState;

/// Read-only view of flood bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FloodStatus {
    /// Start epoch of the active flood
    pub active: Option<Epoch>,
    /// Roots locked for the active flood
    pub locked_roots: u128,
    /// Cumulative payout per root
    pub payout_per_root: u128,
    /// Paid in across all floods
    pub total_paid: u128,
    /// Paid in but not yet claimable by anyone
    pub unallocated: u128,
    /// Claimed out across all floods
    pub total_claimed: u128,
}

fn owed(index: u128, checkpoint: u128, roots: u128) -> SiloResult<u128> {
    mul_div(safe_sub(index, checkpoint)?, roots, FLOOD_PRECISION)
}

fn record(flood: &FloodState, start: Epoch) -> SiloResult<&FloodRecord> {
    flood.records.get(&start).ok_or(SiloError::InvalidConfig {
        reason: "flood record missing",
    })
}

/// Account flood bookkeeping after settling against `flood`
fn settled(flood: &FloodState, roots: u128, mut account: AccountFlood) -> SiloResult<AccountFlood> {
    // a flood the account was snapshotted into has ended
    if let Some(start) = account.tracked_flood {
        if flood.active != Some(start) {
            let ended = record(flood, start)?;
            let payout = owed(ended.end_index, account.checkpoint, account.roots_snapshot)?;
            account.claimable = safe_add(account.claimable, payout)?;
            account.checkpoint = ended.end_index;
            account.tracked_flood = None;
            account.roots_snapshot = 0;
        }
    }

    match flood.active {
        Some(start) => {
            if account.tracked_flood.is_none() {
                let current = record(flood, start)?;
                let payout = owed(current.start_index, account.checkpoint, roots)?;
                account.claimable = safe_add(account.claimable, payout)?;
                account.checkpoint = current.start_index;
                account.tracked_flood = Some(start);
                account.roots_snapshot = roots;
            }
            let payout = owed(flood.payout_per_root, account.checkpoint, account.roots_snapshot)?;
            account.claimable = safe_add(account.claimable, payout)?;
        }
        None => {
            let payout = owed(flood.payout_per_root, account.checkpoint, roots)?;
            account.claimable = safe_add(account.claimable, payout)?;
        }
    }
    account.checkpoint = flood.payout_per_root;
    Ok(account)
}

/// Settle flood payouts owed to `account` into its claimable balance.
/// Runs before the account's roots change in a new epoch.
pub fn settle(state: &mut SiloState, account: &Address) -> SiloResult<()> {
    let acct = state.account_mut(account);
    let roots = acct.roots;
    let current = acct.flood;
    let next = settled(&state.flood, roots, current)?;
    state.account_mut(account).flood = next;
    Ok(())
}

/// Claimable payout of `account`, including what settling would add
pub fn balance_of_payout(state: &SiloState, account: &Address) -> SiloResult<u128> {
    let Some(acct) = state.account(account) else {
        return Ok(0);
    };
    if acct.last_update >= state.epoch {
        return Ok(acct.flood.claimable);
    }
    Ok(settled(&state.flood, acct.roots, acct.flood)?.claimable)
}

/// Begin a flood, locking total roots
pub fn begin(state: &mut SiloState, log: &mut EventLog) -> SiloResult<()> {
    let epoch = state.epoch;
    let roots = state.totals.roots;
    let index = state.flood.payout_per_root;
    state.flood.records.insert(
        epoch,
        FloodRecord {
            start_index: index,
            end_index: index,
            roots,
            paid: 0,
            ended_at: None,
        },
    );
    state.flood.active = Some(epoch);

    debug!("flood started at epoch {epoch} over {roots} roots");
    log.emit(SiloEvent::FloodStarted { roots, epoch });
    Ok(())
}

/// Distribute `amount` of the flood asset over the roots locked for the
/// active flood, together with whatever earlier payouts left unallocated.
///
/// The index only advances by whole steps. The part of the payout those
/// steps cannot cover stays in `unallocated`, so the sum of all claims never
/// exceeds what was paid in.
pub fn pay(state: &mut SiloState, amount: u128, log: &mut EventLog) -> SiloResult<()> {
    let epoch = state.epoch;
    let Some(start) = state.flood.active else {
        return Err(SiloError::FloodNotActive { epoch });
    };
    let locked_roots = record(&state.flood, start)?.roots;
    let available = safe_add(state.flood.unallocated, amount)?;
    state.flood.total_paid = safe_add(state.flood.total_paid, amount)?;

    if locked_roots == 0 {
        warn!("flood payout of {amount} with no roots locked, held for the next payout");
        state.flood.unallocated = available;
        return Ok(());
    }

    let per_root = mul_div(available, FLOOD_PRECISION, locked_roots)?;
    let allocated = mul_div_ceil(per_root, locked_roots, FLOOD_PRECISION)?;
    state.flood.unallocated = safe_sub(available, allocated)?;
    let index = safe_add(state.flood.payout_per_root, per_root)?;
    state.flood.payout_per_root = index;
    if let Some(current) = state.flood.records.get_mut(&start) {
        current.end_index = index;
        current.paid = safe_add(current.paid, amount)?;
    }

    if state.flood.unallocated > 0 {
        debug!("flood payout left {} unallocated", state.flood.unallocated);
    }
    log.emit(SiloEvent::FloodPaid {
        flood_start: start,
        amount,
        payout_per_root: index,
        epoch,
    });
    Ok(())
}

/// End the active flood
pub fn end(state: &mut SiloState, log: &mut EventLog) -> SiloResult<()> {
    let epoch = state.epoch;
    let Some(start) = state.flood.active.take() else {
        return Ok(());
    };
    if let Some(ended) = state.flood.records.get_mut(&start) {
        ended.ended_at = Some(epoch);
    }

    debug!("flood from epoch {start} ended at epoch {epoch}");
    log.emit(SiloEvent::FloodEnded {
        flood_start: start,
        epoch,
    });
    Ok(())
}

/// Zero the claimable balance of `account` and return it. The caller moves
/// the flood asset.
pub fn claim(state: &mut SiloState, account: &Address, log: &mut EventLog) -> SiloResult<u128> {
    accrual::update_account(state, account)?;

    let acct = state.account_mut(account);
    let amount = acct.flood.claimable;
    if amount == 0 {
        return Err(SiloError::NothingToClaim { account: *account });
    }
    acct.flood.claimable = 0;
    state.flood.total_claimed = safe_add(state.flood.total_claimed, amount)?;

    log.emit(SiloEvent::FloodPayoutClaimed {
        account: *account,
        asset: state.config.flood_asset,
        amount,
        epoch: state.epoch,
    });
    Ok(amount)
}

/// Flood bookkeeping summary
pub fn status(state: &SiloState) -> FloodStatus {
    let flood = &state.flood;
    let locked_roots = flood
        .active
        .and_then(|start| flood.records.get(&start))
        .map(|r| r.roots)
        .unwrap_or(0);
    FloodStatus {
        active: flood.active,
        locked_roots,
        payout_per_root: flood.payout_per_root,
        total_paid: flood.total_paid,
        unallocated: flood.unallocated,
        total_claimed: flood.total_claimed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flood_with(active: Option<Epoch>, records: &[(Epoch, u128, u128)], index: u128) -> FloodState {
        let mut flood = FloodState {
            active,
            payout_per_root: index,
            ..FloodState::default()
        };
        for &(start, start_index, end_index) in records {
            flood.records.insert(
                start,
                FloodRecord {
                    start_index,
                    end_index,
                    roots: 1,
                    paid: 0,
                    ended_at: None,
                },
            );
        }
        flood
    }

    #[test]
    fn test_snapshot_locks_roots_for_active_flood() {
        let p = FLOOD_PRECISION;
        // flood began at index 0, paid 2 per root so far
        let flood = flood_with(Some(5), &[(5, 0, 2 * p)], 2 * p);

        let joined = settled(&flood, 100, AccountFlood::default()).unwrap();
        assert_eq!(joined.claimable, 200);
        assert_eq!(joined.roots_snapshot, 100);

        // ten times the roots later in the same flood: only the snapshot counts
        let flood = flood_with(Some(5), &[(5, 0, 3 * p)], 3 * p);
        let later = settled(&flood, 1_000, joined).unwrap();
        assert_eq!(later.claimable, 300);
    }

    #[test]
    fn test_missed_flood_paid_on_pre_flood_roots() {
        let p = FLOOD_PRECISION;
        // a whole flood from index p to 4p happened while the account slept
        let flood = flood_with(None, &[(8, p, 4 * p)], 4 * p);
        let account = AccountFlood {
            checkpoint: p,
            ..AccountFlood::default()
        };
        let caught_up = settled(&flood, 10, account).unwrap();
        assert_eq!(caught_up.claimable, 30);
        assert_eq!(caught_up.checkpoint, 4 * p);
        assert_eq!(caught_up.tracked_flood, None);
    }

    #[test]
    fn test_ended_flood_pays_snapshot_not_current_roots() {
        let p = FLOOD_PRECISION;
        let flood = flood_with(None, &[(3, 0, 5 * p)], 5 * p);
        let account = AccountFlood {
            tracked_flood: Some(3),
            roots_snapshot: 4,
            checkpoint: p,
            claimable: 4,
        };
        // roots grew to 40 mid-flood
        let done = settled(&flood, 40, account).unwrap();
        assert_eq!(done.claimable, 4 + 16);
        assert_eq!(done.roots_snapshot, 0);
    }

    fn live_state(roots: u128) -> SiloState {
        let mut state = SiloState::genesis(silo_common::types::SiloConfig {
            genesis_epoch: 5,
            migration_epoch: 5,
            base_asset: [1u8; 32],
            flood_asset: [2u8; 32],
        })
        .unwrap();
        state.totals.roots = roots;
        state
    }

    #[test]
    fn test_small_payout_over_large_roots_supply() {
        // a billion units of value at 1e4 stalk per value and 1e12 roots per stalk
        let roots = 10_000_000_000_000_000_000_000_000u128;
        let mut state = live_state(roots);
        let mut log = EventLog::new();

        begin(&mut state, &mut log).unwrap();
        pay(&mut state, 1_000_000, &mut log).unwrap();
        assert!(state.flood.payout_per_root > 0);
        assert_eq!(state.flood.unallocated, 0);

        let holder = settled(&state.flood, roots, AccountFlood::default()).unwrap();
        assert_eq!(holder.claimable, 1_000_000);

        // one root in ten thousand still earns its share
        let minor = settled(&state.flood, roots / 10_000, AccountFlood::default()).unwrap();
        assert_eq!(minor.claimable, 100);
    }

    #[test]
    fn test_payout_without_roots_carries_to_next_flood() {
        let mut state = live_state(0);
        let mut log = EventLog::new();

        begin(&mut state, &mut log).unwrap();
        pay(&mut state, 7, &mut log).unwrap();
        end(&mut state, &mut log).unwrap();
        assert_eq!(state.flood.payout_per_root, 0);
        assert_eq!(status(&state).unallocated, 7);

        state.epoch = 6;
        state.totals.roots = 10;
        begin(&mut state, &mut log).unwrap();
        pay(&mut state, 3, &mut log).unwrap();
        assert_eq!(state.flood.unallocated, 0);
        assert_eq!(state.flood.total_paid, 10);

        let holder = settled(&state.flood, 10, AccountFlood::default()).unwrap();
        assert_eq!(holder.claimable, 10);
    }
}
