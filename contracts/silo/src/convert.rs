//! Conversion Engine
//!
//! Retires positions of one asset and creates a single position of another.
//! The new position keeps the removed value at least, and is stamped at an
//! index below the target tip so that what it has "already grown" equals the
//! reward the removed positions had grown. Only whole index steps can be
//! carried; the remainder is forfeited and reported.

use log::debug;
use serde::{Deserialize, Serialize};
use silo_common::{
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    math::{index_for_grown, safe_add, safe_mul, safe_sub},
    types::{AccrualIndex, Address, AssetId},
};

use crate::accrual;
use crate::deposit_store::{add_position_at, remove_multiple, stalk_of_removed};
use crate::state::SiloState;

/// What to convert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub account: Address,
    pub from_asset: AssetId,
    pub to_asset: AssetId,
    /// Indices of the positions to retire
    pub indices: Vec<AccrualIndex>,
    /// Quantity to retire from each position
    pub amounts: Vec<u128>,
    /// Quantity of `to_asset` the conversion produced
    pub to_quantity: u128,
}

/// Result of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertReceipt {
    pub index: AccrualIndex,
    pub quantity: u128,
    pub value: u128,
    pub removed_quantity: u128,
    pub removed_value: u128,
    pub carried_reward: u128,
    pub forfeited_reward: u128,
    pub stalk_removed: u128,
    pub stalk_added: u128,
}

/// Convert positions of `from_asset` into one position of `to_asset`.
///
/// `value_of` prices `to_quantity` in the target asset.
pub fn convert<V>(
    state: &mut SiloState,
    request: &ConvertRequest,
    value_of: V,
    log: &mut EventLog,
) -> SiloResult<ConvertReceipt>
where
    V: FnOnce(u128) -> SiloResult<u128>,
{
    let ConvertRequest {
        account,
        from_asset,
        to_asset,
        indices,
        amounts,
        to_quantity,
    } = request;

    if indices.len() != amounts.len() {
        return Err(SiloError::LengthMismatch {
            indices: indices.len(),
            amounts: amounts.len(),
        });
    }
    if !state.asset(to_asset)?.deposits_enabled {
        return Err(SiloError::DepositsDisabled { asset: *to_asset });
    }

    // 1. Realize both sides
    accrual::mow(state, account, from_asset, log)?;
    if to_asset != from_asset {
        accrual::mow(state, account, to_asset, log)?;
    }

    // 2. Retire the source positions
    let requested = amounts.iter().try_fold(0u128, |sum, &a| safe_add(sum, a))?;
    let removed = remove_multiple(state, account, from_asset, indices, amounts, log)?;
    if removed.total_quantity != requested {
        return Err(SiloError::InsufficientRemoved {
            requested,
            removed: removed.total_quantity,
        });
    }
    let (stalk_removed, grown) = stalk_of_removed(state, from_asset, indices, &removed)?;
    accrual::debit_value(state, account, from_asset, removed.total_value)?;
    accrual::burn_stalk(state, account, stalk_removed, log)?;

    // 3. Value the new quantity, never below what was removed
    let recomputed = value_of(*to_quantity)?;
    let value = recomputed.max(removed.total_value);
    if *to_quantity == 0 || value == 0 {
        return Err(SiloError::ZeroValueConversion {
            asset: *to_asset,
            quantity: *to_quantity,
            value,
        });
    }

    // 4. Stamp the new position so its grown reward matches the carried one
    let target = state.asset(to_asset)?;
    let (index, carried) = index_for_grown(target.accrual_index, grown, value)?;
    let forfeited = safe_sub(grown, carried)?;
    let stalk_added = safe_add(safe_mul(value, target.stalk_per_value)?, carried)?;

    add_position_at(state, account, to_asset, index, value, *to_quantity, log)?;
    accrual::credit_value(state, account, to_asset, value)?;
    accrual::mint_stalk(state, account, stalk_added, log)?;

    if forfeited > 0 {
        debug!("conversion forfeited {forfeited} grown stalk to rounding");
    }
    log.emit(SiloEvent::Converted {
        account: *account,
        from_asset: *from_asset,
        to_asset: *to_asset,
        removed_quantity: removed.total_quantity,
        removed_value: removed.total_value,
        new_index: index,
        new_quantity: *to_quantity,
        new_value: value,
        carried_reward: carried,
        forfeited_reward: forfeited,
        epoch: state.epoch,
    });

    Ok(ConvertReceipt {
        index,
        quantity: *to_quantity,
        value,
        removed_quantity: removed.total_quantity,
        removed_value: removed.total_value,
        carried_reward: carried,
        forfeited_reward: forfeited,
        stalk_removed,
        stalk_added,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit_store::{deposit, position_of};
    use silo_common::types::{AssetConfig, AssetSettings, SiloConfig};

    const FROM: AssetId = [3u8; 32];
    const TO: AssetId = [4u8; 32];
    const ALICE: Address = [10u8; 32];

    fn state() -> SiloState {
        let mut state = SiloState::genesis(SiloConfig {
            genesis_epoch: 1,
            migration_epoch: 1,
            base_asset: [1u8; 32],
            flood_asset: [2u8; 32],
        })
        .unwrap();
        state.assets.insert(FROM, AssetSettings::new(AssetConfig::new(2, 4), 1));
        state.assets.insert(TO, AssetSettings::new(AssetConfig::new(4, 1), 1));
        state
    }

    fn request(amounts: Vec<u128>, to_quantity: u128) -> ConvertRequest {
        ConvertRequest {
            account: ALICE,
            from_asset: FROM,
            to_asset: TO,
            indices: vec![0; amounts.len()],
            amounts,
            to_quantity,
        }
    }

    fn grown_state() -> SiloState {
        let mut state = state();
        let mut log = EventLog::new();
        deposit(&mut state, &ALICE, &FROM, 100, 50, &mut log).unwrap();
        state.epoch = 6;
        state.asset_mut(&FROM).unwrap().accrual_index = 20;
        state.asset_mut(&TO).unwrap().accrual_index = 5;
        state
    }

    #[test]
    fn test_convert_carries_grown_reward() {
        let mut state = grown_state();
        let mut log = EventLog::new();

        // grown: 20 * 50 = 1000, new value 80 -> 12 whole steps, 40 forfeited
        let receipt = convert(&mut state, &request(vec![100], 10), |_| Ok(80), &mut log).unwrap();
        assert_eq!(receipt.value, 80);
        assert_eq!(receipt.index, 5 - 12);
        assert_eq!(receipt.carried_reward, 960);
        assert_eq!(receipt.forfeited_reward, 40);
        assert_eq!(receipt.stalk_added, 80 * 4 + 960);

        let alice = state.account(&ALICE).unwrap();
        assert_eq!(alice.stalk, receipt.stalk_added);
        assert_eq!(alice.stalk, state.totals.stalk);
        assert!(position_of(&state, &ALICE, &FROM, 0).is_none());
        assert_eq!(position_of(&state, &ALICE, &TO, -7).unwrap().value, 80);
    }

    #[test]
    fn test_convert_never_lowers_value() {
        let mut state = grown_state();
        let mut log = EventLog::new();
        let receipt = convert(&mut state, &request(vec![40], 3), |_| Ok(1), &mut log).unwrap();
        assert_eq!(receipt.removed_value, 20);
        assert_eq!(receipt.value, 20);
    }

    #[test]
    fn test_convert_failures() {
        let mut state = grown_state();
        let mut log = EventLog::new();

        let mut mismatched = request(vec![10], 1);
        mismatched.indices.push(0);
        assert!(matches!(
            convert(&mut state, &mismatched, |_| Ok(1), &mut log),
            Err(SiloError::LengthMismatch { .. })
        ));

        assert!(matches!(
            convert(&mut state, &request(vec![10], 0), |_| Ok(1), &mut log),
            Err(SiloError::ZeroValueConversion { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_convert_into_disabled_asset_rejected() {
        let mut state = grown_state();
        let mut log = EventLog::new();
        state.asset_mut(&TO).unwrap().deposits_enabled = false;
        let before = state.clone();

        assert_eq!(
            convert(&mut state, &request(vec![100], 10), |_| Ok(80), &mut log),
            Err(SiloError::DepositsDisabled { asset: TO })
        );
        assert_eq!(state, before);

        // converting out of a disabled asset stays open
        let mut state = grown_state();
        state.asset_mut(&FROM).unwrap().deposits_enabled = false;
        assert!(convert(&mut state, &request(vec![100], 10), |_| Ok(80), &mut log).is_ok());
    }
}
