//! Epoch Clock
//!
//! The epoch source reports each new epoch. Advancing grows every asset's
//! accrual index by `rate * elapsed`, feeds earned reward into the pool and
//! drives the flood state machine. Reporting an epoch that is not newer than
//! the current one changes nothing.

use log::trace;
use silo_common::{
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    types::EpochReport,
};

use crate::accrual;
use crate::flood;
use crate::state::SiloState;

/// Apply an epoch report. Returns false if the epoch was already reached.
pub fn advance_epoch(
    state: &mut SiloState,
    report: &EpochReport,
    log: &mut EventLog,
) -> SiloResult<bool> {
    if report.epoch <= state.epoch {
        trace!("epoch {} already reached", report.epoch);
        return Ok(false);
    }

    let elapsed = i128::from(report.epoch - state.epoch);
    for settings in state.assets.values_mut() {
        let growth = settings
            .accrual_rate
            .checked_mul(elapsed)
            .ok_or(SiloError::Overflow)?;
        settings.accrual_index = settings
            .accrual_index
            .checked_add(growth)
            .ok_or(SiloError::Overflow)?;
    }

    let previous = state.epoch;
    state.epoch = report.epoch;
    log.emit(SiloEvent::EpochAdvanced {
        previous,
        epoch: report.epoch,
    });

    accrual::receive_earned_reward(state, report.earned_reward, log)?;

    match (report.flooding, state.flood.active) {
        (true, None) => flood::begin(state, log)?,
        (false, Some(_)) => flood::end(state, log)?,
        _ => {}
    }
    if report.flood_payout > 0 {
        flood::pay(state, report.flood_payout, log)?;
    }

    Ok(true)
}
