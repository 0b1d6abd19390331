//! Asset registry: whitelisting and accrual-rate changes

use log::debug;
use silo_common::{
    constants::limits::MAX_ASSETS,
    errors::{SiloError, SiloResult},
    events::{EventLog, SiloEvent},
    types::{AssetConfig, AssetId, AssetSettings},
};

use crate::state::SiloState;

/// Register ledger state for a new asset. Its index starts at zero.
pub fn whitelist(
    state: &mut SiloState,
    asset: &AssetId,
    config: AssetConfig,
    log: &mut EventLog,
) -> SiloResult<()> {
    config.validate()?;
    if state.assets.contains_key(asset) {
        return Err(SiloError::AssetAlreadyWhitelisted { asset: *asset });
    }
    if state.assets.len() >= MAX_ASSETS {
        return Err(SiloError::InvalidConfig {
            reason: "asset limit reached",
        });
    }

    state
        .assets
        .insert(*asset, AssetSettings::new(config, state.epoch));
    log.emit(SiloEvent::AssetWhitelisted {
        asset: *asset,
        stalk_per_value: config.stalk_per_value,
        accrual_rate: config.accrual_rate,
        epoch: state.epoch,
    });
    Ok(())
}

/// Stop deposits and index growth. Existing positions can still be
/// withdrawn, converted out and transferred.
pub fn dewhitelist(state: &mut SiloState, asset: &AssetId, log: &mut EventLog) -> SiloResult<()> {
    let epoch = state.epoch;
    let settings = state.asset_mut(asset)?;
    settings.deposits_enabled = false;
    settings.accrual_rate = 0;

    debug!("asset dewhitelisted at epoch {epoch}");
    log.emit(SiloEvent::AssetDewhitelisted {
        asset: *asset,
        epoch,
    });
    Ok(())
}

/// Change the per-epoch index growth used by later epoch advances
pub fn set_accrual_rate(
    state: &mut SiloState,
    asset: &AssetId,
    rate: i128,
    log: &mut EventLog,
) -> SiloResult<()> {
    if rate < 0 {
        return Err(SiloError::InvalidConfig {
            reason: "accrual rate must not be negative",
        });
    }
    let epoch = state.epoch;
    let settings = state.asset_mut(asset)?;
    let old_rate = settings.accrual_rate;
    settings.accrual_rate = rate;

    log.emit(SiloEvent::AccrualRateChanged {
        asset: *asset,
        old_rate,
        new_rate: rate,
        epoch,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_common::types::SiloConfig;

    fn state() -> SiloState {
        SiloState::genesis(SiloConfig {
            genesis_epoch: 3,
            migration_epoch: 0,
            base_asset: [1u8; 32],
            flood_asset: [2u8; 32],
        })
        .unwrap()
    }

    #[test]
    fn test_whitelist_once() {
        let mut state = state();
        let mut log = EventLog::new();
        whitelist(&mut state, &[5u8; 32], AssetConfig::default(), &mut log).unwrap();
        assert_eq!(state.asset(&[5u8; 32]).unwrap().whitelisted_at, 3);
        assert_eq!(
            whitelist(&mut state, &[5u8; 32], AssetConfig::default(), &mut log),
            Err(SiloError::AssetAlreadyWhitelisted { asset: [5u8; 32] })
        );
    }

    #[test]
    fn test_dewhitelist_freezes_asset() {
        let mut state = state();
        let mut log = EventLog::new();
        whitelist(&mut state, &[5u8; 32], AssetConfig::default(), &mut log).unwrap();
        set_accrual_rate(&mut state, &[5u8; 32], 9, &mut log).unwrap();
        dewhitelist(&mut state, &[5u8; 32], &mut log).unwrap();

        let settings = state.asset(&[5u8; 32]).unwrap();
        assert!(!settings.deposits_enabled);
        assert_eq!(settings.accrual_rate, 0);
        assert!(set_accrual_rate(&mut state, &[5u8; 32], -1, &mut log).is_err());
    }
}
