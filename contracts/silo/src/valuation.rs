//! External Collaborators
//!
//! The ledger does not price assets and does not move tokens. Both are
//! capabilities handed to it: a [`Valuation`] chosen per asset at whitelist
//! time, and an [`AssetTransfer`] supplied by the caller of any operation
//! that pays out.

use silo_common::{
    errors::{SiloError, SiloResult},
    math::mul_div,
    types::{Address, AssetId},
};

/// Values a quantity of one asset in the common denomination
pub trait Valuation {
    /// Value of `quantity` units
    fn value_of(&self, quantity: u128) -> SiloResult<u128>;
}

/// One unit of the asset is worth one unit of value (the base asset)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitValuation;

impl Valuation for UnitValuation {
    fn value_of(&self, quantity: u128) -> SiloResult<u128> {
        Ok(quantity)
    }
}

/// Fixed exchange ratio, rounded down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioValuation {
    pub numerator: u128,
    pub denominator: u128,
}

impl RatioValuation {
    pub fn new(numerator: u128, denominator: u128) -> SiloResult<Self> {
        if denominator == 0 {
            return Err(SiloError::DivisionByZero);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

impl Valuation for RatioValuation {
    fn value_of(&self, quantity: u128) -> SiloResult<u128> {
        mul_div(quantity, self.numerator, self.denominator)
    }
}

impl<F> Valuation for F
where
    F: Fn(u128) -> SiloResult<u128>,
{
    fn value_of(&self, quantity: u128) -> SiloResult<u128> {
        self(quantity)
    }
}

/// Moves held tokens out of the silo
pub trait AssetTransfer {
    /// Returns false if the transfer did not happen
    fn transfer(&mut self, asset: &AssetId, to: &Address, quantity: u128) -> bool;
}

impl<F> AssetTransfer for F
where
    F: FnMut(&AssetId, &Address, u128) -> bool,
{
    fn transfer(&mut self, asset: &AssetId, to: &Address, quantity: u128) -> bool {
        self(asset, to, quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_valuation_rounds_down() {
        let half = RatioValuation::new(1, 2).unwrap();
        assert_eq!(half.value_of(7).unwrap(), 3);
        assert_eq!(UnitValuation.value_of(7).unwrap(), 7);
        assert_eq!(RatioValuation::new(1, 0), Err(SiloError::DivisionByZero));
    }

    #[test]
    fn test_closures_are_capabilities() {
        let triple = |quantity: u128| -> SiloResult<u128> { Ok(quantity * 3) };
        assert_eq!(triple.value_of(5).unwrap(), 15);

        let mut sent = Vec::new();
        let mut transfer = |asset: &AssetId, _to: &Address, quantity: u128| {
            sent.push((*asset, quantity));
            true
        };
        assert!(transfer.transfer(&[1u8; 32], &[2u8; 32], 9));
        assert_eq!(sent, vec![([1u8; 32], 9)]);
    }
}
