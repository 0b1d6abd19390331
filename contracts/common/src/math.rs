//! Mathematical Utilities for the Silo Ledger
//!
//! Checked arithmetic and the accrual formulas. All rounding is toward the
//! protocol: values removed are floored, roots burned are ceiled.

use crate::constants::roots::ROOTS_BASE;
use crate::errors::{SiloError, SiloResult};
use crate::types::AccrualIndex;

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> SiloResult<u128> {
    a.checked_add(b).ok_or(SiloError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> SiloResult<u128> {
    a.checked_sub(b).ok_or(SiloError::Underflow)
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> SiloResult<u128> {
    a.checked_mul(b).ok_or(SiloError::Overflow)
}

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two u128 as `(high, low)`
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    let mid = (lo_lo >> 64) + (lo_hi & LOW_MASK) + (hi_lo & LOW_MASK);
    let low = (lo_lo & LOW_MASK) | (mid << 64);
    let high = hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (mid >> 64);
    (high, low)
}

/// `a * b / d` without intermediate overflow, as `(quotient, remainder)`
fn mul_div_rem(a: u128, b: u128, d: u128) -> SiloResult<(u128, u128)> {
    if d == 0 {
        return Err(SiloError::DivisionByZero);
    }
    let (high, low) = mul_wide(a, b);
    if high == 0 {
        return Ok((low / d, low % d));
    }
    // quotient must fit in 128 bits
    if high >= d {
        return Err(SiloError::Overflow);
    }

    let mut rem = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Ok((quotient, rem))
}

/// `a * b / d`, rounded down
pub fn mul_div(a: u128, b: u128, d: u128) -> SiloResult<u128> {
    Ok(mul_div_rem(a, b, d)?.0)
}

/// `a * b / d`, rounded up
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> SiloResult<u128> {
    let (quotient, rem) = mul_div_rem(a, b, d)?;
    if rem == 0 {
        Ok(quotient)
    } else {
        safe_add(quotient, 1)
    }
}

/// Signed delta between two unsigned balances, for event records
pub fn signed_delta(before: u128, after: u128) -> SiloResult<i128> {
    let before = i128::try_from(before).map_err(|_| SiloError::Overflow)?;
    let after = i128::try_from(after).map_err(|_| SiloError::Overflow)?;
    after.checked_sub(before).ok_or(SiloError::Overflow)
}

/// Value carried by `amount` out of a position of `quantity` worth `value`.
///
/// Truncates toward zero. Removing the whole quantity returns the whole value,
/// so a sequence of partial removals never sums above the original value.
pub fn proportional_value(value: u128, amount: u128, quantity: u128) -> SiloResult<u128> {
    if amount == quantity {
        return Ok(value);
    }
    mul_div(value, amount, quantity)
}

/// Reward grown by `value` between `index` and `tip`: `(tip - index) * value`
pub fn grown_reward(tip: AccrualIndex, index: AccrualIndex, value: u128) -> SiloResult<u128> {
    let delta = tip.checked_sub(index).ok_or(SiloError::Overflow)?;
    if delta < 0 {
        return Err(SiloError::Underflow);
    }
    safe_mul(delta as u128, value)
}

/// Index at which `value` has grown as much of `grown` as whole index steps allow.
///
/// Returns `(index, carried)` with `index = tip - floor(grown / value)` and
/// `carried = floor(grown / value) * value <= grown`. The remainder
/// `grown - carried` is forfeited.
pub fn index_for_grown(
    tip: AccrualIndex,
    grown: u128,
    value: u128,
) -> SiloResult<(AccrualIndex, u128)> {
    if value == 0 {
        return Err(SiloError::DivisionByZero);
    }
    let steps = grown / value;
    let carried = safe_mul(steps, value)?;
    let steps = i128::try_from(steps).map_err(|_| SiloError::Overflow)?;
    let index = tip.checked_sub(steps).ok_or(SiloError::Overflow)?;
    Ok((index, carried))
}

/// Roots minted for `stalk` given silo totals (rounded down)
pub fn roots_for_mint(total_roots: u128, total_stalk: u128, stalk: u128) -> SiloResult<u128> {
    if total_roots == 0 || total_stalk == 0 {
        return safe_mul(stalk, ROOTS_BASE);
    }
    mul_div(total_roots, stalk, total_stalk)
}

/// Roots removed with `stalk` (rounded up, capped at what the account holds)
pub fn roots_for_burn(
    total_roots: u128,
    total_stalk: u128,
    stalk: u128,
    account_roots: u128,
) -> SiloResult<u128> {
    if total_stalk == 0 {
        return Ok(account_roots);
    }
    Ok(mul_div_ceil(total_roots, stalk, total_stalk)?.min(account_roots))
}
