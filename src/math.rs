// 2.0: integer fixed-point arithmetic. every balance-bearing computation in the
// engine goes through these checked operations; overflow, underflow and division
// failures are surfaced as distinct MathError values, never wrapped or saturated.
//
// An Exp is an unsigned fraction with 18 decimal places of precision stored as a
// u128 mantissa: Exp { mantissa: 1_500_000_000_000_000_000 } means 1.5.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mantissa scale: 1.0 == 1e18.
pub const EXP_SCALE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MathError {
    #[error("integer overflow")]
    Overflow,
    #[error("integer underflow")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
}

/// 18-decimal fixed-point fraction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash,
)]
pub struct Exp {
    pub mantissa: u128,
}

impl Exp {
    pub const ZERO: Exp = Exp { mantissa: 0 };
    pub const ONE: Exp = Exp { mantissa: EXP_SCALE };

    pub fn from_mantissa(mantissa: u128) -> Self {
        Self { mantissa }
    }

    /// Lift a whole number into fixed-point.
    pub fn from_int(n: u128) -> Result<Self, MathError> {
        n.checked_mul(EXP_SCALE)
            .map(Self::from_mantissa)
            .ok_or(MathError::Overflow)
    }

    /// `num / den` as a fraction. Fails on zero denominator or if the result
    /// does not fit.
    pub fn from_ratio(num: u128, den: u128) -> Result<Self, MathError> {
        mul_div(num, EXP_SCALE, den).map(Self::from_mantissa)
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn add(self, other: Exp) -> Result<Exp, MathError> {
        self.mantissa
            .checked_add(other.mantissa)
            .map(Exp::from_mantissa)
            .ok_or(MathError::Overflow)
    }

    pub fn sub(self, other: Exp) -> Result<Exp, MathError> {
        self.mantissa
            .checked_sub(other.mantissa)
            .map(Exp::from_mantissa)
            .ok_or(MathError::Underflow)
    }

    /// Fraction × fraction, truncating toward zero. The intermediate product
    /// is double-width, so only results outside the mantissa range fail.
    pub fn mul(self, other: Exp) -> Result<Exp, MathError> {
        mul_div(self.mantissa, other.mantissa, EXP_SCALE).map(Exp::from_mantissa)
    }

    /// Fraction ÷ fraction.
    pub fn div(self, other: Exp) -> Result<Exp, MathError> {
        mul_div(self.mantissa, EXP_SCALE, other.mantissa).map(Exp::from_mantissa)
    }

    /// Fraction × whole number, result still a fraction.
    /// `rate.mul_scalar(elapsed_blocks)` is the simple-interest factor.
    pub fn mul_scalar(self, scalar: u128) -> Result<Exp, MathError> {
        self.mantissa
            .checked_mul(scalar)
            .map(Exp::from_mantissa)
            .ok_or(MathError::Overflow)
    }

    /// Fraction × whole number, truncated back to a whole number.
    pub fn mul_scalar_truncate(self, scalar: u128) -> Result<u128, MathError> {
        mul_div(self.mantissa, scalar, EXP_SCALE)
    }

    /// `self * scalar + addend`, truncated. The fused form keeps the failure
    /// site of the trailing addition attributable to the same computation.
    pub fn mul_scalar_truncate_add(self, scalar: u128, addend: u128) -> Result<u128, MathError> {
        let truncated = self.mul_scalar_truncate(scalar)?;
        truncated.checked_add(addend).ok_or(MathError::Overflow)
    }

    /// Drop the fractional part.
    pub fn truncate(self) -> u128 {
        self.mantissa / EXP_SCALE
    }
}

/// `scalar / divisor` where the divisor is a fraction, truncated to a whole
/// number. This is the share-count calculation: `amount / exchange_rate`.
pub fn div_scalar_by_exp(scalar: u128, divisor: Exp) -> Result<u128, MathError> {
    mul_div(scalar, EXP_SCALE, divisor.mantissa)
}

/// `a * b / denom` with a 256-bit intermediate product, so two full-width
/// operands can be combined as long as the quotient fits in a u128.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        return Ok(lo / denom);
    }
    // quotient fits iff the high word is below the divisor
    if hi >= denom {
        return Err(MathError::Overflow);
    }
    // restoring long division of the 256-bit product by the divisor
    let mut rem = hi;
    let mut quot: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry != 0 || rem >= denom {
            rem = rem.wrapping_sub(denom);
            quot |= 1;
        }
    }
    Ok(quot)
}

/// Full 128×128 -> 256-bit product, returned as (high, low) words.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1 << 64) - 1;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;
    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.mantissa / EXP_SCALE;
        let frac = self.mantissa % EXP_SCALE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_construction() {
        let half = Exp::from_ratio(1, 2).unwrap();
        assert_eq!(half.mantissa, EXP_SCALE / 2);
        assert_eq!(Exp::from_ratio(5, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_truncates_toward_zero() {
        let third = Exp::from_ratio(1, 3).unwrap();
        // 1/3 of 100 truncates to 33
        assert_eq!(third.mul_scalar_truncate(100).unwrap(), 33);
    }

    #[test]
    fn checked_ops_report_direction() {
        assert_eq!(
            Exp::from_mantissa(u128::MAX).add(Exp::ONE),
            Err(MathError::Overflow)
        );
        assert_eq!(Exp::ZERO.sub(Exp::ONE), Err(MathError::Underflow));
        assert_eq!(Exp::ONE.div(Exp::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn scalar_division_by_rate() {
        // 1000 units at exchange rate 2.0 -> 500 shares
        let rate = Exp::from_int(2).unwrap();
        assert_eq!(div_scalar_by_exp(1000, rate).unwrap(), 500);
        assert_eq!(div_scalar_by_exp(1000, Exp::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn fused_multiply_add() {
        let rate = Exp::from_ratio(1, 10).unwrap();
        // 0.1 * 50 + 7 = 12
        assert_eq!(rate.mul_scalar_truncate_add(50, 7).unwrap(), 12);
        assert_eq!(
            Exp::ONE.mul_scalar_truncate_add(1, u128::MAX),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn large_mantissa_products_fit() {
        // 2000 * 1500: both mantissas exceed sqrt(u128::MAX), only the
        // double-width intermediate makes this work
        let a = Exp::from_int(2_000).unwrap();
        let b = Exp::from_int(1_500).unwrap();
        assert_eq!(a.mul(b).unwrap(), Exp::from_int(3_000_000).unwrap());
        assert_eq!(a.div(b).unwrap(), Exp::from_ratio(4, 3).unwrap());
        // price 1000 of a 40_000 balance, the liquidity-sweep shape
        let price = Exp::from_int(1_000).unwrap();
        assert_eq!(price.mul_scalar_truncate(40_000).unwrap(), 40_000_000);
    }

    #[test]
    fn mul_div_fails_only_past_u128() {
        assert_eq!(mul_div(u128::MAX, 2, 2).unwrap(), u128::MAX);
        assert_eq!(mul_div(u128::MAX, 4, 8).unwrap(), u128::MAX / 2);
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(MathError::Overflow));
        assert_eq!(mul_div(1, 1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn display_trims_zeros() {
        assert_eq!(Exp::from_ratio(3, 2).unwrap().to_string(), "1.5");
        assert_eq!(Exp::from_int(4).unwrap().to_string(), "4");
    }
}
