// 4.0: interest-rate strategies. stateless curves from pool utilization to a
// per-block borrow rate, swappable per market behind the RateStrategy trait.
// every multiply/divide is checked; a broken curve surfaces a MathError rather
// than wrapping into a nonsense rate.

use crate::math::{Exp, MathError};
use serde::{Deserialize, Serialize};

/// Rate curves are parameterized per year and quoted per block.
pub const BLOCKS_PER_YEAR: u128 = 2_102_400;

/// Pool utilization: `borrows / (cash + borrows - reserves)`, zero when there
/// are no borrows. Reserves exceeding cash + borrows is an accounting fault
/// and reported as underflow.
pub fn utilization(cash: u128, borrows: u128, reserves: u128) -> Result<Exp, MathError> {
    if borrows == 0 {
        return Ok(Exp::ZERO);
    }
    let denom = cash
        .checked_add(borrows)
        .ok_or(MathError::Overflow)?
        .checked_sub(reserves)
        .ok_or(MathError::Underflow)?;
    Exp::from_ratio(borrows, denom)
}

/// A pluggable borrow-rate curve. Implementations are pure: same pool state,
/// same rate.
pub trait RateStrategy: std::fmt::Debug {
    /// Per-block borrow rate for the given pool state.
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Exp, MathError>;

    /// Per-block supply rate: `borrow_rate * (1 - reserve_factor) * utilization`.
    fn supply_rate(
        &self,
        cash: u128,
        borrows: u128,
        reserves: u128,
        reserve_factor: Exp,
    ) -> Result<Exp, MathError> {
        let one_minus_rf = Exp::ONE.sub(reserve_factor)?;
        let rate_to_pool = self.borrow_rate(cash, borrows, reserves)?.mul(one_minus_rf)?;
        utilization(cash, borrows, reserves)?.mul(rate_to_pool)
    }
}

/// Linear curve: `rate = base + slope * utilization`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WhitepaperRateModel {
    /// Per-block base rate.
    pub base_rate: Exp,
    /// Per-block slope against utilization.
    pub multiplier: Exp,
}

impl WhitepaperRateModel {
    /// Build from per-year rates (both 1e18-scaled fractions).
    pub fn per_year(base_rate: Exp, multiplier: Exp) -> Self {
        Self {
            base_rate: Exp::from_mantissa(base_rate.mantissa / BLOCKS_PER_YEAR),
            multiplier: Exp::from_mantissa(multiplier.mantissa / BLOCKS_PER_YEAR),
        }
    }
}

impl RateStrategy for WhitepaperRateModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Exp, MathError> {
        let util = utilization(cash, borrows, reserves)?;
        util.mul(self.multiplier)?.add(self.base_rate)
    }
}

/// Kinked curve: linear below the kink utilization, then a steep jump slope on
/// the excess to discourage draining the pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JumpRateModel {
    pub base_rate: Exp,
    pub multiplier: Exp,
    pub jump_multiplier: Exp,
    /// Utilization at which the jump slope starts, in (0, 1].
    pub kink: Exp,
}

impl JumpRateModel {
    pub fn per_year(base_rate: Exp, multiplier: Exp, jump_multiplier: Exp, kink: Exp) -> Self {
        Self {
            base_rate: Exp::from_mantissa(base_rate.mantissa / BLOCKS_PER_YEAR),
            multiplier: Exp::from_mantissa(multiplier.mantissa / BLOCKS_PER_YEAR),
            jump_multiplier: Exp::from_mantissa(jump_multiplier.mantissa / BLOCKS_PER_YEAR),
            kink,
        }
    }
}

impl RateStrategy for JumpRateModel {
    fn borrow_rate(&self, cash: u128, borrows: u128, reserves: u128) -> Result<Exp, MathError> {
        let util = utilization(cash, borrows, reserves)?;
        if util <= self.kink {
            return util.mul(self.multiplier)?.add(self.base_rate);
        }
        let normal = self.kink.mul(self.multiplier)?.add(self.base_rate)?;
        let excess = util.sub(self.kink)?;
        excess.mul(self.jump_multiplier)?.add(normal)
    }
}

/// Fixed reference rate maintained off-curve (e.g., mirrored from another
/// venue). Utilization does not move it; replace the strategy to change it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExternalRateModel {
    /// Per-block borrow rate.
    pub rate: Exp,
}

impl ExternalRateModel {
    pub fn new(rate: Exp) -> Self {
        Self { rate }
    }
}

impl RateStrategy for ExternalRateModel {
    fn borrow_rate(&self, _cash: u128, _borrows: u128, _reserves: u128) -> Result<Exp, MathError> {
        Ok(self.rate)
    }
}
