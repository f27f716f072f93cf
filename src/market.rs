// 5.0: per-market ledger record and per-account positions.
//
// A market is one listed asset's pool. The record owns supply/borrow totals,
// reserves, the borrow index and the accrual clock; the risk-side fields
// (listed flag, collateral factor, pauses, borrow cap) live on the same record
// but are only written through the engine's admin surface.

use crate::errors::{Failure, FailureSite};
use crate::math::{Exp, MathError};
use crate::types::{AssetId, BlockNumber, EngineId, MarketId};
use serde::{Deserialize, Serialize};

/// Static market configuration, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Human-readable name (e.g., "pDAI").
    pub name: String,
    /// The asset this pool holds and lends.
    pub underlying: AssetId,
    /// Exchange rate used while total shares are zero.
    pub initial_exchange_rate: Exp,
    /// Fraction of accrued interest routed to reserves, in [0, 1).
    pub reserve_factor: Exp,
}

/// Per-action pause switches. Pausing blocks new exposure; repayment and
/// liquidation of existing debt stay open except for seize itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseFlags {
    pub mint: bool,
    pub borrow: bool,
    pub transfer: bool,
    pub seize: bool,
}

/// Dynamic ledger state for one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub config: MarketConfig,
    /// Set once by the admin's support action; never unset.
    pub listed: bool,
    /// Fraction of this market's collateral value that counts toward borrowing
    /// power. Zero until explicitly configured.
    pub collateral_factor: Exp,
    /// Claim shares outstanding.
    pub total_shares: u128,
    /// Underlying currently lent out, inclusive of accrued interest.
    pub total_borrows: u128,
    /// Underlying set aside for the protocol.
    pub total_reserves: u128,
    /// Block the ledger was last accrued to.
    pub accrual_block: BlockNumber,
    /// Monotonic interest accumulator, seeded at 1.0.
    pub borrow_index: Exp,
    pub pause: PauseFlags,
    /// Hard ceiling on total borrows; zero means unlimited.
    pub borrow_cap: u128,
    /// Risk engine this market was listed under.
    pub engine: EngineId,
}

impl Market {
    pub fn new(config: MarketConfig, engine: EngineId, block: BlockNumber) -> Self {
        Self {
            config,
            listed: false,
            collateral_factor: Exp::ZERO,
            total_shares: 0,
            total_borrows: 0,
            total_reserves: 0,
            accrual_block: block,
            borrow_index: Exp::ONE,
            pause: PauseFlags::default(),
            borrow_cap: 0,
            engine,
        }
    }

    pub fn id(&self) -> MarketId {
        self.config.id
    }

    /// Fresh means accrued up to the current block; every mutating path
    /// requires freshness before touching balances.
    pub fn is_fresh(&self, block: BlockNumber) -> bool {
        self.accrual_block == block
    }

    /// Underlying-per-share conversion. With no shares outstanding this is the
    /// configured initial rate; otherwise `(cash + borrows - reserves) / shares`.
    pub fn exchange_rate(&self, cash: u128) -> Result<Exp, Failure> {
        if self.total_shares == 0 {
            return Ok(self.config.initial_exchange_rate);
        }
        let site = FailureSite::ExchangeRateCalculation;
        let pooled = cash
            .checked_add(self.total_borrows)
            .ok_or_else(|| Failure::math(site, MathError::Overflow))?
            .checked_sub(self.total_reserves)
            .ok_or_else(|| Failure::math(site, MathError::Underflow))?;
        Exp::from_ratio(pooled, self.total_shares).map_err(|e| Failure::math(site, e))
    }
}

/// Per-(account, market) state the ledger owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    /// Claim shares held.
    pub shares: u128,
    /// Borrow principal as of the last borrow-side action.
    pub borrow_principal: u128,
    /// Market borrow index at the time the principal was last set.
    pub interest_index: Exp,
}

impl AccountPosition {
    /// Current borrow balance: `principal * market_index / checkpoint_index`.
    ///
    /// A non-zero principal with a zero checkpoint is a corrupted position and
    /// fails loudly; it must never silently read as zero or infinity.
    pub fn borrow_balance(&self, market_index: Exp) -> Result<u128, Failure> {
        if self.borrow_principal == 0 {
            return Ok(0);
        }
        if self.interest_index.is_zero() {
            return Err(Failure::math(
                FailureSite::BorrowBalanceCheckpoint,
                MathError::DivisionByZero,
            ));
        }
        let scaled = self
            .borrow_principal
            .checked_mul(market_index.mantissa)
            .ok_or_else(|| {
                Failure::math(FailureSite::BorrowBalanceAccumulation, MathError::Overflow)
            })?;
        Ok(scaled / self.interest_index.mantissa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::math::EXP_SCALE;

    fn config() -> MarketConfig {
        MarketConfig {
            id: MarketId(1),
            name: "pDAI".to_string(),
            underlying: AssetId(1),
            initial_exchange_rate: Exp::ONE,
            reserve_factor: Exp::from_ratio(1, 10).unwrap(),
        }
    }

    #[test]
    fn empty_market_uses_initial_rate() {
        let market = Market::new(config(), EngineId(1), BlockNumber(0));
        assert_eq!(market.exchange_rate(123_456).unwrap(), Exp::ONE);
        assert_eq!(market.borrow_index, Exp::ONE);
        assert!(!market.listed);
    }

    #[test]
    fn exchange_rate_tracks_pool_value() {
        let mut market = Market::new(config(), EngineId(1), BlockNumber(0));
        market.total_shares = 1_000;
        market.total_borrows = 500;
        market.total_reserves = 100;
        // (600 cash + 500 borrows - 100 reserves) / 1000 shares = 1.0
        assert_eq!(market.exchange_rate(600).unwrap(), Exp::ONE);
        // more cash, higher rate
        let rate = market.exchange_rate(1_600).unwrap();
        assert_eq!(rate, Exp::from_mantissa(2 * EXP_SCALE));
    }

    #[test]
    fn exchange_rate_reserve_fault() {
        let mut market = Market::new(config(), EngineId(1), BlockNumber(0));
        market.total_shares = 10;
        market.total_reserves = 50;
        let failure = market.exchange_rate(20).unwrap_err();
        assert_eq!(failure.site, FailureSite::ExchangeRateCalculation);
        assert_eq!(failure.code, ErrorCode::Math(MathError::Underflow));
    }

    #[test]
    fn borrow_balance_compounds_by_index_ratio() {
        let pos = AccountPosition {
            shares: 0,
            borrow_principal: 1_000,
            interest_index: Exp::ONE,
        };
        // index grew 10% since the checkpoint
        let index = Exp::from_ratio(11, 10).unwrap();
        assert_eq!(pos.borrow_balance(index).unwrap(), 1_100);
    }

    #[test]
    fn zero_checkpoint_with_principal_fails_loudly() {
        let pos = AccountPosition {
            shares: 0,
            borrow_principal: 1,
            interest_index: Exp::ZERO,
        };
        let failure = pos.borrow_balance(Exp::ONE).unwrap_err();
        assert_eq!(failure.site, FailureSite::BorrowBalanceCheckpoint);

        // but zero principal with zero checkpoint is a clean empty position
        let empty = AccountPosition::default();
        assert_eq!(empty.borrow_balance(Exp::ONE).unwrap(), 0);
    }

    #[test]
    fn freshness_is_exact_block_equality() {
        let market = Market::new(config(), EngineId(1), BlockNumber(5));
        assert!(market.is_fresh(BlockNumber(5)));
        assert!(!market.is_fresh(BlockNumber(6)));
    }
}
