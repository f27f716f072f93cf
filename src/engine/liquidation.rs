// 8.17 engine/liquidation.rs: liquidation of under-water borrowers. a
// liquidator repays part of a borrow in one market and seizes discounted
// collateral shares in another. the repay leg reuses the repay machinery; the
// seize leg moves shares without touching underlying cash.

use super::core::Engine;
use crate::errors::{EngineError, ErrorCode, Failure, FailureSite};
use crate::events::{EventPayload, LiquidateBorrowEvent, SeizeEvent};
use crate::math::MathError;
use crate::types::{AccountId, MarketId};

impl Engine {
    /// Repay `repay_amount` of `borrower`'s debt in `borrowed_market` and
    /// seize collateral shares in `collateral_market`. Returns the shares
    /// seized.
    pub fn liquidate_borrow(
        &mut self,
        liquidator: AccountId,
        borrower: AccountId,
        borrowed_market: MarketId,
        repay_amount: u128,
        collateral_market: MarketId,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(borrowed_market)?;
        self.accrue_interest(collateral_market)?;

        if liquidator == borrower {
            return Err(self.reject(Failure::new(
                ErrorCode::BadInput,
                FailureSite::LiquidateLiquidatorIsBorrower,
            )));
        }
        if repay_amount == 0 {
            return Err(self.reject(Failure::new(
                ErrorCode::BadInput,
                FailureSite::LiquidateCloseAmountIsZero,
            )));
        }
        // the max sentinel is a repay-only convenience; liquidation must name
        // an exact amount so the close-factor check is meaningful
        if repay_amount == u128::MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::BadInput,
                FailureSite::LiquidateCloseAmountIsMax,
            )));
        }
        if !self.market(borrowed_market)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::LiquidateFreshnessCheck,
            )));
        }
        if !self.market(collateral_market)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::LiquidateCollateralFreshnessCheck,
            )));
        }

        if let Err(f) =
            self.liquidate_borrow_allowed(borrowed_market, collateral_market, borrower, repay_amount)
        {
            return Err(self.reject(f));
        }

        // every seize-side gate runs before the repay leg moves any tokens:
        // a refused seizure must leave the borrower's debt untouched
        let collateral_engine = self.market(collateral_market)?.engine;
        let borrowed_engine = self.market(borrowed_market)?.engine;
        if collateral_engine != borrowed_engine || collateral_engine != self.id {
            return Err(EngineError::EngineMismatch(collateral_market, borrowed_market));
        }
        if let Err(f) =
            self.seize_allowed(collateral_market, borrowed_market, liquidator, borrower)
        {
            return Err(self.reject(f));
        }
        // sufficiency pre-check with the requested amount: the actual repay is
        // never larger, so the post-repay seizure stays within this bound
        let upper_seize =
            match self.seize_tokens_for(borrowed_market, collateral_market, repay_amount) {
                Ok(s) => s,
                Err(f) => return Err(self.reject(f)),
            };
        if self.position(collateral_market, borrower).shares < upper_seize {
            return Err(self.reject(Failure::new(
                ErrorCode::InsufficientCollateral,
                FailureSite::LiquidateSeizeTooMuch,
            )));
        }

        let actual_repay =
            self.repay_borrow_fresh(liquidator, borrower, borrowed_market, repay_amount)?;

        let seize_shares =
            match self.seize_tokens_for(borrowed_market, collateral_market, actual_repay) {
                Ok(s) => s,
                Err(f) => return Err(self.reject(f)),
            };

        self.seize_internal(collateral_market, liquidator, borrower, seize_shares)?;

        self.emit_event(EventPayload::LiquidateBorrow(LiquidateBorrowEvent {
            market: borrowed_market,
            liquidator,
            borrower,
            repay_amount: actual_repay,
            collateral_market,
            seize_shares,
        }));
        Ok(seize_shares)
    }

    /// Move seized collateral shares from borrower to liquidator. The caller
    /// has already cleared `seize_allowed` and the engine-affinity check.
    pub(super) fn seize_internal(
        &mut self,
        collateral_market: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
        shares: u128,
    ) -> Result<(), EngineError> {
        let staged = (|| -> Result<(u128, u128), Failure> {
            let new_borrower = self
                .position(collateral_market, borrower)
                .shares
                .checked_sub(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::SeizeNewBorrowerShares, MathError::Underflow)
                })?;
            let new_liquidator = self
                .position(collateral_market, liquidator)
                .shares
                .checked_add(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::SeizeNewLiquidatorShares, MathError::Overflow)
                })?;
            Ok((new_borrower, new_liquidator))
        })();
        let (new_borrower, new_liquidator) = match staged {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        self.position_mut(collateral_market, borrower).shares = new_borrower;
        self.position_mut(collateral_market, liquidator).shares = new_liquidator;

        self.emit_event(EventPayload::Seize(SeizeEvent {
            collateral_market,
            liquidator,
            borrower,
            shares,
        }));
        Ok(())
    }
}
