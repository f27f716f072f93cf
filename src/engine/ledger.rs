// 8.10 engine/ledger.rs: the per-market ledger operations. accrual first,
// admission hook second, checked math third, commit last. a soft rejection
// after accrual leaves the accrual (and any reward checkpoints the hook wrote)
// in place; that partial progress is legitimate committed state.

use super::core::Engine;
use crate::errors::{EngineError, ErrorCode, Failure, FailureSite};
use crate::events::{
    AccrueInterestEvent, BorrowEvent, EventPayload, MintEvent, RedeemEvent, RepayBorrowEvent,
    TransferSharesEvent,
};
use crate::config::BORROW_RATE_MAX;
use crate::math::{div_scalar_by_exp, Exp, MathError};
use crate::token::Holder;
use crate::types::{AccountId, MarketId};

impl Engine {
    // 8.11: interest accrual. brings one market's ledger up to the current
    // block: simple interest on total borrows at the strategy's rate, a
    // reserve cut, and a compounding borrow index.

    pub fn accrue_interest(&mut self, market_id: MarketId) -> Result<(), EngineError> {
        let block = self.block;
        let (accrual_block, total_borrows, total_reserves, reserve_factor, borrow_index, underlying) = {
            let market = self.market(market_id)?;
            (
                market.accrual_block,
                market.total_borrows,
                market.total_reserves,
                market.config.reserve_factor,
                market.borrow_index,
                market.config.underlying,
            )
        };
        // short-circuit: already fresh
        if accrual_block == block {
            return Ok(());
        }
        let cash = self.token(underlying)?.balance_of(Holder::Market(market_id));

        let rate_result = self
            .strategies
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?
            .borrow_rate(cash, total_borrows, total_reserves);
        let rate = match rate_result {
            Ok(r) => r,
            Err(e) => return Err(self.reject(Failure::math(FailureSite::AccrueBorrowRate, e))),
        };
        if rate > BORROW_RATE_MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::BadInput,
                FailureSite::AccrueBorrowRateCeiling,
            )));
        }

        let elapsed = block.delta(accrual_block) as u128;
        let staged = (|| -> Result<(u128, u128, u128, crate::math::Exp), Failure> {
            let simple_interest_factor = rate
                .mul_scalar(elapsed)
                .map_err(|e| Failure::math(FailureSite::AccrueSimpleInterestFactor, e))?;
            let interest_accumulated = simple_interest_factor
                .mul_scalar_truncate(total_borrows)
                .map_err(|e| Failure::math(FailureSite::AccrueInterestAccumulated, e))?;
            let new_total_borrows = total_borrows
                .checked_add(interest_accumulated)
                .ok_or_else(|| {
                    Failure::math(FailureSite::AccrueNewTotalBorrows, MathError::Overflow)
                })?;
            let new_total_reserves = reserve_factor
                .mul_scalar_truncate_add(interest_accumulated, total_reserves)
                .map_err(|e| Failure::math(FailureSite::AccrueNewTotalReserves, e))?;
            let new_borrow_index = simple_interest_factor
                .mul_scalar_truncate_add(borrow_index.mantissa, borrow_index.mantissa)
                .map(crate::math::Exp::from_mantissa)
                .map_err(|e| Failure::math(FailureSite::AccrueNewBorrowIndex, e))?;
            Ok((
                interest_accumulated,
                new_total_borrows,
                new_total_reserves,
                new_borrow_index,
            ))
        })();
        let (interest_accumulated, new_total_borrows, new_total_reserves, new_borrow_index) =
            match staged {
                Ok(v) => v,
                Err(f) => return Err(self.reject(f)),
            };

        let market = self.market_mut(market_id)?;
        market.accrual_block = block;
        market.total_borrows = new_total_borrows;
        market.total_reserves = new_total_reserves;
        market.borrow_index = new_borrow_index;

        self.emit_event(EventPayload::AccrueInterest(AccrueInterestEvent {
            market: market_id,
            cash_prior: cash,
            interest_accumulated,
            new_borrow_index,
            new_total_borrows,
        }));
        Ok(())
    }

    /// Borrow balance after accruing to the current block.
    pub fn borrow_balance_current(
        &mut self,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        self.borrow_balance_stored(market_id, account)
    }

    /// Exchange rate after accruing to the current block.
    pub fn exchange_rate_current(&mut self, market_id: MarketId) -> Result<Exp, EngineError> {
        self.accrue_interest(market_id)?;
        self.exchange_rate_stored(market_id)
    }

    // 8.12: mint. deposit underlying, receive shares at the pre-deposit
    // exchange rate. shares are computed from the amount the pool actually
    // received, so fee-on-transfer assets mint fewer shares, never more.

    pub fn mint(
        &mut self,
        minter: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        if let Err(f) = self.mint_allowed(minter, market_id) {
            return Err(self.reject(f));
        }
        if !self.market(market_id)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::MintFreshnessCheck,
            )));
        }

        let cash = self.cash(market_id)?;
        let underlying = self.market(market_id)?.config.underlying;
        let exchange_rate = match self.market(market_id)?.exchange_rate(cash) {
            Ok(r) => r,
            Err(f) => return Err(self.reject(f)),
        };

        // pre-check with the requested amount: the actual amount received is
        // never larger, so the post-transfer math cannot fail
        let staged = (|| -> Result<(), Failure> {
            let upper_shares = div_scalar_by_exp(amount, exchange_rate)
                .map_err(|e| Failure::math(FailureSite::MintSharesCalculation, e))?;
            self.market(market_id)
                .map_err(|_| Failure::new(ErrorCode::MarketNotListed, FailureSite::MintAllowed))?
                .total_shares
                .checked_add(upper_shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::MintNewTotalShares, MathError::Overflow)
                })?;
            self.position(market_id, minter)
                .shares
                .checked_add(upper_shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::MintNewAccountShares, MathError::Overflow)
                })?;
            Ok(())
        })();
        if let Err(f) = staged {
            return Err(self.reject(f));
        }

        let actual = self
            .token_mut(underlying)?
            .transfer_from(minter, Holder::Market(market_id), amount)
            .map_err(EngineError::TransferInFailed)?;

        // cannot fail: actual <= amount and the pre-check passed
        let shares = div_scalar_by_exp(actual, exchange_rate)
            .map_err(|e| Failure::math(FailureSite::MintSharesCalculation, e))?;
        let market = self.market_mut(market_id)?;
        market.total_shares += shares;
        self.position_mut(market_id, minter).shares += shares;

        self.emit_event(EventPayload::Mint(MintEvent {
            market: market_id,
            minter,
            amount: actual,
            shares,
        }));
        Ok(shares)
    }

    // 8.13: redeem. burn shares, withdraw underlying at the current exchange
    // rate. callable by share count or by underlying amount.

    /// Redeem an exact number of shares.
    pub fn redeem(
        &mut self,
        redeemer: AccountId,
        market_id: MarketId,
        shares: u128,
    ) -> Result<u128, EngineError> {
        self.redeem_fresh(redeemer, market_id, Some(shares), None)
    }

    /// Redeem whatever number of shares yields an exact underlying amount.
    pub fn redeem_underlying(
        &mut self,
        redeemer: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        self.redeem_fresh(redeemer, market_id, None, Some(amount))
    }

    fn redeem_fresh(
        &mut self,
        redeemer: AccountId,
        market_id: MarketId,
        shares_in: Option<u128>,
        amount_in: Option<u128>,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;

        let cash = self.cash(market_id)?;
        let underlying = self.market(market_id)?.config.underlying;
        let exchange_rate = match self.market(market_id)?.exchange_rate(cash) {
            Ok(r) => r,
            Err(f) => return Err(self.reject(f)),
        };

        let staged = (|| -> Result<(u128, u128), Failure> {
            match (shares_in, amount_in) {
                (Some(shares), None) => {
                    let amount = exchange_rate
                        .mul_scalar_truncate(shares)
                        .map_err(|e| Failure::math(FailureSite::RedeemAmountCalculation, e))?;
                    Ok((shares, amount))
                }
                (None, Some(amount)) => {
                    let shares = div_scalar_by_exp(amount, exchange_rate)
                        .map_err(|e| Failure::math(FailureSite::RedeemSharesCalculation, e))?;
                    Ok((shares, amount))
                }
                _ => Err(Failure::new(
                    ErrorCode::BadInput,
                    FailureSite::RedeemSharesCalculation,
                )),
            }
        })();
        let (shares, amount) = match staged {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        if let Err(f) = self.redeem_allowed(redeemer, market_id, shares) {
            return Err(self.reject(f));
        }
        if !self.market(market_id)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::RedeemFreshnessCheck,
            )));
        }

        let totals = (|| -> Result<(u128, u128), Failure> {
            let new_total = self
                .market(market_id)
                .map_err(|_| Failure::new(ErrorCode::MarketNotListed, FailureSite::RedeemAllowed))?
                .total_shares
                .checked_sub(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::RedeemNewTotalShares, MathError::Underflow)
                })?;
            let new_account = self
                .position(market_id, redeemer)
                .shares
                .checked_sub(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::RedeemNewAccountShares, MathError::Underflow)
                })?;
            Ok((new_total, new_account))
        })();
        let (new_total_shares, new_account_shares) = match totals {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        if cash < amount {
            return Err(self.reject(Failure::new(
                ErrorCode::InsufficientCash,
                FailureSite::RedeemTransferOut,
            )));
        }

        self.token_mut(underlying)?
            .transfer(Holder::Market(market_id), Holder::Account(redeemer), amount)
            .map_err(EngineError::TransferOutFailed)?;

        self.market_mut(market_id)?.total_shares = new_total_shares;
        self.position_mut(market_id, redeemer).shares = new_account_shares;

        self.emit_event(EventPayload::Redeem(RedeemEvent {
            market: market_id,
            redeemer,
            amount,
            shares,
        }));
        Ok(amount)
    }

    // 8.14: borrow. draw underlying against the account's cross-market
    // collateral; the hook auto-enters the market and runs the liquidity check.

    pub fn borrow(
        &mut self,
        borrower: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<(), EngineError> {
        self.accrue_interest(market_id)?;
        if let Err(f) = self.borrow_allowed(borrower, market_id, amount) {
            return Err(self.reject(f));
        }
        if !self.market(market_id)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::BorrowFreshnessCheck,
            )));
        }

        let cash = self.cash(market_id)?;
        if cash < amount {
            return Err(self.reject(Failure::new(
                ErrorCode::InsufficientCash,
                FailureSite::BorrowCashNotAvailable,
            )));
        }

        let (underlying, borrow_index, total_borrows) = {
            let market = self.market(market_id)?;
            (
                market.config.underlying,
                market.borrow_index,
                market.total_borrows,
            )
        };
        let staged = (|| -> Result<(u128, u128), Failure> {
            let account_borrows = self
                .position(market_id, borrower)
                .borrow_balance(borrow_index)?;
            let new_account_borrows = account_borrows.checked_add(amount).ok_or_else(|| {
                Failure::math(FailureSite::BorrowNewAccountBorrows, MathError::Overflow)
            })?;
            let new_total_borrows = total_borrows.checked_add(amount).ok_or_else(|| {
                Failure::math(FailureSite::BorrowNewTotalBorrows, MathError::Overflow)
            })?;
            Ok((new_account_borrows, new_total_borrows))
        })();
        let (new_account_borrows, new_total_borrows) = match staged {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        self.token_mut(underlying)?
            .transfer(Holder::Market(market_id), Holder::Account(borrower), amount)
            .map_err(EngineError::TransferOutFailed)?;

        let position = self.position_mut(market_id, borrower);
        position.borrow_principal = new_account_borrows;
        position.interest_index = borrow_index;
        self.market_mut(market_id)?.total_borrows = new_total_borrows;

        self.emit_event(EventPayload::Borrow(BorrowEvent {
            market: market_id,
            borrower,
            amount,
            account_borrows: new_account_borrows,
            total_borrows: new_total_borrows,
        }));
        Ok(())
    }

    // 8.15: repay. `u128::MAX` means "the full balance as of this block".
    // repayments are never paused and never liquidity-checked.

    pub fn repay_borrow(
        &mut self,
        borrower: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        self.repay_borrow_fresh(borrower, borrower, market_id, amount)
    }

    /// Third-party repayment; the payer's tokens, the borrower's debt.
    pub fn repay_borrow_behalf(
        &mut self,
        payer: AccountId,
        borrower: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        self.repay_borrow_fresh(payer, borrower, market_id, amount)
    }

    /// Assumes the market is already accrued. Returns the amount actually
    /// repaid (after any transfer fee).
    pub(super) fn repay_borrow_fresh(
        &mut self,
        payer: AccountId,
        borrower: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        if let Err(f) = self.repay_borrow_allowed(market_id, borrower) {
            return Err(self.reject(f));
        }
        if !self.market(market_id)?.is_fresh(self.block) {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotFresh,
                FailureSite::RepayFreshnessCheck,
            )));
        }

        let (underlying, borrow_index, total_borrows) = {
            let market = self.market(market_id)?;
            (
                market.config.underlying,
                market.borrow_index,
                market.total_borrows,
            )
        };
        let staged = (|| -> Result<(u128, u128), Failure> {
            let account_borrows = self
                .position(market_id, borrower)
                .borrow_balance(borrow_index)?;
            let repay = if amount == u128::MAX {
                account_borrows
            } else {
                amount
            };
            // pre-check with the requested amount: the actual transfer can
            // only come in smaller
            account_borrows.checked_sub(repay).ok_or_else(|| {
                Failure::math(FailureSite::RepayNewAccountBorrows, MathError::Underflow)
            })?;
            total_borrows.checked_sub(repay).ok_or_else(|| {
                Failure::math(FailureSite::RepayNewTotalBorrows, MathError::Underflow)
            })?;
            Ok((account_borrows, repay))
        })();
        let (account_borrows, repay) = match staged {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        let actual = self
            .token_mut(underlying)?
            .transfer_from(payer, Holder::Market(market_id), repay)
            .map_err(EngineError::TransferInFailed)?;

        let new_account_borrows = account_borrows - actual;
        let new_total_borrows = total_borrows - actual;
        let position = self.position_mut(market_id, borrower);
        position.borrow_principal = new_account_borrows;
        position.interest_index = borrow_index;
        self.market_mut(market_id)?.total_borrows = new_total_borrows;

        self.emit_event(EventPayload::RepayBorrow(RepayBorrowEvent {
            market: market_id,
            payer,
            borrower,
            amount: actual,
            account_borrows: new_account_borrows,
            total_borrows: new_total_borrows,
        }));
        Ok(actual)
    }

    // 8.16: share transfer. moves claim shares between accounts; no accrual
    // needed because no underlying moves and the exchange rate is untouched.

    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        market_id: MarketId,
        shares: u128,
    ) -> Result<(), EngineError> {
        if from == to {
            return Err(self.reject(Failure::new(
                ErrorCode::BadInput,
                FailureSite::TransferSelfTransfer,
            )));
        }
        if let Err(f) = self.transfer_allowed(market_id, from, to, shares) {
            return Err(self.reject(f));
        }

        let staged = (|| -> Result<(u128, u128), Failure> {
            let new_from = self
                .position(market_id, from)
                .shares
                .checked_sub(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::TransferNewFromShares, MathError::Underflow)
                })?;
            let new_to = self
                .position(market_id, to)
                .shares
                .checked_add(shares)
                .ok_or_else(|| {
                    Failure::math(FailureSite::TransferNewToShares, MathError::Overflow)
                })?;
            Ok((new_from, new_to))
        })();
        let (new_from, new_to) = match staged {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };

        self.position_mut(market_id, from).shares = new_from;
        self.position_mut(market_id, to).shares = new_to;

        self.emit_event(EventPayload::TransferShares(TransferSharesEvent {
            market: market_id,
            from,
            to,
            shares,
        }));
        Ok(())
    }
}
