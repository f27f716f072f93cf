// 8.9 engine/risk.rs: the risk engine. market membership, the cross-market
// liquidity sweep, and the admission hooks every ledger operation clears
// before touching balances. hooks also drive the reward flywheel: any
// operation that can change a balance settles rewards for the affected
// accounts first, against pre-operation balances.

use super::core::Engine;
use crate::errors::{EngineError, ErrorCode, Failure, FailureSite};
use crate::events::{EventPayload, MembershipEvent};
use crate::math::MathError;
use crate::types::{AccountId, MarketId};

impl Engine {
    // membership

    /// Enter markets as collateral. Per-element results: one bad market does
    /// not abort the rest, matching the batch semantics callers expect.
    pub fn enter_markets(
        &mut self,
        account: AccountId,
        markets: &[MarketId],
    ) -> Vec<Result<(), Failure>> {
        markets
            .iter()
            .map(|&market_id| match self.add_to_market(account, market_id) {
                Ok(()) => Ok(()),
                Err(f) => {
                    self.reject(f);
                    Err(f)
                }
            })
            .collect()
    }

    /// Idempotent single-market entry. Emits MarketEntered only on a real
    /// state change.
    pub(super) fn add_to_market(
        &mut self,
        account: AccountId,
        market_id: MarketId,
    ) -> Result<(), Failure> {
        let listed = self
            .markets
            .get(&market_id)
            .map(|m| m.listed)
            .unwrap_or(false);
        if !listed {
            return Err(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::EnterMarketsNotListed,
            ));
        }
        let max_markets = self.risk.max_markets_per_account;
        let members = self.memberships.entry(account).or_default();
        if members.contains(&market_id) {
            return Ok(());
        }
        if members.len() >= max_markets {
            return Err(Failure::new(
                ErrorCode::TooManyMarkets,
                FailureSite::EnterMarketsMembershipLimit,
            ));
        }
        members.push(market_id);
        self.emit_event(EventPayload::MarketEntered(MembershipEvent {
            market: market_id,
            account,
        }));
        Ok(())
    }

    /// Leave a market. Refused while the account owes a borrow there or while
    /// the position's shares are load-bearing collateral.
    pub fn exit_market(
        &mut self,
        account: AccountId,
        market_id: MarketId,
    ) -> Result<(), EngineError> {
        let borrow_index = self.market(market_id)?.borrow_index;
        let position = self.position(market_id, account);

        let owed = match position.borrow_balance(borrow_index) {
            Ok(v) => v,
            Err(f) => return Err(self.reject(f)),
        };
        if owed != 0 {
            return Err(self.reject(Failure::new(
                ErrorCode::NonzeroBorrowBalance,
                FailureSite::ExitMarketBalanceOwed,
            )));
        }
        if !self.is_member(account, market_id) {
            return Ok(());
        }

        // hypothetically redeem every share; the rest of the portfolio must
        // still cover all borrows
        match self.hypothetical_account_liquidity(account, Some(market_id), position.shares, 0) {
            Ok((_, 0)) => {}
            Ok(_) => {
                return Err(self.reject(Failure::new(
                    ErrorCode::InsufficientLiquidity,
                    FailureSite::ExitMarketRejection,
                )))
            }
            Err(f) => return Err(self.reject(f)),
        }

        if let Some(members) = self.memberships.get_mut(&account) {
            if let Some(index) = members.iter().position(|&m| m == market_id) {
                members.swap_remove(index);
            }
        }
        self.emit_event(EventPayload::MarketExited(MembershipEvent {
            market: market_id,
            account,
        }));
        Ok(())
    }

    // liquidity

    /// (liquidity, shortfall) at stored balances. At most one side is nonzero.
    pub fn get_account_liquidity(
        &self,
        account: AccountId,
    ) -> Result<(u128, u128), EngineError> {
        self.hypothetical_account_liquidity(account, None, 0, 0)
            .map_err(EngineError::from)
    }

    /// (liquidity, shortfall) as if `redeem_shares` left and `borrow_amount`
    /// was drawn from `market_id`.
    pub fn get_hypothetical_account_liquidity(
        &self,
        account: AccountId,
        market_id: MarketId,
        redeem_shares: u128,
        borrow_amount: u128,
    ) -> Result<(u128, u128), EngineError> {
        self.hypothetical_account_liquidity(account, Some(market_id), redeem_shares, borrow_amount)
            .map_err(EngineError::from)
    }

    /// The sweep. Walks only entered markets: collateral side accumulates
    /// `shares × exchange_rate × collateral_factor × price`, borrow side
    /// `borrow_balance × price`, both u128 value units. A missing price on any
    /// entered market poisons the whole answer.
    pub(super) fn hypothetical_account_liquidity(
        &self,
        account: AccountId,
        target: Option<MarketId>,
        redeem_shares: u128,
        borrow_amount: u128,
    ) -> Result<(u128, u128), Failure> {
        let site = FailureSite::LiquidityCalculation;
        let mut sum_collateral: u128 = 0;
        let mut sum_borrow: u128 = 0;

        for &market_id in self.assets_in(account) {
            // membership only ever contains listed markets
            let Some(market) = self.markets.get(&market_id) else {
                continue;
            };
            let position = self.position(market_id, account);
            let cash = self
                .tokens
                .get(&market.config.underlying)
                .map(|t| t.balance_of(crate::token::Holder::Market(market_id)))
                .unwrap_or(0);
            let exchange_rate = market.exchange_rate(cash)?;
            let price = self
                .oracle
                .get_underlying_price(market_id)
                .ok_or_else(|| {
                    Failure::new(ErrorCode::PriceError, FailureSite::LiquidityPriceCheck)
                })?;

            // value of one share in borrow-power units
            let share_value = market
                .collateral_factor
                .mul(exchange_rate)
                .and_then(|v| v.mul(price))
                .map_err(|e| Failure::math(site, e))?;

            sum_collateral = share_value
                .mul_scalar_truncate(position.shares)
                .map_err(|e| Failure::math(site, e))?
                .checked_add(sum_collateral)
                .ok_or_else(|| Failure::math(site, MathError::Overflow))?;

            let borrow_balance = position.borrow_balance(market.borrow_index)?;
            sum_borrow = price
                .mul_scalar_truncate(borrow_balance)
                .map_err(|e| Failure::math(site, e))?
                .checked_add(sum_borrow)
                .ok_or_else(|| Failure::math(site, MathError::Overflow))?;

            if target == Some(market_id) {
                // hypothetical redeem counts against borrow power
                sum_borrow = share_value
                    .mul_scalar_truncate(redeem_shares)
                    .map_err(|e| Failure::math(site, e))?
                    .checked_add(sum_borrow)
                    .ok_or_else(|| Failure::math(site, MathError::Overflow))?;
                sum_borrow = price
                    .mul_scalar_truncate(borrow_amount)
                    .map_err(|e| Failure::math(site, e))?
                    .checked_add(sum_borrow)
                    .ok_or_else(|| Failure::math(site, MathError::Overflow))?;
            }
        }

        if sum_collateral >= sum_borrow {
            Ok((sum_collateral - sum_borrow, 0))
        } else {
            Ok((0, sum_borrow - sum_collateral))
        }
    }

    // admission hooks

    pub(super) fn mint_allowed(
        &mut self,
        minter: AccountId,
        market_id: MarketId,
    ) -> Result<(), Failure> {
        let market = self
            .markets
            .get(&market_id)
            .filter(|m| m.listed)
            .ok_or_else(|| Failure::new(ErrorCode::MarketNotListed, FailureSite::MintAllowed))?;
        if market.pause.mint {
            return Err(Failure::new(ErrorCode::Paused, FailureSite::MintAllowed));
        }
        self.update_reward_supply_index(market_id)?;
        self.distribute_supplier_reward(market_id, minter)?;
        Ok(())
    }

    pub(super) fn redeem_allowed(
        &mut self,
        redeemer: AccountId,
        market_id: MarketId,
        shares: u128,
    ) -> Result<(), Failure> {
        if !self
            .markets
            .get(&market_id)
            .map(|m| m.listed)
            .unwrap_or(false)
        {
            return Err(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::RedeemAllowed,
            ));
        }
        // shares in a market the account never entered are not collateral, so
        // pulling them out cannot break liquidity
        if self.is_member(redeemer, market_id) {
            let (_, shortfall) =
                self.hypothetical_account_liquidity(redeemer, Some(market_id), shares, 0)?;
            if shortfall > 0 {
                return Err(Failure::new(
                    ErrorCode::InsufficientLiquidity,
                    FailureSite::RedeemAllowedLiquidityCheck,
                ));
            }
        }
        self.update_reward_supply_index(market_id)?;
        self.distribute_supplier_reward(market_id, redeemer)?;
        Ok(())
    }

    pub(super) fn borrow_allowed(
        &mut self,
        borrower: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<(), Failure> {
        let market = self
            .markets
            .get(&market_id)
            .filter(|m| m.listed)
            .ok_or_else(|| Failure::new(ErrorCode::MarketNotListed, FailureSite::BorrowAllowed))?;
        if market.pause.borrow {
            return Err(Failure::new(ErrorCode::Paused, FailureSite::BorrowAllowed));
        }
        let total_borrows = market.total_borrows;
        let borrow_cap = market.borrow_cap;

        // borrowing implies the market is part of the account's risk set
        if !self.is_member(borrower, market_id) {
            self.add_to_market(borrower, market_id).map_err(|f| {
                Failure::new(f.code, FailureSite::BorrowAllowedMembershipLimit)
            })?;
        }

        if self.oracle.get_underlying_price(market_id).is_none() {
            return Err(Failure::new(
                ErrorCode::PriceError,
                FailureSite::BorrowAllowedPriceCheck,
            ));
        }

        if borrow_cap != 0 {
            let next_total = total_borrows
                .checked_add(amount)
                .ok_or_else(|| {
                    Failure::math(FailureSite::BorrowAllowedCapCheck, MathError::Overflow)
                })?;
            if next_total > borrow_cap {
                return Err(Failure::new(
                    ErrorCode::BorrowCapExceeded,
                    FailureSite::BorrowAllowedCapCheck,
                ));
            }
        }

        let (_, shortfall) =
            self.hypothetical_account_liquidity(borrower, Some(market_id), 0, amount)?;
        if shortfall > 0 {
            return Err(Failure::new(
                ErrorCode::InsufficientLiquidity,
                FailureSite::BorrowAllowedLiquidityCheck,
            ));
        }

        self.update_reward_borrow_index(market_id)?;
        self.distribute_borrower_reward(market_id, borrower)?;
        Ok(())
    }

    pub(super) fn repay_borrow_allowed(
        &mut self,
        market_id: MarketId,
        borrower: AccountId,
    ) -> Result<(), Failure> {
        if !self
            .markets
            .get(&market_id)
            .map(|m| m.listed)
            .unwrap_or(false)
        {
            return Err(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::RepayBorrowAllowed,
            ));
        }
        self.update_reward_borrow_index(market_id)?;
        self.distribute_borrower_reward(market_id, borrower)?;
        Ok(())
    }

    pub(super) fn liquidate_borrow_allowed(
        &mut self,
        borrowed_market: MarketId,
        collateral_market: MarketId,
        borrower: AccountId,
        repay_amount: u128,
    ) -> Result<(), Failure> {
        let both_listed = self
            .markets
            .get(&borrowed_market)
            .map(|m| m.listed)
            .unwrap_or(false)
            && self
                .markets
                .get(&collateral_market)
                .map(|m| m.listed)
                .unwrap_or(false);
        if !both_listed {
            return Err(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::LiquidateBorrowAllowed,
            ));
        }

        let (_, shortfall) = self.hypothetical_account_liquidity(borrower, None, 0, 0)?;
        if shortfall == 0 {
            return Err(Failure::new(
                ErrorCode::InsufficientShortfall,
                FailureSite::LiquidateBorrowAllowedShortfallCheck,
            ));
        }

        let borrow_index = self
            .markets
            .get(&borrowed_market)
            .map(|m| m.borrow_index)
            .unwrap_or_default();
        let borrow_balance = self
            .position(borrowed_market, borrower)
            .borrow_balance(borrow_index)?;
        let max_close = self
            .risk
            .close_factor
            .mul_scalar_truncate(borrow_balance)
            .map_err(|e| Failure::math(FailureSite::LiquidateBorrowAllowedRepayTooMuch, e))?;
        if repay_amount > max_close {
            return Err(Failure::new(
                ErrorCode::TooMuchRepay,
                FailureSite::LiquidateBorrowAllowedRepayTooMuch,
            ));
        }
        Ok(())
    }

    pub(super) fn seize_allowed(
        &mut self,
        collateral_market: MarketId,
        borrowed_market: MarketId,
        liquidator: AccountId,
        borrower: AccountId,
    ) -> Result<(), Failure> {
        let collateral = self
            .markets
            .get(&collateral_market)
            .filter(|m| m.listed)
            .ok_or_else(|| Failure::new(ErrorCode::MarketNotListed, FailureSite::SeizeAllowed))?;
        if collateral.pause.seize {
            return Err(Failure::new(ErrorCode::Paused, FailureSite::SeizeAllowed));
        }
        if !self
            .markets
            .get(&borrowed_market)
            .map(|m| m.listed)
            .unwrap_or(false)
        {
            return Err(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::SeizeAllowed,
            ));
        }
        self.update_reward_supply_index(collateral_market)?;
        self.distribute_supplier_reward(collateral_market, borrower)?;
        self.distribute_supplier_reward(collateral_market, liquidator)?;
        Ok(())
    }

    pub(super) fn transfer_allowed(
        &mut self,
        market_id: MarketId,
        from: AccountId,
        to: AccountId,
        shares: u128,
    ) -> Result<(), Failure> {
        let market = self
            .markets
            .get(&market_id)
            .filter(|m| m.listed)
            .ok_or_else(|| {
                Failure::new(ErrorCode::MarketNotListed, FailureSite::TransferAllowed)
            })?;
        if market.pause.transfer {
            return Err(Failure::new(ErrorCode::Paused, FailureSite::TransferAllowed));
        }
        if !self.risk.transfers_exempt_from_liquidity_check && self.is_member(from, market_id) {
            let (_, shortfall) =
                self.hypothetical_account_liquidity(from, Some(market_id), shares, 0)?;
            if shortfall > 0 {
                return Err(Failure::new(
                    ErrorCode::InsufficientLiquidity,
                    FailureSite::TransferAllowedLiquidityCheck,
                ));
            }
        }
        self.update_reward_supply_index(market_id)?;
        self.distribute_supplier_reward(market_id, from)?;
        self.distribute_supplier_reward(market_id, to)?;
        Ok(())
    }

    /// Collateral shares owed to a liquidator for repaying `repay_amount`:
    /// `repay × incentive × price_borrowed / (price_collateral × exchange_rate)`.
    pub fn liquidate_calculate_seize_tokens(
        &self,
        borrowed_market: MarketId,
        collateral_market: MarketId,
        repay_amount: u128,
    ) -> Result<u128, EngineError> {
        self.seize_tokens_for(borrowed_market, collateral_market, repay_amount)
            .map_err(EngineError::from)
    }

    pub(super) fn seize_tokens_for(
        &self,
        borrowed_market: MarketId,
        collateral_market: MarketId,
        repay_amount: u128,
    ) -> Result<u128, Failure> {
        let price_borrowed = self
            .oracle
            .get_underlying_price(borrowed_market)
            .ok_or_else(|| Failure::new(ErrorCode::PriceError, FailureSite::LiquidateSeizePrice))?;
        let price_collateral = self
            .oracle
            .get_underlying_price(collateral_market)
            .ok_or_else(|| Failure::new(ErrorCode::PriceError, FailureSite::LiquidateSeizePrice))?;

        let site = FailureSite::LiquidateSeizeCalculation;
        let cash = self
            .tokens
            .get(
                &self
                    .markets
                    .get(&collateral_market)
                    .map(|m| m.config.underlying)
                    .ok_or_else(|| Failure::new(ErrorCode::MarketNotListed, site))?,
            )
            .map(|t| t.balance_of(crate::token::Holder::Market(collateral_market)))
            .unwrap_or(0);
        let exchange_rate = self
            .markets
            .get(&collateral_market)
            .ok_or_else(|| Failure::new(ErrorCode::MarketNotListed, site))?
            .exchange_rate(cash)?;

        let numerator = self
            .risk
            .liquidation_incentive
            .mul(price_borrowed)
            .map_err(|e| Failure::math(site, e))?;
        let denominator = price_collateral
            .mul(exchange_rate)
            .map_err(|e| Failure::math(site, e))?;
        let ratio = numerator.div(denominator).map_err(|e| Failure::math(site, e))?;
        ratio
            .mul_scalar_truncate(repay_amount)
            .map_err(|e| Failure::math(site, e))
    }
}
