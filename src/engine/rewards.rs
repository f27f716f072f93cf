// 8.19 engine/rewards.rs: engine-side flywheel driver. the Flywheel owns
// indices and accruals; this module feeds it the ledger balances it cannot
// see, splits the global reward rate across markets, and pays accruals out of
// the reward treasury.

use super::core::Engine;
use crate::errors::{EngineError, ErrorCode, Failure, FailureSite};
use crate::events::{
    DistributedRewardEvent, EventPayload, RewardPaidEvent, RewardSpeedUpdatedEvent,
};
use crate::math::div_scalar_by_exp;
use crate::token::Holder;
use crate::types::{AccountId, MarketId};

impl Engine {
    // index maintenance, called from the admission hooks

    pub(super) fn update_reward_supply_index(&mut self, market_id: MarketId) -> Result<(), Failure> {
        let total_shares = self
            .markets
            .get(&market_id)
            .map(|m| m.total_shares)
            .unwrap_or(0);
        let block = self.block;
        self.flywheel.update_supply_index(market_id, total_shares, block)
    }

    pub(super) fn update_reward_borrow_index(&mut self, market_id: MarketId) -> Result<(), Failure> {
        let Some(market) = self.markets.get(&market_id) else {
            return Ok(());
        };
        // deflate by the borrow index so compounding interest does not dilute
        // the per-unit reward
        let units = div_scalar_by_exp(market.total_borrows, market.borrow_index)
            .map_err(|e| Failure::math(FailureSite::RewardBorrowIndex, e))?;
        let block = self.block;
        self.flywheel.update_borrow_index(market_id, units, block)
    }

    pub(super) fn distribute_supplier_reward(
        &mut self,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<(), Failure> {
        let shares = self.position(market_id, account).shares;
        let delta = self.flywheel.distribute_supplier(market_id, account, shares)?;
        if let Some(state) = self.flywheel.market_state(market_id) {
            let index = state.supply_index;
            self.emit_event(EventPayload::DistributedSupplierReward(
                DistributedRewardEvent {
                    market: market_id,
                    account,
                    delta,
                    index,
                },
            ));
        }
        Ok(())
    }

    pub(super) fn distribute_borrower_reward(
        &mut self,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<(), Failure> {
        let Some(market) = self.markets.get(&market_id) else {
            return Ok(());
        };
        let borrow_index = market.borrow_index;
        let balance = self
            .position(market_id, account)
            .borrow_balance(borrow_index)?;
        let units = div_scalar_by_exp(balance, borrow_index)
            .map_err(|e| Failure::math(FailureSite::RewardDistribution, e))?;
        let delta = self.flywheel.distribute_borrower(market_id, account, units)?;
        if let Some(state) = self.flywheel.market_state(market_id) {
            let index = state.borrow_index;
            self.emit_event(EventPayload::DistributedBorrowerReward(
                DistributedRewardEvent {
                    market: market_id,
                    account,
                    delta,
                    index,
                },
            ));
        }
        Ok(())
    }

    // speed control

    /// Pin one market's emission speed directly.
    pub fn set_reward_speed(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        speed: u128,
    ) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::SetRewardSpeedOwnerCheck,
            )));
        }
        // settle both indices at the old speed before changing it
        if let Err(f) = self.update_reward_supply_index(market_id) {
            return Err(self.reject(f));
        }
        if let Err(f) = self.update_reward_borrow_index(market_id) {
            return Err(self.reject(f));
        }
        let block = self.block;
        self.flywheel.set_speed(market_id, speed, block);
        self.emit_event(EventPayload::RewardSpeedUpdated(RewardSpeedUpdatedEvent {
            market: market_id,
            speed,
        }));
        Ok(())
    }

    /// Total emission per block, split across markets by `refresh_reward_speeds`.
    pub fn set_reward_rate(&mut self, caller: AccountId, rate: u128) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::SetRewardRateOwnerCheck,
            )));
        }
        self.flywheel.reward_rate = rate;
        Ok(())
    }

    /// Minimum accrual worth auto-paying during a claim.
    pub fn set_reward_claim_threshold(
        &mut self,
        caller: AccountId,
        threshold: u128,
    ) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::SetRewardRateOwnerCheck,
            )));
        }
        self.flywheel.claim_threshold = threshold;
        Ok(())
    }

    /// Re-split the global reward rate across tracked markets in proportion to
    /// the value borrowed from each. Markets without a price count as zero
    /// value and simply receive no emission.
    pub fn refresh_reward_speeds(&mut self) -> Result<(), EngineError> {
        let mut market_ids: Vec<MarketId> = self.flywheel.tracked_markets().collect();
        market_ids.sort_by_key(|m| m.0);

        // settle every index at the old speeds first
        for &market_id in &market_ids {
            if let Err(f) = self.update_reward_supply_index(market_id) {
                return Err(self.reject(f));
            }
            if let Err(f) = self.update_reward_borrow_index(market_id) {
                return Err(self.reject(f));
            }
        }

        let mut utilities: Vec<(MarketId, u128)> = Vec::with_capacity(market_ids.len());
        let mut total_utility: u128 = 0;
        for &market_id in &market_ids {
            let borrows = self
                .markets
                .get(&market_id)
                .map(|m| m.total_borrows)
                .unwrap_or(0);
            let utility = match self.oracle.get_underlying_price(market_id) {
                Some(price) => match price.mul_scalar_truncate(borrows) {
                    Ok(v) => v,
                    Err(e) => {
                        return Err(
                            self.reject(Failure::math(FailureSite::RewardDistribution, e))
                        )
                    }
                },
                None => 0,
            };
            total_utility = match total_utility.checked_add(utility) {
                Some(v) => v,
                None => {
                    return Err(self.reject(Failure::math(
                        FailureSite::RewardDistribution,
                        crate::math::MathError::Overflow,
                    )))
                }
            };
            utilities.push((market_id, utility));
        }

        let rate = self.flywheel.reward_rate;
        let block = self.block;
        for (market_id, utility) in utilities {
            let speed = if total_utility > 0 {
                // rate * utility / total; utility <= total so this fits
                match utility.checked_mul(rate) {
                    Some(scaled) => scaled / total_utility,
                    None => {
                        return Err(self.reject(Failure::math(
                            FailureSite::RewardDistribution,
                            crate::math::MathError::Overflow,
                        )))
                    }
                }
            } else {
                0
            };
            self.flywheel.set_speed(market_id, speed, block);
            self.emit_event(EventPayload::RewardSpeedUpdated(RewardSpeedUpdatedEvent {
                market: market_id,
                speed,
            }));
        }
        Ok(())
    }

    // claiming

    /// Settle an account against every tracked market and pay the accrual if
    /// it clears the claim threshold and the treasury can cover it. Returns
    /// the amount paid (zero when deferred).
    pub fn claim_reward(&mut self, account: AccountId) -> Result<u128, EngineError> {
        let mut market_ids: Vec<MarketId> = self.flywheel.tracked_markets().collect();
        market_ids.sort_by_key(|m| m.0);

        for &market_id in &market_ids {
            if let Err(f) = self.update_reward_borrow_index(market_id) {
                return Err(self.reject(f));
            }
            if let Err(f) = self.distribute_borrower_reward(market_id, account) {
                return Err(self.reject(f));
            }
            if let Err(f) = self.update_reward_supply_index(market_id) {
                return Err(self.reject(f));
            }
            if let Err(f) = self.distribute_supplier_reward(market_id, account) {
                return Err(self.reject(f));
            }
        }

        let amount = self.flywheel.accrued(account);
        let threshold = self.flywheel.claim_threshold;
        Ok(self.pay_reward(account, amount, threshold))
    }

    /// Treasury payout. Pays only when the amount is nonzero, clears the
    /// threshold, and the treasury holds enough; otherwise the accrual stays
    /// booked for a later claim.
    fn pay_reward(&mut self, account: AccountId, amount: u128, threshold: u128) -> u128 {
        if amount == 0 || amount < threshold {
            return 0;
        }
        if self.reward_token.balance_of(Holder::Treasury) < amount {
            return 0;
        }
        if self
            .reward_token
            .transfer(Holder::Treasury, Holder::Account(account), amount)
            .is_err()
        {
            return 0;
        }
        self.flywheel.set_accrued(account, 0);
        self.emit_event(EventPayload::RewardPaid(RewardPaidEvent { account, amount }));
        amount
    }

    /// Admin grant straight from the treasury, outside the flywheel.
    pub fn grant_reward(
        &mut self,
        caller: AccountId,
        recipient: AccountId,
        amount: u128,
    ) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::GrantRewardOwnerCheck,
            )));
        }
        if self.reward_token.balance_of(Holder::Treasury) < amount {
            return Err(self.reject(Failure::new(
                ErrorCode::InsufficientCash,
                FailureSite::GrantRewardTreasuryCheck,
            )));
        }
        self.reward_token
            .transfer(Holder::Treasury, Holder::Account(recipient), amount)
            .map_err(EngineError::TransferOutFailed)?;
        self.emit_event(EventPayload::RewardGranted(RewardPaidEvent {
            account: recipient,
            amount,
        }));
        Ok(())
    }
}
