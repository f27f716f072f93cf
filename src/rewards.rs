// 7.0: reward flywheel state. proportional reward accrual driven by hooks on
// every balance-changing event: each market carries a supply index and a borrow
// index that advance with (speed × elapsed blocks) spread over the active
// total, and each account carries checkpoints of the last index it settled at.
// accrued rewards sit here until the engine pays them from the treasury.

use crate::errors::{Failure, FailureSite};
use crate::math::Exp;
use crate::types::{AccountId, BlockNumber, MarketId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index value a market (and implicitly every fresh account checkpoint)
/// starts at.
pub const REWARD_INITIAL_INDEX: Exp = Exp::ONE;

/// Per-market reward accumulator state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardMarketState {
    pub supply_index: Exp,
    pub supply_block: BlockNumber,
    pub borrow_index: Exp,
    pub borrow_block: BlockNumber,
    /// Reward units emitted per block to this market, split between the
    /// supply and borrow side sweeps that reference it.
    pub speed: u128,
}

impl RewardMarketState {
    fn new(block: BlockNumber) -> Self {
        Self {
            supply_index: REWARD_INITIAL_INDEX,
            supply_block: block,
            borrow_index: REWARD_INITIAL_INDEX,
            borrow_block: block,
            speed: 0,
        }
    }
}

/// The reward distributor. Owns indices and pending accruals; reads but never
/// mutates share/borrow balances, which the engine passes in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flywheel {
    markets: HashMap<MarketId, RewardMarketState>,
    supplier_index: HashMap<(MarketId, AccountId), Exp>,
    borrower_index: HashMap<(MarketId, AccountId), Exp>,
    accrued: HashMap<AccountId, u128>,
    /// Total emission per block, divided across markets by `refresh_speeds`.
    pub reward_rate: u128,
    /// Minimum pending accrual worth paying out automatically.
    pub claim_threshold: u128,
}

impl Flywheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a market the first time it is listed. Idempotent.
    pub fn ensure_market(&mut self, market: MarketId, block: BlockNumber) {
        self.markets
            .entry(market)
            .or_insert_with(|| RewardMarketState::new(block));
    }

    pub fn market_state(&self, market: MarketId) -> Option<&RewardMarketState> {
        self.markets.get(&market)
    }

    pub fn speed(&self, market: MarketId) -> u128 {
        self.markets.get(&market).map(|s| s.speed).unwrap_or(0)
    }

    pub fn set_speed(&mut self, market: MarketId, speed: u128, block: BlockNumber) {
        self.ensure_market(market, block);
        if let Some(state) = self.markets.get_mut(&market) {
            state.speed = speed;
        }
    }

    pub fn tracked_markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.keys().copied()
    }

    /// Advance the supply-side index by `speed × elapsed / total_shares`.
    /// No elapsed blocks, zero speed, or an empty supply leaves the index
    /// unchanged (never divides by zero); the block checkpoint still advances.
    pub fn update_supply_index(
        &mut self,
        market: MarketId,
        total_shares: u128,
        block: BlockNumber,
    ) -> Result<(), Failure> {
        let Some(state) = self.markets.get_mut(&market) else {
            return Ok(());
        };
        let elapsed = block.delta(state.supply_block);
        if elapsed > 0 && state.speed > 0 && total_shares > 0 {
            let site = FailureSite::RewardSupplyIndex;
            let emitted = state
                .speed
                .checked_mul(elapsed as u128)
                .ok_or_else(|| Failure::math(site, crate::math::MathError::Overflow))?;
            let ratio = Exp::from_ratio(emitted, total_shares).map_err(|e| Failure::math(site, e))?;
            state.supply_index = state.supply_index.add(ratio).map_err(|e| Failure::math(site, e))?;
        }
        state.supply_block = block;
        Ok(())
    }

    /// Borrow-side twin. `borrow_principal_units` is total borrows deflated by
    /// the market's borrow index, so the denominator does not inflate as
    /// interest compounds.
    pub fn update_borrow_index(
        &mut self,
        market: MarketId,
        borrow_principal_units: u128,
        block: BlockNumber,
    ) -> Result<(), Failure> {
        let Some(state) = self.markets.get_mut(&market) else {
            return Ok(());
        };
        let elapsed = block.delta(state.borrow_block);
        if elapsed > 0 && state.speed > 0 && borrow_principal_units > 0 {
            let site = FailureSite::RewardBorrowIndex;
            let emitted = state
                .speed
                .checked_mul(elapsed as u128)
                .ok_or_else(|| Failure::math(site, crate::math::MathError::Overflow))?;
            let ratio = Exp::from_ratio(emitted, borrow_principal_units)
                .map_err(|e| Failure::math(site, e))?;
            state.borrow_index = state.borrow_index.add(ratio).map_err(|e| Failure::math(site, e))?;
        }
        state.borrow_block = block;
        Ok(())
    }

    /// Settle a supplier against the current supply index. Runs even for a
    /// first-time account (zero delta) so the checkpoint exists and later
    /// growth is never double-counted. Returns the reward delta.
    pub fn distribute_supplier(
        &mut self,
        market: MarketId,
        account: AccountId,
        shares: u128,
    ) -> Result<u128, Failure> {
        let Some(state) = self.markets.get(&market) else {
            return Ok(0);
        };
        let index = state.supply_index;
        let checkpoint = self
            .supplier_index
            .insert((market, account), index)
            .unwrap_or(REWARD_INITIAL_INDEX);
        self.settle(account, index, checkpoint, shares)
    }

    /// Borrow-side twin; `borrow_principal_units` is the account's borrow
    /// balance deflated by the market borrow index.
    pub fn distribute_borrower(
        &mut self,
        market: MarketId,
        account: AccountId,
        borrow_principal_units: u128,
    ) -> Result<u128, Failure> {
        let Some(state) = self.markets.get(&market) else {
            return Ok(0);
        };
        let index = state.borrow_index;
        let checkpoint = self
            .borrower_index
            .insert((market, account), index)
            .unwrap_or(REWARD_INITIAL_INDEX);
        self.settle(account, index, checkpoint, borrow_principal_units)
    }

    fn settle(
        &mut self,
        account: AccountId,
        index: Exp,
        checkpoint: Exp,
        balance: u128,
    ) -> Result<u128, Failure> {
        let site = FailureSite::RewardDistribution;
        let delta_index = index.sub(checkpoint).map_err(|e| Failure::math(site, e))?;
        let delta = delta_index
            .mul_scalar_truncate(balance)
            .map_err(|e| Failure::math(site, e))?;
        if delta > 0 {
            let total = self.accrued.entry(account).or_insert(0);
            *total = total
                .checked_add(delta)
                .ok_or_else(|| Failure::math(site, crate::math::MathError::Overflow))?;
        }
        Ok(delta)
    }

    /// Rewards accrued but not yet paid.
    pub fn accrued(&self, account: AccountId) -> u128 {
        self.accrued.get(&account).copied().unwrap_or(0)
    }

    /// Engine calls this after a successful treasury payout.
    pub fn set_accrued(&mut self, account: AccountId, amount: u128) {
        if amount == 0 {
            self.accrued.remove(&account);
        } else {
            self.accrued.insert(account, amount);
        }
    }

    pub fn supplier_checkpoint(&self, market: MarketId, account: AccountId) -> Option<Exp> {
        self.supplier_index.get(&(market, account)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: MarketId = MarketId(1);
    const A: AccountId = AccountId(10);

    #[test]
    fn zero_speed_never_moves_index() {
        let mut fw = Flywheel::new();
        fw.ensure_market(M, BlockNumber(0));
        fw.update_supply_index(M, 1_000_000, BlockNumber(500)).unwrap();
        fw.update_borrow_index(M, 1_000_000, BlockNumber(500)).unwrap();
        let state = fw.market_state(M).unwrap();
        assert_eq!(state.supply_index, REWARD_INITIAL_INDEX);
        assert_eq!(state.borrow_index, REWARD_INITIAL_INDEX);
        // the block checkpoint still advances
        assert_eq!(state.supply_block, BlockNumber(500));
    }

    #[test]
    fn empty_supply_never_divides_by_zero() {
        let mut fw = Flywheel::new();
        fw.ensure_market(M, BlockNumber(0));
        fw.set_speed(M, 1_000, BlockNumber(0));
        fw.update_supply_index(M, 0, BlockNumber(100)).unwrap();
        assert_eq!(fw.market_state(M).unwrap().supply_index, REWARD_INITIAL_INDEX);
    }

    #[test]
    fn index_growth_is_speed_times_blocks_over_total() {
        let mut fw = Flywheel::new();
        fw.ensure_market(M, BlockNumber(0));
        fw.set_speed(M, 100, BlockNumber(0));
        fw.update_supply_index(M, 1_000, BlockNumber(10)).unwrap();
        // 100/block * 10 blocks / 1000 shares = 1.0 of index growth
        let expected = REWARD_INITIAL_INDEX.add(Exp::ONE).unwrap();
        assert_eq!(fw.market_state(M).unwrap().supply_index, expected);
    }

    #[test]
    fn first_time_account_checkpoints_with_zero_delta() {
        let mut fw = Flywheel::new();
        fw.ensure_market(M, BlockNumber(0));
        let delta = fw.distribute_supplier(M, A, 500).unwrap();
        assert_eq!(delta, 0);
        assert_eq!(fw.accrued(A), 0);
        assert_eq!(fw.supplier_checkpoint(M, A), Some(REWARD_INITIAL_INDEX));
    }

    #[test]
    fn supplier_accrues_index_delta_times_balance() {
        let mut fw = Flywheel::new();
        fw.ensure_market(M, BlockNumber(0));
        fw.set_speed(M, 10, BlockNumber(0));
        fw.distribute_supplier(M, A, 500).unwrap();

        // 10/block * 100 blocks over 1000 shares -> index +1.0
        fw.update_supply_index(M, 1_000, BlockNumber(100)).unwrap();
        let delta = fw.distribute_supplier(M, A, 500).unwrap();
        assert_eq!(delta, 500); // 500 shares * 1.0

        // settling again with no index movement accrues nothing
        let delta = fw.distribute_supplier(M, A, 500).unwrap();
        assert_eq!(delta, 0);
        assert_eq!(fw.accrued(A), 500);
    }

    #[test]
    fn untracked_market_is_a_no_op() {
        let mut fw = Flywheel::new();
        assert_eq!(fw.distribute_supplier(MarketId(99), A, 10).unwrap(), 0);
        fw.update_supply_index(MarketId(99), 10, BlockNumber(5)).unwrap();
        assert!(fw.market_state(MarketId(99)).is_none());
    }
}
