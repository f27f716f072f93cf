// 8.1 engine/core.rs: main engine struct. all state lives here: markets and
// their rate strategies, per-account positions and memberships, the oracle,
// underlying token ledgers, the reward flywheel, and the event log.

use crate::config::{EngineConfig, RiskParams, RESERVE_FACTOR_MAX};
use crate::errors::{EngineError, Failure};
use crate::events::{Event, EventId, EventPayload, FailureEvent};
use crate::market::{AccountPosition, Market, MarketConfig};
use crate::math::Exp;
use crate::oracle::PriceOracle;
use crate::rates::RateStrategy;
use crate::rewards::Flywheel;
use crate::token::{Holder, TokenLedger};
use crate::types::{AccountId, AssetId, BlockNumber, EngineId, MarketId};
use std::collections::HashMap;

/** 8.2: the engine. markets are created unlisted; the admin surface lists
them, sets risk parameters, and wires rewards. */
#[derive(Debug)]
pub struct Engine {
    pub(super) id: EngineId,
    pub(super) config: EngineConfig,
    pub(super) risk: RiskParams,
    pub(super) admin: AccountId,
    pub(super) pending_admin: Option<AccountId>,
    pub(super) pause_guardian: Option<AccountId>,
    pub(super) borrow_cap_guardian: Option<AccountId>,
    pub(super) markets: HashMap<MarketId, Market>,
    pub(super) strategies: HashMap<MarketId, Box<dyn RateStrategy>>,
    pub(super) positions: HashMap<(MarketId, AccountId), AccountPosition>,
    pub(super) memberships: HashMap<AccountId, Vec<MarketId>>,
    pub(super) oracle: Box<dyn PriceOracle>,
    pub(super) tokens: HashMap<AssetId, TokenLedger>,
    pub(super) reward_token: TokenLedger,
    pub(super) flywheel: Flywheel,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) block: BlockNumber,
}

impl Engine {
    pub fn new(
        id: EngineId,
        admin: AccountId,
        oracle: Box<dyn PriceOracle>,
        config: EngineConfig,
    ) -> Self {
        Self {
            id,
            config,
            risk: RiskParams::default(),
            admin,
            pending_admin: None,
            pause_guardian: None,
            borrow_cap_guardian: None,
            markets: HashMap::new(),
            strategies: HashMap::new(),
            positions: HashMap::new(),
            memberships: HashMap::new(),
            oracle,
            tokens: HashMap::new(),
            reward_token: TokenLedger::new(AssetId(u32::MAX), "RWD"),
            flywheel: Flywheel::new(),
            events: Vec::new(),
            next_event_id: 1,
            block: BlockNumber::zero(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn pending_admin(&self) -> Option<AccountId> {
        self.pending_admin
    }

    pub fn risk_params(&self) -> &RiskParams {
        &self.risk
    }

    // 8.3: the block clock. all accrual deltas are measured against this.

    pub fn block(&self) -> BlockNumber {
        self.block
    }

    pub fn set_block(&mut self, block: BlockNumber) {
        self.block = block;
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block = BlockNumber(self.block.0 + blocks);
    }

    // 8.4: market and token registration. creation is a hard-error surface:
    // nothing has been listed yet, so a bad config aborts with no ledger state.

    /// Register an underlying asset's token ledger with the engine.
    pub fn add_token(&mut self, ledger: TokenLedger) {
        self.tokens.insert(ledger.asset, ledger);
    }

    /// Create a market over a registered underlying. The market starts
    /// unlisted; `support_market` admits it to the risk engine.
    pub fn add_market(
        &mut self,
        config: MarketConfig,
        strategy: Box<dyn RateStrategy>,
    ) -> Result<MarketId, EngineError> {
        let market_id = config.id;
        if self.markets.contains_key(&market_id) {
            return Err(EngineError::MarketAlreadyExists(market_id));
        }
        if !self.tokens.contains_key(&config.underlying) {
            return Err(EngineError::UnknownAsset(config.underlying));
        }
        if config.initial_exchange_rate.is_zero() {
            return Err(EngineError::InvalidMarketConfig(
                "initial exchange rate must be positive",
            ));
        }
        if config.reserve_factor > RESERVE_FACTOR_MAX {
            return Err(EngineError::InvalidMarketConfig(
                "reserve factor above maximum",
            ));
        }
        let market = Market::new(config, self.id, self.block);
        self.markets.insert(market_id, market);
        self.strategies.insert(market_id, strategy);
        Ok(market_id)
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&Market> {
        self.markets.get(&market_id)
    }

    pub(super) fn market(&self, market_id: MarketId) -> Result<&Market, EngineError> {
        self.markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    pub(super) fn market_mut(&mut self, market_id: MarketId) -> Result<&mut Market, EngineError> {
        self.markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    pub fn token(&self, asset: AssetId) -> Result<&TokenLedger, EngineError> {
        self.tokens.get(&asset).ok_or(EngineError::UnknownAsset(asset))
    }

    pub fn token_mut(&mut self, asset: AssetId) -> Result<&mut TokenLedger, EngineError> {
        self.tokens
            .get_mut(&asset)
            .ok_or(EngineError::UnknownAsset(asset))
    }

    /// Underlying held by the market's pool right now.
    pub fn cash(&self, market_id: MarketId) -> Result<u128, EngineError> {
        let market = self.market(market_id)?;
        let token = self.token(market.config.underlying)?;
        Ok(token.balance_of(Holder::Market(market_id)))
    }

    // 8.5: positions and memberships. positions are implicit: any (market,
    // account) pair reads as an empty position until something is booked.

    pub fn position(&self, market_id: MarketId, account: AccountId) -> AccountPosition {
        self.positions
            .get(&(market_id, account))
            .copied()
            .unwrap_or_default()
    }

    pub(super) fn position_mut(
        &mut self,
        market_id: MarketId,
        account: AccountId,
    ) -> &mut AccountPosition {
        self.positions.entry((market_id, account)).or_default()
    }

    /// Markets the account has entered as collateral.
    pub fn assets_in(&self, account: AccountId) -> &[MarketId] {
        self.memberships
            .get(&account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_member(&self, account: AccountId, market_id: MarketId) -> bool {
        self.assets_in(account).contains(&market_id)
    }

    // 8.6: stored views. these read the ledger as-is without accruing.

    /// Exchange rate from current pool state; does not accrue first.
    pub fn exchange_rate_stored(&self, market_id: MarketId) -> Result<Exp, EngineError> {
        let cash = self.cash(market_id)?;
        let market = self.market(market_id)?;
        market.exchange_rate(cash).map_err(EngineError::from)
    }

    /// Borrow balance at the stored borrow index.
    pub fn borrow_balance_stored(
        &self,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<u128, EngineError> {
        let market = self.market(market_id)?;
        let position = self.position(market_id, account);
        position.borrow_balance(market.borrow_index).map_err(EngineError::from)
    }

    /// (shares, borrow balance, exchange rate) in one read, the shape the
    /// liquidity sweep consumes.
    pub fn get_account_snapshot(
        &self,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<(u128, u128, Exp), EngineError> {
        let shares = self.position(market_id, account).shares;
        let borrows = self.borrow_balance_stored(market_id, account)?;
        let rate = self.exchange_rate_stored(market_id)?;
        Ok((shares, borrows, rate))
    }

    pub fn borrow_rate_per_block(&self, market_id: MarketId) -> Result<Exp, EngineError> {
        let cash = self.cash(market_id)?;
        let market = self.market(market_id)?;
        let strategy = self
            .strategies
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        strategy
            .borrow_rate(cash, market.total_borrows, market.total_reserves)
            .map_err(|e| Failure::math(crate::errors::FailureSite::AccrueBorrowRate, e).into())
    }

    pub fn supply_rate_per_block(&self, market_id: MarketId) -> Result<Exp, EngineError> {
        let cash = self.cash(market_id)?;
        let market = self.market(market_id)?;
        let strategy = self
            .strategies
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        strategy
            .supply_rate(
                cash,
                market.total_borrows,
                market.total_reserves,
                market.config.reserve_factor,
            )
            .map_err(|e| Failure::math(crate::errors::FailureSite::AccrueBorrowRate, e).into())
    }

    // 8.7: rewards plumbing shared with the flywheel module.

    pub fn reward_accrued(&self, account: AccountId) -> u128 {
        self.flywheel.accrued(account)
    }

    pub fn reward_treasury_balance(&self) -> u128 {
        self.reward_token.balance_of(Holder::Treasury)
    }

    pub fn reward_balance(&self, account: AccountId) -> u128 {
        self.reward_token.balance_of(Holder::Account(account))
    }

    /// Seed the reward treasury. Faucet for tests and the simulator.
    pub fn fund_reward_treasury(&mut self, amount: u128) {
        self.reward_token.mint_to(Holder::Treasury, amount);
    }

    pub fn reward_speed(&self, market_id: MarketId) -> u128 {
        self.flywheel.speed(market_id)
    }

    // 8.8: event log.

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.block, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    /// Record a soft failure in the event log and hand back the rejection.
    /// State written before this point stays written; that is the soft-failure
    /// contract.
    pub(super) fn reject(&mut self, failure: Failure) -> EngineError {
        self.emit_event(EventPayload::Failure(FailureEvent {
            code: failure.code,
            site: failure.site,
        }));
        EngineError::Rejected(failure)
    }
}
