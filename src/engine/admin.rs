// 8.18 engine/admin.rs: the governance surface. listing, risk-parameter
// setters with protocol bounds, pause switches with a guardian that can pause
// but never unpause, borrow caps, reserve management, and the two-step admin
// handover. authorization failures are soft: they land in the event log like
// any other rejection.

use super::core::Engine;
use crate::config::{
    CLOSE_FACTOR_MAX, CLOSE_FACTOR_MIN, COLLATERAL_FACTOR_MAX, LIQUIDATION_INCENTIVE_MAX,
    LIQUIDATION_INCENTIVE_MIN, RESERVE_FACTOR_MAX,
};
use crate::errors::{EngineError, ErrorCode, Failure, FailureSite};
use crate::events::{
    ActionPausedEvent, EventPayload, MarketListedEvent, NewAdminEvent, NewBorrowCapEvent,
    NewBorrowCapGuardianEvent, NewCloseFactorEvent, NewCollateralFactorEvent,
    NewLiquidationIncentiveEvent, NewPauseGuardianEvent, NewPendingAdminEvent,
    NewReserveFactorEvent, OracleUpdatedEvent, PauseAction, RateStrategyUpdatedEvent,
    ReservesChangedEvent,
};
use crate::math::{Exp, MathError};
use crate::oracle::PriceOracle;
use crate::rates::RateStrategy;
use crate::token::Holder;
use crate::types::{AccountId, MarketId};

impl Engine {
    fn require_admin(&mut self, caller: AccountId, site: FailureSite) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(self.reject(Failure::new(ErrorCode::Unauthorized, site)));
        }
        Ok(())
    }

    // listing and per-market risk parameters

    /// Admit a market to the risk engine. One-way: a listed market can be
    /// paused but never delisted.
    pub fn support_market(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SupportMarketOwnerCheck)?;
        let listed = self.market(market_id)?.listed;
        if listed {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketAlreadyListed,
                FailureSite::SupportMarketExists,
            )));
        }
        self.market_mut(market_id)?.listed = true;
        let block = self.block;
        self.flywheel.ensure_market(market_id, block);
        self.emit_event(EventPayload::MarketListed(MarketListedEvent {
            market: market_id,
        }));
        Ok(())
    }

    /// Collateral factor for one market. Requires a live price unless the
    /// factor is being zeroed out.
    pub fn set_collateral_factor(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        new_factor: Exp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetCollateralFactorOwnerCheck)?;
        let listed = self
            .markets
            .get(&market_id)
            .map(|m| m.listed)
            .unwrap_or(false);
        if !listed {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::SetCollateralFactorNoExists,
            )));
        }
        if new_factor > COLLATERAL_FACTOR_MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::InvalidParameter,
                FailureSite::SetCollateralFactorValidation,
            )));
        }
        if !new_factor.is_zero() && self.oracle.get_underlying_price(market_id).is_none() {
            return Err(self.reject(Failure::new(
                ErrorCode::PriceError,
                FailureSite::SetCollateralFactorWithoutPrice,
            )));
        }
        let market = self.market_mut(market_id)?;
        let old_factor = market.collateral_factor;
        market.collateral_factor = new_factor;
        self.emit_event(EventPayload::NewCollateralFactor(NewCollateralFactorEvent {
            market: market_id,
            old_factor,
            new_factor,
        }));
        Ok(())
    }

    pub fn set_close_factor(
        &mut self,
        caller: AccountId,
        new_factor: Exp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetCloseFactorOwnerCheck)?;
        if new_factor < CLOSE_FACTOR_MIN || new_factor > CLOSE_FACTOR_MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::InvalidParameter,
                FailureSite::SetCloseFactorValidation,
            )));
        }
        let old_factor = self.risk.close_factor;
        self.risk.close_factor = new_factor;
        self.emit_event(EventPayload::NewCloseFactor(NewCloseFactorEvent {
            old_factor,
            new_factor,
        }));
        Ok(())
    }

    pub fn set_liquidation_incentive(
        &mut self,
        caller: AccountId,
        new_incentive: Exp,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetLiquidationIncentiveOwnerCheck)?;
        if new_incentive < LIQUIDATION_INCENTIVE_MIN || new_incentive > LIQUIDATION_INCENTIVE_MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::InvalidParameter,
                FailureSite::SetLiquidationIncentiveValidation,
            )));
        }
        let old_incentive = self.risk.liquidation_incentive;
        self.risk.liquidation_incentive = new_incentive;
        self.emit_event(EventPayload::NewLiquidationIncentive(
            NewLiquidationIncentiveEvent {
                old_incentive,
                new_incentive,
            },
        ));
        Ok(())
    }

    /// Reserve factor takes effect only on interest accrued after this block,
    /// so the market is accrued first.
    pub fn set_reserve_factor(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        new_factor: Exp,
    ) -> Result<(), EngineError> {
        self.accrue_interest(market_id)?;
        self.require_admin(caller, FailureSite::SetReserveFactorAdminCheck)?;
        if new_factor > RESERVE_FACTOR_MAX {
            return Err(self.reject(Failure::new(
                ErrorCode::InvalidParameter,
                FailureSite::SetReserveFactorBoundsCheck,
            )));
        }
        let market = self.market_mut(market_id)?;
        let old_factor = market.config.reserve_factor;
        market.config.reserve_factor = new_factor;
        self.emit_event(EventPayload::NewReserveFactor(NewReserveFactorEvent {
            market: market_id,
            old_factor,
            new_factor,
        }));
        Ok(())
    }

    /// Swap a market's rate curve. Accrues at the old curve first so the new
    /// one only governs future blocks.
    pub fn set_rate_strategy(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        strategy: Box<dyn RateStrategy>,
    ) -> Result<(), EngineError> {
        self.accrue_interest(market_id)?;
        self.require_admin(caller, FailureSite::SetRateStrategyOwnerCheck)?;
        self.market(market_id)?;
        self.strategies.insert(market_id, strategy);
        self.emit_event(EventPayload::RateStrategyUpdated(RateStrategyUpdatedEvent {
            market: market_id,
        }));
        Ok(())
    }

    pub fn set_price_oracle(
        &mut self,
        caller: AccountId,
        oracle: Box<dyn PriceOracle>,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetOracleOwnerCheck)?;
        self.oracle = oracle;
        self.emit_event(EventPayload::OracleUpdated(OracleUpdatedEvent {}));
        Ok(())
    }

    // pause switches

    pub fn set_pause_guardian(
        &mut self,
        caller: AccountId,
        guardian: Option<AccountId>,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetPauseGuardianOwnerCheck)?;
        let old_guardian = self.pause_guardian;
        self.pause_guardian = guardian;
        self.emit_event(EventPayload::NewPauseGuardian(NewPauseGuardianEvent {
            old_guardian,
            new_guardian: guardian,
        }));
        Ok(())
    }

    pub fn set_mint_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        paused: bool,
    ) -> Result<(), EngineError> {
        self.set_paused(caller, market_id, PauseAction::Mint, paused)
    }

    pub fn set_borrow_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        paused: bool,
    ) -> Result<(), EngineError> {
        self.set_paused(caller, market_id, PauseAction::Borrow, paused)
    }

    pub fn set_transfer_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        paused: bool,
    ) -> Result<(), EngineError> {
        self.set_paused(caller, market_id, PauseAction::Transfer, paused)
    }

    pub fn set_seize_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        paused: bool,
    ) -> Result<(), EngineError> {
        self.set_paused(caller, market_id, PauseAction::Seize, paused)
    }

    /// Guardian or admin may pause; only the admin may unpause.
    fn set_paused(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        action: PauseAction,
        paused: bool,
    ) -> Result<(), EngineError> {
        let authorized = caller == self.admin || Some(caller) == self.pause_guardian;
        if !authorized {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::SetPausedGuardianCheck,
            )));
        }
        if !paused && caller != self.admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::UnpauseAdminCheck,
            )));
        }
        let listed = self.market(market_id)?.listed;
        if !listed {
            return Err(self.reject(Failure::new(
                ErrorCode::MarketNotListed,
                FailureSite::SetPausedGuardianCheck,
            )));
        }
        let market = self.market_mut(market_id)?;
        match action {
            PauseAction::Mint => market.pause.mint = paused,
            PauseAction::Borrow => market.pause.borrow = paused,
            PauseAction::Transfer => market.pause.transfer = paused,
            PauseAction::Seize => market.pause.seize = paused,
        }
        self.emit_event(EventPayload::ActionPaused(ActionPausedEvent {
            market: market_id,
            action,
            paused,
        }));
        Ok(())
    }

    // borrow caps

    pub fn set_borrow_cap_guardian(
        &mut self,
        caller: AccountId,
        guardian: Option<AccountId>,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetBorrowCapGuardianOwnerCheck)?;
        let old_guardian = self.borrow_cap_guardian;
        self.borrow_cap_guardian = guardian;
        self.emit_event(EventPayload::NewBorrowCapGuardian(
            NewBorrowCapGuardianEvent {
                old_guardian,
                new_guardian: guardian,
            },
        ));
        Ok(())
    }

    /// Cap total borrows for a market; zero removes the cap. Admin or the
    /// borrow-cap guardian.
    pub fn set_borrow_cap(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        new_cap: u128,
    ) -> Result<(), EngineError> {
        let authorized = caller == self.admin || Some(caller) == self.borrow_cap_guardian;
        if !authorized {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::SetBorrowCapGuardianCheck,
            )));
        }
        self.market_mut(market_id)?.borrow_cap = new_cap;
        self.emit_event(EventPayload::NewBorrowCap(NewBorrowCapEvent {
            market: market_id,
            new_cap,
        }));
        Ok(())
    }

    // policy knobs

    pub fn set_max_markets_per_account(
        &mut self,
        caller: AccountId,
        max: usize,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetMaxMarketsOwnerCheck)?;
        self.risk.max_markets_per_account = max;
        Ok(())
    }

    pub fn set_transfer_liquidity_exemption(
        &mut self,
        caller: AccountId,
        exempt: bool,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetTransferExemptionOwnerCheck)?;
        self.risk.transfers_exempt_from_liquidity_check = exempt;
        Ok(())
    }

    // reserves

    /// Top up a market's reserves from any benefactor's tokens.
    pub fn add_reserves(
        &mut self,
        benefactor: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<u128, EngineError> {
        self.accrue_interest(market_id)?;
        let (underlying, total_reserves) = {
            let market = self.market(market_id)?;
            (market.config.underlying, market.total_reserves)
        };
        let staged = total_reserves.checked_add(amount).ok_or(Failure::math(
            FailureSite::AddReservesCalculation,
            MathError::Overflow,
        ));
        if let Err(f) = staged {
            return Err(self.reject(f));
        }

        let actual = self
            .token_mut(underlying)?
            .transfer_from(benefactor, Holder::Market(market_id), amount)
            .map_err(EngineError::TransferInFailed)?;

        let market = self.market_mut(market_id)?;
        market.total_reserves += actual;
        let new_total_reserves = market.total_reserves;
        self.emit_event(EventPayload::ReservesAdded(ReservesChangedEvent {
            market: market_id,
            by: benefactor,
            amount: actual,
            new_total_reserves,
        }));
        Ok(actual)
    }

    /// Pay reserves out to the admin. Bounded by both the reserve balance and
    /// the cash actually on hand.
    pub fn reduce_reserves(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        amount: u128,
    ) -> Result<(), EngineError> {
        self.accrue_interest(market_id)?;
        self.require_admin(caller, FailureSite::ReduceReservesAdminCheck)?;
        let cash = self.cash(market_id)?;
        if amount > cash {
            return Err(self.reject(Failure::new(
                ErrorCode::InsufficientCash,
                FailureSite::ReduceReservesCashNotAvailable,
            )));
        }
        let (underlying, total_reserves) = {
            let market = self.market(market_id)?;
            (market.config.underlying, market.total_reserves)
        };
        if amount > total_reserves {
            return Err(self.reject(Failure::new(
                ErrorCode::InvalidParameter,
                FailureSite::ReduceReservesValidation,
            )));
        }

        let admin = self.admin;
        self.token_mut(underlying)?
            .transfer(Holder::Market(market_id), Holder::Account(admin), amount)
            .map_err(EngineError::TransferOutFailed)?;

        let market = self.market_mut(market_id)?;
        market.total_reserves = total_reserves - amount;
        let new_total_reserves = market.total_reserves;
        self.emit_event(EventPayload::ReservesReduced(ReservesChangedEvent {
            market: market_id,
            by: caller,
            amount,
            new_total_reserves,
        }));
        Ok(())
    }

    // admin handover

    pub fn set_pending_admin(
        &mut self,
        caller: AccountId,
        new_pending: Option<AccountId>,
    ) -> Result<(), EngineError> {
        self.require_admin(caller, FailureSite::SetPendingAdminOwnerCheck)?;
        let old_pending = self.pending_admin;
        self.pending_admin = new_pending;
        self.emit_event(EventPayload::NewPendingAdmin(NewPendingAdminEvent {
            old_pending,
            new_pending,
        }));
        Ok(())
    }

    /// The handover completes only when the pending admin claims it.
    pub fn accept_admin(&mut self, caller: AccountId) -> Result<(), EngineError> {
        if Some(caller) != self.pending_admin {
            return Err(self.reject(Failure::new(
                ErrorCode::Unauthorized,
                FailureSite::AcceptAdminPendingAdminCheck,
            )));
        }
        let old_admin = self.admin;
        self.admin = caller;
        self.pending_admin = None;
        self.emit_event(EventPayload::NewAdmin(NewAdminEvent {
            old_admin,
            new_admin: caller,
        }));
        self.emit_event(EventPayload::NewPendingAdmin(NewPendingAdminEvent {
            old_pending: Some(caller),
            new_pending: None,
        }));
        Ok(())
    }
}
