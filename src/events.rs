// 11.0: every state change produces an event. used for audit trails, state
// reconstruction, and off-chain indexers. soft failures that do not abort the
// surrounding bookkeeping also land here as structured Failure records so an
// observer can tell "same broad error, different cause" apart.

use crate::errors::{ErrorCode, FailureSite};
use crate::math::Exp;
use crate::types::{AccountId, BlockNumber, MarketId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block: BlockNumber,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block: BlockNumber, payload: EventPayload) -> Self {
        Self { id, block, payload }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // market lifecycle
    MarketListed(MarketListedEvent),
    NewCollateralFactor(NewCollateralFactorEvent),
    NewReserveFactor(NewReserveFactorEvent),
    NewBorrowCap(NewBorrowCapEvent),
    NewBorrowCapGuardian(NewBorrowCapGuardianEvent),
    RateStrategyUpdated(RateStrategyUpdatedEvent),
    OracleUpdated(OracleUpdatedEvent),
    ActionPaused(ActionPausedEvent),

    // global risk parameters
    NewCloseFactor(NewCloseFactorEvent),
    NewLiquidationIncentive(NewLiquidationIncentiveEvent),

    // administration
    NewPendingAdmin(NewPendingAdminEvent),
    NewAdmin(NewAdminEvent),
    NewPauseGuardian(NewPauseGuardianEvent),

    // membership
    MarketEntered(MembershipEvent),
    MarketExited(MembershipEvent),

    // ledger operations
    AccrueInterest(AccrueInterestEvent),
    Mint(MintEvent),
    Redeem(RedeemEvent),
    Borrow(BorrowEvent),
    RepayBorrow(RepayBorrowEvent),
    LiquidateBorrow(LiquidateBorrowEvent),
    Seize(SeizeEvent),
    TransferShares(TransferSharesEvent),
    ReservesAdded(ReservesChangedEvent),
    ReservesReduced(ReservesChangedEvent),

    // rewards
    RewardSpeedUpdated(RewardSpeedUpdatedEvent),
    DistributedSupplierReward(DistributedRewardEvent),
    DistributedBorrowerReward(DistributedRewardEvent),
    RewardPaid(RewardPaidEvent),
    RewardGranted(RewardPaidEvent),

    // soft failures
    Failure(FailureEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListedEvent {
    pub market: MarketId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCollateralFactorEvent {
    pub market: MarketId,
    pub old_factor: Exp,
    pub new_factor: Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReserveFactorEvent {
    pub market: MarketId,
    pub old_factor: Exp,
    pub new_factor: Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBorrowCapEvent {
    pub market: MarketId,
    pub new_cap: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBorrowCapGuardianEvent {
    pub old_guardian: Option<AccountId>,
    pub new_guardian: Option<AccountId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateStrategyUpdatedEvent {
    pub market: MarketId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleUpdatedEvent {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseAction {
    Mint,
    Borrow,
    Transfer,
    Seize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPausedEvent {
    pub market: MarketId,
    pub action: PauseAction,
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCloseFactorEvent {
    pub old_factor: Exp,
    pub new_factor: Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLiquidationIncentiveEvent {
    pub old_incentive: Exp,
    pub new_incentive: Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPendingAdminEvent {
    pub old_pending: Option<AccountId>,
    pub new_pending: Option<AccountId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdminEvent {
    pub old_admin: AccountId,
    pub new_admin: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPauseGuardianEvent {
    pub old_guardian: Option<AccountId>,
    pub new_guardian: Option<AccountId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub market: MarketId,
    pub account: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrueInterestEvent {
    pub market: MarketId,
    pub cash_prior: u128,
    pub interest_accumulated: u128,
    pub new_borrow_index: Exp,
    pub new_total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintEvent {
    pub market: MarketId,
    pub minter: AccountId,
    pub amount: u128,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemEvent {
    pub market: MarketId,
    pub redeemer: AccountId,
    pub amount: u128,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub market: MarketId,
    pub borrower: AccountId,
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepayBorrowEvent {
    pub market: MarketId,
    pub payer: AccountId,
    pub borrower: AccountId,
    pub amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidateBorrowEvent {
    pub market: MarketId,
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub repay_amount: u128,
    pub collateral_market: MarketId,
    pub seize_shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeizeEvent {
    pub collateral_market: MarketId,
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSharesEvent {
    pub market: MarketId,
    pub from: AccountId,
    pub to: AccountId,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservesChangedEvent {
    pub market: MarketId,
    pub by: AccountId,
    pub amount: u128,
    pub new_total_reserves: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSpeedUpdatedEvent {
    pub market: MarketId,
    pub speed: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedRewardEvent {
    pub market: MarketId,
    pub account: AccountId,
    pub delta: u128,
    pub index: Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardPaidEvent {
    pub account: AccountId,
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub code: ErrorCode,
    pub site: FailureSite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_for_indexers() {
        let event = Event::new(
            EventId(1),
            BlockNumber(42),
            EventPayload::Mint(MintEvent {
                market: MarketId(1),
                minter: AccountId(7),
                amount: 1_000,
                shares: 1_000,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"Mint\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(1));
        assert_eq!(back.block, BlockNumber(42));
    }

    #[test]
    fn failure_records_carry_code_and_site() {
        let payload = EventPayload::Failure(FailureEvent {
            code: ErrorCode::Paused,
            site: FailureSite::MintAllowed,
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("Paused"));
        assert!(json.contains("MintAllowed"));
    }
}
