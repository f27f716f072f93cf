// 3.0: error taxonomy. two families, per the accounting model:
//
// hard failures (EngineError) abort the whole call with no ledger mutation:
// bad constructor arguments, token transfer failures, cross-engine seizure.
//
// soft failures (Failure) are structured (code, site) pairs: admission-hook
// rejections, authorization checks, and checked-math failures. the site names
// the exact computation or check that failed so callers and tests can tell
// "new total borrows overflowed" apart from "borrower is under water".

use crate::math::MathError;
use crate::token::TokenError;
use crate::types::{AssetId, MarketId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad reason a soft failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ErrorCode {
    #[error("caller is not authorized")]
    Unauthorized,
    #[error("market is not listed")]
    MarketNotListed,
    #[error("market is already listed")]
    MarketAlreadyListed,
    #[error("market interest has not been accrued to the current block")]
    MarketNotFresh,
    #[error("operation would leave the account under-collateralized")]
    InsufficientLiquidity,
    #[error("borrower is not under water")]
    InsufficientShortfall,
    #[error("repay amount exceeds the close factor limit")]
    TooMuchRepay,
    #[error("account still has an outstanding borrow in this market")]
    NonzeroBorrowBalance,
    #[error("oracle price unavailable")]
    PriceError,
    #[error("action is paused for this market")]
    Paused,
    #[error("account has entered the maximum number of markets")]
    TooManyMarkets,
    #[error("parameter outside its allowed range")]
    InvalidParameter,
    #[error("pool cash cannot cover the requested amount")]
    InsufficientCash,
    #[error("borrower collateral cannot cover the seizure")]
    InsufficientCollateral,
    #[error("market borrow cap would be exceeded")]
    BorrowCapExceeded,
    #[error("malformed request")]
    BadInput,
    #[error("math failure: {0}")]
    Math(MathError),
}

/// The exact check or computation that produced a soft failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureSite {
    // interest accrual
    AccrueBorrowRate,
    AccrueBorrowRateCeiling,
    AccrueSimpleInterestFactor,
    AccrueInterestAccumulated,
    AccrueNewTotalBorrows,
    AccrueNewTotalReserves,
    AccrueNewBorrowIndex,

    // exchange rate and borrow balance reads
    ExchangeRateCalculation,
    BorrowBalanceCheckpoint,
    BorrowBalanceAccumulation,

    // mint
    MintFreshnessCheck,
    MintSharesCalculation,
    MintNewTotalShares,
    MintNewAccountShares,

    // redeem
    RedeemFreshnessCheck,
    RedeemSharesCalculation,
    RedeemAmountCalculation,
    RedeemNewTotalShares,
    RedeemNewAccountShares,
    RedeemTransferOut,

    // borrow
    BorrowFreshnessCheck,
    BorrowCashNotAvailable,
    BorrowNewAccountBorrows,
    BorrowNewTotalBorrows,

    // repay
    RepayFreshnessCheck,
    RepayNewAccountBorrows,
    RepayNewTotalBorrows,

    // share transfer
    TransferSelfTransfer,
    TransferNewFromShares,
    TransferNewToShares,

    // liquidation and seizure
    LiquidateFreshnessCheck,
    LiquidateCollateralFreshnessCheck,
    LiquidateLiquidatorIsBorrower,
    LiquidateCloseAmountIsZero,
    LiquidateCloseAmountIsMax,
    LiquidateSeizePrice,
    LiquidateSeizeCalculation,
    LiquidateSeizeTooMuch,
    SeizeNewBorrowerShares,
    SeizeNewLiquidatorShares,

    // admission hooks
    MintAllowed,
    RedeemAllowed,
    RedeemAllowedLiquidityCheck,
    BorrowAllowed,
    BorrowAllowedPriceCheck,
    BorrowAllowedCapCheck,
    BorrowAllowedLiquidityCheck,
    BorrowAllowedMembershipLimit,
    RepayBorrowAllowed,
    LiquidateBorrowAllowed,
    LiquidateBorrowAllowedShortfallCheck,
    LiquidateBorrowAllowedRepayTooMuch,
    SeizeAllowed,
    TransferAllowed,
    TransferAllowedLiquidityCheck,

    // liquidity sweep
    LiquidityPriceCheck,
    LiquidityCalculation,

    // membership
    EnterMarketsNotListed,
    EnterMarketsMembershipLimit,
    ExitMarketBalanceOwed,
    ExitMarketRejection,

    // administration
    SetPendingAdminOwnerCheck,
    AcceptAdminPendingAdminCheck,
    SetPauseGuardianOwnerCheck,
    SetPausedGuardianCheck,
    UnpauseAdminCheck,
    SetCloseFactorOwnerCheck,
    SetCloseFactorValidation,
    SetCollateralFactorOwnerCheck,
    SetCollateralFactorNoExists,
    SetCollateralFactorValidation,
    SetCollateralFactorWithoutPrice,
    SetLiquidationIncentiveOwnerCheck,
    SetLiquidationIncentiveValidation,
    SupportMarketOwnerCheck,
    SupportMarketExists,
    SetReserveFactorAdminCheck,
    SetReserveFactorBoundsCheck,
    SetRateStrategyOwnerCheck,
    SetOracleOwnerCheck,
    SetBorrowCapGuardianCheck,
    SetBorrowCapGuardianOwnerCheck,
    SetTransferExemptionOwnerCheck,
    SetMaxMarketsOwnerCheck,
    AddReservesCalculation,
    ReduceReservesAdminCheck,
    ReduceReservesCashNotAvailable,
    ReduceReservesValidation,

    // rewards
    RewardSupplyIndex,
    RewardBorrowIndex,
    RewardDistribution,
    SetRewardSpeedOwnerCheck,
    SetRewardRateOwnerCheck,
    GrantRewardOwnerCheck,
    GrantRewardTreasuryCheck,
}

/// A soft failure: what went wrong and exactly where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code} [{site:?}]")]
pub struct Failure {
    pub code: ErrorCode,
    pub site: FailureSite,
}

impl Failure {
    pub fn new(code: ErrorCode, site: FailureSite) -> Self {
        Self { code, site }
    }

    pub fn math(site: FailureSite, err: MathError) -> Self {
        Self {
            code: ErrorCode::Math(err),
            site,
        }
    }
}

/// Top-level operation error. `Rejected` carries a soft failure; the other
/// variants are hard failures that never leave partial ledger state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("market {0:?} already exists")]
    MarketAlreadyExists(MarketId),

    #[error("unknown asset {0:?}")]
    UnknownAsset(AssetId),

    #[error("invalid market config: {0}")]
    InvalidMarketConfig(&'static str),

    #[error("markets {0:?} and {1:?} belong to different risk engines")]
    EngineMismatch(MarketId, MarketId),

    #[error("transfer in failed: {0}")]
    TransferInFailed(TokenError),

    #[error("transfer out failed: {0}")]
    TransferOutFailed(TokenError),

    #[error("rejected: {0}")]
    Rejected(Failure),
}

impl From<Failure> for EngineError {
    fn from(f: Failure) -> Self {
        EngineError::Rejected(f)
    }
}

impl EngineError {
    /// The soft-failure payload, if this is a rejection.
    pub fn rejection(&self) -> Option<Failure> {
        match self {
            EngineError::Rejected(f) => Some(*f),
            _ => None,
        }
    }
}
