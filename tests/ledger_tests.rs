//! Market ledger integration tests.
//!
//! Accrual, mint/redeem, borrow/repay, reserves, and the admin surface,
//! exercised through the full engine with two markets and a shared oracle.

use lending_core::*;

const ADMIN: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(10);
const BOB: AccountId = AccountId(11);
const DAI: MarketId = MarketId(1);
const ETH: MarketId = MarketId(2);

/// One-per-block rate of 1e-6, well under the protocol ceiling. 1000 blocks
/// of accrual is an exact 0.001 simple-interest factor.
fn flat_rate() -> Box<dyn RateStrategy> {
    Box::new(ExternalRateModel::new(Exp::from_mantissa(1_000_000_000_000)))
}

fn setup() -> (Engine, SharedOracle) {
    let oracle = SimplePriceOracle::new().shared();
    oracle.borrow_mut().set_price(DAI, Exp::ONE);
    oracle
        .borrow_mut()
        .set_price(ETH, Exp::from_int(1_000).unwrap());

    let mut engine = Engine::new(
        EngineId(1),
        ADMIN,
        Box::new(oracle.clone()),
        EngineConfig::default(),
    );

    let mut dai = TokenLedger::new(AssetId(1), "DAI");
    let mut eth = TokenLedger::new(AssetId(2), "ETH");
    for account in [ADMIN, ALICE, BOB] {
        dai.mint_to(Holder::Account(account), 1_000_000);
        eth.mint_to(Holder::Account(account), 10_000);
        dai.approve(account, u128::MAX / 2);
        eth.approve(account, u128::MAX / 2);
    }
    engine.add_token(dai);
    engine.add_token(eth);

    for (market, name, underlying) in [(DAI, "pDAI", AssetId(1)), (ETH, "pETH", AssetId(2))] {
        engine
            .add_market(
                MarketConfig {
                    id: market,
                    name: name.to_string(),
                    underlying,
                    initial_exchange_rate: Exp::ONE,
                    reserve_factor: Exp::from_ratio(10, 100).unwrap(),
                },
                flat_rate(),
            )
            .unwrap();
        engine.support_market(ADMIN, market).unwrap();
        engine
            .set_collateral_factor(ADMIN, market, Exp::from_ratio(50, 100).unwrap())
            .unwrap();
    }
    (engine, oracle)
}

fn site_of(err: EngineError) -> FailureSite {
    err.rejection().expect("expected a soft rejection").site
}

#[test]
fn mint_issues_shares_at_initial_rate() {
    let (mut engine, _) = setup();
    let shares = engine.mint(ALICE, DAI, 1_000).unwrap();
    assert_eq!(shares, 1_000);
    assert_eq!(engine.cash(DAI).unwrap(), 1_000);
    assert_eq!(engine.get_market(DAI).unwrap().total_shares, 1_000);
    assert_eq!(engine.position(DAI, ALICE).shares, 1_000);
    // supplier's token balance dropped by exactly the deposit
    assert_eq!(
        engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ALICE)),
        999_000
    );
}

#[test]
fn mint_books_actual_amount_for_fee_on_transfer() {
    let oracle = SimplePriceOracle::new().shared();
    oracle.borrow_mut().set_price(DAI, Exp::ONE);
    let mut engine = Engine::new(
        EngineId(1),
        ADMIN,
        Box::new(oracle),
        EngineConfig::default(),
    );
    let mut fee_token = TokenLedger::new(AssetId(1), "FEE").with_transfer_fee(10);
    fee_token.mint_to(Holder::Account(ALICE), 10_000);
    fee_token.approve(ALICE, u128::MAX / 2);
    engine.add_token(fee_token);
    engine
        .add_market(
            MarketConfig {
                id: DAI,
                name: "pFEE".to_string(),
                underlying: AssetId(1),
                initial_exchange_rate: Exp::ONE,
                reserve_factor: Exp::ZERO,
            },
            flat_rate(),
        )
        .unwrap();
    engine.support_market(ADMIN, DAI).unwrap();

    // 1000 sent, 990 received: shares follow what the pool got
    let shares = engine.mint(ALICE, DAI, 1_000).unwrap();
    assert_eq!(shares, 990);
    assert_eq!(engine.cash(DAI).unwrap(), 990);
}

#[test]
fn redeem_round_trip_restores_balance() {
    let (mut engine, _) = setup();
    let shares = engine.mint(ALICE, DAI, 5_000).unwrap();
    let amount = engine.redeem(ALICE, DAI, shares).unwrap();
    assert_eq!(amount, 5_000);
    assert_eq!(engine.position(DAI, ALICE).shares, 0);
    assert_eq!(
        engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ALICE)),
        1_000_000
    );
}

#[test]
fn redeem_underlying_computes_shares() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 5_000).unwrap();
    let amount = engine.redeem_underlying(ALICE, DAI, 2_000).unwrap();
    assert_eq!(amount, 2_000);
    assert_eq!(engine.position(DAI, ALICE).shares, 3_000);
}

#[test]
fn redeem_without_cash_is_rejected() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 1_000).unwrap();
    // bob drains most of the pool against ETH collateral
    engine.mint(BOB, ETH, 10).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.borrow(BOB, DAI, 800).unwrap();

    let err = engine.redeem(ALICE, DAI, 1_000).unwrap_err();
    assert_eq!(site_of(err), FailureSite::RedeemTransferOut);
    // nothing moved
    assert_eq!(engine.position(DAI, ALICE).shares, 1_000);
}

#[test]
fn redeem_more_than_held_is_rejected() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 1_000).unwrap();
    let err = engine.redeem(ALICE, DAI, 2_000).unwrap_err();
    assert_eq!(site_of(err), FailureSite::RedeemNewAccountShares);
}

#[test]
fn borrow_without_collateral_is_rejected_but_membership_sticks() {
    let (mut engine, _) = setup();
    engine.mint(BOB, DAI, 10_000).unwrap();

    let err = engine.borrow(ALICE, DAI, 1_000).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::InsufficientLiquidity);
    assert_eq!(failure.site, FailureSite::BorrowAllowedLiquidityCheck);
    // the auto-enter committed before the rejection; that partial progress
    // is the soft-failure contract
    assert!(engine.is_member(ALICE, DAI));
    assert_eq!(engine.borrow_balance_stored(DAI, ALICE).unwrap(), 0);
}

#[test]
fn borrow_moves_cash_and_books_debt() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    // 100 ETH * 1000 * 0.5 CF = 50,000 borrow power
    engine.borrow(BOB, DAI, 40_000).unwrap();

    assert_eq!(engine.cash(DAI).unwrap(), 60_000);
    assert_eq!(engine.borrow_balance_stored(DAI, BOB).unwrap(), 40_000);
    assert_eq!(engine.get_market(DAI).unwrap().total_borrows, 40_000);
    assert_eq!(
        engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(BOB)),
        1_040_000
    );
}

#[test]
fn accrual_compounds_index_borrows_and_reserves() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.borrow(BOB, DAI, 40_000).unwrap();

    engine.advance_blocks(1_000);
    engine.accrue_interest(DAI).unwrap();

    // factor 0.001: interest 40, reserves 10% of that
    let market = engine.get_market(DAI).unwrap();
    assert_eq!(market.total_borrows, 40_040);
    assert_eq!(market.total_reserves, 4);
    assert_eq!(market.borrow_index, Exp::from_ratio(1_001, 1_000).unwrap());
    assert_eq!(engine.borrow_balance_stored(DAI, BOB).unwrap(), 40_040);

    // supplier side: (60,000 cash + 40,040 borrows - 4 reserves) / 100,000
    let rate = engine.exchange_rate_stored(DAI).unwrap();
    assert_eq!(rate, Exp::from_ratio(100_036, 100_000).unwrap());
}

#[test]
fn accrue_is_idempotent_within_a_block() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 10_000).unwrap();
    engine.advance_blocks(10);
    engine.accrue_interest(DAI).unwrap();
    let events_after_first = engine.events().len();
    engine.accrue_interest(DAI).unwrap();
    assert_eq!(engine.events().len(), events_after_first);
}

#[test]
fn accrual_rejects_rate_above_ceiling() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 10_000).unwrap();
    // swap in a curve above the per-block ceiling
    engine
        .set_rate_strategy(
            ADMIN,
            DAI,
            Box::new(ExternalRateModel::new(Exp::from_mantissa(
                6_000_000_000_000,
            ))),
        )
        .unwrap();
    engine.advance_blocks(1);
    let err = engine.accrue_interest(DAI).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::BadInput);
    assert_eq!(failure.site, FailureSite::AccrueBorrowRateCeiling);
}

#[test]
fn repay_sentinel_clears_full_balance() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.borrow(BOB, DAI, 40_000).unwrap();
    engine.advance_blocks(1_000);

    let repaid = engine.repay_borrow(BOB, DAI, u128::MAX).unwrap();
    assert_eq!(repaid, 40_040);
    assert_eq!(engine.borrow_balance_stored(DAI, BOB).unwrap(), 0);
    assert_eq!(engine.get_market(DAI).unwrap().total_borrows, 0);
}

#[test]
fn repay_more_than_owed_is_rejected() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.borrow(BOB, DAI, 10_000).unwrap();

    let err = engine.repay_borrow(BOB, DAI, 10_001).unwrap_err();
    assert_eq!(site_of(err), FailureSite::RepayNewAccountBorrows);
    assert_eq!(engine.borrow_balance_stored(DAI, BOB).unwrap(), 10_000);
}

#[test]
fn repay_on_behalf_uses_payer_tokens() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.borrow(BOB, DAI, 10_000).unwrap();

    let alice_before = engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ALICE));
    engine.repay_borrow_behalf(ALICE, BOB, DAI, 10_000).unwrap();
    assert_eq!(engine.borrow_balance_stored(DAI, BOB).unwrap(), 0);
    assert_eq!(
        engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ALICE)),
        alice_before - 10_000
    );
}

#[test]
fn share_transfer_moves_claims() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 1_000).unwrap();
    engine.transfer(ALICE, BOB, DAI, 400).unwrap();
    assert_eq!(engine.position(DAI, ALICE).shares, 600);
    assert_eq!(engine.position(DAI, BOB).shares, 400);

    let err = engine.transfer(ALICE, ALICE, DAI, 1).unwrap_err();
    assert_eq!(site_of(err), FailureSite::TransferSelfTransfer);
}

#[test]
fn reserves_can_be_added_and_reduced() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 10_000).unwrap();
    engine.add_reserves(BOB, DAI, 500).unwrap();
    assert_eq!(engine.get_market(DAI).unwrap().total_reserves, 500);

    let admin_before = engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ADMIN));
    engine.reduce_reserves(ADMIN, DAI, 200).unwrap();
    assert_eq!(engine.get_market(DAI).unwrap().total_reserves, 300);
    assert_eq!(
        engine.token(AssetId(1)).unwrap().balance_of(Holder::Account(ADMIN)),
        admin_before + 200
    );

    let err = engine.reduce_reserves(ADMIN, DAI, 10_000).unwrap_err();
    assert_eq!(site_of(err), FailureSite::ReduceReservesValidation);

    let err = engine.reduce_reserves(BOB, DAI, 1).unwrap_err();
    assert_eq!(site_of(err), FailureSite::ReduceReservesAdminCheck);
}

#[test]
fn guardian_can_pause_but_not_unpause() {
    let (mut engine, _) = setup();
    let guardian = AccountId(99);
    engine.set_pause_guardian(ADMIN, Some(guardian)).unwrap();

    engine.set_mint_paused(guardian, DAI, true).unwrap();
    let err = engine.mint(ALICE, DAI, 100).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::Paused);
    assert_eq!(failure.site, FailureSite::MintAllowed);

    let err = engine.set_mint_paused(guardian, DAI, false).unwrap_err();
    assert_eq!(site_of(err), FailureSite::UnpauseAdminCheck);

    engine.set_mint_paused(ADMIN, DAI, false).unwrap();
    engine.mint(ALICE, DAI, 100).unwrap();
}

#[test]
fn borrow_cap_limits_total_borrows() {
    let (mut engine, _) = setup();
    engine.mint(ALICE, DAI, 100_000).unwrap();
    engine.mint(BOB, ETH, 100).unwrap();
    for r in engine.enter_markets(BOB, &[ETH]) {
        r.unwrap();
    }
    engine.set_borrow_cap(ADMIN, DAI, 10_000).unwrap();

    let err = engine.borrow(BOB, DAI, 20_000).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::BorrowCapExceeded);

    engine.borrow(BOB, DAI, 10_000).unwrap();
    // zero removes the cap
    engine.set_borrow_cap(ADMIN, DAI, 0).unwrap();
    engine.borrow(BOB, DAI, 5_000).unwrap();
}

#[test]
fn parameter_setters_enforce_bounds() {
    let (mut engine, oracle) = setup();

    let err = engine.set_close_factor(ADMIN, Exp::from_ratio(95, 100).unwrap()).unwrap_err();
    assert_eq!(site_of(err), FailureSite::SetCloseFactorValidation);

    let err = engine
        .set_liquidation_incentive(ADMIN, Exp::from_ratio(99, 100).unwrap())
        .unwrap_err();
    assert_eq!(site_of(err), FailureSite::SetLiquidationIncentiveValidation);

    let err = engine
        .set_collateral_factor(ADMIN, DAI, Exp::from_ratio(95, 100).unwrap())
        .unwrap_err();
    assert_eq!(site_of(err), FailureSite::SetCollateralFactorValidation);

    // nonzero collateral factor needs a live price
    oracle.borrow_mut().clear_price(ETH);
    let err = engine
        .set_collateral_factor(ADMIN, ETH, Exp::from_ratio(40, 100).unwrap())
        .unwrap_err();
    assert_eq!(site_of(err), FailureSite::SetCollateralFactorWithoutPrice);
    // zeroing it out is always allowed
    engine.set_collateral_factor(ADMIN, ETH, Exp::ZERO).unwrap();

    let err = engine.set_close_factor(ALICE, Exp::from_ratio(50, 100).unwrap()).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::Unauthorized);
}

#[test]
fn support_market_is_one_shot() {
    let (mut engine, _) = setup();
    let err = engine.support_market(ADMIN, DAI).unwrap_err();
    let failure = err.rejection().unwrap();
    assert_eq!(failure.code, ErrorCode::MarketAlreadyListed);
}

#[test]
fn admin_handover_is_two_step() {
    let (mut engine, _) = setup();
    let new_admin = AccountId(50);
    engine.set_pending_admin(ADMIN, Some(new_admin)).unwrap();
    assert_eq!(engine.admin(), ADMIN);

    let err = engine.accept_admin(ALICE).unwrap_err();
    assert_eq!(site_of(err), FailureSite::AcceptAdminPendingAdminCheck);

    engine.accept_admin(new_admin).unwrap();
    assert_eq!(engine.admin(), new_admin);
    assert_eq!(engine.pending_admin(), None);

    // the old admin has lost its powers
    let err = engine.set_close_factor(ADMIN, Exp::from_ratio(40, 100).unwrap()).unwrap_err();
    assert_eq!(site_of(err), FailureSite::SetCloseFactorOwnerCheck);
}

#[test]
fn market_creation_validates_hard() {
    let (mut engine, _) = setup();
    let err = engine
        .add_market(
            MarketConfig {
                id: DAI,
                name: "dup".to_string(),
                underlying: AssetId(1),
                initial_exchange_rate: Exp::ONE,
                reserve_factor: Exp::ZERO,
            },
            flat_rate(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::MarketAlreadyExists(_)));

    let err = engine
        .add_market(
            MarketConfig {
                id: MarketId(9),
                name: "bad".to_string(),
                underlying: AssetId(42),
                initial_exchange_rate: Exp::ONE,
                reserve_factor: Exp::ZERO,
            },
            flat_rate(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownAsset(_)));

    let err = engine
        .add_market(
            MarketConfig {
                id: MarketId(9),
                name: "bad".to_string(),
                underlying: AssetId(1),
                initial_exchange_rate: Exp::ZERO,
                reserve_factor: Exp::ZERO,
            },
            flat_rate(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidMarketConfig(_)));
}

#[test]
fn soft_failures_land_in_the_event_log() {
    let (mut engine, _) = setup();
    engine.mint(BOB, DAI, 1_000).unwrap();
    engine.borrow(ALICE, DAI, 500).unwrap_err();

    let recorded = engine.events().iter().any(|e| {
        matches!(
            &e.payload,
            EventPayload::Failure(f)
                if f.code == ErrorCode::InsufficientLiquidity
                    && f.site == FailureSite::BorrowAllowedLiquidityCheck
        )
    });
    assert!(recorded);
}
