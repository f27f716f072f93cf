//! Money Market Core Simulation.
//!
//! Demonstrates the full pooled-lending lifecycle: supply and borrow across
//! markets, interest accrual over blocks, a price-crash liquidation, and the
//! reward flywheel.

use lending_core::*;

const ADMIN: AccountId = AccountId(1);
const DAI: MarketId = MarketId(1);
const ETH: MarketId = MarketId(2);

fn main() {
    println!("Money Market Core Engine Simulation");
    println!("Shared Liquidity, Cross-Market Collateral, Block-Driven Accrual\n");

    scenario_1_supply_and_borrow();
    scenario_2_interest_accrual();
    scenario_3_price_crash_liquidation();
    scenario_4_reward_flywheel();

    println!("\nAll simulations completed successfully.");
}

/// Two listed markets over a shared oracle, collateral factors set, pools
/// seeded with token balances for the named accounts.
fn setup(accounts: &[(AccountId, u128, u128)]) -> (Engine, SharedOracle) {
    let oracle = SimplePriceOracle::new().shared();
    oracle.borrow_mut().set_price(DAI, Exp::ONE);
    oracle
        .borrow_mut()
        .set_price(ETH, Exp::from_int(2_000).unwrap());

    let mut engine = Engine::new(
        EngineId(1),
        ADMIN,
        Box::new(oracle.clone()),
        EngineConfig::default(),
    );

    let mut dai = TokenLedger::new(AssetId(1), "DAI");
    let mut eth = TokenLedger::new(AssetId(2), "ETH");
    for &(account, dai_balance, eth_balance) in accounts {
        dai.mint_to(Holder::Account(account), dai_balance);
        eth.mint_to(Holder::Account(account), eth_balance);
        dai.approve(account, u128::MAX / 2);
        eth.approve(account, u128::MAX / 2);
    }
    engine.add_token(dai);
    engine.add_token(eth);

    let rates = JumpRateModel::per_year(
        Exp::from_ratio(2, 100).unwrap(),
        Exp::from_ratio(20, 100).unwrap(),
        Exp::from_int(4).unwrap(),
        Exp::from_ratio(80, 100).unwrap(),
    );
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
                Box::new(rates),
            )
            .unwrap();
        engine.support_market(ADMIN, market).unwrap();
        engine
            .set_collateral_factor(ADMIN, market, Exp::from_ratio(75, 100).unwrap())
            .unwrap();
    }
    (engine, oracle)
}

/// Supply in one market, borrow from another against it.
fn scenario_1_supply_and_borrow() {
    println!("Scenario 1: Supply and Cross-Market Borrow\n");

    let alice = AccountId(10);
    let bob = AccountId(11);
    let (mut engine, _oracle) = setup(&[(alice, 0, 100), (bob, 500_000, 0)]);

    // bob seeds the DAI pool; alice posts ETH and borrows DAI against it
    engine.mint(bob, DAI, 500_000).unwrap();
    let shares = engine.mint(alice, ETH, 100).unwrap();
    println!("  Bob supplies 500,000 DAI; Alice supplies 100 ETH -> {} shares", shares);

    for result in engine.enter_markets(alice, &[ETH]) {
        result.unwrap();
    }
    let (liquidity, shortfall) = engine.get_account_liquidity(alice).unwrap();
    println!("  Alice borrow power: {} value units (shortfall {})", liquidity, shortfall);

    engine.borrow(alice, DAI, 100_000).unwrap();
    let owed = engine.borrow_balance_stored(DAI, alice).unwrap();
    println!("  Alice borrows 100,000 DAI, owes {}", owed);

    let (liquidity, _) = engine.get_account_liquidity(alice).unwrap();
    println!("  Remaining borrow power: {}\n", liquidity);
}

/// Interest compounds per block; suppliers earn through the exchange rate.
fn scenario_2_interest_accrual() {
    println!("Scenario 2: Interest Accrual\n");

    let alice = AccountId(10);
    let bob = AccountId(11);
    let (mut engine, _oracle) = setup(&[(alice, 0, 1_000), (bob, 1_000_000_000, 0)]);

    engine.mint(bob, DAI, 1_000_000_000).unwrap();
    engine.mint(alice, ETH, 1_000).unwrap();
    for result in engine.enter_markets(alice, &[ETH]) {
        result.unwrap();
    }
    engine.borrow(alice, DAI, 600_000_000).unwrap();

    let rate_before = engine.exchange_rate_stored(DAI).unwrap();
    println!("  600M of 1,000M borrowed, exchange rate {}", rate_before);

    engine.advance_blocks(BLOCKS_PER_YEAR as u64);
    engine.accrue_interest(DAI).unwrap();

    let market = engine.get_market(DAI).unwrap();
    let rate_after = engine.exchange_rate_stored(DAI).unwrap();
    println!("  One year later: total borrows {}, reserves {}", market.total_borrows, market.total_reserves);
    println!("  Exchange rate {} -> {}", rate_before, rate_after);

    let owed = engine.borrow_balance_stored(DAI, alice).unwrap();
    println!("  Alice owes {} (borrowed 600,000,000)\n", owed);
}

/// Collateral price crash makes a borrower liquidatable.
fn scenario_3_price_crash_liquidation() {
    println!("Scenario 3: Price Crash and Liquidation\n");

    let borrower = AccountId(10);
    let whale = AccountId(11);
    let liquidator = AccountId(12);
    let (mut engine, oracle) = setup(&[
        (borrower, 0, 100),
        (whale, 10_000_000, 0),
        (liquidator, 1_000_000, 0),
    ]);

    engine.mint(whale, DAI, 10_000_000).unwrap();
    engine.mint(borrower, ETH, 100).unwrap();
    for result in engine.enter_markets(borrower, &[ETH]) {
        result.unwrap();
    }
    // 100 ETH @ 2000 * 0.75 CF = 150,000 borrow power; borrow close to it
    engine.borrow(borrower, DAI, 140_000).unwrap();
    println!("  Borrower: 100 ETH collateral, 140,000 DAI borrowed");

    oracle
        .borrow_mut()
        .set_price(ETH, Exp::from_int(1_500).unwrap());
    let (_, shortfall) = engine.get_account_liquidity(borrower).unwrap();
    println!("  ETH drops to 1,500 -> shortfall {}", shortfall);

    // close factor caps the repay at half the borrow
    let seized = engine
        .liquidate_borrow(liquidator, borrower, DAI, 70_000, ETH)
        .unwrap();
    println!("  Liquidator repays 70,000 DAI, seizes {} ETH shares", seized);

    let owed = engine.borrow_balance_stored(DAI, borrower).unwrap();
    let remaining = engine.position(ETH, borrower).shares;
    println!("  Borrower now owes {}, holds {} ETH shares", owed, remaining);

    let (_, shortfall) = engine.get_account_liquidity(borrower).unwrap();
    println!("  Post-liquidation shortfall: {}\n", shortfall);
}

/// Reward emission proportional to participation, paid from the treasury.
fn scenario_4_reward_flywheel() {
    println!("Scenario 4: Reward Flywheel\n");

    let alice = AccountId(10);
    let bob = AccountId(11);
    let (mut engine, _oracle) = setup(&[(alice, 300_000, 0), (bob, 100_000, 0)]);

    engine.fund_reward_treasury(1_000_000);
    engine.set_reward_speed(ADMIN, DAI, 100).unwrap();

    // alice supplies 3x what bob does
    engine.mint(alice, DAI, 300_000).unwrap();
    engine.mint(bob, DAI, 100_000).unwrap();

    engine.advance_blocks(1_000);
    let alice_paid = engine.claim_reward(alice).unwrap();
    let bob_paid = engine.claim_reward(bob).unwrap();

    println!("  Speed 100/block for 1,000 blocks, supply split 3:1");
    println!("  Alice claims {}, Bob claims {}", alice_paid, bob_paid);
    println!("  Treasury remaining: {}", engine.reward_treasury_balance());
    println!("  Events generated: {}", engine.events().len());
}
