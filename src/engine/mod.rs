// 8.0: the pool engine. one struct coordinates the risk engine (membership,
// liquidity sweeps, admission hooks), the per-market ledgers (accrual, mint,
// redeem, borrow, repay), liquidations, the reward flywheel, and the admin
// surface. deterministic and event-driven with no external I/O.

mod admin;
mod core;
mod ledger;
mod liquidation;
mod rewards;
mod risk;

pub use core::Engine;
