// lending-core: pooled money-market engine.
// risk-first architecture: the cross-market liquidity check gates every
// balance-changing operation. all computation is deterministic integer
// fixed-point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, AccountId, AssetId, BlockNumber
//   2.x  math.rs: checked 18-decimal fixed-point (Exp)
//   3.x  errors.rs: hard failures vs soft (code, site) rejections
//   4.x  rates.rs: utilization + pluggable borrow-rate curves
//   5.x  market.rs: per-market ledger record, account positions
//   6.x  config.rs: engine config, risk params, protocol bounds
//   7.x  rewards.rs: flywheel indices and accruals
//   8.x  engine/: risk engine, ledger ops, liquidation, admin, rewards
//   9.x  oracle.rs: price oracle boundary
//   10.x token.rs: underlying token ledger (fee-on-transfer aware)
//   11.x events.rs: state transition events for audit

// core ledger modules
pub mod engine;
pub mod errors;
pub mod events;
pub mod market;
pub mod math;
pub mod rates;
pub mod rewards;
pub mod types;

// boundary modules
pub mod config;
pub mod oracle;
pub mod token;

// re exports for convenience
pub use config::*;
pub use engine::*;
pub use errors::*;
pub use events::*;
pub use market::*;
pub use math::*;
pub use oracle::*;
pub use rates::*;
pub use rewards::*;
pub use token::*;
pub use types::*;
