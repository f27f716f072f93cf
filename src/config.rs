// 6.0: engine configuration and the global risk parameters, with the protocol
// bounds that parameter setters enforce. defaults are production-plausible and
// every bound is a named constant so tests can assert against the same values
// the setters check.

use crate::math::{Exp, EXP_SCALE};
use serde::{Deserialize, Serialize};

/// Hard ceiling on the per-block borrow rate a strategy may return
/// (0.0005% per block). Guards against a malicious or broken curve producing
/// runaway interest.
pub const BORROW_RATE_MAX: Exp = Exp {
    mantissa: 5_000_000_000_000,
};

/// Close factor must stay in [5%, 90%].
pub const CLOSE_FACTOR_MIN: Exp = Exp {
    mantissa: EXP_SCALE / 20,
};
pub const CLOSE_FACTOR_MAX: Exp = Exp {
    mantissa: EXP_SCALE * 9 / 10,
};

/// Collateral factors may not reach 90%.
pub const COLLATERAL_FACTOR_MAX: Exp = Exp {
    mantissa: EXP_SCALE * 9 / 10,
};

/// Liquidation incentive must stay in [100%, 150%].
pub const LIQUIDATION_INCENTIVE_MIN: Exp = Exp { mantissa: EXP_SCALE };
pub const LIQUIDATION_INCENTIVE_MAX: Exp = Exp {
    mantissa: EXP_SCALE * 3 / 2,
};

/// Reserve factor may take the whole interest stream but no more.
pub const RESERVE_FACTOR_MAX: Exp = Exp { mantissa: EXP_SCALE };

/// Engine plumbing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Print events as they are emitted.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
        }
    }
}

/// Global risk parameters owned by the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParams {
    /// Max fraction of a borrow repayable in one liquidation.
    pub close_factor: Exp,
    /// Multiplier (> 1.0) rewarding liquidators in seized collateral.
    pub liquidation_incentive: Exp,
    /// Cap on markets an account may enter, bounding the liquidity sweep.
    pub max_markets_per_account: usize,
    /// When set, share transfers skip the sender's hypothetical liquidity
    /// check. Off by default; enabling it is an explicit policy choice.
    pub transfers_exempt_from_liquidity_check: bool,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            close_factor: Exp::from_mantissa(EXP_SCALE / 2), // 50%
            liquidation_incentive: Exp::from_mantissa(EXP_SCALE * 108 / 100), // 1.08x
            max_markets_per_account: 10,
            transfers_exempt_from_liquidity_check: false,
        }
    }
}
