// 9.0: price oracle boundary. the engine only ever asks one question: what is
// the underlying price of a market, in value units per underlying unit. a
// missing or zero price is "unavailable" and must propagate as PriceError in
// the risk engine, never default to anything.

use crate::math::Exp;
use crate::types::MarketId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub trait PriceOracle: std::fmt::Debug {
    /// Price of the market's underlying, 1e18-scaled. `None` means the feed is
    /// down or the asset is unlisted on the oracle side.
    fn get_underlying_price(&self, market: MarketId) -> Option<Exp>;
}

/// In-memory price table. Production deployments put a real feed behind the
/// trait; tests and the simulator post prices here directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimplePriceOracle {
    prices: HashMap<MarketId, Exp>,
}

impl SimplePriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, market: MarketId, price: Exp) {
        self.prices.insert(market, price);
    }

    pub fn clear_price(&mut self, market: MarketId) {
        self.prices.remove(&market);
    }

    /// Wrap in a shared handle so a test can keep posting prices after the
    /// engine takes ownership of the oracle.
    pub fn shared(self) -> SharedOracle {
        Rc::new(RefCell::new(self))
    }
}

impl PriceOracle for SimplePriceOracle {
    fn get_underlying_price(&self, market: MarketId) -> Option<Exp> {
        match self.prices.get(&market) {
            Some(p) if !p.is_zero() => Some(*p),
            _ => None,
        }
    }
}

pub type SharedOracle = Rc<RefCell<SimplePriceOracle>>;

impl PriceOracle for SharedOracle {
    fn get_underlying_price(&self, market: MarketId) -> Option<Exp> {
        self.borrow().get_underlying_price(market)
    }
}
