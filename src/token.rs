// 10.0: underlying token ledger, specified at its interface boundary only.
// standard balance / allowance / transfer semantics with one twist the market
// ledger must survive: fee-on-transfer assets, where the amount received is
// less than the amount sent. transfer methods therefore return the amount
// actually credited, and callers book that, not the requested amount.

use crate::types::{AccountId, AssetId, MarketId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Who can hold underlying tokens. Market pools and the reward treasury are
/// first-class holders next to user accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Market(MarketId),
    Treasury,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TokenError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("insufficient allowance: requested {requested}, approved {approved}")]
    InsufficientAllowance { requested: u128, approved: u128 },
}

/// One fungible asset's book of balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    pub asset: AssetId,
    pub symbol: String,
    balances: HashMap<Holder, u128>,
    /// Approval granted by an account to the pool engine for transfer-in.
    allowances: HashMap<AccountId, u128>,
    /// Flat fee burned on every transfer. Zero for standard assets; non-zero
    /// models fee-on-transfer underlyings.
    pub transfer_fee: u128,
}

impl TokenLedger {
    pub fn new(asset: AssetId, symbol: impl Into<String>) -> Self {
        Self {
            asset,
            symbol: symbol.into(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            transfer_fee: 0,
        }
    }

    pub fn with_transfer_fee(mut self, fee: u128) -> Self {
        self.transfer_fee = fee;
        self
    }

    pub fn balance_of(&self, holder: Holder) -> u128 {
        self.balances.get(&holder).copied().unwrap_or(0)
    }

    /// Issue new units to a holder. Faucet for tests and the simulator.
    pub fn mint_to(&mut self, holder: Holder, amount: u128) {
        *self.balances.entry(holder).or_insert(0) += amount;
    }

    pub fn allowance(&self, owner: AccountId) -> u128 {
        self.allowances.get(&owner).copied().unwrap_or(0)
    }

    /// Approve the pool engine to pull up to `amount` from `owner`.
    pub fn approve(&mut self, owner: AccountId, amount: u128) {
        self.allowances.insert(owner, amount);
    }

    /// Move tokens. Returns the amount actually credited to `to`, which is
    /// `amount - transfer_fee` for fee-on-transfer assets.
    pub fn transfer(&mut self, from: Holder, to: Holder, amount: u128) -> Result<u128, TokenError> {
        let available = self.balance_of(from);
        if amount > available {
            return Err(TokenError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let received = amount.saturating_sub(self.transfer_fee);
        *self.balances.entry(from).or_insert(0) -= amount;
        *self.balances.entry(to).or_insert(0) += received;
        Ok(received)
    }

    /// Engine-initiated pull against a prior approval. Decrements the
    /// allowance by the requested amount, then transfers.
    pub fn transfer_from(
        &mut self,
        owner: AccountId,
        to: Holder,
        amount: u128,
    ) -> Result<u128, TokenError> {
        let approved = self.allowance(owner);
        if amount > approved {
            return Err(TokenError::InsufficientAllowance {
                requested: amount,
                approved,
            });
        }
        let received = self.transfer(Holder::Account(owner), to, amount)?;
        self.allowances.insert(owner, approved - amount);
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> TokenLedger {
        let mut t = TokenLedger::new(AssetId(1), "DAI");
        t.mint_to(Holder::Account(AccountId(1)), 1_000);
        t
    }

    #[test]
    fn transfer_moves_balances() {
        let mut t = ledger();
        let received = t
            .transfer(Holder::Account(AccountId(1)), Holder::Market(MarketId(1)), 400)
            .unwrap();
        assert_eq!(received, 400);
        assert_eq!(t.balance_of(Holder::Account(AccountId(1))), 600);
        assert_eq!(t.balance_of(Holder::Market(MarketId(1))), 400);
    }

    #[test]
    fn transfer_rejects_over_balance() {
        let mut t = ledger();
        let err = t
            .transfer(Holder::Account(AccountId(1)), Holder::Treasury, 2_000)
            .unwrap_err();
        assert_eq!(
            err,
            TokenError::InsufficientBalance {
                requested: 2_000,
                available: 1_000
            }
        );
        // no partial mutation
        assert_eq!(t.balance_of(Holder::Account(AccountId(1))), 1_000);
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut t = ledger();
        t.approve(AccountId(1), 500);
        t.transfer_from(AccountId(1), Holder::Market(MarketId(1)), 300)
            .unwrap();
        assert_eq!(t.allowance(AccountId(1)), 200);

        let err = t
            .transfer_from(AccountId(1), Holder::Market(MarketId(1)), 300)
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { .. }));
    }

    #[test]
    fn fee_on_transfer_credits_less() {
        let mut t = TokenLedger::new(AssetId(2), "FEE").with_transfer_fee(10);
        t.mint_to(Holder::Account(AccountId(1)), 1_000);
        let received = t
            .transfer(Holder::Account(AccountId(1)), Holder::Market(MarketId(1)), 100)
            .unwrap();
        assert_eq!(received, 90);
        assert_eq!(t.balance_of(Holder::Account(AccountId(1))), 900);
        assert_eq!(t.balance_of(Holder::Market(MarketId(1))), 90);
    }
}
