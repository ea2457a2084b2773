//! Currency and goods holdings.

use serde::{Deserialize, Serialize};

use crate::holdings::{Delta, Holdings};

/// A signed change to a wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletDelta {
    pub currency: i64,
    pub goods: i64,
}

impl WalletDelta {
    pub fn new(currency: i64, goods: i64) -> Self {
        Self { currency, goods }
    }

    pub fn currency(amount: i64) -> Self {
        Self::new(amount, 0)
    }

    pub fn goods(amount: i64) -> Self {
        Self::new(0, amount)
    }

    /// Returns true if the delta changes nothing.
    pub fn is_zero(&self) -> bool {
        self.currency == 0 && self.goods == 0
    }
}

impl Delta for WalletDelta {
    fn inverse(&self) -> Self {
        Self {
            currency: -self.currency,
            goods: -self.goods,
        }
    }
}

/// Currency and goods owned by one account. Neither may go negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: i64,
    pub goods: i64,
}

impl Wallet {
    pub fn new(currency: i64, goods: i64) -> Self {
        Self { currency, goods }
    }

    /// Returns the wallet after `delta`, or `None` if a quantity would go
    /// negative or overflow.
    fn checked_add(&self, delta: &WalletDelta) -> Option<Self> {
        let currency = self.currency.checked_add(delta.currency)?;
        let goods = self.goods.checked_add(delta.goods)?;
        (currency >= 0 && goods >= 0).then_some(Self { currency, goods })
    }
}

impl Holdings for Wallet {
    type Delta = WalletDelta;

    fn validate_and_apply(&mut self, delta: &WalletDelta) -> bool {
        match self.checked_add(delta) {
            Some(next) => {
                *self = next;
                true
            }
            None => false,
        }
    }

    fn reverse(&mut self, delta: &WalletDelta) {
        self.currency = self.currency.saturating_sub(delta.currency);
        self.goods = self.goods.saturating_sub(delta.goods);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_applies_both_quantities() {
        let mut wallet = Wallet::new(5, 0);
        assert!(wallet.validate_and_apply(&WalletDelta::new(-5, 5)));
        assert_eq!(wallet, Wallet::new(0, 5));
    }

    #[test]
    fn insufficient_currency_is_rejected_atomically() {
        let mut wallet = Wallet::new(1, 0);
        assert!(!wallet.validate_and_apply(&WalletDelta::new(-5, 5)));
        assert_eq!(wallet, Wallet::new(1, 0));
    }

    #[test]
    fn insufficient_goods_is_rejected_atomically() {
        let mut wallet = Wallet::new(5, 1);
        assert!(!wallet.validate_and_apply(&WalletDelta::new(5, -5)));
        assert_eq!(wallet, Wallet::new(5, 1));
    }

    #[test]
    fn overflow_is_rejected() {
        let mut wallet = Wallet::new(i64::MAX, 0);
        assert!(!wallet.validate_and_apply(&WalletDelta::currency(1)));
    }

    #[test]
    fn reverse_restores_previous_wallet() {
        let mut wallet = Wallet::new(5, 0);
        let delta = WalletDelta::new(-5, 5);
        assert!(wallet.validate_and_apply(&delta));
        wallet.reverse(&delta);
        assert_eq!(wallet, Wallet::new(5, 0));
    }

    #[test]
    fn delta_inverse_and_zero() {
        let delta = WalletDelta::new(3, -2);
        assert_eq!(delta.inverse(), WalletDelta::new(-3, 2));
        assert!(!delta.is_zero());
        assert!(WalletDelta::default().is_zero());
    }

    #[test]
    fn wallet_serialization_roundtrip() {
        let wallet = Wallet::new(7, 3);
        let json = serde_json::to_string(&wallet).unwrap();
        assert_eq!(json, r#"{"currency":7,"goods":3}"#);
        let back: Wallet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wallet);
    }
}
