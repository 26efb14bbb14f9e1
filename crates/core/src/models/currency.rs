//! Currency codes and multi-currency balances.
//!
//! Amounts are integer minor units. A [`Balance`] never holds a negative
//! value for any currency: debits are checked before they are applied.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WalletError, WalletResult};

/// Currency codes accepted by the ledger.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "CUP", "MLC", "USD", "EUR", "CAD", "GBP", "MXN", "CHF", "JPY", "BRL", "ARS", "COP",
];

/// A validated currency code from [`SUPPORTED_CURRENCIES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct CurrencyCode(&'static str);

impl CurrencyCode {
    /// Parse a currency code. Lowercase input is normalised.
    pub fn parse(code: &str) -> WalletResult<Self> {
        let normalised = code.trim().to_ascii_uppercase();
        SUPPORTED_CURRENCIES
            .iter()
            .find(|known| **known == normalised)
            .map(|known| Self(*known))
            .ok_or_else(|| WalletError::InvalidInput(format!("unsupported currency code '{}'", code)))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Self::parse(&code).map_err(serde::de::Error::custom)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0.to_string()
    }
}

/// Per-currency amounts in minor units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: BTreeMap<CurrencyCode, i64>,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount held in `currency` (zero if never credited).
    pub fn get(&self, currency: CurrencyCode) -> i64 {
        self.amount.get(&currency).copied().unwrap_or(0)
    }

    /// Whether debiting `amount` keeps the balance non-negative.
    pub fn can_debit(&self, amount: i64, currency: CurrencyCode) -> bool {
        self.get(currency)
            .checked_sub(amount)
            .is_some_and(|left| left >= 0)
    }

    /// Whether crediting `amount` stays representable.
    pub fn can_credit(&self, amount: i64, currency: CurrencyCode) -> bool {
        self.get(currency).checked_add(amount).is_some()
    }

    pub fn credit(&mut self, amount: i64, currency: CurrencyCode) -> WalletResult<()> {
        ensure_positive(amount)?;
        let current = self.get(currency);
        let next = current.checked_add(amount).ok_or_else(|| {
            WalletError::InvalidInput(format!("{} balance would overflow", currency))
        })?;
        self.amount.insert(currency, next);
        Ok(())
    }

    pub fn debit(&mut self, amount: i64, currency: CurrencyCode) -> WalletResult<()> {
        ensure_positive(amount)?;
        if !self.can_debit(amount, currency) {
            return Err(WalletError::InsufficientFunds {
                currency,
                available: self.get(currency),
                requested: amount,
            });
        }
        self.amount.insert(currency, self.get(currency) - amount);
        Ok(())
    }

    /// Restrict the balance to a single currency, reporting zero if absent.
    pub fn only(&self, currency: CurrencyCode) -> Balance {
        let mut amount = BTreeMap::new();
        amount.insert(currency, self.get(currency));
        Balance { amount }
    }
}

/// Reject zero and negative amounts.
pub(crate) fn ensure_positive(amount: i64) -> WalletResult<()> {
    if amount <= 0 {
        return Err(WalletError::InvalidInput(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}
