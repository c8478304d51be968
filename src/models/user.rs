//! Backend user profile models.
//!
//! The profile endpoint reports cash either as a top-level `balance` or
//! nested as `wallet.balance`, depending on backend version. Both are
//! accepted.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::Holding;

/// Authenticated user profile with balances.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    balance: Option<Decimal>,
    #[serde(default)]
    wallet: Option<Wallet>,
    #[serde(default)]
    pub assets: Vec<UserAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct Wallet {
    #[serde(default)]
    balance: Option<Decimal>,
}

/// One held asset as reported in the profile.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAsset {
    pub id: serde_json::Value,
    #[serde(default)]
    pub name: String,
    pub symbol: String,
    pub amount: Decimal,
}

impl UserProfile {
    /// Cash balance in the base currency; zero when the backend reports none.
    pub fn cash_balance(&self) -> Decimal {
        self.balance
            .or_else(|| self.wallet.as_ref().and_then(|w| w.balance))
            .unwrap_or_default()
    }

    /// Holdings with a positive amount, normalized to [`Holding`].
    pub fn holdings(&self) -> Vec<Holding> {
        self.assets
            .iter()
            .filter(|a| a.amount > Decimal::ZERO)
            .map(|a| Holding {
                asset_id: id_string(&a.id),
                symbol: a.symbol.to_uppercase(),
                name: a.name.clone(),
                amount: a.amount,
            })
            .collect()
    }
}

/// Asset ids arrive as numbers or strings; both become strings.
fn id_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
