//! Staking plan configuration and staking request/response models.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A staking offer for one asset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StakingPlan {
    pub id: u64,
    /// Ticker of the staked asset, e.g. `"ETH"`.
    pub crypto_currency: String,
    /// Annual reward rate in percent.
    pub annual_rate: Decimal,
    /// Smallest stake accepted, in asset units.
    pub min_amount: Decimal,
    /// Lock period in days; zero means flexible.
    #[serde(default)]
    pub lock_days: u32,
}

/// Staking plans loaded from `staking_plans.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StakingPlans {
    pub plans: Vec<StakingPlan>,
}

impl StakingPlans {
    /// Loads staking plans from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a plan
    /// has a negative rate or minimum.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::ConvexError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let plans: Self = serde_json::from_str(&contents)?;
        if let Some(bad) = plans
            .plans
            .iter()
            .find(|p| p.annual_rate < Decimal::ZERO || p.min_amount < Decimal::ZERO)
        {
            return Err(crate::ConvexError::Config(format!(
                "staking plan {} has a negative rate or minimum",
                bad.id
            )));
        }
        Ok(plans)
    }

    /// Looks up a plan by id.
    pub fn get(&self, id: u64) -> Option<&StakingPlan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// All plans offered for an asset ticker.
    pub fn for_asset<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a StakingPlan> {
        self.plans
            .iter()
            .filter(move |p| p.crypto_currency.eq_ignore_ascii_case(symbol))
    }
}

/// `POST /stake` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeRequest {
    pub crypto_currency: String,
    pub amount: Decimal,
    pub plan_id: u64,
}

/// Lifecycle state of a stake on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    Active,
    Completed,
    Cancelled,
    Unstaked,
}

/// A stake as reported by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StakePosition {
    pub id: u64,
    pub plan_id: u64,
    pub crypto_currency: String,
    pub amount: Decimal,
    pub status: StakeStatus,
    #[serde(default)]
    pub reward: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
            "plans": [
                {"id": 1, "crypto_currency": "ETH", "annual_rate": "4.5", "min_amount": "0.1", "lock_days": 30},
                {"id": 2, "crypto_currency": "ETH", "annual_rate": "2", "min_amount": "0.01"},
                {"id": 3, "crypto_currency": "SOL", "annual_rate": "7", "min_amount": "1", "lock_days": 90}
            ]
        }"#
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let plans = StakingPlans::load(file.path()).unwrap();
        assert_eq!(plans.plans.len(), 3);
        assert_eq!(plans.get(1).unwrap().annual_rate, dec!(4.5));
        assert_eq!(plans.get(2).unwrap().lock_days, 0);
        assert_eq!(plans.for_asset("eth").count(), 2);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StakingPlans::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, crate::ConvexError::Config(_)));
    }

    #[test]
    fn negative_rate_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"plans": [{"id": 9, "crypto_currency": "BTC", "annual_rate": "-1", "min_amount": "0"}]}"#,
        )
        .unwrap();
        let err = StakingPlans::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("plan 9"));
    }

    #[test]
    fn position_status_parses() {
        let json = r#"{"id": 5, "plan_id": 1, "crypto_currency": "ETH", "amount": "2", "status": "active"}"#;
        let position: StakePosition = serde_json::from_str(json).unwrap();
        assert_eq!(position.status, StakeStatus::Active);
        assert_eq!(position.reward, Decimal::ZERO);
    }
}
