//! Exchange rate feed models.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{ConvexError, Result};

/// Response from the exchange rate feed: units of each currency per 1 USD.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesResponse {
    #[serde(default)]
    pub base_code: Option<String>,
    pub rates: HashMap<String, Decimal>,
}

impl RatesResponse {
    /// Validates the response and returns its rates keyed by upper-case code.
    ///
    /// Non-positive rates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConvexError::MalformedPayload`] if the feed reports a base
    /// other than USD or no usable rate at all.
    pub fn into_table(self) -> Result<HashMap<String, Decimal>> {
        if let Some(base) = &self.base_code
            && !base.eq_ignore_ascii_case("USD")
        {
            return Err(ConvexError::MalformedPayload(format!(
                "rates are based on {base}, expected USD"
            )));
        }

        let table: HashMap<String, Decimal> = self
            .rates
            .into_iter()
            .filter(|(_, rate)| *rate > Decimal::ZERO)
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();

        if table.is_empty() {
            return Err(ConvexError::MalformedPayload(
                "rates response contains no usable rate".to_string(),
            ));
        }
        Ok(table)
    }
}
