//! Crate-level error types.
//!
//! [`ConvexError`] unifies every error source (configuration, HTTP, JSON,
//! feed validation, backend rejections) behind a single enum so callers can
//! match on the variant they care about while still using the `?` operator
//! for easy propagation.

use crate::convert::FormError;
use crate::models::response::ApiError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConvexError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum ConvexError {
    /// Environment or file configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An HTTP request could not be sent or its body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A local I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A feed or backend payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The price feed has no usable price for this symbol.
    ///
    /// A quote that depends on this price cannot be computed; callers must
    /// not substitute zero.
    #[error("price unavailable for {symbol}")]
    PriceUnavailable { symbol: String },

    /// The backend rejected the request.
    #[error("backend error: {0}")]
    Api(ApiError),

    /// A submission from the same form is still awaiting its response.
    #[error("a submission is already in flight")]
    SubmissionInFlight,

    /// The quote form is not in a submittable state.
    #[error("form error: {0}")]
    Form(#[from] FormError),
}

impl ConvexError {
    /// Returns `true` when the error means a quote cannot be priced.
    pub fn is_price_unavailable(&self) -> bool {
        matches!(self, Self::PriceUnavailable { .. })
    }
}
