//! Backend response envelopes and error bodies.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// A rejection reported by the backend.
///
/// Field errors are kept per input name so the UI can attach each message
/// to the field it concerns; `message` is the blocking, form-level text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
    /// Builds an error from a non-success status and its raw body.
    ///
    /// Bodies that are not JSON are relayed as the message text.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => {
                let message = parsed
                    .message
                    .or(parsed.error)
                    .or_else(|| {
                        parsed
                            .errors
                            .values()
                            .flat_map(|msgs| msgs.first())
                            .next()
                            .cloned()
                    })
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                Self {
                    status,
                    message,
                    field_errors: parsed.errors,
                }
            }
            Err(_) => Self {
                status,
                message: if body.trim().is_empty() {
                    format!("request failed with status {status}")
                } else {
                    body.trim().to_string()
                },
                field_errors: BTreeMap::new(),
            },
        }
    }

    /// First message attached to `field`, if any.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.field_errors
            .get(field)
            .and_then(|msgs| msgs.first())
            .map(String::as_str)
    }

    /// Returns `true` for 422-style validation rejections.
    pub fn is_validation(&self) -> bool {
        !self.field_errors.is_empty()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}
