//! Session token storage in the OS keychain.
//!
//! At startup, [`populate_env_from_keychain`] copies a stored bearer token
//! into `CONVEX_API_TOKEN` so [`crate::config::fetch_config`] picks it up
//! like any other setting.

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::ConvexError;

/// Keychain service name.
const SERVICE: &str = "convex";

/// Keychain entry holding the backend bearer token.
const TOKEN_ENTRY: &str = "api_token";

/// Environment variable the token is exported to.
pub const TOKEN_ENV: &str = "CONVEX_API_TOKEN";

fn entry() -> crate::Result<keyring::Entry> {
    keyring::Entry::new(SERVICE, TOKEN_ENTRY)
        .map_err(|e| ConvexError::Config(format!("keyring entry error: {e}")))
}

/// Loads the stored token, returning `None` if there is none.
pub fn load_token() -> Option<Zeroizing<String>> {
    let entry = entry().ok()?;
    match entry.get_password() {
        Ok(token) => Some(Zeroizing::new(token)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Stores the token after a successful login.
pub fn save_token(token: &str) -> crate::Result<()> {
    entry()?
        .set_password(token)
        .map_err(|e| ConvexError::Config(format!("failed to save to keychain: {e}")))
}

/// Removes the stored token on logout. Missing entries are not an error.
pub fn clear_token() -> crate::Result<()> {
    match entry()?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(ConvexError::Config(format!(
            "failed to delete keychain entry: {e}"
        ))),
    }
}

/// Exports the stored token to [`TOKEN_ENV`] unless it is already set.
///
/// Call this at startup before [`crate::config::fetch_config`], from a
/// synchronous `main` before the async runtime and its worker threads exist.
pub fn populate_env_from_keychain() {
    if std::env::var(TOKEN_ENV).is_ok() {
        return;
    }
    if let Some(token) = load_token() {
        debug!(var = TOKEN_ENV, "loaded session token from keychain");
        // SAFETY: callers run this before spawning any thread, so nothing can
        // read the environment concurrently.
        unsafe {
            std::env::set_var(TOKEN_ENV, token.as_str());
        }
    }
}
