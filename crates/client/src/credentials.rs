//! Persistence of the realtime auth token.
//!
//! The token is written by the host application's login flow and read back
//! on every connection attempt. A missing token is the expected state for a
//! session that has not logged in yet, not an error.

use crate::storage;

const TOKEN_KEY: &str = "deskwire_auth_token";

/// Read the stored auth token, if any.
pub fn get() -> Option<String> {
    storage::load(TOKEN_KEY)
}

/// Store the auth token. Returns `true` on success.
pub fn set(token: &str) -> bool {
    storage::save(TOKEN_KEY, token)
}

/// Remove the stored token (logout).
pub fn remove() {
    storage::remove(TOKEN_KEY)
}
