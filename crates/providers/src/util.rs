//! Shared utility functions for backend adapters.

use cr_domain::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read the bearer key from the named environment variable.
///
/// Backends without `api_key_env` (e.g. a local Ollama) get `None`.
pub(crate) fn resolve_api_key(env_var: Option<&str>) -> Result<Option<String>> {
    let Some(env_var) = env_var else {
        return Ok(None);
    };
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
        _ => Err(Error::Auth(format!(
            "environment variable '{env_var}' not set or empty"
        ))),
    }
}
