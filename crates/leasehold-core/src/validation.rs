//! Input validation performed before any store round-trip

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{LockError, Result};
use crate::model::{MAX_KEY_LENGTH, MAX_LOCK_TTL, MIN_LOCK_TTL};

/// Resource keys: 1 to 256 ASCII letters, digits, underscores or hyphens
static KEY_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(&format!("^[a-zA-Z0-9_-]{{1,{}}}$", MAX_KEY_LENGTH))
        .expect("Invalid regex pattern")
});

/// Validate a resource key
///
/// # Examples
///
/// ```
/// use leasehold_core::validate_key;
///
/// assert!(validate_key("job-42").is_ok());
/// assert!(validate_key("with spaces").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<()> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(LockError::InvalidKey(key.to_string()))
    }
}

/// Validate a lease TTL against `[MIN_LOCK_TTL, MAX_LOCK_TTL]`
pub fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl < MIN_LOCK_TTL || ttl > MAX_LOCK_TTL {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(())
}
