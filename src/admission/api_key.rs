//! Constant-time API key check.

use std::sync::Arc;

use crate::error::AppError;

/// Holds the configured set of valid API keys. Cloned cheaply (`Arc` inside)
/// into handler state.
#[derive(Debug, Clone)]
pub struct ApiKeyGate {
    enabled: bool,
    keys: Arc<Vec<String>>,
}

impl ApiKeyGate {
    pub fn new(enabled: bool, keys: Vec<String>) -> Self {
        Self {
            enabled,
            keys: Arc::new(keys),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    /// Checks `presented` against the configured keys in constant time per
    /// candidate, so a timing side-channel can't narrow down a valid key
    /// character by character.
    pub fn check(&self, presented: Option<&str>) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }
        let presented = presented.ok_or_else(|| AppError::api_key_required("X-Api-Key header is required"))?;
        let matched = self.keys.iter().any(|k| constant_time_eq(k.as_bytes(), presented.as_bytes()));
        if matched {
            Ok(())
        } else {
            Err(AppError::api_key_invalid("API key not recognized"))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_allows_anything() {
        let gate = ApiKeyGate::disabled();
        assert!(gate.check(None).is_ok());
    }

    #[test]
    fn enabled_gate_requires_header() {
        let gate = ApiKeyGate::new(true, vec!["key-1".to_string()]);
        assert!(gate.check(None).is_err());
    }

    #[test]
    fn enabled_gate_checks_membership() {
        let gate = ApiKeyGate::new(true, vec!["key-1".to_string(), "key-2".to_string()]);
        assert!(gate.check(Some("key-2")).is_ok());
        assert!(gate.check(Some("key-3")).is_err());
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_lengths() {
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}
