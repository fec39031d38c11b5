//! Confirmation gate for destructive resets.
//!
//! A [`ResetCommand`] can only be obtained by passing validation, so holding one
//! proves the operator typed the exact phrase for the scope it targets.

use super::scope::{MapScope, MapType};

/// Map-type value that short-circuits everything and reports liveness.
pub const HEALTH_CHECK_SENTINEL: &str = "test_health_check";

/// Rejected input. Raised before any read or delete happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid map type: {value}. Valid types: {valid}")]
    InvalidMapType { value: String, valid: String },

    #[error("Confirmation text must be exactly: \"{expected}\"")]
    ConfirmationMismatch { expected: String },
}

impl ValidationError {
    pub(crate) fn invalid_map_type(value: &str, valid: &[&str]) -> Self {
        Self::InvalidMapType {
            value: value.to_string(),
            valid: valid.join(", "),
        }
    }
}

/// The phrase an operator must type to reset `scope`, e.g. `DELETE DEEP DESERT`.
pub fn confirmation_phrase(scope: MapScope) -> String {
    format!("DELETE {}", scope.as_str().to_uppercase().replacen('_', " ", 1))
}

/// A validated, confirmed reset of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetCommand {
    scope: MapScope,
}

/// Outcome of parsing a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedReset {
    HealthCheck,
    Reset(ResetCommand),
}

impl ResetCommand {
    /// Validate a single-partition request in order: health-check sentinel, then
    /// map type, then exact confirmation text.
    pub fn parse(map_type: &str, confirm_text: &str) -> Result<ParsedReset, ValidationError> {
        if map_type == HEALTH_CHECK_SENTINEL {
            return Ok(ParsedReset::HealthCheck);
        }

        let map: MapType = map_type.parse().map_err(|_| {
            let valid: Vec<&str> = MapType::ALL.iter().map(MapType::as_str).collect();
            ValidationError::invalid_map_type(map_type, &valid)
        })?;

        Self::confirmed(MapScope::Single(map), confirm_text).map(ParsedReset::Reset)
    }

    /// Build a reset of every partition. Requires `DELETE COMBINED`.
    pub fn combined(confirm_text: &str) -> Result<Self, ValidationError> {
        Self::confirmed(MapScope::Combined, confirm_text)
    }

    fn confirmed(scope: MapScope, confirm_text: &str) -> Result<Self, ValidationError> {
        let expected = confirmation_phrase(scope);
        if confirm_text != expected {
            return Err(ValidationError::ConfirmationMismatch { expected });
        }
        Ok(Self { scope })
    }

    pub fn scope(&self) -> MapScope {
        self.scope
    }
}
