//! Secret references

use serde::{Deserialize, Serialize};

/// Placeholder stored instead of a secret value
pub const REDACTED: &str = "***";

/// Audit record of a secret resolved for a run
///
/// Only the name is kept; the value is always [`REDACTED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub value: String,
}

impl SecretRef {
    pub fn redacted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: REDACTED.to_string(),
        }
    }
}
