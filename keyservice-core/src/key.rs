//! Versioned key material.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A versioned symmetric secret.
///
/// `previous` holds the secret of `version - 1` during a rotation grace
/// period. Keys are handed out by value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    #[serde(rename = "n", default)]
    version: u16,

    #[serde(rename = "v", default)]
    value: String,

    #[serde(
        rename = "o",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    previous: Option<String>,
}

impl Key {
    pub fn new(version: u16, value: impl Into<String>) -> Self {
        Self {
            version,
            value: value.into(),
            previous: None,
        }
    }

    /// A key still inside its rotation grace period.
    pub fn with_previous(
        version: u16,
        value: impl Into<String>,
        previous: impl Into<String>,
    ) -> Self {
        let previous = previous.into();
        Self {
            version,
            value: value.into(),
            previous: (!previous.is_empty()).then_some(previous),
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// The current secret.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The secret of `version - 1`, if the grace period is still open.
    pub fn previous_value(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Rotates to `new_value`: the version advances by one and the current
    /// secret becomes the previous one.
    ///
    /// Returns `None` once the version space is exhausted.
    pub fn rotate(&self, new_value: impl Into<String>) -> Option<Self> {
        Some(Self {
            version: self.version.checked_add(1)?,
            value: new_value.into(),
            previous: Some(self.value.clone()),
        })
    }

    /// Ends the grace period by dropping the previous secret.
    pub fn retire_previous(&self) -> Self {
        Self::new(self.version, self.value.clone())
    }

    /// Picks the secret that opens a payload sealed under `version`.
    ///
    /// The previous secret is used only for exactly `self.version - 1`.
    /// Every other mismatch falls back to the current secret and is left to
    /// fail at decryption.
    pub fn secret_for(&self, version: u16) -> &str {
        if version == self.version.wrapping_sub(1) {
            if let Some(previous) = self.previous.as_deref() {
                return previous;
            }
        }
        &self.value
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("version", &self.version)
            .field("has_previous", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
