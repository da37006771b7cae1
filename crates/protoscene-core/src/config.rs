// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! World configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for a [`World`](crate::World).
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// URL relative EXTERNPROTO candidates are resolved against.
    pub base_url: Option<String>,
    /// Maximum number of entries kept in the diagnostic log.
    pub diagnostics_capacity: usize,
    /// Maximum deliveries processed for one externally sent event before the
    /// rest of the cascade is dropped.
    pub max_cascade: usize,
    /// Thread name prefix for EXTERNPROTO resolver workers.
    pub resolver_thread_name: String,
    /// Join outstanding resolver workers when the world is dropped.
    pub join_on_drop: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            diagnostics_capacity: 256,
            max_cascade: 10_000,
            resolver_thread_name: "protoscene-externproto".to_owned(),
            join_on_drop: true,
        }
    }
}

/// Config decoding failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON did not match the config shape.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl WorldConfig {
    /// Decodes a JSON config document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Sets [`base_url`](Self::base_url).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() -> Result<(), ConfigError> {
        let config =
            WorldConfig::from_json(br#"{"base_url":"http://example.org/scene/","max_cascade":5}"#)?;
        assert_eq!(config.base_url.as_deref(), Some("http://example.org/scene/"));
        assert_eq!(config.max_cascade, 5);
        assert_eq!(config.diagnostics_capacity, WorldConfig::default().diagnostics_capacity);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(WorldConfig::from_json(br#"{"bogus":1}"#).is_err());
    }
}
