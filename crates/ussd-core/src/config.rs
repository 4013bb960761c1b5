// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// What happens to a pending send when a newer send replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedePolicy {
    /// Answer the superseded caller with `SESSION_SUPERSEDED`.
    Fail,
    /// Drop the superseded caller's result sink without an answer.
    Orphan,
}

/// Settings for the USSD plugin and its platform bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the request/response endpoint exposed to the host.
    pub method_channel: String,
    /// Name of the persistent event-stream endpoint.
    pub event_channel: String,
    /// Lowest Android API level with `TelephonyManager.sendUssdRequest` (26).
    pub min_sdk_version: u32,
    pub supersede_policy: SupersedePolicy,
    /// Treat numbered options ("1. Balance") as a menu even without a line break.
    pub detect_menu_options: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            method_channel: "ussd_bridge".into(),
            event_channel: "ussd_bridge/events".into(),
            min_sdk_version: 26,
            supersede_policy: SupersedePolicy::Fail,
            detect_menu_options: true,
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&data)?;
        debug!(path = %path.as_ref().display(), "bridge config loaded");
        Ok(config)
    }

    /// Like [`BridgeConfig::load`] but falls back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "using default bridge config");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "supersede_policy": "orphan", "min_sdk_version": 28 }"#).unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.supersede_policy, SupersedePolicy::Orphan);
        assert_eq!(config.min_sdk_version, 28);
        assert_eq!(config.method_channel, "ussd_bridge");
        assert!(config.detect_menu_options);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(BridgeConfig::load(&path).is_err());
        assert_eq!(BridgeConfig::load_or_default(&path), BridgeConfig::default());
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(config, BridgeConfig::default());
    }
}
