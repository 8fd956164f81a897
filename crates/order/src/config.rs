// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Order configuration

use lane_dispatch::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Order configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Name used in logs, diagnostics, and event labels
    pub name: String,
    /// A pending firing within this distance of a new request absorbs it
    #[serde(with = "humantime_serde")]
    pub coalesce_slack: Duration,
}

impl OrderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_coalesce_slack(mut self, slack: Duration) -> Self {
        self.coalesce_slack = slack;
        self
    }

    /// Parse a configuration from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            name: "order".to_string(),
            coalesce_slack: Duration::from_millis(5),
        }
    }
}
