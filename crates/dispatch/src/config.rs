// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatcher configuration
///
/// Every field has a default, so a TOML document only needs the keys it
/// wants to override:
///
/// ```toml
/// name = "ui"
/// idle_wait = "250ms"
/// idle_cycle_limit = 8
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Name used in logs and diagnostics
    pub name: String,
    /// How long an idle worker blocks before re-checking the queue
    #[serde(with = "humantime_serde")]
    pub idle_wait: Duration,
    /// Consecutive empty polls a demand-mode worker tolerates before exiting
    pub idle_cycle_limit: u32,
    /// Maximum number of queued events listed by `Dispatcher::dump`
    pub dump_limit: usize,
}

impl DispatcherConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn with_idle_cycle_limit(mut self, limit: u32) -> Self {
        self.idle_cycle_limit = limit;
        self
    }

    pub fn with_dump_limit(mut self, limit: usize) -> Self {
        self.dump_limit = limit;
        self
    }

    /// Parse a configuration from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "dispatcher".to_string(),
            idle_wait: Duration::from_secs(1),
            idle_cycle_limit: 5,
            dump_limit: 20,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
