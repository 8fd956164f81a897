// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the dispatcher

use thiserror::Error;

/// Errors returned by dispatcher lifecycle operations
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("dispatcher {0} already has a live worker")]
    AlreadyRunning(String),
    #[error("no tokio runtime available to host the dispatcher worker")]
    NoRuntime,
}

/// Errors loading a configuration document
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
