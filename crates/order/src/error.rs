// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for orders and the timer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} cannot be awaited from its own dispatcher worker")]
    WorkerContext(String),
    #[error("no tokio runtime available to drive the timer")]
    NoRuntime,
}
