// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lane-dispatch: single-worker event dispatcher
//!
//! This crate provides:
//! - `Dispatcher` - serializes events from any number of producers onto one
//!   worker task, strictly FIFO
//! - `Event` / `EventHandle` - an owned unit of work and the producer's view of
//!   its lifecycle
//! - `Handler` - the destination capability an event is delivered to
//!
//! The worker is created either explicitly by [`Dispatcher::start`]
//! (persistent) or implicitly by the first [`Dispatcher::enqueue`] (demand
//! mode, which shuts itself down after sustained idleness).

mod config;
mod dispatcher;
mod error;
mod event;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherId, DispatcherState};
pub use error::{ConfigError, DispatcherError};
pub use event::{Event, EventHandle, EventId, EventState, Handler};

// Re-export so handler implementors don't need their own async-trait dependency
pub use async_trait::async_trait;
