// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lane-order: deferred, coalescing orders on top of lane-dispatch
//!
//! A [`DeferredOrder`] is a reusable job bound to one dispatcher. Callers
//! request a firing time with [`DeferredOrder::activate_at`]; the [`Timer`]
//! turns an elapsed time into an enqueue on the order's dispatcher, where
//! [`DeferredOrder::execute`] runs the payload.

mod config;
mod error;
mod order;
mod timer;
mod timer_queue;

pub use config::OrderConfig;
pub use error::OrderError;
pub use order::{DeferredOrder, OrderId, OrderTask};
pub use timer::{Timer, TimerTarget};
pub use timer_queue::TimerQueue;
