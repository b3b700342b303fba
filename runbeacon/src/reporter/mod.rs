// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration of run lifecycle events into a webhook notification.
//!
//! The main type here is [`WebhookReporter`]. Hosts (or thin adapters over
//! a host's plugin interface) drive it with three calls: `on_run_started`,
//! one `on_test_finished` per execution attempt, and `on_run_finished`.

mod events;
mod imp;
mod payload;

pub use events::*;
pub use imp::*;
pub use payload::*;
