// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry ingestion and log forwarding for the HSP logging Lambda extension.
//!
//! The runtime's Telemetry API pushes batches of events to a local
//! [`receiver`], which appends them to a shared [`queue`]. Before every poll
//! for the next lifecycle event the [`orchestrator`] asks the [`dispatcher`]
//! to drain that queue, run every event through the [`parser`] and ship the
//! accepted records, 25 at a time, to the HSP logging service via [`store`].
//! Chunks the backend refuses go back on the queue for the next dispatch.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod extension;
pub mod http_utils;
pub mod logger;
pub mod orchestrator;
pub mod parser;
pub mod queue;
pub mod receiver;
pub mod signer;
pub mod store;

/// Maximum number of log resources the HSP logging API accepts per request.
pub const MAX_LOG_BATCH_SIZE: usize = 25;

/// Substring of the telemetry event type marking a line written by function code.
pub const FUNCTION_LOG_MARKER: &str = "function";

/// Literal a log line must contain to be forwarded.
pub const APPLICATION_LOG_MARKER: &str = "CustomLogEvent";
