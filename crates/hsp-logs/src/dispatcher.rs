// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::event::RawTelemetryEvent;
use crate::parser::{LogRecordParser, LogResource};
use crate::queue::EventQueue;
use crate::store::LogStore;
use crate::MAX_LOG_BATCH_SIZE;

/// Counts describing what a single `dispatch` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub drained: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub delivered: usize,
    pub requeued: usize,
}

/// Splits `items` into consecutive chunks of at most `size` elements.
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(size).collect());
    }
    chunks
}

pub struct Dispatcher {
    queue: EventQueue,
    parser: LogRecordParser,
    store: Arc<dyn LogStore + Send + Sync>,
    min_batch_size: usize,
}

impl Dispatcher {
    pub fn new(
        queue: EventQueue,
        parser: LogRecordParser,
        store: Arc<dyn LogStore + Send + Sync>,
        min_batch_size: usize,
    ) -> Self {
        Self {
            queue,
            parser,
            store,
            min_batch_size: min_batch_size.max(1),
        }
    }

    pub fn from_config(
        config: &Config,
        queue: EventQueue,
        store: Arc<dyn LogStore + Send + Sync>,
    ) -> Self {
        Self::new(
            queue,
            LogRecordParser::from_config(config),
            store,
            config.min_batch_size,
        )
    }

    /// Drains the queue and forwards every parseable event to the store.
    ///
    /// Without `force` nothing happens until the queue holds at least the
    /// minimum batch size. Events of a chunk the store refuses go back onto
    /// the queue behind anything that arrived meanwhile.
    pub async fn dispatch(&self, force: bool) -> DispatchSummary {
        let queued = self.queue.len();
        if queued == 0 || (!force && queued < self.min_batch_size) {
            return DispatchSummary::default();
        }

        let drained = self.queue.drain_all();
        let mut summary = DispatchSummary {
            drained: drained.len(),
            ..Default::default()
        };

        let mut accepted: Vec<(RawTelemetryEvent, LogResource)> = Vec::with_capacity(drained.len());
        for event in drained {
            match self.parser.parse(&event) {
                Ok(resource) => accepted.push((event, resource)),
                Err(e) => {
                    debug!("Dropping telemetry event from {}: {e}", event.time);
                    summary.rejected += 1;
                }
            }
        }
        summary.accepted = accepted.len();

        for batch in chunk(accepted, MAX_LOG_BATCH_SIZE) {
            let (events, resources): (Vec<RawTelemetryEvent>, Vec<LogResource>) =
                batch.into_iter().unzip();
            match self.store.store_resources(&resources).await {
                Ok(()) => summary.delivered += resources.len(),
                Err(e) => {
                    warn!(
                        "Failed to deliver batch of {} log resources, requeueing: {e}",
                        resources.len()
                    );
                    summary.requeued += events.len();
                    self.queue.push_batch(events);
                }
            }
        }

        debug!(
            "Dispatched telemetry: drained={} accepted={} rejected={} delivered={} requeued={}",
            summary.drained, summary.accepted, summary.rejected, summary.delivered, summary.requeued
        );
        summary
    }
}
