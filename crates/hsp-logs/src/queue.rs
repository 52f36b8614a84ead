// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::RawTelemetryEvent;

/// Unbounded FIFO of telemetry events shared between the receiver and the
/// dispatcher. Clones share the same underlying buffer.
///
/// There is no upper bound: if the logging service stays unreachable the
/// queue keeps growing with every requeued chunk.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Arc<Mutex<VecDeque<RawTelemetryEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: RawTelemetryEvent) {
        self.lock().push_back(event);
    }

    /// Appends a whole batch under a single lock so concurrent producers do
    /// not interleave inside it.
    pub fn push_batch(&self, events: impl IntoIterator<Item = RawTelemetryEvent>) {
        self.lock().extend(events);
    }

    /// Takes every queued event in insertion order, leaving the queue empty.
    pub fn drain_all(&self) -> Vec<RawTelemetryEvent> {
        let drained = std::mem::take(&mut *self.lock());
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A producer panicking mid-push cannot leave the deque half-written, so
    // a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<RawTelemetryEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
