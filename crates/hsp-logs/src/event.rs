// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FUNCTION_LOG_MARKER;

/// A single event as pushed by the Lambda Telemetry API.
///
/// Only `time` and `type` are required. `record` is free text for
/// `function` events and an object for most `platform.*` events, so it is
/// kept as a raw JSON value until the parser looks at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetryEvent {
    pub time: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub record: Value,
}

impl RawTelemetryEvent {
    pub fn is_function_log(&self) -> bool {
        self.event_type.contains(FUNCTION_LOG_MARKER)
    }

    /// The record as text, if the runtime delivered it as a string.
    pub fn record_text(&self) -> Option<&str> {
        self.record.as_str()
    }
}

/// Converts a decoded JSON array into typed events.
///
/// Elements missing a required field are dropped; the count of dropped
/// elements is returned alongside the events so the caller can report it.
pub fn from_values(values: Vec<Value>) -> (Vec<RawTelemetryEvent>, usize) {
    let mut events = Vec::with_capacity(values.len());
    let mut dropped = 0;
    for value in values {
        match serde_json::from_value::<RawTelemetryEvent>(value) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::debug!("Dropping telemetry event without required fields: {e}");
                dropped += 1;
            }
        }
    }
    (events, dropped)
}
