// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns application log lines into HSP log resources.
//!
//! Lines are expected in the HSP console format:
//!
//! ```text
//! <Category>.<Severity>|CustomLogEvent|<TransactionId>|<TraceId>|<SpanId>|<Component>|<Message>
//! ```
//!
//! Anything else is rejected with a [`ParseError`]. Rejections are final: the
//! same input will never parse, so callers drop the event instead of retrying.

use base64::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, ResourceIdentity};
use crate::event::RawTelemetryEvent;
use crate::APPLICATION_LOG_MARKER;

pub const RESOURCE_TYPE: &str = "LogEvent";
pub const EVENT_ID: &str = "1";

const FIELD_DELIMITER: char = '|';
const SEVERITY_DELIMITER: char = '.';
const FIELD_COUNT: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("event type '{0}' is not a function log")]
    NotFunctionLog(String),

    #[error("record is not a text line")]
    RecordNotText,

    #[error("record does not contain the CustomLogEvent marker")]
    MissingMarker,

    #[error("record has {found} of 7 pipe-delimited fields")]
    MissingFields { found: usize },

    #[error("first field '{0}' is not of the form <category>.<severity>")]
    MissingSeverity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogData {
    /// Base64 of the original message text
    pub message: String,
}

/// A log entry in the shape the HSP logging service stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResource {
    pub id: String,
    pub resource_type: String,
    pub application_name: String,
    pub event_id: String,
    pub category: String,
    pub component: String,
    pub transaction_id: String,
    pub service_name: String,
    pub application_instance: String,
    pub application_version: String,
    pub originating_user: String,
    pub server_name: String,
    pub log_time: String,
    pub severity: String,
    pub trace_id: String,
    pub span_id: String,
    pub log_data: LogData,
}

impl LogResource {
    /// Decodes the transport-encoded message back into text.
    pub fn decoded_message(&self) -> Option<String> {
        BASE64_STANDARD
            .decode(&self.log_data.message)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }
}

/// Parser bound to the identity of the hosting function.
#[derive(Debug, Clone)]
pub struct LogRecordParser {
    service_name: String,
    service_version: String,
    identity: ResourceIdentity,
}

impl LogRecordParser {
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        identity: ResourceIdentity,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            identity,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.function_name.clone(),
            config.function_version.clone(),
            config.resource_identity.clone(),
        )
    }

    pub fn parse(&self, event: &RawTelemetryEvent) -> Result<LogResource, ParseError> {
        if !event.is_function_log() {
            return Err(ParseError::NotFunctionLog(event.event_type.clone()));
        }
        let record = event.record_text().ok_or(ParseError::RecordNotText)?;
        if !record.contains(APPLICATION_LOG_MARKER) {
            return Err(ParseError::MissingMarker);
        }

        // The runtime hands over each line with its terminator still attached.
        let record = record.trim_end_matches(['\r', '\n']);

        // splitn keeps any pipes inside the message body intact.
        let fields: Vec<&str> = record.splitn(FIELD_COUNT, FIELD_DELIMITER).collect();
        let [level, _marker, transaction_id, trace_id, span_id, component, message] =
            fields[..]
        else {
            return Err(ParseError::MissingFields {
                found: fields.len(),
            });
        };

        let mut level_parts = level.split(SEVERITY_DELIMITER);
        let (Some(category), Some(severity)) = (level_parts.next(), level_parts.next()) else {
            return Err(ParseError::MissingSeverity(level.to_string()));
        };

        Ok(LogResource {
            id: Uuid::new_v4().to_string(),
            resource_type: RESOURCE_TYPE.to_string(),
            application_name: self.identity.application_name.clone(),
            event_id: EVENT_ID.to_string(),
            category: category.to_string(),
            component: component.to_string(),
            transaction_id: transaction_id.to_string(),
            service_name: self.service_name.clone(),
            application_instance: component.to_string(),
            application_version: self.service_version.clone(),
            originating_user: self.identity.originating_user.clone(),
            server_name: self.identity.server_name.clone(),
            log_time: event.time.clone(),
            severity: severity.to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            log_data: LogData {
                message: BASE64_STANDARD.encode(message),
            },
        })
    }
}
