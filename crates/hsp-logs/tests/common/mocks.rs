// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock log store for testing

use async_trait::async_trait;
use hsp_logs::parser::LogResource;
use hsp_logs::store::{LogStore, StoreError};
use std::sync::Mutex;

/// Log store that keeps every batch it receives
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingLogStore {
    pub batches: Mutex<Vec<Vec<LogResource>>>,
}

#[async_trait]
impl LogStore for RecordingLogStore {
    async fn store_resources(&self, resources: &[LogResource]) -> Result<(), StoreError> {
        self.batches.lock().unwrap().push(resources.to_vec());
        Ok(())
    }
}
