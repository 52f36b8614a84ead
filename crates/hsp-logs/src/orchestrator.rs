// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::LifecycleError;
use crate::extension::{ExtensionApi, ExtensionId, NextEvent, TelemetrySubscriber};
use crate::receiver::TelemetryReceiver;

/// How the lifecycle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The runtime sent `SHUTDOWN` and buffered telemetry was flushed.
    Shutdown,
    /// The cancellation token fired while waiting for the next event.
    /// Nothing is flushed on this path.
    Cancelled,
}

/// Drives register, listen, subscribe and the poll loop of the extension.
pub struct Orchestrator {
    extension_name: String,
    extension_api: Arc<dyn ExtensionApi + Send + Sync>,
    telemetry_api: Arc<dyn TelemetrySubscriber + Send + Sync>,
    receiver: TelemetryReceiver,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        extension_name: impl Into<String>,
        extension_api: Arc<dyn ExtensionApi + Send + Sync>,
        telemetry_api: Arc<dyn TelemetrySubscriber + Send + Sync>,
        receiver: TelemetryReceiver,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            extension_name: extension_name.into(),
            extension_api,
            telemetry_api,
            receiver,
            dispatcher,
            cancel_token,
        }
    }

    pub async fn run(self) -> Result<Termination, LifecycleError> {
        let Self {
            extension_name,
            extension_api,
            telemetry_api,
            receiver,
            dispatcher,
            cancel_token,
        } = self;

        let id = extension_api
            .register(&extension_name)
            .await
            .map_err(LifecycleError::Register)?;
        info!("Registered extension {extension_name} with id {id}");

        let receiver_token = cancel_token.child_token();
        let running = receiver
            .start(receiver_token.clone())
            .await
            .map_err(LifecycleError::Receiver)?;

        let result = async {
            telemetry_api
                .subscribe(&id, &running.uri)
                .await
                .map_err(LifecycleError::Subscribe)?;
            info!("Subscribed to the Telemetry API at {}", running.uri);
            poll_loop(&*extension_api, &dispatcher, &id, &cancel_token).await
        }
        .await;

        receiver_token.cancel();
        if let Err(e) = running.handle.await {
            error!("Telemetry receiver task failed: {e}");
        }
        result
    }
}

async fn poll_loop(
    extension_api: &(dyn ExtensionApi + Send + Sync),
    dispatcher: &Dispatcher,
    id: &ExtensionId,
    cancel_token: &CancellationToken,
) -> Result<Termination, LifecycleError> {
    loop {
        dispatcher.dispatch(false).await;

        let event = tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Termination requested, exiting without flushing");
                return Ok(Termination::Cancelled);
            }
            event = extension_api.next_event(id) => event.map_err(LifecycleError::Poll)?,
        };

        match event {
            NextEvent::Invoke {
                request_id,
                deadline_ms,
                ..
            } => {
                info!("Invoke received, request id {request_id}");
                debug!("Invocation deadline {deadline_ms}");
            }
            NextEvent::Shutdown {
                shutdown_reason, ..
            } => {
                let summary = dispatcher.dispatch(true).await;
                info!(
                    "Shutdown received ({shutdown_reason}), flushed {}, {} undelivered",
                    summary.delivered,
                    summary.requeued
                );
                return Ok(Termination::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceIdentity;
    use crate::event::RawTelemetryEvent;
    use crate::extension::ExtensionError;
    use crate::parser::{LogRecordParser, LogResource};
    use crate::queue::EventQueue;
    use crate::store::{LogStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted lifecycle events, then blocks forever.
    struct ScriptedExtensionApi {
        register_fails: bool,
        events: Mutex<VecDeque<Result<NextEvent, ExtensionError>>>,
        polls: Mutex<usize>,
    }

    impl ScriptedExtensionApi {
        fn new(events: Vec<Result<NextEvent, ExtensionError>>) -> Self {
            Self {
                register_fails: false,
                events: Mutex::new(events.into()),
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtensionApi for ScriptedExtensionApi {
        async fn register(&self, name: &str) -> Result<ExtensionId, ExtensionError> {
            if self.register_fails {
                return Err(ExtensionError::MissingExtensionId);
            }
            Ok(ExtensionId(format!("{name}-id")))
        }

        async fn next_event(&self, _id: &ExtensionId) -> Result<NextEvent, ExtensionError> {
            *self.polls.lock().unwrap() += 1;
            let next = self.events.lock().unwrap().pop_front();
            match next {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct RecordingSubscriber {
        fails: bool,
        uris: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TelemetrySubscriber for RecordingSubscriber {
        async fn subscribe(
            &self,
            _id: &ExtensionId,
            receiver_uri: &str,
        ) -> Result<(), ExtensionError> {
            self.uris.lock().unwrap().push(receiver_uri.to_string());
            if self.fails {
                return Err(ExtensionError::Client("subscription refused".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingStore {
        stored: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LogStore for CountingStore {
        async fn store_resources(&self, resources: &[LogResource]) -> Result<(), StoreError> {
            self.stored.lock().unwrap().push(resources.len());
            Ok(())
        }
    }

    struct Harness {
        queue: EventQueue,
        store: Arc<CountingStore>,
        subscriber: Arc<RecordingSubscriber>,
        cancel_token: CancellationToken,
    }

    impl Harness {
        fn new(subscriber: RecordingSubscriber) -> Self {
            Self {
                queue: EventQueue::new(),
                store: Arc::new(CountingStore::default()),
                subscriber: Arc::new(subscriber),
                cancel_token: CancellationToken::new(),
            }
        }

        fn orchestrator(
            &self,
            api: Arc<ScriptedExtensionApi>,
            min_batch_size: usize,
        ) -> Orchestrator {
            let dispatcher = Dispatcher::new(
                self.queue.clone(),
                LogRecordParser::new("fn", "1.0", ResourceIdentity::default()),
                self.store.clone(),
                min_batch_size,
            );
            Orchestrator::new(
                "hsp-logs-extension",
                api,
                self.subscriber.clone(),
                TelemetryReceiver::with_address("127.0.0.1", 0, self.queue.clone()),
                dispatcher,
                self.cancel_token.clone(),
            )
        }

        fn seed(&self, count: usize) {
            self.queue.push_batch((0..count).map(|n| RawTelemetryEvent {
                time: format!("2024-01-01T00:00:0{n}.000Z"),
                event_type: "function".to_string(),
                record: json!(format!("App.INFO|CustomLogEvent|t{n}|tr|sp|c|m{n}")),
            }));
        }
    }

    fn invoke(request_id: &str) -> Result<NextEvent, ExtensionError> {
        Ok(NextEvent::Invoke {
            request_id: request_id.to_string(),
            deadline_ms: 0,
            invoked_function_arn: String::new(),
        })
    }

    fn shutdown() -> Result<NextEvent, ExtensionError> {
        Ok(NextEvent::Shutdown {
            shutdown_reason: "spindown".to_string(),
            deadline_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_shutdown_forces_flush_below_threshold() {
        let harness = Harness::new(RecordingSubscriber::default());
        harness.seed(3);
        let api = Arc::new(ScriptedExtensionApi::new(vec![invoke("r1"), invoke("r2"), shutdown()]));

        let termination = harness.orchestrator(api.clone(), 10).run().await.unwrap();

        assert_eq!(termination, Termination::Shutdown);
        assert_eq!(*api.polls.lock().unwrap(), 3);
        assert_eq!(*harness.store.stored.lock().unwrap(), vec![3]);
        assert!(harness.queue.is_empty());
    }

    #[tokio::test]
    async fn test_dispatches_before_each_poll() {
        let harness = Harness::new(RecordingSubscriber::default());
        harness.seed(2);
        let api = Arc::new(ScriptedExtensionApi::new(vec![shutdown()]));

        harness.orchestrator(api, 1).run().await.unwrap();

        // delivered by the pre-poll dispatch, the forced flush found nothing
        assert_eq!(*harness.store.stored.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_subscribes_receiver_uri_and_stops_receiver() {
        let harness = Harness::new(RecordingSubscriber::default());
        let api = Arc::new(ScriptedExtensionApi::new(vec![shutdown()]));

        harness.orchestrator(api, 1).run().await.unwrap();

        let uris = harness.subscriber.uris.lock().unwrap().clone();
        assert_eq!(uris.len(), 1);
        assert!(uris[0].starts_with("http://127.0.0.1:"));

        let addr = uris[0]
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_exits_without_flush() {
        let harness = Harness::new(RecordingSubscriber::default());
        harness.seed(3);
        let api = Arc::new(ScriptedExtensionApi::new(vec![]));
        let orchestrator = harness.orchestrator(api, 10);

        let run = tokio::spawn(orchestrator.run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        harness.cancel_token.cancel();

        assert_eq!(run.await.unwrap().unwrap(), Termination::Cancelled);
        assert!(harness.store.stored.lock().unwrap().is_empty());
        assert_eq!(harness.queue.len(), 3);
    }

    #[tokio::test]
    async fn test_poll_error_is_fatal() {
        let harness = Harness::new(RecordingSubscriber::default());
        let api = Arc::new(ScriptedExtensionApi::new(vec![
            invoke("r1"),
            Err(ExtensionError::Client("connection reset".to_string())),
            shutdown(),
        ]));

        let result = harness.orchestrator(api.clone(), 1).run().await;

        assert!(matches!(result, Err(LifecycleError::Poll(_))));
        assert_eq!(*api.polls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_register_failure_skips_subscription() {
        let harness = Harness::new(RecordingSubscriber::default());
        let api = Arc::new(ScriptedExtensionApi {
            register_fails: true,
            ..ScriptedExtensionApi::new(vec![shutdown()])
        });

        let result = harness.orchestrator(api.clone(), 1).run().await;

        assert!(matches!(result, Err(LifecycleError::Register(_))));
        assert!(harness.subscriber.uris.lock().unwrap().is_empty());
        assert_eq!(*api.polls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_fatal() {
        let harness = Harness::new(RecordingSubscriber {
            fails: true,
            ..Default::default()
        });
        let api = Arc::new(ScriptedExtensionApi::new(vec![shutdown()]));

        let result = harness.orchestrator(api.clone(), 1).run().await;

        assert!(matches!(result, Err(LifecycleError::Subscribe(_))));
        assert_eq!(*api.polls.lock().unwrap(), 0);
    }
}
