// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{Config, DEFAULT_RECEIVER_HOST};
use crate::event;
use crate::http_utils::{log_and_create_http_response, verify_request_content_length, HttpResponse};
use crate::queue::EventQueue;

/// Local HTTP endpoint the Telemetry API pushes event batches to.
#[derive(Debug, Clone)]
pub struct TelemetryReceiver {
    host: String,
    port: u16,
    max_request_content_length: usize,
    queue: EventQueue,
}

/// A receiver whose listener is bound and serving.
#[derive(Debug)]
pub struct RunningReceiver {
    /// URI to hand to the Telemetry API subscription
    pub uri: String,
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

impl TelemetryReceiver {
    pub fn new(config: &Config, queue: EventQueue) -> Self {
        Self {
            host: config.receiver_host.clone(),
            port: config.receiver_port,
            max_request_content_length: config.max_request_content_length,
            queue,
        }
    }

    pub fn with_address(host: impl Into<String>, port: u16, queue: EventQueue) -> Self {
        Self {
            host: host.into(),
            port,
            max_request_content_length: Config::default().max_request_content_length,
            queue,
        }
    }

    /// Binds the listener, then serves on a background task until `cancel_token` fires.
    ///
    /// Binding happens before this returns so an unusable address is reported
    /// to the caller instead of dying silently inside the task.
    pub async fn start(self, cancel_token: CancellationToken) -> io::Result<RunningReceiver> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        let uri = format!("http://{}:{}/", advertised_host(&self.host), local_addr.port());
        debug!("Telemetry receiver listening on {local_addr}, advertised as {uri}");

        let queue = self.queue;
        let max_request_content_length = self.max_request_content_length;
        let service = service_fn(move |req: Request<Incoming>| {
            let queue = queue.clone();
            TelemetryReceiver::endpoint_handler(req, queue, max_request_content_length)
        });

        let handle = tokio::spawn(async move {
            if let Err(e) = Self::serve_tcp(listener, service, cancel_token).await {
                error!("Telemetry receiver stopped: {e}");
            }
        });

        Ok(RunningReceiver {
            uri,
            local_addr,
            handle,
        })
    }

    async fn serve_tcp<S>(
        listener: TcpListener,
        service: S,
        cancel_token: CancellationToken,
    ) -> io::Result<()>
    where
        S: hyper::service::Service<Request<Incoming>, Response = HttpResponse>
            + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("Telemetry receiver shutting down");
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => return Err(e),
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }
    }

    async fn endpoint_handler(
        req: Request<Incoming>,
        queue: EventQueue,
        max_request_content_length: usize,
    ) -> http::Result<HttpResponse> {
        match *req.method() {
            Method::POST => Self::telemetry_handler(req, queue, max_request_content_length).await,
            _ => log_and_create_http_response(
                &format!("Unsupported method {} for telemetry receiver", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
        }
    }

    async fn telemetry_handler(
        req: Request<Incoming>,
        queue: EventQueue,
        max_request_content_length: usize,
    ) -> http::Result<HttpResponse> {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            max_request_content_length,
            "Error processing telemetry batch",
        ) {
            return response;
        }

        // Chunked bodies carry no declared length, the limit applies while reading.
        let body_bytes = match Limited::new(body, max_request_content_length).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_http_response(
                    "Error processing telemetry batch: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading telemetry batch: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let values = match serde_json::from_slice::<Vec<Value>>(&body_bytes) {
            Ok(values) => values,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Telemetry batch is not a JSON array: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let (events, dropped) = event::from_values(values);
        let queued = events.len();
        queue.push_batch(events);

        log_and_create_http_response(
            &format!("Queued {queued} telemetry events, dropped {dropped}"),
            StatusCode::OK,
        )
    }
}

/// A wildcard bind address is not reachable, the Telemetry API gets the sandbox hostname.
fn advertised_host(bind_host: &str) -> &str {
    match bind_host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => DEFAULT_RECEIVER_HOST,
        _ => bind_host,
    }
}
