// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::Path, process::ExitCode, sync::Arc};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hsp_logs::{
    config::Config,
    dispatcher::Dispatcher,
    extension::{BufferingConfig, ExtensionApiClient, TelemetryApiClient},
    logger,
    orchestrator::Orchestrator,
    queue::EventQueue,
    receiver::TelemetryReceiver,
    store::HspLoggingClient,
};

const DEFAULT_EXTENSION_NAME: &str = "hsp-logs-extension";

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{DEFAULT_EXTENSION_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = match EnvFilter::try_new(logger::filter_directive(&config.log_level)) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("{DEFAULT_EXTENSION_NAME}: could not parse log level: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .event_format(logger::Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{DEFAULT_EXTENSION_NAME}: failed to install logger: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Starting with {config:?}");

    let cancel_token = CancellationToken::new();
    if let Err(e) = spawn_signal_handler(cancel_token.clone()) {
        error!("Failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let orchestrator = match build_orchestrator(&config, cancel_token) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    match orchestrator.run().await {
        Ok(termination) => {
            info!("Exiting after {termination:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn build_orchestrator(
    config: &Config,
    cancel_token: CancellationToken,
) -> Result<Orchestrator, Box<dyn std::error::Error + Send + Sync>> {
    let queue = EventQueue::new();
    let store = Arc::new(HspLoggingClient::new(config)?);
    let dispatcher = Dispatcher::from_config(config, queue.clone(), store);
    let receiver = TelemetryReceiver::new(config, queue);

    Ok(Orchestrator::new(
        extension_name(),
        Arc::new(ExtensionApiClient::new(&config.runtime_api)?),
        Arc::new(TelemetryApiClient::new(
            &config.runtime_api,
            BufferingConfig::default(),
        )?),
        receiver,
        dispatcher,
        cancel_token,
    ))
}

/// The runtime expects the registered name to match the executable's file name.
fn extension_name() -> String {
    env::args()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION_NAME.to_string())
}

fn spawn_signal_handler(cancel_token: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        cancel_token.cancel();
    });
    Ok(())
}
