// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::extension::ExtensionError;

/// Errors raised while building the extension configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

/// Fatal failures of the extension lifecycle. Any of these ends the process.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Failed to register extension: {0}")]
    Register(#[source] ExtensionError),

    #[error("Failed to start telemetry receiver: {0}")]
    Receiver(#[source] std::io::Error),

    #[error("Failed to subscribe to the Telemetry API: {0}")]
    Subscribe(#[source] ExtensionError),

    #[error("Failed to poll for the next lifecycle event: {0}")]
    Poll(#[source] ExtensionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingVariable("PRODUCT_KEY");
        assert_eq!(
            error.to_string(),
            "Required environment variable PRODUCT_KEY is not set"
        );

        let error = ConfigError::InvalidValue("timeout must be positive".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: timeout must be positive"
        );
    }

    #[test]
    fn test_lifecycle_error_display() {
        let error = LifecycleError::Register(ExtensionError::MissingExtensionId);
        assert_eq!(
            error.to_string(),
            "Failed to register extension: Register response did not carry an extension identifier"
        );

        let error = LifecycleError::Receiver(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ));
        assert!(error.to_string().contains("address in use"));
    }
}
