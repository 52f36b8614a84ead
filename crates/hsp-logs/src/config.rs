// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_FUNCTION_VERSION: &str = "1.0";
const DEFAULT_MIN_BATCH_SIZE: usize = 1;
const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TELEMETRY_PORT: u16 = 4323;
pub const DEFAULT_RECEIVER_HOST: &str = "sandbox.localdomain";
const LOCAL_RECEIVER_HOST: &str = "0.0.0.0";
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 8 * 1024 * 1024;

pub const DEFAULT_APPLICATION_NAME: &str = "DicomStore";
pub const DEFAULT_ORIGINATING_USER: &str = "Ross";
pub const DEFAULT_SERVER_NAME: &str = "AWS Lambda";

/// Fixed identity stamped on every log resource of this deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub application_name: String,
    pub originating_user: String,
    pub server_name: String,
}

impl Default for ResourceIdentity {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            originating_user: DEFAULT_ORIGINATING_USER.to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    /// Base URL of the HSP logging service, without trailing slash
    pub logging_base_url: String,
    pub product_key: String,
    pub shared_key: String,
    pub shared_secret: String,
    /// Hosting function name, reported as the service name
    pub function_name: String,
    pub function_version: String,
    /// `host:port` of the Lambda runtime API
    pub runtime_api: String,
    /// Queue length below which a non-forced dispatch does nothing
    pub min_batch_size: usize,
    /// Upper bound for a single call to the logging service
    pub flush_timeout: Duration,
    pub log_level: String,
    pub receiver_host: String,
    pub receiver_port: u16,
    pub max_request_content_length: usize,
    pub https_proxy: Option<String>,
    pub resource_identity: ResourceIdentity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging_base_url: String::new(),
            product_key: String::new(),
            shared_key: String::new(),
            shared_secret: String::new(),
            function_name: String::new(),
            function_version: DEFAULT_FUNCTION_VERSION.to_string(),
            runtime_api: String::new(),
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            flush_timeout: Duration::from_secs(DEFAULT_FLUSH_TIMEOUT_SECS),
            log_level: "info".to_string(),
            receiver_host: DEFAULT_RECEIVER_HOST.to_string(),
            receiver_port: DEFAULT_TELEMETRY_PORT,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            https_proxy: None,
            resource_identity: ResourceIdentity::default(),
        }
    }
}

// Hand-written so the shared secret never ends up in a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("logging_base_url", &self.logging_base_url)
            .field("product_key", &self.product_key)
            .field("shared_key", &self.shared_key)
            .field("shared_secret", &"<redacted>")
            .field("function_name", &self.function_name)
            .field("function_version", &self.function_version)
            .field("runtime_api", &self.runtime_api)
            .field("min_batch_size", &self.min_batch_size)
            .field("flush_timeout", &self.flush_timeout)
            .field("log_level", &self.log_level)
            .field("receiver_host", &self.receiver_host)
            .field("receiver_port", &self.receiver_port)
            .field("https_proxy", &self.https_proxy)
            .field("resource_identity", &self.resource_identity)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let logging_base_url = required("HSDP_LOGGING_BASE_URI")?
            .trim_end_matches('/')
            .to_string();
        let product_key = required("PRODUCT_KEY")?;
        let shared_key = required("SHARED_KEY")?;
        let shared_secret = required("SECRET_KEY")?;
        let function_name = required("AWS_LAMBDA_FUNCTION_NAME")?;
        let runtime_api = required("AWS_LAMBDA_RUNTIME_API")?;

        let function_version = non_empty("AWS_LAMBDA_FUNCTION_VERSION")
            .unwrap_or_else(|| DEFAULT_FUNCTION_VERSION.to_string());
        let min_batch_size =
            parse_min_batch_size(env::var("DISPATCH_MIN_BATCH_SIZE").ok().as_deref());
        let flush_timeout = match non_empty("DISPATCH_TIMEOUT_SECS") {
            Some(val) => Duration::from_secs(val.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!("DISPATCH_TIMEOUT_SECS '{val}' is not a number"))
            })?),
            None => Duration::from_secs(DEFAULT_FLUSH_TIMEOUT_SECS),
        };
        let log_level = non_empty("HSP_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| {
                log_level_for_verbose_flag(env::var("ENABLE_VERBOSE_LOGGING").ok().as_deref())
            });
        let receiver_host = match env::var("AWS_SAM_LOCAL") {
            Ok(val) if val == "true" => LOCAL_RECEIVER_HOST.to_string(),
            _ => DEFAULT_RECEIVER_HOST.to_string(),
        };
        let receiver_port = env::var("HSP_TELEMETRY_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_TELEMETRY_PORT);
        let https_proxy = env::var("HTTPS_PROXY").ok().filter(|val| !val.is_empty());

        let defaults = ResourceIdentity::default();
        let resource_identity = ResourceIdentity {
            application_name: non_empty("HSP_APPLICATION_NAME")
                .unwrap_or(defaults.application_name),
            originating_user: non_empty("HSP_ORIGINATING_USER")
                .unwrap_or(defaults.originating_user),
            server_name: non_empty("HSP_SERVER_NAME").unwrap_or(defaults.server_name),
        };

        let config = Self {
            logging_base_url,
            product_key,
            shared_key,
            shared_secret,
            function_name,
            function_version,
            runtime_api,
            min_batch_size,
            flush_timeout,
            log_level,
            receiver_host,
            receiver_port,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            https_proxy,
            resource_identity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.logging_base_url.starts_with("http://")
            && !self.logging_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(format!(
                "HSDP_LOGGING_BASE_URI '{}' must be an http(s) URL",
                self.logging_base_url
            )));
        }

        if self.flush_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "DISPATCH_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.min_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "minimum batch size must be at least 1".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    non_empty(name).ok_or(ConfigError::MissingVariable(name))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

/// Absent, unparsable or non-positive values fall back to a threshold of 1.
pub fn parse_min_batch_size(raw: Option<&str>) -> usize {
    raw.and_then(|val| val.trim().parse::<usize>().ok())
        .filter(|size| *size >= 1)
        .unwrap_or(DEFAULT_MIN_BATCH_SIZE)
}

fn log_level_for_verbose_flag(flag: Option<&str>) -> String {
    match flag {
        Some(val) if !val.is_empty() => "debug".to_string(),
        _ => "info".to_string(),
    }
}
