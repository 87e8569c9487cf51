//! Provides utilities to initialize logging.
use std::env;

use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable name for the service label, which is appended to the
/// whoami string.
pub const SVC_LABEL_ENVVAR: &str = "STAKING_SIGNER_SVC_LABEL";

/// Configuration for the logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// The whoami string, which is used to identify the signer in logs.
    whoami: String,
}

impl LoggerConfig {
    /// Creates a new instance with whoami set.
    pub const fn new(whoami: String) -> Self {
        Self { whoami }
    }

    /// Creates a new instance with the whoami string set to the provided
    /// string, suffixed with the service label if one is set.
    pub fn with_base_name(s: &str) -> Self {
        Self::new(get_whoami_string(s))
    }

    /// The whoami string.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("(staking-signer)")
    }
}

/// Initializes the logging subsystem with the provided config.
///
/// # Panics
///
/// If a global subscriber is already installed. Use [`try_init`] where that can happen.
pub fn init(config: LoggerConfig) {
    stdout_registry().init();
    info!(whoami = %config.whoami, "logging started");
}

/// Like [`init`], but returns an error instead of panicking if a global subscriber is already
/// installed, as happens when several tests initialize logging in one process.
pub fn try_init(config: LoggerConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    stdout_registry().try_init()?;
    info!(whoami = %config.whoami, "logging started");
    Ok(())
}

fn stdout_registry() -> impl SubscriberInitExt {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let enabled = |var: &str| env::var(var).is_ok_and(|v| v == "1");

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .event_format(
            tracing_subscriber::fmt::format()
                .with_file(enabled("LOG_FILE"))
                .with_line_number(enabled("LOG_LINE_NUM")),
        )
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer)
}

/// Gets the service label from the standard envvar, which should be included
/// in the whoami string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
