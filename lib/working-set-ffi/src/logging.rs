//! Logging.

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::{
    layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _, util::TryInitError, EnvFilter,
    Layer,
};

use crate::config::LoggingConfiguration;

/// A logging initialization error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum LoggingError {
    /// A global subscriber was already installed, either by us or by the host application.
    #[snafu(display("Failed to install global logging subscriber: {}", source))]
    AlreadyInitialized {
        /// Error source.
        source: TryInitError,
    },
}

/// Initializes the logging subsystem for `tracing`.
///
/// Logs are written to standard error, filtered by the configured directives (defaulting to `WARN`), and formatted
/// either as JSON or as human-readable text.
///
/// # Errors
///
/// If a global subscriber was already installed, an error will be returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<(), LoggingError> {
    let level_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(config.level_directives.as_deref().unwrap_or_default());

    if config.json {
        tracing_subscriber::registry()
            .with(initialize_tracing_json().with_filter(level_filter))
            .try_init()
            .context(AlreadyInitialized)
    } else {
        tracing_subscriber::registry()
            .with(initialize_tracing_pretty().with_filter(level_filter))
            .try_init()
            .context(AlreadyInitialized)
    }
}

fn initialize_tracing_json<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_writer(std::io::stderr)
}

fn initialize_tracing_pretty<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .with_target(true)
        .with_writer(std::io::stderr)
}
