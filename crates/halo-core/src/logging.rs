//! Structured logging setup for the loader.
//!
//! All loader components emit `tracing` events; this module owns the one
//! place a host application (or a test binary) configures the subscriber.
//! Discovery decisions and backend init failures land at debug/warn, the
//! trampoline hot path stays silent.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Subscriber configuration for the loader.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level to emit.
    pub level: LogLevel,
    /// Include thread IDs in each event.
    pub with_thread_ids: bool,
    /// Include file/line source locations.
    pub with_source_location: bool,
    /// Emit span enter/close events.
    pub with_span_events: bool,
    /// Emit JSON instead of the human-readable format.
    pub json_format: bool,
}

/// Log level selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Per-call detail; discovery and composition decisions.
    Debug,
    /// Lifecycle milestones.
    Info,
    /// Degraded-backend and teardown anomalies.
    Warn,
    /// Least verbose.
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_thread_ids: false,
            with_source_location: false,
            with_span_events: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Toggle thread IDs.
    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.with_thread_ids = enable;
        self
    }

    /// Toggle source locations.
    pub fn with_source_location(mut self, enable: bool) -> Self {
        self.with_source_location = enable;
        self
    }

    /// Toggle span enter/close events.
    pub fn with_span_events(mut self, enable: bool) -> Self {
        self.with_span_events = enable;
        self
    }

    /// Toggle JSON output.
    pub fn with_json_format(mut self, enable: bool) -> Self {
        self.json_format = enable;
        self
    }

    /// Verbose configuration for debugging loader/backend interactions.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            with_thread_ids: true,
            with_source_location: true,
            with_span_events: false,
            json_format: false,
        }
    }

    /// Quiet JSON configuration for embedding in services.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Warn,
            with_thread_ids: false,
            with_source_location: false,
            with_span_events: false,
            json_format: true,
        }
    }
}

/// Install the global subscriber for the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
/// Panics if a global subscriber is already installed; use
/// [`try_init_logging`] in tests where several entry points may race.
pub fn init_logging(config: LoggingConfig) {
    try_init_logging(config).expect("global tracing subscriber already installed");
}

/// Install the global subscriber, reporting failure instead of panicking.
pub fn try_init_logging(config: LoggingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_tracing_level().as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.with_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(true)
            .with_thread_ids(config.with_thread_ids)
            .with_file(config.with_source_location)
            .with_line_number(config.with_source_location);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| e.to_string())
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_thread_ids(config.with_thread_ids)
            .with_file(config.with_source_location)
            .with_line_number(config.with_source_location)
            .with_target(config.with_source_location);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| e.to_string())
    }
}

/// Install the global subscriber with default settings.
pub fn init_default_logging() {
    init_logging(LoggingConfig::default());
}
