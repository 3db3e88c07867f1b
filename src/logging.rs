//! Logging setup for marionette-di
//!
//! Container, scope and dispatcher transitions emit `tracing` events under
//! the `marionette_di` target. This module offers quick subscriber setup
//! with JSON output for production (`tracing-json` feature) or pretty
//! output for development (`tracing-pretty` feature).
//!
//! # Example
//!
//! ```rust,ignore
//! use marionette_di::logging;
//!
//! // Default setup for the enabled format feature
//! logging::init();
//!
//! // Or pick a format explicitly
//! logging::init_json();
//! logging::init_pretty();
//!
//! // Or configure explicitly
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .di_only()
//!     .pretty()
//!     .init();
//! ```

use tracing::Level;

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured output (production).
    #[default]
    Json,
    /// Human-readable multi-line output (development).
    Pretty,
    /// Compact single-line output.
    Compact,
}

/// Builder for the logging subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_file: false,
            with_line_number: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Only show logs from a specific target.
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show marionette-di logs.
    pub fn di_only(self) -> Self {
        self.with_target_filter("marionette_di")
    }

    /// Include file names in log output.
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include line numbers in log output.
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Use JSON structured output.
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty output.
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line output.
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Install the configured subscriber as the global default.
    #[cfg(any(feature = "tracing-json", feature = "tracing-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if let Some(target) = self.target {
            EnvFilter::new(format!("{}={}", target, self.level))
        } else {
            EnvFilter::new(self.level.to_string())
        };

        match self.format {
            LogFormat::Json => {
                #[cfg(feature = "tracing-json")]
                {
                    let layer = fmt::layer()
                        .json()
                        .with_file(self.with_file)
                        .with_line_number(self.with_line_number)
                        .with_target(true);
                    tracing_subscriber::registry().with(filter).with(layer).init();
                }
                #[cfg(not(feature = "tracing-json"))]
                {
                    let layer = fmt::layer()
                        .with_file(self.with_file)
                        .with_line_number(self.with_line_number)
                        .with_target(true);
                    tracing_subscriber::registry().with(filter).with(layer).init();
                }
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
        }
    }

    /// No-op without a subscriber format feature.
    #[cfg(not(any(feature = "tracing-json", feature = "tracing-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder.
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize with the default settings of the enabled format feature.
#[cfg(any(feature = "tracing-json", feature = "tracing-pretty"))]
pub fn init() {
    #[cfg(feature = "tracing-json")]
    {
        init_json();
    }
    #[cfg(all(feature = "tracing-pretty", not(feature = "tracing-json")))]
    {
        init_pretty();
    }
}

/// No-op without a subscriber format feature.
#[cfg(not(any(feature = "tracing-json", feature = "tracing-pretty")))]
pub fn init() {}

/// Initialize JSON structured logging.
///
/// Ideal for production environments where logs are aggregated and parsed:
///
/// ```json
/// {"timestamp":"2024-01-01T00:00:00.000Z","level":"DEBUG","target":"marionette_di","message":"Creating container"}
/// ```
#[cfg(any(feature = "tracing-json", feature = "tracing-pretty"))]
pub fn init_json() {
    builder().json().init();
}

/// Initialize JSON logging (no-op when not available).
#[cfg(not(any(feature = "tracing-json", feature = "tracing-pretty")))]
pub fn init_json() {}

/// Initialize pretty colorful logging.
///
/// Human-readable multi-line output, ideal for development:
///
/// ```text
///   2024-01-01T00:00:00.000Z DEBUG marionette_di: Creating container
/// ```
#[cfg(any(feature = "tracing-json", feature = "tracing-pretty"))]
pub fn init_pretty() {
    builder().pretty().init();
}

/// Initialize pretty logging (no-op when not available).
#[cfg(not(any(feature = "tracing-json", feature = "tracing-pretty")))]
pub fn init_pretty() {}

/// Initialize logging for marionette-di only (filters other crates).
#[cfg(any(feature = "tracing-json", feature = "tracing-pretty"))]
pub fn init_di_only() {
    builder().di_only().init();
}

/// Initialize DI-only logging (no-op when not available).
#[cfg(not(any(feature = "tracing-json", feature = "tracing-pretty")))]
pub fn init_di_only() {}
