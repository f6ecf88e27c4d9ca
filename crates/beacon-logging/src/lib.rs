//! Tracing subscriber setup for the Beacon telemetry pipeline
//!
//! The pipeline crates only emit `tracing` events. Hosts, simulators and
//! test harnesses that embed them install a subscriber through this crate.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Pretty Console**: Human-readable output for development
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//! - **Per-target Levels**: `RUST_LOG` style directives from configuration
//!
//! # Quick Start
//!
//! ```no_run
//! use beacon_logging::{BeaconSubscriberBuilder, LogConfig};
//!
//! // Development mode with pretty human-readable output
//! let _guard = BeaconSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_target("beacon_storage", "trace")
//!     .init();
//! ```

pub mod config;
pub mod error;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use error::LogError;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Builder for configuring and initializing the Beacon logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct BeaconSubscriberBuilder {
    config: LogConfig,
}

impl BeaconSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Set the level for a single target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config = self.config.with_target(target, level);
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Initialize the subscriber globally
    ///
    /// Returns the file writer guard, which must be kept alive for the
    /// duration of the program when file output is enabled. Failures are
    /// reported on stderr and leave logging uninitialized.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if a global subscriber has already been set or the
    /// configuration is invalid.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogError> {
        let env_filter = self.env_filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if let Some(layer) = self.console_layer()? {
            layers.push(layer);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(self.json_layer(writer));
            guard = Some(file_guard);
        }

        Registry::default().with(env_filter).with(layers).try_init()?;

        tracing::debug!(level = %self.config.default_level, "Logging initialized");
        Ok(guard)
    }

    /// RUST_LOG when set, the configured default level otherwise, plus the
    /// per-target directives
    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        let mut filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)?,
        };

        for (target, level) in &self.config.targets {
            filter = filter.add_directive(format!("{}={}", target, level).parse()?);
        }
        Ok(filter)
    }

    fn console_layer(&self) -> Result<Option<BoxedLayer>, LogError> {
        let console = &self.config.console;
        if !console.enabled {
            return Ok(None);
        }

        let layer = if console.pretty {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
                .boxed()
        } else {
            self.json_layer(std::io::stdout)
        };

        let layer = match &console.level {
            Some(level) => layer.with_filter(EnvFilter::try_new(level)?).boxed(),
            None => layer,
        };
        Ok(Some(layer))
    }

    fn json_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
            .with_writer(writer)
            .boxed()
    }
}

impl Default for BeaconSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for the configured log file
///
/// `Never` truncates a single file, the rotating strategies append.
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)?;
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }

    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() {
    BeaconSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    BeaconSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = BeaconSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
