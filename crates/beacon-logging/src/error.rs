//! Error types for subscriber initialization

use thiserror::Error;

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LogError {
    /// A level or target directive could not be parsed
    #[error("Invalid filter directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    /// The log directory or file could not be created
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// The rolling file appender could not be built
    #[error("Log appender error: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}
