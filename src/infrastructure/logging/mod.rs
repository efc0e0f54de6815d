//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rotating JSON log files via tracing-appender
//! - `RUST_LOG` overrides the configured level

pub mod logger;

pub use logger::LoggerImpl;
