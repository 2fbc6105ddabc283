//! Diagnostic sink used by the loading cache.

use std::fmt;

pub use tracing::Level;

/// Receives the cache's diagnostic lines (sweep warnings, per-item debug
/// output). Never required for correctness.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Record one line at the given level.
    fn log(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Forwards to the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level == Level::ERROR {
            tracing::error!(target: "fcache", "{args}");
        } else if level == Level::WARN {
            tracing::warn!(target: "fcache", "{args}");
        } else if level == Level::INFO {
            tracing::info!(target: "fcache", "{args}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "fcache", "{args}");
        } else {
            tracing::trace!(target: "fcache", "{args}");
        }
    }
}
