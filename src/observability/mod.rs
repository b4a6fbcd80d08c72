//! Observability
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Counters
//!
//! Observability is read-only: it never changes the outcome of a command.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{parse_line, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic
        log_event(Event::ConfigLoaded);
        log_event_with_fields(Event::CommitApplied, &[("table", "projects")]);
    }
}
