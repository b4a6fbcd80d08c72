//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` and `severity` first, then fields in alphabetical order
//! - Synchronous, no buffering
//! - Lines below the process-wide minimum severity are dropped
//! - ERROR and FATAL go to stderr; the rest to stdout unless all logging is
//!   routed to stderr

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Per-command detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Rejected commands, conflicts
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Storage lost
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "INFO" => Ok(Severity::Info),
            "WARN" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "FATAL" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);
static STDERR_ONLY: AtomicBool = AtomicBool::new(false);

/// Structured logger writing JSON lines
pub struct Logger;

impl Logger {
    /// Sets the process-wide minimum severity.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    /// Sends every severity to stderr, leaving stdout to the caller.
    pub fn set_stderr_only(enabled: bool) {
        STDERR_ONLY.store(enabled, Ordering::Relaxed);
    }

    pub fn writes_to_stderr(severity: Severity) -> bool {
        severity >= Severity::Error || STDERR_ONLY.load(Ordering::Relaxed)
    }

    /// Log an event with the given severity and fields.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        if Self::writes_to_stderr(severity) {
            Self::log_to_writer(severity, event, fields, &mut io::stderr());
        } else {
            Self::log_to_writer(severity, event, fields, &mut io::stdout());
        }
    }

    fn log_to_writer<W: Write>(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
        writer: &mut W,
    ) {
        let line = Self::format_line(severity, event, fields);
        // Logging must never fail the operation being logged
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        // serde_json's Map keeps insertion order only with `preserve_order`,
        // so the line is assembled from individually encoded pieces.
        let mut output = String::with_capacity(128);
        output.push('{');
        push_pair(&mut output, "event", event);
        output.push(',');
        push_pair(&mut output, "severity", severity.as_str());
        for (key, value) in sorted {
            output.push(',');
            push_pair(&mut output, key, value);
        }
        output.push_str("}\n");
        output
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}

fn push_pair(output: &mut String, key: &str, value: &str) {
    output.push_str(&Value::String(key.to_string()).to_string());
    output.push(':');
    output.push_str(&Value::String(value.to_string()).to_string());
}

/// Parses a log line back into a field map.
pub fn parse_line(line: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(line) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::log_to_writer(severity, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_stderr_routing() {
        assert!(Logger::writes_to_stderr(Severity::Error));
        assert!(Logger::writes_to_stderr(Severity::Fatal));

        Logger::set_stderr_only(true);
        assert!(Logger::writes_to_stderr(Severity::Trace));
        assert!(Logger::writes_to_stderr(Severity::Info));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(Severity::Info, "COMMAND_EXECUTED", &[("command", "UPDATE")]);
        let parsed = parse_line(&output).unwrap();
        assert_eq!(parsed["event"], "COMMAND_EXECUTED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["command"], "UPDATE");
    }

    #[test]
    fn test_log_deterministic_ordering() {
        let a = capture_log(Severity::Info, "T", &[("zebra", "1"), ("apple", "2"), ("mango", "3")]);
        let b = capture_log(Severity::Info, "T", &[("mango", "3"), ("zebra", "1"), ("apple", "2")]);
        assert_eq!(a, b);

        let apple = a.find("apple").unwrap();
        let zebra = a.find("zebra").unwrap();
        assert!(apple < zebra);
        assert!(a.starts_with("{\"event\":\"T\",\"severity\":\"INFO\""));
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let output = capture_log(Severity::Warn, "T", &[("branch", "co \"1\"\nx")]);
        let parsed = parse_line(&output).unwrap();
        assert_eq!(parsed["branch"], "co \"1\"\nx");
        assert_eq!(output.matches('\n').count(), 1);
    }
}
