//! 📦 Common data structures — the building blocks of lgx.
//!
//! 🎬 COLD OPEN — INT. APPLICATION THREAD — 11:58 PM
//!
//! A request handler hits an error. It does what every handler does in a crisis:
//! it writes a log line and keeps going. It does not wait. It does not ask where the
//! line goes. It hands it to us and walks away. This module is what it hands us.
//!
//! A [`LogRecord`] is immutable once built. From admission to shipment (or the
//! recycling bin, it happens) the pipeline owns it outright. Nobody else holds a
//! reference. Nobody else gets to mutate it. 🦆

use std::error::Error;
use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// 🎚️ Numeric severity on the fixed integer scale.
///
/// The gaps between levels are enormous on purpose: 10000 apart, so the scale is
/// shared with the older logging frameworks this document shape came from.
/// `OFF` is `i32::MAX`. Nobody logs at OFF. And yet here it is, with a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Severity(pub i32);

impl Severity {
    pub const TRACE: Severity = Severity(5000);
    pub const DEBUG: Severity = Severity(10000);
    pub const INFO: Severity = Severity(20000);
    pub const WARN: Severity = Severity(30000);
    pub const ERROR: Severity = Severity(40000);
    pub const FATAL: Severity = Severity(50000);
    pub const OFF: Severity = Severity(i32::MAX);

    /// 🏷️ Human label for the level. Anything off the scale gets the empty string,
    /// not an error. Unknown levels are a display problem, not a pipeline problem.
    pub fn label(self) -> &'static str {
        match self.0 {
            5000 => "TRACE",
            10000 => "DEBUG",
            20000 => "INFO",
            30000 => "WARN",
            40000 => "ERROR",
            50000 => "FATAL",
            i32::MAX => "OFF",
            _ => "",
        }
    }

    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        // -- 🗺️ tracing has no FATAL and no OFF. ERROR is as loud as it gets over there.
        match level {
            tracing::Level::TRACE => Severity::TRACE,
            tracing::Level::DEBUG => Severity::DEBUG,
            tracing::Level::INFO => Severity::INFO,
            tracing::Level::WARN => Severity::WARN,
            tracing::Level::ERROR => Severity::ERROR,
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.0)
    }
}

/// 🎯 One log event, normalized and frozen.
///
/// Serializes to the system-log document shape the index expects:
///
/// ```text
/// {"logId":null,"logClass":"app::db","logLevel":40000,"logLevelStr":"ERROR",
///  "logContent":"...","threadName":"worker-3","logTime":1718000000000,"hostName":"web-01"}
/// ```
///
/// `logId` is always null. The backend assigns ids. We are not in the id business.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    log_id: Option<i64>,
    log_class: String,
    log_level: Severity,
    log_level_str: &'static str,
    log_content: String,
    thread_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    log_time: DateTime<Utc>,
    host_name: String,
}

impl LogRecord {
    /// 🏗️ Build a record. All fields are owned; the record never borrows from the caller.
    pub fn new(
        timestamp: DateTime<Utc>,
        logger: impl Into<String>,
        severity: Severity,
        thread_name: impl Into<String>,
        host_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            log_id: None,
            log_class: logger.into(),
            log_level: severity,
            log_level_str: severity.label(),
            log_content: content.into(),
            thread_name: thread_name.into(),
            log_time: timestamp,
            host_name: host_name.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.log_time
    }

    pub fn logger(&self) -> &str {
        &self.log_class
    }

    pub fn severity(&self) -> Severity {
        self.log_level
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn content(&self) -> &str {
        &self.log_content
    }
}

/// 📝 Flatten a message and an optional error chain into the record's content.
///
/// Without an error the message passes through untouched. With one, the message is
/// newline-terminated, then the top-level error gets an `error:` line and every
/// source in the chain gets a `caused by:` line. Each line ends in `\n`.
pub fn render_content(message: &str, error: Option<&(dyn Error + 'static)>) -> String {
    let Some(error) = error else {
        return message.to_string();
    };

    let mut content = String::with_capacity(message.len() + 128);
    if !message.is_empty() {
        content.push_str(message);
        if !message.ends_with('\n') {
            content.push('\n');
        }
    }
    let _ = writeln!(content, "error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(content, "caused by: {cause}");
        source = cause.source();
    }
    content
}

/// 🏷️ Resolve this machine's host name. Once. At startup. Then pass it around.
///
/// `HOSTNAME` wins if set and non-empty, then the kernel's answer, then `""`.
/// A missing host name never stops the pipeline. It just makes the dashboard sadder.
pub fn resolve_host_name() -> String {
    if let Ok(from_env) = std::env::var("HOSTNAME") {
        if !from_env.is_empty() {
            return from_env;
        }
    }
    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().unwrap_or_default(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf;
    impl fmt::Display for Leaf {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk on fire")
        }
    }
    impl Error for Leaf {}

    #[derive(Debug)]
    struct Wrapper(Leaf);
    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("failed to save invoice")
        }
    }
    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn the_one_where_every_level_knows_its_name() {
        assert_eq!(Severity(5000).label(), "TRACE");
        assert_eq!(Severity(10000).label(), "DEBUG");
        assert_eq!(Severity(20000).label(), "INFO");
        assert_eq!(Severity(30000).label(), "WARN");
        assert_eq!(Severity(40000).label(), "ERROR");
        assert_eq!(Severity(50000).label(), "FATAL");
        assert_eq!(Severity(2147483647).label(), "OFF");
    }

    #[test]
    fn the_one_where_an_unknown_level_gets_no_label_at_all() {
        assert_eq!(Severity(12345).label(), "");
        assert_eq!(Severity(-1).label(), "");
        assert_eq!(Severity(0).to_string(), "");
    }

    #[test]
    fn the_one_where_tracing_levels_land_on_the_scale() {
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::TRACE);
        assert_eq!(Severity::from(tracing::Level::INFO), Severity::INFO);
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::ERROR);
        assert!(Severity::WARN > Severity::INFO);
    }

    #[test]
    fn the_one_where_the_record_serializes_to_the_syslog_shape() -> anyhow::Result<()> {
        let when = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123)
            .ok_or_else(|| anyhow::anyhow!("timestamp out of range"))?;
        let record = LogRecord::new(when, "app::billing", Severity::ERROR, "worker-7", "web-01", "boom");

        let json: serde_json::Value = serde_json::to_value(&record)?;
        assert_eq!(json["logId"], serde_json::Value::Null);
        assert_eq!(json["logClass"], "app::billing");
        assert_eq!(json["logLevel"], 40000);
        assert_eq!(json["logLevelStr"], "ERROR");
        assert_eq!(json["logContent"], "boom");
        assert_eq!(json["threadName"], "worker-7");
        assert_eq!(json["logTime"], 1_700_000_000_123i64);
        assert_eq!(json["hostName"], "web-01");
        Ok(())
    }

    #[test]
    fn the_one_where_plain_messages_pass_through_untouched() {
        assert_eq!(render_content("hello", None), "hello");
        assert_eq!(render_content("", None), "");
    }

    #[test]
    fn the_one_where_the_error_chain_gets_flattened_line_by_line() {
        let err = Wrapper(Leaf);
        let content = render_content("checkout failed", Some(&err));
        assert_eq!(
            content,
            "checkout failed\nerror: failed to save invoice\ncaused by: disk on fire\n"
        );
    }

    #[test]
    fn the_one_where_a_message_that_already_ends_in_newline_gets_no_extra() {
        let content = render_content("already done\n", Some(&Leaf));
        assert_eq!(content, "already done\nerror: disk on fire\n");
    }
}
