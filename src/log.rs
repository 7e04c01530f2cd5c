//! Logger configuration.
//!
//! [`LogConfig::dispatch`] builds a `tracing` subscriber for one
//! application instance. The server attaches it to every connection task
//! instead of installing it globally, so two apps in one process (or two
//! tests) can log differently.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Deserialize;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// How an application logs.
///
/// Deserializable with every field optional, so it can sit inside a host's
/// own configuration file:
///
/// ```toml
/// [log]
/// level = "issac=debug,info"
/// format = "json"
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives. `RUST_LOG`, when set and valid, wins.
    pub level: String,
    pub format: LogFormat,
    /// Include the date in timestamps (`2024/3/9 7:5:1` vs `7:5:1`).
    pub show_year: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Compact, show_year: true, ansi: true }
    }
}

impl LogConfig {
    /// Builds the subscriber described by this configuration.
    pub fn dispatch(&self) -> Result<Dispatch, ConfigError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.level).map_err(|e| ConfigError::InvalidLogFilter {
                filter: self.level.clone(),
                reason: e.to_string(),
            })?,
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTime { show_year: self.show_year })
            .with_ansi(self.ansi)
            .with_target(true);

        Ok(match self.format {
            LogFormat::Compact => Dispatch::new(builder.compact().finish()),
            LogFormat::Pretty => Dispatch::new(builder.pretty().finish()),
            LogFormat::Json => Dispatch::new(builder.json().finish()),
        })
    }
}

/// Local wall-clock time without zero padding: `Y/M/D H:M:S`, or `H:M:S`
/// when `show_year` is off.
pub fn formatted_time(at: &DateTime<Local>, show_year: bool) -> String {
    if show_year {
        at.format("%Y/%-m/%-d %-H:%-M:%-S").to_string()
    } else {
        at.format("%-H:%-M:%-S").to_string()
    }
}

struct LocalTime {
    show_year: bool,
}

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&formatted_time(&Local::now(), self.show_year))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamps_are_unpadded() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(formatted_time(&at, true), "2024/3/9 7:5:1");
        assert_eq!(formatted_time(&at, false), "7:5:1");
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: LogConfig = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "info");
        assert!(cfg.show_year);
    }

    #[test]
    fn builds_each_format() {
        for format in [LogFormat::Compact, LogFormat::Pretty, LogFormat::Json] {
            let cfg = LogConfig { format, ansi: false, ..LogConfig::default() };
            assert!(cfg.dispatch().is_ok());
        }
    }
}
