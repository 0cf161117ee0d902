//! Process-wide tracing setup.
//!
//! Every turn runs inside a `turn` span carrying `turn_id` and `adapter`, so
//! pipeline diagnostics (dropped frames, read failures) are attributable to
//! the turn that produced them. Those diagnostics log at `debug` under
//! [`PIPELINE_TARGET`].

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_ENV: &str = "CHATSTREAM_OBSERVABILITY_ENABLED";
const LEVEL_ENV: &str = "CHATSTREAM_LOG_LEVEL";
const JSON_LOG_PATH_ENV: &str = "CHATSTREAM_JSON_LOG_PATH";
const DEFAULT_JSON_LOG_FILE: &str = "chatstream.logs.jsonl";

/// Log target of the frame-level pipeline diagnostics.
pub const PIPELINE_TARGET: &str = "chatstream_core::pipeline";

/// How logging is installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// Explicit filter directives. Wins over `verbosity` when valid.
    pub filter: Option<String>,
    /// 0 warnings only, 1 turn lifecycle, 2 pipeline frame diagnostics,
    /// 3 and up everything from this crate.
    pub verbosity: u8,
    /// Write JSON lines here instead of the stderr console.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            verbosity: 0,
            json_log_path: None,
        }
    }
}

impl ObservabilityConfig {
    /// Reads `CHATSTREAM_OBSERVABILITY_ENABLED`, `CHATSTREAM_LOG_LEVEL` (or
    /// `RUST_LOG`) and `CHATSTREAM_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENABLED_ENV)
            .ok()
            .and_then(|value| parse_bool_env(&value))
            .unwrap_or(true);
        let filter = std::env::var(LEVEL_ENV)
            .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
            .ok()
            .filter(|value| !value.trim().is_empty());
        let json_log_path = std::env::var(JSON_LOG_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            verbosity: 0,
            json_log_path,
        }
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn directives(&self) -> String {
        match &self.filter {
            Some(filter) if EnvFilter::try_new(filter).is_ok() => filter.clone(),
            _ => verbosity_directives(self.verbosity),
        }
    }
}

fn verbosity_directives(verbosity: u8) -> String {
    match verbosity {
        0 => "warn".to_string(),
        1 => "warn,chatstream_core=info,chatstream=info".to_string(),
        2 => format!("warn,chatstream_core=info,chatstream=info,{PIPELINE_TARGET}=debug"),
        _ => "warn,chatstream_core=trace,chatstream=trace".to_string(),
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// `(directory, file name)` for the JSON appender.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Initializes logging from the environment, once per process.
pub fn init_observability() {
    init_with(ObservabilityConfig::from_env());
}

/// Initializes logging with an explicit config. Only the first call in a
/// process has an effect.
pub fn init_with(config: ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let env_filter = EnvFilter::new(config.directives());
        match &config.json_log_path {
            Some(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                // stdout carries rendered model output.
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.verbosity >= 2)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_env_values() {
        assert_eq!(parse_bool_env(" On "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn verbosity_opens_pipeline_diagnostics_at_two() {
        assert_eq!(verbosity_directives(0), "warn");
        assert!(!verbosity_directives(1).contains(PIPELINE_TARGET));
        assert!(verbosity_directives(2).contains("chatstream_core::pipeline=debug"));
        assert!(verbosity_directives(7).contains("chatstream_core=trace"));
    }

    #[test]
    fn explicit_filter_wins_over_verbosity() {
        let config = ObservabilityConfig {
            filter: Some("chatstream_core=debug".into()),
            ..ObservabilityConfig::default()
        }
        .verbosity(3);
        assert_eq!(config.directives(), "chatstream_core=debug");
        let fallback = ObservabilityConfig::default().verbosity(1);
        assert_eq!(fallback.directives(), verbosity_directives(1));
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        assert_eq!(
            split_log_path(Path::new("logs/turns.jsonl")),
            (PathBuf::from("logs"), "turns.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("turns.jsonl")),
            (PathBuf::from("."), "turns.jsonl".to_string())
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_with(ObservabilityConfig {
            enabled: false,
            ..ObservabilityConfig::default()
        });
        init_observability();
        assert!(INIT.get().is_some());
    }
}
