//! Application-level configuration loading, including session timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZLINE_BACK_CONFIG_PATH";
/// Length of the inter-question pause window, in seconds.
const DEFAULT_PAUSE_SECONDS: u64 = 10;
/// Deadline applied to an `advance` command that carries no time limit and
/// follows no previous deadline.
const DEFAULT_ADVANCE_SECONDS: u64 = 30;
/// Default location of the quiz definitions served by the in-memory catalog.
const DEFAULT_QUIZZES_PATH: &str = "config/quizzes.json";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pause_seconds: u64,
    default_advance_seconds: u64,
    quizzes_path: PathBuf,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Fixed window between a question's expiry and the next question.
    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs(self.pause_seconds)
    }

    /// Length of the inter-question pause, in seconds, as sent to clients.
    pub fn pause_seconds(&self) -> u64 {
        self.pause_seconds
    }

    /// Fallback question duration when `advance` carries no explicit limit
    /// and the session has no previous deadline to extend.
    pub fn default_advance_seconds(&self) -> u64 {
        self.default_advance_seconds
    }

    /// Path of the JSON file holding the quiz definitions to serve.
    pub fn quizzes_path(&self) -> &PathBuf {
        &self.quizzes_path
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pause_seconds: DEFAULT_PAUSE_SECONDS,
            default_advance_seconds: DEFAULT_ADVANCE_SECONDS,
            quizzes_path: PathBuf::from(DEFAULT_QUIZZES_PATH),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    pause_seconds: Option<u64>,
    default_advance_seconds: Option<u64>,
    quizzes_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            pause_seconds: value.pause_seconds.unwrap_or(defaults.pause_seconds),
            default_advance_seconds: value
                .default_advance_seconds
                .unwrap_or(defaults.default_advance_seconds),
            quizzes_path: value.quizzes_path.unwrap_or(defaults.quizzes_path),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
