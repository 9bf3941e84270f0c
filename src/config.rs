use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "markd";
const URL_ENV: &str = "MARKD_SUPABASE_URL";
const ANON_KEY_ENV: &str = "MARKD_SUPABASE_ANON_KEY";

/// How a delete gesture on a bookmark row is turned into a backend delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// First press arms, second press within the window deletes.
    #[default]
    Confirm,
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub supabase_url: String,

    #[serde(default)]
    pub supabase_anon_key: String,

    #[serde(default = "default_session_path")]
    pub session_path: String,

    #[serde(default)]
    pub delete_policy: DeletePolicy,

    #[serde(default = "default_confirm_window")]
    pub confirm_window_secs: u64,

    #[serde(default = "default_realtime")]
    pub realtime: bool,

    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
}

fn default_session_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("session.json").to_string_lossy().to_string()
}

fn default_confirm_window() -> u64 {
    3
}

fn default_realtime() -> bool {
    true
}

fn default_callback_port() -> u16 {
    54321
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            session_path: default_session_path(),
            delete_policy: DeletePolicy::default(),
            confirm_window_secs: default_confirm_window(),
            realtime: default_realtime(),
            callback_port: default_callback_port(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read the config at `path`, writing defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(URL_ENV) {
            self.supabase_url = url;
        }
        if let Ok(key) = std::env::var(ANON_KEY_ENV) {
            self.supabase_anon_key = key;
        }
    }

    /// Fails when the backend project is not configured.
    pub fn validate(&self) -> Result<()> {
        if self.supabase_url.trim().is_empty() {
            return Err(AppError::Config(format!(
                "supabase_url is not set (edit {} or set {})",
                Self::config_path().display(),
                URL_ENV
            )));
        }
        if self.supabase_anon_key.trim().is_empty() {
            return Err(AppError::Config(format!(
                "supabase_anon_key is not set (edit {} or set {})",
                Self::config_path().display(),
                ANON_KEY_ENV
            )));
        }
        url::Url::parse(&self.supabase_url)?;
        Ok(())
    }

    /// Project URL without a trailing slash.
    pub fn project_url(&self) -> &str {
        self.supabase_url.trim_end_matches('/')
    }

    pub fn confirm_window(&self) -> Duration {
        Duration::from_secs(self.confirm_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        Config {
            supabase_url: "https://abc.supabase.co/".to_string(),
            supabase_anon_key: "anon".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.delete_policy, DeletePolicy::Confirm);
        assert_eq!(config.confirm_window_secs, 3);
        assert!(config.realtime);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "supabase_url = \"https://abc.supabase.co\"\ndelete_policy = \"immediate\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.supabase_url, "https://abc.supabase.co");
        assert_eq!(config.delete_policy, DeletePolicy::Immediate);
        assert_eq!(config.callback_port, 54321);
    }

    #[test]
    fn saved_config_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = configured();

        config.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();

        assert_eq!(reloaded.supabase_url, config.supabase_url);
        assert_eq!(reloaded.supabase_anon_key, "anon");
    }

    #[test]
    fn validate_rejects_unconfigured_project() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("supabase_url"));

        let no_key = Config {
            supabase_anon_key: String::new(),
            ..configured()
        };
        assert!(no_key.validate().unwrap_err().to_string().contains("anon_key"));

        assert!(configured().validate().is_ok());
    }

    #[test]
    fn project_url_strips_trailing_slash() {
        assert_eq!(configured().project_url(), "https://abc.supabase.co");
    }
}
