use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::conversation::ConversationSettings;
use crate::core::gateway::DEFAULT_API_URL;
use crate::core::workflow::WorkflowSettings;

pub const ENV_DATA_DIR: &str = "AGENTDESK_DATA_DIR";
pub const ENV_API_URL: &str = "AGENTDESK_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "AGENTDESK_POLL_INTERVAL_MS";

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_UPLOAD_PURPOSE: &str = "agents";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_upload_purpose")]
    pub upload_purpose: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_to_stderr: bool,
    #[serde(default)]
    pub workflows: WorkflowsConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowsConfigToml {
    #[serde(default = "default_required_inputs")]
    pub required_inputs: BTreeMap<String, Vec<String>>,
}

impl Default for WorkflowsConfigToml {
    fn default() -> Self {
        Self {
            required_inputs: default_required_inputs(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_upload_purpose() -> String {
    DEFAULT_UPLOAD_PURPOSE.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_required_inputs() -> BTreeMap<String, Vec<String>> {
    WorkflowSettings::default().required_inputs
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            upload_purpose: default_upload_purpose(),
            default_model: default_model(),
            log_level: default_log_level(),
            log_to_stderr: false,
            workflows: WorkflowsConfigToml::default(),
        }
    }
}

/// `$AGENTDESK_DATA_DIR`, else `~/.agentdesk`, else `./.agentdesk`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentdesk")
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid agentdesk config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Config file under `dir` if present, defaults otherwise, then
    /// environment overrides.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS).filter(|v| !v.trim().is_empty()) {
            self.poll_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("{} must be a number of milliseconds", ENV_POLL_INTERVAL_MS)
                })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        url::Url::parse(&self.api_url)
            .with_context(|| format!("api_url '{}' is not a valid URL", self.api_url))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            poll_interval: self.poll_interval(),
            upload_purpose: self.upload_purpose.clone(),
            default_model: self.default_model.clone(),
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            poll_interval: self.poll_interval(),
            required_inputs: self.workflows.required_inputs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.api_url, "http://127.0.0.1:8000/api/v1");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(
            config.workflows.required_inputs.get("hr-onboarding"),
            Some(&vec!["name".to_string(), "role".to_string()])
        );
    }

    #[test]
    fn file_values_and_required_inputs_are_read() {
        let config = ClientConfig::from_toml_str(
            r#"
api_url = "http://backend:9000/api/v1"
poll_interval_ms = 250
log_to_stderr = true

[workflows.required_inputs]
trip-planner = ["destination"]
"#,
        )
        .unwrap();
        assert_eq!(config.api_url, "http://backend:9000/api/v1");
        assert_eq!(config.conversation_settings().poll_interval, Duration::from_millis(250));
        assert!(config.log_to_stderr);
        let required = config.workflow_settings().required_inputs;
        assert_eq!(required.get("trip-planner"), Some(&vec!["destination".to_string()]));
        assert!(!required.contains_key("hr-onboarding"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ClientConfig::from_toml_str("poll_interval_ms = 0").is_err());
        assert!(ClientConfig::from_toml_str("api_url = \"nope\"").is_err());
        assert!(ClientConfig::from_toml_str("poll_interval_ms = \"fast\"").is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = ClientConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_API_URL => Some("http://10.0.0.5:8000/api/v1".to_string()),
                ENV_POLL_INTERVAL_MS => Some("500".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.api_url, "http://10.0.0.5:8000/api/v1");
        assert_eq!(config.poll_interval_ms, 500);

        let mut config = ClientConfig::default();
        assert!(
            config
                .apply_overrides(|key| (key == ENV_POLL_INTERVAL_MS).then(|| "soon".to_string()))
                .is_err()
        );
    }

    #[test]
    fn load_reads_config_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config.upload_purpose, "agents");

        std::fs::write(
            dir.path().join("config.toml"),
            "default_model = \"gpt-4o\"\nupload_purpose = \"assistants\"\n",
        )
        .unwrap();
        let config = ClientConfig::from_path(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.upload_purpose, "assistants");
    }
}
