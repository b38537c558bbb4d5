use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::request::ScanMetadata;

pub const DEFAULT_ENDPOINT: &str = "https://service.api.aisecurity.paloaltonetworks.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_APP_NAME: &str = "airs-guard";

/// Problems resolving the settings a scan needs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(
        "API key not configured (set {} or `api_key` in the config file)",
        SettingsLayer::API_KEY_ENV
    )]
    MissingApiKey,
    #[error(
        "security profile not configured (set {} or `profile` in the config file)",
        SettingsLayer::PROFILE_ENV
    )]
    MissingProfile,
    #[error("invalid timeout `{value}`: {reason}")]
    InvalidTimeout { value: String, reason: String },
    #[error("failed to load config file {path}: {reason}")]
    ConfigFile { path: String, reason: String },
}

/// Fully resolved scan settings. Read-only once built.
#[derive(Clone, PartialEq, Eq)]
pub struct AirsSettings {
    pub api_key: String,
    pub profile: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub app_name: String,
    pub app_user: Option<String>,
    pub ai_model: Option<String>,
}

impl AirsSettings {
    pub fn metadata(&self) -> ScanMetadata {
        ScanMetadata {
            app_name: Some(self.app_name.clone()),
            app_user: self.app_user.clone(),
            ai_model: self.ai_model.clone(),
            source: None,
        }
    }
}

impl fmt::Debug for AirsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirsSettings")
            .field("api_key", &"<redacted>")
            .field("profile", &self.profile)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .field("app_user", &self.app_user)
            .field("ai_model", &self.ai_model)
            .finish()
    }
}

/// One partial source of settings (config file, environment, CLI flags).
/// Layers are merged with [`SettingsLayer::merge`] and resolved last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsLayer {
    pub api_key: Option<String>,
    pub profile: Option<String>,
    pub endpoint: Option<String>,
    /// Human-readable duration such as `30s` or `1500ms`.
    pub timeout: Option<String>,
    pub app_name: Option<String>,
    pub app_user: Option<String>,
    pub ai_model: Option<String>,
}

impl SettingsLayer {
    pub const API_KEY_ENV: &'static str = "PRISMA_AIRS_API_KEY";
    pub const PROFILE_ENV: &'static str = "PRISMA_AIRS_PROFILE";
    pub const ENDPOINT_ENV: &'static str = "PRISMA_AIRS_ENDPOINT";
    pub const TIMEOUT_ENV: &'static str = "PRISMA_AIRS_TIMEOUT";
    pub const APP_NAME_ENV: &'static str = "PRISMA_AIRS_APP_NAME";
    pub const APP_USER_ENV: &'static str = "PRISMA_AIRS_APP_USER";
    pub const AI_MODEL_ENV: &'static str = "PRISMA_AIRS_AI_MODEL";

    /// Layer built from environment variables.
    ///
    /// * `PRISMA_AIRS_API_KEY`: API key (required after merging).
    /// * `PRISMA_AIRS_PROFILE`: security profile name (required after merging).
    /// * `PRISMA_AIRS_ENDPOINT`: service endpoint (default: US region).
    /// * `PRISMA_AIRS_TIMEOUT`: request timeout, e.g. `30s`.
    pub fn from_env() -> Self {
        Self::from_map(&std::env::vars().collect())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).cloned();
        Self {
            api_key: get(Self::API_KEY_ENV),
            profile: get(Self::PROFILE_ENV),
            endpoint: get(Self::ENDPOINT_ENV),
            timeout: get(Self::TIMEOUT_ENV),
            app_name: get(Self::APP_NAME_ENV),
            app_user: get(Self::APP_USER_ENV),
            ai_model: get(Self::AI_MODEL_ENV),
        }
    }

    /// Overlay `over` on top of `self`. Blank values in `over` do not shadow.
    pub fn merge(self, over: SettingsLayer) -> Self {
        Self {
            api_key: non_blank(over.api_key).or(self.api_key),
            profile: non_blank(over.profile).or(self.profile),
            endpoint: non_blank(over.endpoint).or(self.endpoint),
            timeout: non_blank(over.timeout).or(self.timeout),
            app_name: non_blank(over.app_name).or(self.app_name),
            app_user: non_blank(over.app_user).or(self.app_user),
            ai_model: non_blank(over.ai_model).or(self.ai_model),
        }
    }

    pub fn resolve(self) -> Result<AirsSettings, ConfigurationError> {
        let api_key = non_blank(self.api_key).ok_or(ConfigurationError::MissingApiKey)?;
        let profile = non_blank(self.profile).ok_or(ConfigurationError::MissingProfile)?;
        let timeout = match non_blank(self.timeout) {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT,
        };
        Ok(AirsSettings {
            api_key,
            profile,
            endpoint: non_blank(self.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
            app_name: non_blank(self.app_name).unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            app_user: non_blank(self.app_user),
            ai_model: non_blank(self.ai_model),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts humantime strings; a bare integer is read as seconds.
fn parse_timeout(raw: &str) -> Result<Duration, ConfigurationError> {
    let parsed = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw).map_err(|err| ConfigurationError::InvalidTimeout {
            value: raw.to_string(),
            reason: err.to_string(),
        })?,
    };
    if parsed.is_zero() {
        return Err(ConfigurationError::InvalidTimeout {
            value: raw.to_string(),
            reason: "timeout must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
