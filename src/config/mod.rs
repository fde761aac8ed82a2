//! Configuration system (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::call::vad::VadConfig;
use crate::error::CallError;
use crate::types::{Locale, SessionRequest, Voice};

pub const DEFAULT_API_BASE_URL: &str = "https://apiceritain.indonesiacore.com";
pub const DEFAULT_NEGOTIATION_URL: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "oai-events";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration for backend endpoints, negotiation, and voice detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub api_base_url: String,
    /// Overrides `{api_base_url}/api/realtime/session` when set.
    pub realtime_session_url: Option<String>,
    pub negotiation_url: String,
    pub model: String,
    pub locale: Locale,
    pub session: SessionRequest,
    pub vad: VadConfig,
    /// Fallback cadence of the audio level tick.
    pub level_cadence: Duration,
    /// Upper bound on the offer/answer exchange.
    pub negotiation_timeout: Duration,
    pub request_timeout: Duration,
    pub data_channel_label: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            realtime_session_url: None,
            negotiation_url: DEFAULT_NEGOTIATION_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            locale: Locale::default(),
            session: SessionRequest::default(),
            vad: VadConfig::default(),
            level_cadence: Duration::from_millis(16),
            negotiation_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
        }
    }
}

/// On-disk shape; every field is optional and layered over the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_base_url: Option<String>,
    realtime_session_url: Option<String>,
    negotiation_url: Option<String>,
    model: Option<String>,
    locale: Option<Locale>,
    prompt: Option<String>,
    voice: Option<Voice>,
    level_cadence_ms: Option<u64>,
    negotiation_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    data_channel_label: Option<String>,
    vad: FileVadConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileVadConfig {
    energy_threshold: Option<f32>,
    min_speaking_duration_ms: Option<u64>,
    silence_duration_ms: Option<u64>,
}

impl CallConfig {
    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, CallError> {
        let file: FileConfig = toml::from_str(source)
            .map_err(|e| CallError::Configuration(format!("Invalid config file: {e}")))?;
        let mut config = Self::default();
        config.apply_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file, then layer environment variables on top.
    pub fn load(path: &Path) -> Result<Self, CallError> {
        let source = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&source)?;
        let _ = dotenvy::dotenv();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Platform config location, e.g. `~/.config/ceritain-call/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ceritain", "ceritain-call")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Credential issuance endpoint.
    pub fn session_url(&self) -> String {
        self.realtime_session_url.clone().unwrap_or_else(|| {
            format!(
                "{}/api/realtime/session",
                trim_trailing_slash(&self.api_base_url)
            )
        })
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if self.api_base_url.trim().is_empty() {
            return Err(CallError::Configuration("API base URL cannot be empty".into()));
        }
        if self.negotiation_url.trim().is_empty() {
            return Err(CallError::Configuration("Negotiation URL cannot be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(CallError::Configuration("Realtime model cannot be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.vad.energy_threshold) {
            return Err(CallError::Configuration(format!(
                "VAD energy threshold must be within [0, 1], got {}",
                self.vad.energy_threshold
            )));
        }
        if self.level_cadence.is_zero() {
            return Err(CallError::Configuration("Level cadence must be positive".into()));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CERITAIN_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var("CERITAIN_REALTIME_SESSION_URL") {
            self.realtime_session_url = Some(url);
        }
        if let Ok(url) = std::env::var("CERITAIN_NEGOTIATION_URL") {
            self.negotiation_url = url;
        }
        if let Ok(model) = std::env::var("CERITAIN_REALTIME_MODEL") {
            self.model = model;
        }
        if let Ok(code) = std::env::var("CERITAIN_LOCALE") {
            match code.parse() {
                Ok(locale) => self.locale = locale,
                Err(_) => tracing::warn!(locale = %code, "Ignoring unknown CERITAIN_LOCALE"),
            }
        }
        if let Ok(voice) = std::env::var("CERITAIN_VOICE") {
            match voice.parse() {
                Ok(voice) => self.session.voice = voice,
                Err(_) => tracing::warn!(voice = %voice, "Ignoring unknown CERITAIN_VOICE"),
            }
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if file.realtime_session_url.is_some() {
            self.realtime_session_url = file.realtime_session_url;
        }
        if let Some(v) = file.negotiation_url {
            self.negotiation_url = v;
        }
        if let Some(v) = file.model {
            self.model = v;
        }
        if let Some(v) = file.locale {
            self.locale = v;
        }
        if let Some(v) = file.prompt {
            self.session.prompt = v;
        }
        if let Some(v) = file.voice {
            self.session.voice = v;
        }
        if let Some(ms) = file.level_cadence_ms {
            self.level_cadence = Duration::from_millis(ms);
        }
        if let Some(ms) = file.negotiation_timeout_ms {
            self.negotiation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = file.data_channel_label {
            self.data_channel_label = v;
        }
        if let Some(v) = file.vad.energy_threshold {
            self.vad.energy_threshold = v;
        }
        if let Some(ms) = file.vad.min_speaking_duration_ms {
            self.vad.min_speaking_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = file.vad.silence_duration_ms {
            self.vad.silence_duration = Duration::from_millis(ms);
        }
    }
}

pub(crate) fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}
