use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::CaptureConfig;
use crate::session::SessionConfig;
use crate::settings::PartiesConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub parties: PartiesConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "parley-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Config {
    /// Load from a config file; the extension may be omitted
    pub fn load(path: &str) -> Result<Self> {
        Self::build(path, true)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_optional(path: &str) -> Result<Self> {
        Self::build(path, false)
    }

    fn build(path: &str, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CaptureSource;
    use crate::session::Party;

    #[test]
    fn test_missing_optional_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");

        let config = Config::load_optional(path.to_str().unwrap()).unwrap();

        assert_eq!(config.session.countdown_secs, 30);
        assert_eq!(config.session.tick_interval_ms, 1000);
        assert_eq!(config.capture.source, CaptureSource::Tone);
        assert_eq!(config.service.http.port, 8787);
    }

    #[test]
    fn test_missing_required_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");

        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        std::fs::write(
            &path,
            r#"
[session]
countdown_secs = 10
default_mode = "person2"

[capture]
source = "microphone"
device = "USB Mic"

[parties.person2]
input_language = "es-ES"
output_language = "en"
"#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.session.countdown_secs, 10);
        assert_eq!(config.session.tick_interval_ms, 1000);
        assert_eq!(config.session.default_mode, Party::Person2);
        assert_eq!(config.capture.source, CaptureSource::Microphone);
        assert_eq!(config.capture.device, "USB Mic");
        assert_eq!(config.capture.sample_rate, 16000);
        assert_eq!(config.parties.person2.input_language, "es-ES");
        assert_eq!(config.parties.person2.voice, "");
        assert_eq!(config.parties.person1.input_language, "en-US");
    }
}
