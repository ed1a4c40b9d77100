//! Service configuration.
//!
//! Precedence: `OPTIMISM__*` environment > file at `OPTIMISM_CONFIG`
//! (default `config/optimism`, any format the `config` crate reads) > defaults.
//! Nested keys use `__`, e.g. `OPTIMISM__SERVER__PORT=8080` or
//! `OPTIMISM__RATE_LIMITS__REFRAME__MAX_REQUESTS=5`.
//!
//! Provider API keys are not part of this file; they come from the
//! `<NAME>_API_KEY` variables described in [`crate::provider::catalog`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::provider::catalog::{self, ProviderKind, ProviderSpec};
use crate::provider::{GenerationParams, RetryPolicy};
use crate::rate_limit::RateLimitRules;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Generation and orchestration knobs.
///
/// | Key | Default | |
/// |-----|---------|-|
/// | temperature | 0.8 | sampling temperature for both phases |
/// | max_tokens | 2000 | completion cap |
/// | history_window | 6 | prior turns sent with each phase |
/// | request_timeout_secs | 15 | per provider call |
/// | retry_policy | every_provider | `every_provider` \| `first_provider_only` |
/// | sweep_interval_secs | 60 | rate-limit record sweep |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub history_window: usize,
    pub request_timeout_secs: u64,
    pub retry_policy: RetryPolicy,
    pub sweep_interval_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 2000,
            history_window: 6,
            request_timeout_secs: 15,
            retry_policy: RetryPolicy::EveryProvider,
            sweep_interval_secs: 60,
        }
    }
}

impl GenerationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.request_timeout(),
        }
    }
}

/// The always-tried last resort: an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for DefaultProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
        }
    }
}

/// Explicit provider tried before the environment chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl OverrideProviderConfig {
    pub fn spec(&self) -> ProviderSpec {
        let mut spec = ProviderSpec::new(self.kind, self.api_key.trim());
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            spec = spec.with_model(model.trim());
        }
        spec.base_url = self.base_url.clone();
        spec
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimismConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rate_limits: RateLimitRules,
    #[serde(default)]
    pub default_provider: DefaultProviderConfig,
    #[serde(default)]
    pub override_provider: Option<OverrideProviderConfig>,
}

impl OptimismConfig {
    /// Load from `OPTIMISM_CONFIG` (or `config/optimism`) and the environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("OPTIMISM_CONFIG").unwrap_or_else(|_| "config/optimism".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path. The extension may be omitted, in which
    /// case any supported one is tried. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let loaded: Self = config::Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .add_source(config::File::with_name(&path.to_string_lossy()).required(false))
            .add_source(config::Environment::with_prefix("OPTIMISM").separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(ConfigError::Invalid(format!(
                "generation.temperature must be within 0.0..=2.0, got {}",
                g.temperature
            )));
        }
        if g.max_tokens == 0 {
            return Err(ConfigError::Invalid("generation.max_tokens must be > 0".into()));
        }
        if g.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("generation.request_timeout_secs must be > 0".into()));
        }
        if g.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("generation.sweep_interval_secs must be > 0".into()));
        }
        self.rate_limits.validate().map_err(ConfigError::Invalid)?;
        if self.default_provider.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("default_provider.base_url is empty".into()));
        }
        if let Some(o) = &self.override_provider {
            if o.api_key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "override_provider ({}) has an empty api_key",
                    o.kind.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Enabled providers from `<NAME>_API_KEY` variables, in priority order.
    pub fn provider_chain(&self) -> Vec<ProviderSpec> {
        catalog::chain_from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::EndpointClass;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = OptimismConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.generation.history_window, 6);
        assert_eq!(cfg.generation.request_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.rate_limits.rule_for(EndpointClass::Reframe).max_requests, 10);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = OptimismConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.server.port, 8001);
        assert!(cfg.override_provider.is_none());
    }

    #[test]
    fn toml_file_overrides_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimism.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[server]
port = 9090

[generation]
retry_policy = "first_provider_only"
history_window = 4

[rate_limits.reframe]
window_secs = 30
max_requests = 3
block_secs = 120

[default_provider]
base_url = "http://localhost:8080/v1/chat/completions"
model = "qwen2.5"

[override_provider]
kind = "groq"
api_key = "gsk-test"
"#
        )
        .unwrap();

        let cfg = OptimismConfig::load_from(&path).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.generation.retry_policy, RetryPolicy::FirstProviderOnly);
        assert_eq!(cfg.generation.history_window, 4);
        assert_eq!(cfg.generation.max_tokens, 2000);
        let reframe = cfg.rate_limits.rule_for(EndpointClass::Reframe);
        assert_eq!((reframe.window_secs, reframe.max_requests, reframe.block_secs), (30, 3, 120));
        assert_eq!(cfg.rate_limits.rule_for(EndpointClass::Session).max_requests, 20);
        assert_eq!(cfg.default_provider.model, "qwen2.5");

        let spec = cfg.override_provider.unwrap().spec();
        assert_eq!(spec.kind, ProviderKind::Groq);
        assert_eq!(spec.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn extensionless_path_resolves_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("optimism.toml"), "[server]\nport = 9123\n").unwrap();
        let cfg = OptimismConfig::load_from(&dir.path().join("optimism")).unwrap();
        assert_eq!(cfg.server.port, 9123);
    }

    #[test]
    fn shipped_sample_loads_without_extension() {
        let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/optimism");
        let cfg = OptimismConfig::load_from(&base).unwrap();
        let raw = config::Config::builder()
            .add_source(config::File::from(base.with_extension("toml")))
            .build()
            .unwrap();
        assert_eq!(i64::from(cfg.server.port), raw.get_int("server.port").unwrap());
        assert_eq!(cfg.generation.retry_policy, raw.get::<RetryPolicy>("generation.retry_policy").unwrap());
        assert_eq!(
            cfg.rate_limits.rule_for(EndpointClass::Reframe).max_requests,
            raw.get::<u32>("rate_limits.reframe.max_requests").unwrap()
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[generation]\nrequest_timeout_secs = 0\n").unwrap();
        let err = OptimismConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut cfg = OptimismConfig::default();
        cfg.override_provider = Some(OverrideProviderConfig {
            kind: ProviderKind::OpenAi,
            api_key: " ".into(),
            model: None,
            base_url: None,
        });
        assert!(cfg.validate().is_err());
    }
}
