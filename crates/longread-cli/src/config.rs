//! Layered configuration for the `longread` binary.
//!
//! Sources, later wins: built-in defaults, the TOML config file
//! ([`FileConfig`]), the environment ([`EnvConfig`]), then command-line
//! flags ([`Overrides`]). [`Settings::resolve`] merges them into the
//! [`ServiceConfig`] and [`EngineConfig`] a run needs.
//!
//! ```toml
//! size_unit = "chars"
//! markers = ['(?m)^Note to reader:.*$']
//!
//! [service]
//! endpoint = "https://openrouter.ai/api/v1/chat/completions"
//! model = "openai/gpt-4o-mini"
//! timeout_secs = 120
//!
//! [retry.rate_limit]
//! max_attempts = 5
//! base_delay_ms = 2000
//!
//! [levels.terse]
//! max_chunk = 15000
//!
//! [levels.bullets]
//! prompt = "Summarize as short bullet points."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use longread::api::RetryPolicy;
use longread::context::{MarkerRules, SizeUnit};
use longread::engine::{EngineConfig, LevelOverride, LevelTable, PromptMode, SamplingConfig};
use longread::error::ConfigError;
use longread::{AuthScheme, DEFAULT_MODEL, ServiceConfig};
use serde::Deserialize;
use tracing::debug;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "longread.toml";

/// Primary credential variable.
pub const API_KEY_VAR: &str = "LONGREAD_API_KEY";
/// Accepted when [`API_KEY_VAR`] is unset.
pub const FALLBACK_API_KEY_VAR: &str = "OPENROUTER_KEY";
pub const ENDPOINT_VAR: &str = "LONGREAD_ENDPOINT";
pub const MODEL_VAR: &str = "LONGREAD_MODEL";

/// `[service]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    pub endpoint: Option<String>,
    /// An empty string sends no model field (Azure deployment URLs).
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    /// `bearer` or `api-key`. Inferred from the endpoint host when unset.
    pub auth: Option<AuthScheme>,
}

/// Contents of a `longread.toml` file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub service: ServiceSection,
    pub retry: RetryPolicy,
    pub sampling: SamplingConfig,
    pub levels: BTreeMap<String, LevelOverride>,
    /// Extra artifact-marker regexes, applied after the built-in rules.
    pub markers: Vec<String>,
    pub size_unit: SizeUnit,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse TOML text; `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `explicit` if given (it must exist), else `longread.toml` in
    /// `dir` if present, else defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }
        match default_config_path(dir) {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// The built-in level table with this file's `[levels.*]` applied.
    pub fn level_table(&self) -> Result<LevelTable, ConfigError> {
        let mut table = LevelTable::default();
        for (name, over) in &self.levels {
            table.apply_override(name, over)?;
        }
        Ok(table)
    }

    pub fn marker_rules(&self) -> Result<MarkerRules, ConfigError> {
        MarkerRules::default().with_patterns(&self.markers)
    }
}

/// Settings read from environment variables (after `.env` is loaded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            api_key: get(API_KEY_VAR).or_else(|| get(FALLBACK_API_KEY_VAR)),
            endpoint: get(ENDPOINT_VAR),
            model: get(MODEL_VAR),
        }
    }
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub level: String,
    pub prompt: Option<String>,
    pub prompt_mode: PromptMode,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub max_attempts: Option<u32>,
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceConfig,
    pub engine: EngineConfig,
}

impl Settings {
    /// Merge all layers. The credential is checked first so a missing key
    /// fails before any other work.
    pub fn resolve(
        file: FileConfig,
        env: EnvConfig,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let api_key = env.api_key.ok_or_else(|| ConfigError::MissingCredential {
            variable: format!("{API_KEY_VAR} (or {FALLBACK_API_KEY_VAR})"),
        })?;

        let table = file.level_table()?;
        let mut engine = EngineConfig::from_table(&table, &overrides.level)?
            .with_sampling(file.sampling.clone())
            .with_retry(file.retry.clone())
            .with_markers(file.marker_rules()?)
            .with_measure(file.size_unit.into());

        let model = overrides
            .model
            .or(env.model)
            .or_else(|| file.service.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        engine = if model.trim().is_empty() {
            engine.without_model()
        } else {
            engine.with_model(model.trim())
        };

        if let Some(attempts) = overrides.max_attempts {
            engine = engine.with_max_attempts(attempts);
        }
        if let Some(prompt) = overrides.prompt {
            engine = engine.with_custom_prompt(prompt, overrides.prompt_mode);
        }
        engine.validate()?;

        let mut service = ServiceConfig::new(api_key);
        if let Some(endpoint) = overrides.endpoint.or(env.endpoint).or(file.service.endpoint) {
            service = service.with_endpoint(endpoint);
        }
        let auth = file
            .service
            .auth
            .unwrap_or_else(|| AuthScheme::for_endpoint(&service.endpoint));
        service = service.with_auth(auth);
        if let Some(secs) = file.service.timeout_secs {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "service.timeout_secs".into(),
                    message: "must be at least 1".into(),
                });
            }
            service = service.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self { service, engine })
    }
}

/// Path of the config file `discover` would load from `dir`, if any.
pub fn default_config_path(dir: &Path) -> Option<PathBuf> {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use longread::context::TextMeasure;

    fn env_with_key() -> EnvConfig {
        EnvConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        }
    }

    fn overrides(level: &str) -> Overrides {
        Overrides {
            level: level.into(),
            ..Default::default()
        }
    }

    fn parse(toml: &str) -> FileConfig {
        FileConfig::parse(toml, Path::new("longread.toml")).unwrap()
    }

    #[test]
    fn defaults_resolve_to_verbose_on_openrouter() {
        let settings =
            Settings::resolve(FileConfig::default(), env_with_key(), overrides("verbose")).unwrap();
        assert_eq!(settings.engine.level.name, "verbose");
        assert_eq!(settings.engine.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(settings.service.endpoint, longread::OPENROUTER_URL);
        assert_eq!(settings.service.api_key, "sk-test");
    }

    #[test]
    fn missing_credential_is_reported_first() {
        // Unknown level too, but the credential wins.
        let err = Settings::resolve(FileConfig::default(), EnvConfig::default(), overrides("nope"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn fallback_key_variable() {
        let env = EnvConfig::from_lookup(|name| match name {
            FALLBACK_API_KEY_VAR => Some("sk-fallback".into()),
            API_KEY_VAR => Some("   ".into()),
            _ => None,
        });
        assert_eq!(env.api_key.as_deref(), Some("sk-fallback"));
        assert_eq!(env.endpoint, None);
    }

    #[test]
    fn unknown_level_lists_known_names() {
        let err = Settings::resolve(FileConfig::default(), env_with_key(), overrides("chatty"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("chatty"));
        assert!(msg.contains("barney"));
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let file = parse(
            r#"
            [service]
            endpoint = "https://file.example/v1/chat/completions"
            model = "file/model"
            "#,
        );
        let env = EnvConfig {
            api_key: Some("k".into()),
            endpoint: Some("https://env.example/v1/chat/completions".into()),
            model: Some("env/model".into()),
        };
        let settings = Settings::resolve(file.clone(), env.clone(), overrides("terse")).unwrap();
        assert_eq!(settings.engine.model.as_deref(), Some("env/model"));
        assert_eq!(settings.service.endpoint, "https://env.example/v1/chat/completions");

        let flags = Overrides {
            model: Some("flag/model".into()),
            endpoint: Some("http://localhost:8080/v1/chat/completions".into()),
            ..overrides("terse")
        };
        let settings = Settings::resolve(file, env, flags).unwrap();
        assert_eq!(settings.engine.model.as_deref(), Some("flag/model"));
        assert_eq!(settings.service.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn empty_model_sends_none() {
        let file = parse("[service]\nmodel = \"\"\n");
        let settings = Settings::resolve(file, env_with_key(), overrides("concise")).unwrap();
        assert_eq!(settings.engine.model, None);
    }

    #[test]
    fn full_file_is_applied() {
        let file = parse(
            r#"
            size_unit = "tokens"
            markers = ['(?m)^Note to reader:.*$']

            [service]
            timeout_secs = 30

            [retry.rate_limit]
            max_attempts = 7
            base_delay_ms = 500

            [retry.timeout]
            step_ms = 100

            [sampling]
            temperature = 0.2

            [levels.terse]
            max_chunk = 15000

            [levels.bullets]
            prompt = "Summarize as short bullet points."
            context_paragraphs = 2
            "#,
        );

        let settings = Settings::resolve(file.clone(), env_with_key(), overrides("terse")).unwrap();
        let engine = &settings.engine;
        assert_eq!(engine.level.max_chunk, 15000);
        assert_eq!(engine.level.max_window, 18000);
        assert_eq!(engine.retry.rate_limit.max_attempts, 7);
        assert_eq!(engine.retry.rate_limit.base_delay, Duration::from_millis(500));
        assert_eq!(engine.retry.timeout.step, Duration::from_millis(100));
        assert_eq!(engine.retry.timeout.max_attempts, 3);
        assert!((engine.sampling.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(engine.sampling.top_p, Some(0.4));
        assert_eq!(engine.measure, TextMeasure::tokens());
        assert_eq!(engine.markers.len(), MarkerRules::default().len() + 1);
        assert_eq!(settings.service.timeout, Duration::from_secs(30));

        let bullets = Settings::resolve(file, env_with_key(), overrides("Bullets")).unwrap();
        assert_eq!(bullets.engine.level.name, "bullets");
        assert_eq!(bullets.engine.level.context_paragraphs, 2);
        assert_eq!(bullets.engine.level.prompt, "Summarize as short bullet points.");
    }

    #[test]
    fn max_attempts_flag_overrides_both_policies() {
        let flags = Overrides {
            max_attempts: Some(2),
            ..overrides("verbose")
        };
        let settings = Settings::resolve(FileConfig::default(), env_with_key(), flags).unwrap();
        assert_eq!(settings.engine.retry.rate_limit.max_attempts, 2);
        assert_eq!(settings.engine.retry.timeout.max_attempts, 2);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let flags = Overrides {
            max_attempts: Some(0),
            ..overrides("verbose")
        };
        let err = Settings::resolve(FileConfig::default(), env_with_key(), flags).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn custom_prompt_flag_with_mode() {
        let flags = Overrides {
            prompt: Some("Focus on dates.".into()),
            prompt_mode: PromptMode::Append,
            ..overrides("terse")
        };
        let settings = Settings::resolve(FileConfig::default(), env_with_key(), flags).unwrap();
        assert_eq!(settings.engine.custom_prompt.as_deref(), Some("Focus on dates."));
        assert_eq!(settings.engine.prompt_mode, PromptMode::Append);
    }

    #[test]
    fn invalid_marker_is_rejected() {
        let file = parse("markers = ['(unclosed']\n");
        let err = Settings::resolve(file, env_with_key(), overrides("verbose")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMarker { .. }));
    }

    #[test]
    fn new_level_without_prompt_is_rejected() {
        let file = parse("[levels.custom]\nmax_chunk = 1000\n");
        let err = Settings::resolve(file, env_with_key(), overrides("verbose")).unwrap_err();
        assert!(err.to_string().contains("levels.custom.prompt"), "{err}");
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = FileConfig::parse("[service]\nmodle = \"x\"\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let file = parse("[service]\ntimeout_secs = 0\n");
        let err = Settings::resolve(file, env_with_key(), overrides("verbose")).unwrap_err();
        assert!(err.to_string().contains("service.timeout_secs"));
    }

    #[test]
    fn negative_backoff_multiplier_is_rejected() {
        let file = parse("[retry.rate_limit]\nmultiplier = -2.0\n");
        let err = Settings::resolve(file, env_with_key(), overrides("verbose")).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "retry.rate_limit.multiplier"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn azure_endpoint_uses_api_key_header() {
        let env = EnvConfig {
            endpoint: Some(
                "https://acme.openai.azure.com/openai/deployments/gpt4/chat/completions".into(),
            ),
            ..env_with_key()
        };
        let settings = Settings::resolve(FileConfig::default(), env, overrides("verbose")).unwrap();
        assert_eq!(settings.service.auth, AuthScheme::ApiKey);

        // An explicit choice wins, e.g. Azure AD tokens.
        let file = parse("[service]\nauth = \"bearer\"\nendpoint = \"https://acme.openai.azure.com/x\"\n");
        let settings = Settings::resolve(file, env_with_key(), overrides("verbose")).unwrap();
        assert_eq!(settings.service.auth, AuthScheme::Bearer);

        let settings =
            Settings::resolve(FileConfig::default(), env_with_key(), overrides("verbose")).unwrap();
        assert_eq!(settings.service.auth, AuthScheme::Bearer);
    }

    #[test]
    fn discover_prefers_explicit_then_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(default_config_path(dir.path()).is_none());
        let config = FileConfig::discover(None, dir.path()).unwrap();
        assert!(config.levels.is_empty());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[service]\nmodel = \"dir/model\"\n",
        )
        .unwrap();
        assert!(default_config_path(dir.path()).is_some());
        let config = FileConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.service.model.as_deref(), Some("dir/model"));

        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[service]\nmodel = \"explicit/model\"\n").unwrap();
        let config = FileConfig::discover(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.service.model.as_deref(), Some("explicit/model"));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::discover(Some(&dir.path().join("absent.toml")), dir.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
