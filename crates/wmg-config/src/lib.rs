//! Configuration for `wmg`: the completion provider, the API key, and logging.
//!
//! Config is read once at startup from a TOML file (optional) and then overridden by
//! environment variables. Nothing in here is a process-wide singleton except the tracing
//! subscriber installed by [`init_tracing`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use url::Url;

mod logging;

pub use logging::init_tracing;

/// Tracing target used for AI audit events (prompts / model output).
pub const AI_AUDIT_TARGET: &str = "wmg.ai.audit";

/// Explicit config file path. Takes precedence over `./wmg.toml`.
pub const WMG_CONFIG_ENV_VAR: &str = "WMG_CONFIG";

/// API key for the completion provider. Overrides `ai.api_key` from the config file.
pub const WMG_API_KEY_ENV_VAR: &str = "WMG_API_KEY";

/// Model override. Overrides `ai.provider.model` from the config file.
pub const WMG_MODEL_ENV_VAR: &str = "WMG_MODEL";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "wmg.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WmgConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a simple level (`info`, `debug`, ...) or an `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while stderr logging stays active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            "off" | "none" => "off".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// If `RUST_LOG` is set, it is merged into the configured directives.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// Bearer token for the completion endpoint. Usually supplied via `WMG_API_KEY` rather than
    /// written into the config file.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub provider: AiProviderConfig,

    #[serde(default)]
    pub audit_log: AuditLogConfig,
}

impl AiConfig {
    /// The configured API key, or [`ConfigError::MissingApiKey`] when it is absent or blank.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key_present", &self.api_key.is_some())
            .field("provider", &self.provider)
            .field("audit_log", &self.audit_log)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiProviderConfig {
    /// Full URL of the completion endpoint (the request is POSTed here as-is).
    #[serde(default = "default_provider_url")]
    pub url: Url,

    #[serde(default = "default_model_name")]
    pub model: String,

    /// Upper bound on generated tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature. `0.0` keeps revisions deterministic.
    #[serde(default)]
    pub temperature: f32,

    /// Total request timeout (connect + send + read), in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl AiProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AiProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            model: default_model_name(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl fmt::Debug for AiProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiProviderConfig")
            .field("url", &sanitize_url_for_debug(&self.url))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn default_provider_url() -> Url {
    Url::parse("https://api.openai.com/v1/completions").expect("valid default url")
}

fn default_model_name() -> String {
    "gpt-3.5-turbo-instruct".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditLogConfig {
    /// Record sanitized prompts and completions under [`AI_AUDIT_TARGET`].
    #[serde(default)]
    pub enabled: bool,

    /// Dedicated audit log file. Defaults to `$TMPDIR/wmg-ai-audit.log`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditLogConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("wmg-ai-audit.log"))
    }
}

/// Render a URL without userinfo, query values or fragment.
pub(crate) fn sanitize_url_for_debug(url: &Url) -> String {
    const REDACTION: &str = "<redacted>";
    let mut out = String::new();

    out.push_str(url.scheme());
    out.push_str("://");

    if !url.username().is_empty() || url.password().is_some() {
        out.push_str(REDACTION);
        out.push('@');
    }

    match url.host_str() {
        Some(host) => out.push_str(host),
        None => out.push_str("<unknown-host>"),
    }

    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    out.push_str(url.path());

    if url.query().is_some() {
        out.push('?');
        let mut first = true;
        for (k, _v) in url.query_pairs() {
            if !first {
                out.push('&');
            }
            first = false;
            out.push_str(&k);
            out.push('=');
            out.push_str(REDACTION);
        }
    }

    if url.fragment().is_some() {
        out.push('#');
        out.push_str(REDACTION);
    }

    out
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("no API key configured; set WMG_API_KEY or ai.api_key")]
    MissingApiKey,
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet, which may contain `ai.api_key`.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();
    static SINGLE_QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();

    let re = QUOTED_STRING_RE.get_or_init(|| {
        regex::Regex::new(r#""(?:\\.|[^"\\])*""#).expect("quoted-string regex should compile")
    });
    let out = re.replace_all(message, r#""<redacted>""#).into_owned();

    let re_single = SINGLE_QUOTED_STRING_RE.get_or_init(|| {
        regex::Regex::new(r#"'(?:\\.|[^'\\])*'"#)
            .expect("single-quoted-string regex should compile")
    });
    re_single.replace_all(&out, "'<redacted>'").into_owned()
}

impl WmgConfig {
    /// Load a config file from TOML and validate it. Environment overrides are not applied.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: WmgConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = &self.ai.provider;
        if provider.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "ai.provider.max_tokens must be >= 1".into(),
            ));
        }
        if provider.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ai.provider.timeout_ms must be >= 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "ai.provider.temperature must be within 0.0..=2.0; got {}",
                provider.temperature
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ai.provider.model must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply `WMG_API_KEY` / `WMG_MODEL` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup. Blank values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup(WMG_API_KEY_ENV_VAR) {
            self.ai.api_key = Some(key.trim().to_owned());
        }
        if let Some(model) = lookup(WMG_MODEL_ENV_VAR) {
            self.ai.provider.model = model.trim().to_owned();
        }
    }
}

/// Locate the config file for a process started in `cwd`.
///
/// `$WMG_CONFIG` wins when set (even if the file does not exist, so the caller gets a read
/// error instead of silently falling back to defaults). Otherwise `cwd/wmg.toml` is used when
/// present.
pub fn discover_config_path(cwd: &Path) -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(WMG_CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(explicit);
        return Some(if path.is_absolute() {
            path
        } else {
            cwd.join(path)
        });
    }

    let candidate = cwd.join(DEFAULT_CONFIG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

/// Load the effective configuration: explicit path, else discovered file, else defaults; then
/// environment overrides.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<WmgConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| discover_config_path(cwd));

    let mut config = match path {
        Some(path) => {
            tracing::debug!(target: "wmg.config", path = %path.display(), "loading config");
            WmgConfig::load_from_path(&path)?
        }
        None => WmgConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
