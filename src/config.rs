//! Woundrelay configuration. Loaded once at startup from an optional TOML file
//! and `WOUNDRELAY_*` environment variables, then handed to the server as an
//! immutable value

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file, read if present
pub const CONFIG_FILE: &str = "woundrelay.toml";

/// Prefix of the environment variables that override the config file
pub const ENV_PREFIX: &str = "WOUNDRELAY";

/// Fallback environment variable holding the remote API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Largest accepted upload (10 MiB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Instruction sent alongside every image
pub const PROMPT: &str = "Detect any wounds in this image. Respond only with JSON of the form \
{\"data\": [{\"type\": string, \"location\": string, \"appearance\": {\"color\": string, \
\"size\": string, \"texture\": string}, \"infection\": string, \"severity\": integer 1-5}]}. \
Use an empty data array if there is no wound.";

/// Runtime configuration of the relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for transient upload files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Key for the remote inference API. Resolved by `Config::load`
    #[serde(default)]
    pub api_key: Option<String>,

    /// JSON file of the form `{"api_key": "..."}`
    #[serde(default = "default_api_key_file")]
    pub api_key_file: PathBuf,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Timeout of the outbound inference call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tracing filter directive, `RUST_LOG` wins if set
    #[serde(default = "default_log")]
    pub log: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

fn default_upload_dir() -> PathBuf {
    "uploads".into()
}

fn default_max_upload_bytes() -> usize {
    MAX_UPLOAD_BYTES
}

fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_model() -> String {
    "gemini-1.5-flash".into()
}

fn default_api_key_file() -> PathBuf {
    "google-key.json".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_log() -> String {
    "info,actix_web=info".into()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            api_key: None,
            api_key_file: default_api_key_file(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            log: default_log(),
        }
    }
}

#[derive(Deserialize)]
struct KeyFile {
    api_key: String,
}

impl Config {
    /// Read the config file (if it exists) and the environment, then resolve
    /// the API key and validate
    pub fn load(file: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(file).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read config from {file}"))?;

        let mut config: Config = settings
            .try_deserialize()
            .context("invalid configuration")?;

        let env_key = std::env::var(API_KEY_ENV).ok();
        config.api_key = Some(config.resolve_api_key(env_key)?);
        config.validate()?;
        Ok(config)
    }

    /// Explicit setting first, then the key file, then `GEMINI_API_KEY`
    fn resolve_api_key(&self, env_key: Option<String>) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        if self.api_key_file.exists() {
            return read_key_file(&self.api_key_file);
        }
        env_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            anyhow!(
                "no API key: set api_key, provide {} or export {API_KEY_ENV}",
                self.api_key_file.display()
            )
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be positive");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature {} is outside 0.0..=2.0", self.temperature);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn read_key_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: KeyFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid key file", path.display()))?;
    Ok(file.api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(crate::util::unique_file_name("config-test"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_key_wins() {
        let config = Config {
            api_key: Some("explicit".into()),
            api_key_file: "/nonexistent/google-key.json".into(),
            ..Config::default()
        };
        let key = config.resolve_api_key(Some("from-env".into())).unwrap();
        assert_eq!(key, "explicit");
    }

    #[test]
    fn test_key_file() {
        let path = scratch_file("google-key.json", r#"{"api_key": "from-file"}"#);
        let config = Config {
            api_key_file: path.clone(),
            ..Config::default()
        };
        assert_eq!(config.resolve_api_key(None).unwrap(), "from-file");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_env_key_fallback() {
        let config = Config {
            api_key_file: "/nonexistent/google-key.json".into(),
            ..Config::default()
        };
        assert_eq!(config.resolve_api_key(Some("env".into())).unwrap(), "env");
        assert!(config.resolve_api_key(None).is_err());
        assert!(config.resolve_api_key(Some(String::new())).is_err());
    }

    #[test]
    fn test_load_toml() {
        let path = scratch_file(
            "woundrelay.toml",
            "port = 8080\napi_key = \"abc\"\ntemperature = 0.1\nupload_dir = \"/tmp/wr\"\n",
        );
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/wr"));
        assert_eq!(config.model, "gemini-1.5-flash");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let config = Config {
            temperature: 3.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
