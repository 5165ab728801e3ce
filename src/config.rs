use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::semantic::DEFAULT_MODEL;

const DEFAULT_LLM_MODEL: &str = "gpt-4.1";
const DEFAULT_VECTOR_STORE_DIR: &str = "vector_store";
const DEFAULT_CACHE_PATH: &str = "all_bookmarks.json";
const DEFAULT_RETRIEVAL_K: usize = 10;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DESCRIPTION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MODELS_DIR: &str = "models";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVariable(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file {path} is malformed: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Runtime settings, built once at startup.
///
/// Precedence, lowest first: built-in defaults, the optional YAML file, then
/// environment variables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Chat model used for descriptions and answers
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// fastembed model name for the index
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_vector_store_dir")]
    pub vector_store_dir: PathBuf,

    #[serde(default = "default_cache_path")]
    pub bookmarks_cache_path: PathBuf,

    /// Documents retrieved per question
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Browser bookmarks file, the platform default when unset
    #[serde(default)]
    pub bookmarks_path: Option<PathBuf>,

    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_max_concurrent_descriptions")]
    pub max_concurrent_descriptions: usize,

    /// Per-call limit for description generation, 0 disables it
    #[serde(default = "default_description_timeout_secs")]
    pub description_timeout_secs: u64,

    /// Where embedding models are downloaded to
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_model: default_llm_model(),
            embedding_model: default_embedding_model(),
            vector_store_dir: default_vector_store_dir(),
            bookmarks_cache_path: default_cache_path(),
            retrieval_k: default_retrieval_k(),
            log_level: default_log_level(),
            bookmarks_path: None,
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            max_concurrent_descriptions: default_max_concurrent_descriptions(),
            description_timeout_secs: default_description_timeout_secs(),
            models_dir: default_models_dir(),
        }
    }
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_vector_store_dir() -> PathBuf {
    PathBuf::from(DEFAULT_VECTOR_STORE_DIR)
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}

fn default_retrieval_k() -> usize {
    DEFAULT_RETRIEVAL_K
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_max_concurrent_descriptions() -> usize {
    crate::enrich::MAX_CONCURRENT
}

fn default_description_timeout_secs() -> u64 {
    DEFAULT_DESCRIPTION_TIMEOUT_SECS
}

fn default_models_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MODELS_DIR)
}

impl Config {
    /// Load `.env`, the optional YAML file and the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }

        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yml::from_str(&config_str).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from variables returned by `lookup`. Empty values
    /// count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = get("VECTOR_STORE_DIR") {
            self.vector_store_dir = PathBuf::from(v);
        }
        if let Some(v) = get("BOOKMARKS_CACHE_PATH") {
            self.bookmarks_cache_path = PathBuf::from(v);
        }
        if let Some(v) = get("RETRIEVAL_K") {
            self.retrieval_k = parse_number("RETRIEVAL_K", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("BOOKMARKS_PATH") {
            self.bookmarks_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = get("MAX_CONCURRENT_DESCRIPTIONS") {
            self.max_concurrent_descriptions = parse_number("MAX_CONCURRENT_DESCRIPTIONS", &v)?;
        }
        if let Some(v) = get("DESCRIPTION_TIMEOUT_SECS") {
            self.description_timeout_secs = parse_number("DESCRIPTION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("MODELS_DIR") {
            self.models_dir = PathBuf::from(v);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval_k == 0 {
            return Err(ConfigError::InvalidValue {
                var: "RETRIEVAL_K",
                value: "0".to_string(),
            });
        }

        if self.max_concurrent_descriptions == 0
            || self.max_concurrent_descriptions > Semaphore::MAX_PERMITS
        {
            return Err(ConfigError::InvalidValue {
                var: "MAX_CONCURRENT_DESCRIPTIONS",
                value: self.max_concurrent_descriptions.to_string(),
            });
        }

        Ok(())
    }

    /// The API key, required by anything that talks to the chat model.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingVariable("OPENAI_API_KEY"))
    }

    pub fn description_timeout(&self) -> Option<Duration> {
        match self.description_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}
