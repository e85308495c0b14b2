//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, so `APP_BUILD__K=4` sets `build.k`). Every
//! section has defaults, so a missing file still yields a usable [`Settings`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::BuildParams;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment, env_name: env_name.to_string() })
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub build: BuildConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.build.params.validate().map_err(Error::InvalidConfig)?;
        if self.build.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("build.embed_batch_size must be positive".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if self.index.kmeans_iterations == 0 {
            return Err(Error::InvalidConfig("index.kmeans_iterations must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub corpus_dir: String,
    pub artifacts_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { corpus_dir: "corpus".into(), artifacts_dir: "artifacts".into() }
    }
}

impl PathsConfig {
    pub fn corpus_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.corpus_dir)
    }

    pub fn artifacts_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.artifacts_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    #[serde(flatten)]
    pub params: BuildParams,
    /// Texts per embedding call at build time.
    pub embed_batch_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { params: BuildParams::default(), embed_batch_size: 32 }
    }
}

/// Nearest-neighbour index tuning. Zero means "derive from corpus size".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Corpora with fewer chunks than this use exact search.
    pub flat_threshold: usize,
    pub nlist: usize,
    pub nprobe: usize,
    pub kmeans_iterations: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { flat_threshold: 256, nlist: 0, nprobe: 0, kmeans_iterations: 12 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Bert,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model_name: String,
    pub model_dir: Option<String>,
    /// Only used by the hash provider; model-backed providers report their own.
    pub dim: usize,
    pub max_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Bert,
            model_name: "sentence-transformers/all-MiniLM-L6-v2".into(),
            model_dir: None,
            dim: 384,
            max_len: 256,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
