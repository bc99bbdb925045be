use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::database::EpsillaConfig;
use crate::groq::GroqConfig;
use crate::huggingface::HuggingFaceConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 4;

/// Source of configuration values, keyed by variable name
pub trait VarSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads from the process environment
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl<F> VarSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Fetch a variable that must be present and non-blank
pub fn required(vars: &impl VarSource, name: &str) -> Result<String> {
    vars.var(name)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Missing required environment variable {}", name))
}

/// Fetch a variable, falling back to `default` when unset or blank
pub fn or_default(vars: &impl VarSource, name: &str, default: &str) -> String {
    vars.var(name)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse a variable that may be unset or blank
pub fn parsed<T>(vars: &impl VarSource, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    vars.var(name)
        .filter(|v| !v.trim().is_empty())
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {:?}", name, raw))
        })
        .transpose()
}

/// Parse a variable, falling back to `default` when unset
pub fn parsed_or<T>(vars: &impl VarSource, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parsed(vars, name)?.unwrap_or(default))
}

/// Optional request timeout shared by all HTTP clients (`HTTP_TIMEOUT_SECS`)
pub fn http_timeout(vars: &impl VarSource) -> Result<Option<Duration>> {
    Ok(parsed::<u64>(vars, "HTTP_TIMEOUT_SECS")?.map(Duration::from_secs))
}

/// Splitter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &impl VarSource) -> Result<Self> {
        Ok(ChunkingConfig {
            chunk_size: parsed_or(vars, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parsed_or(vars, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
        })
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub epsilla: EpsillaConfig,
    pub huggingface: HuggingFaceConfig,
    pub groq: GroqConfig,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
}

impl Settings {
    /// Load all settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&ProcessEnv)
    }

    /// Load all settings from an arbitrary variable source.
    /// API keys are checked first so a missing key fails fast.
    pub fn from_vars(vars: &impl VarSource) -> Result<Self> {
        let huggingface = HuggingFaceConfig::from_vars(vars)?;
        let groq = GroqConfig::from_vars(vars)?;
        let epsilla = EpsillaConfig::from_vars(vars)?;
        let chunking = ChunkingConfig::from_vars(vars)?;
        let top_k = parsed_or(vars, "RAG_TOP_K", DEFAULT_TOP_K)?;
        anyhow::ensure!(top_k > 0, "RAG_TOP_K must be greater than zero");

        Ok(Settings {
            epsilla,
            huggingface,
            groq,
            chunking,
            top_k,
        })
    }
}
