use anyhow::{Context, Result};
use extract::ExtractionConfig;
use ingest::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "graphrag.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub chunks: ChunkingConfig,
    pub extract: ExtractionConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("input"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Registry name the extractor looks the model up by.
    pub model_id: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_id: "default_chat_model".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// One file per entry, survives across runs.
    #[default]
    File,
    Memory,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub dir: PathBuf,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::File,
            dir: PathBuf::from("cache/extract_graph"),
            max_entries: 10000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// Used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl AppConfig {
    /// Load `path`, or `graphrag.toml` in the working directory. Without an
    /// explicit path a missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&contents).context(format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunks.validate()?;
        self.extract.validate()?;
        if self.cache.kind == CacheKind::Memory && self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be at least 1 for the memory cache");
        }
        Ok(())
    }
}
