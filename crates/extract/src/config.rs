use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::prompt::{DEFAULT_ENTITY_TYPES, DEFAULT_EXTRACTION_PROMPT, Delimiters};
use crate::retry::RetryConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// One gleaning loop per chunk.
    #[default]
    Single,
    /// Several chunks per prompt, falling back to `Single` on mismatch.
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub mode: ExtractionMode,
    pub max_gleanings: usize,
    pub entity_types: Vec<String>,
    pub delimiters: Delimiters,
    /// Overrides the built-in extraction template.
    pub prompt_template: Option<String>,
    pub max_batch_size: usize,
    /// Target combined characters per batched prompt.
    pub batch_char_budget: usize,
    pub concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Single,
            max_gleanings: 1,
            entity_types: DEFAULT_ENTITY_TYPES.iter().map(|s| s.to_string()).collect(),
            delimiters: Delimiters::default(),
            prompt_template: None,
            max_batch_size: 5,
            batch_char_budget: 10_000,
            concurrency: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn template(&self) -> &str {
        self.prompt_template.as_deref().unwrap_or(DEFAULT_EXTRACTION_PROMPT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("extraction concurrency must be at least 1");
        }
        if self.max_batch_size == 0 {
            anyhow::bail!("max_batch_size must be at least 1");
        }
        if self.delimiters.tuple.is_empty() || self.delimiters.record.is_empty() {
            anyhow::bail!("tuple and record delimiters must be non-empty");
        }
        if !self.template().contains("{input_text}") {
            anyhow::bail!("extraction prompt template has no {{input_text}} placeholder");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.entity_types, vec!["organization", "person", "geo", "event"]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"mode": "batch", "retry": {"delay_ms": 0}}"#).unwrap();
        assert_eq!(config.mode, ExtractionMode::Batch);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.delay_ms, 0);
        assert_eq!(config.delimiters.tuple, "<|>");
    }

    #[test]
    fn test_template_without_input_rejected() {
        let config = ExtractionConfig {
            prompt_template: Some("no placeholder".into()),
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
