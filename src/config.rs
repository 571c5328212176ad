use crate::models::{ContentRequest, DEFAULT_MODEL};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings shared by every request of a run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// OpenAI-compatible API endpoint
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Model used for content insights
    #[serde(default = "default_model")]
    pub insights_model: String,
    /// Sampling temperature for grading and insight calls
    #[serde(default)]
    pub temperature: f64,
    /// Rate limit for API requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// CSV of metrics applied to every content category
    pub common_metrics_path: PathBuf,
    /// CSV of metrics per content category
    pub category_metrics_path: PathBuf,
    /// Persistent grading cache, disabled when absent
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Optional local path to store reports as JSON
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_timeout() -> u64 {
    120
}

/// A content request as written in the run file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestConfig {
    /// Inline generated content
    #[serde(default)]
    pub content: Option<String>,
    /// File holding the generated content
    #[serde(default)]
    pub content_file: Option<PathBuf>,
    #[serde(default)]
    pub reference_text: Option<String>,
    #[serde(default)]
    pub reference_file: Option<PathBuf>,
    pub content_type: String,
    /// Grading model
    #[serde(default = "default_model")]
    pub model: String,
    /// Keywords whose density is reported
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Extra context appended to the reference text
    #[serde(default)]
    pub extra_context: BTreeMap<String, String>,
}

/// Root configuration of a run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub settings: Settings,
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(config)
    }

    /// Resolve a path from the run file relative to the run file's directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Turn a configured request into a [`ContentRequest`], reading any
    /// referenced files
    pub fn content_request(&self, request: &RequestConfig) -> Result<ContentRequest> {
        let generated_content = self
            .inline_or_file(&request.content, &request.content_file)
            .context("Failed to load generated content")?;
        let reference_text = self
            .inline_or_file(&request.reference_text, &request.reference_file)
            .context("Failed to load reference text")?;

        Ok(ContentRequest {
            generated_content,
            reference_text,
            content_type: request.content_type.clone(),
            model_name: request.model.clone(),
            extra_context: request.extra_context.clone(),
        })
    }

    fn inline_or_file(&self, inline: &Option<String>, file: &Option<PathBuf>) -> Result<String> {
        match (inline, file) {
            (Some(text), None) => Ok(text.clone()),
            (None, Some(file)) => {
                let path = self.resolve(file);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))
            }
            (Some(_), Some(_)) => bail!("Both inline text and a file were given"),
            (None, None) => bail!("Neither inline text nor a file was given"),
        }
    }
}
