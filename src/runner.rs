use crate::cache::{GradingCache, JsonFileCache, NoCache};
use crate::catalog::MetricCatalog;
use crate::config::Config;
use crate::content::{Content, Services};
use crate::llm::{ChatBackend, OpenAiBackend, RateLimiter};
use crate::models::{ContentReport, ContentRequest};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Main runner that evaluates every request of a run file
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run all requests defined in the configuration
    pub async fn run_evaluations(&self) -> Result<Vec<ContentReport>> {
        let settings = &self.config.settings;

        let catalog = self.load_catalog()?;
        let cache = self.open_cache()?;
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit_rps));
        let analyst: Arc<dyn ChatBackend> = Arc::new(
            OpenAiBackend::new(settings, &settings.insights_model, limiter.clone())
                .context("Failed to create insights model client")?,
        );

        let total_requests = self.config.requests.len();
        let mut reports = Vec::with_capacity(total_requests);

        for (index, request_config) in self.config.requests.iter().enumerate() {
            let request = self.config.content_request(request_config)?;
            info!(
                "Evaluating request {}/{} ({}, graded by {})",
                index + 1,
                total_requests,
                request.content_type,
                request.model_name
            );

            let judge: Arc<dyn ChatBackend> = Arc::new(
                OpenAiBackend::new(settings, &request.model_name, limiter.clone())
                    .context("Failed to create grading model client")?,
            );
            let services = Services {
                judge,
                analyst: analyst.clone(),
                cache: cache.clone(),
            };

            let report = evaluate_request(request, &request_config.keywords, &catalog, &services)
                .await
                .with_context(|| format!("Failed to evaluate request {}", index + 1))?;
            reports.push(report);
        }

        self.store_results_if_configured(&reports)?;

        Ok(reports)
    }

    fn load_catalog(&self) -> Result<MetricCatalog> {
        let settings = &self.config.settings;
        let common = self.config.resolve(&settings.common_metrics_path);
        let category = self.config.resolve(&settings.category_metrics_path);

        MetricCatalog::from_paths(&common, &category).context("Failed to load metric catalogs")
    }

    fn open_cache(&self) -> Result<Arc<dyn GradingCache>> {
        match &self.config.settings.cache_path {
            Some(path) => {
                let path = self.config.resolve(path);
                let cache = JsonFileCache::open(&path).context("Failed to open grading cache")?;
                Ok(Arc::new(cache))
            }
            None => Ok(Arc::new(NoCache)),
        }
    }

    /// Store results if storage path is configured
    fn store_results_if_configured(&self, reports: &[ContentReport]) -> Result<()> {
        if let Some(storage_path) = &self.config.settings.storage_path {
            let path = self.config.resolve(storage_path);
            info!("Storing {} reports to {}", reports.len(), path.display());
            self.store_results(reports, &path)?;
        }
        Ok(())
    }

    /// Store results to a JSON file
    fn store_results(&self, reports: &[ContentReport], path: &Path) -> Result<()> {
        let json_content =
            serde_json::to_string_pretty(reports).context("Failed to serialize results to JSON")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, json_content)
            .with_context(|| format!("Failed to write results to: {}", path.display()))?;

        info!("Results stored to: {}", path.display());
        Ok(())
    }
}

/// Run every facade accessor for one request
pub async fn evaluate_request(
    request: ContentRequest,
    keywords: &[String],
    catalog: &MetricCatalog,
    services: &Services,
) -> Result<ContentReport> {
    let content = Content::new(request, catalog, services)?;

    let statistics = content.get_statistical_metrics();
    let keyword_density: BTreeMap<String, f64> = keywords
        .iter()
        .map(|keyword| (keyword.clone(), content.keyword_density(keyword)))
        .collect();

    let llm_metrics = content
        .get_llm_metrics()
        .await
        .context("Failed to compute LLM metrics")?;
    let insights = content
        .get_content_insights()
        .await
        .context("Failed to extract content insights")?;

    Ok(ContentReport {
        content_type: content.content_type().to_string(),
        model: services.judge.model().to_string(),
        statistics,
        keyword_density,
        llm_metrics,
        insights,
    })
}
