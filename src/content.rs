use crate::cache::GradingCache;
use crate::catalog::MetricCatalog;
use crate::error::{ContentError, EvalError, InsightError};
use crate::insights::{ContentInsight, InsightExtractor};
use crate::llm::ChatBackend;
use crate::llm_metrics::LlmMetrics;
use crate::models::{ContentRequest, MetricScores};
use crate::text_stats::TextMetrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const BLOCK_SEPARATOR: &str = "\n___________________";

/// Collaborators a [`Content`] delegates to
#[derive(Clone)]
pub struct Services {
    /// Grading model, expected to be the request's `model_name`
    pub judge: Arc<dyn ChatBackend>,
    /// Model used for content insights
    pub analyst: Arc<dyn ChatBackend>,
    pub cache: Arc<dyn GradingCache>,
}

/// Fold extra context into the reference text as labeled blocks
pub fn augment_reference(reference_text: &str, extra_context: &BTreeMap<String, String>) -> String {
    if extra_context.is_empty() {
        return reference_text.to_string();
    }

    let mut augmented = format!("Core Information : \n{reference_text}{BLOCK_SEPARATOR}");
    for (key, value) in extra_context {
        augmented.push_str(&format!("\n {key} : \n {value}{BLOCK_SEPARATOR}"));
    }
    augmented
}

/// Entry point: one piece of generated content and everything needed to
/// evaluate it
pub struct Content {
    content: String,
    reference_text: String,
    content_type: String,
    llm_metrics: LlmMetrics,
    insights: InsightExtractor,
}

impl Content {
    /// Validate the content type and bind the evaluators to the request
    pub fn new(request: ContentRequest, catalog: &MetricCatalog, services: &Services) -> Result<Self, ContentError> {
        if !catalog.contains_category(&request.content_type) {
            return Err(ContentError::UnknownContentType {
                content_type: request.content_type,
                allowed: catalog.categories(),
            });
        }

        if !request.extra_context.is_empty() {
            info!(
                keys = ?request.extra_context.keys().collect::<Vec<_>>(),
                "appending extra context to the reference text, keep it relevant for stable grading"
            );
        }
        let reference_text = augment_reference(&request.reference_text, &request.extra_context);

        let llm_metrics = LlmMetrics::new(
            request.generated_content.clone(),
            reference_text.clone(),
            catalog.metrics_for(&request.content_type),
            services.judge.clone(),
            services.cache.clone(),
        );

        Ok(Self {
            content: request.generated_content,
            reference_text,
            content_type: request.content_type,
            llm_metrics,
            insights: InsightExtractor::new(services.analyst.clone()),
        })
    }

    /// Reference text used by every reference-based metric
    pub fn reference_text(&self) -> &str {
        &self.reference_text
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn text_metrics(&self) -> TextMetrics<'_> {
        TextMetrics::new(&self.content)
    }

    /// Default statistical metrics, keyword density excluded
    pub fn get_statistical_metrics(&self) -> BTreeMap<String, f64> {
        self.text_metrics().summary().to_map()
    }

    pub fn keyword_density(&self, keyword: &str) -> f64 {
        self.text_metrics().keyword_density(keyword)
    }

    /// Hallucination, faithfulness and every catalog metric in one map
    pub async fn get_llm_metrics(&self) -> Result<MetricScores, EvalError> {
        let mut all_metrics = self.llm_metrics.get_common_deepeval_metrics().await?;
        let (reference_based, content_based) = self.llm_metrics.compute_metrics().await?;

        all_metrics.extend(reference_based);
        all_metrics.extend(content_based);

        Ok(all_metrics)
    }

    pub async fn get_content_insights(&self) -> Result<ContentInsight, InsightError> {
        self.insights.extract(&self.content_type, &self.content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoCache};
    use crate::catalog::tests::sample_catalog;
    use crate::insights::ContentTone;
    use crate::llm::testing::ScriptedBackend;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn judge() -> ScriptedBackend {
        ScriptedBackend::new()
            .on("Generate 3-4", r#"{"steps": ["Check it"]}"#)
            .on("Score the test case", r#"{"score": 7, "reason": "Solid."}"#)
            .on("Hallucination check", r#"{"verdicts": [{"verdict": "yes"}]}"#)
            .on("Explain the hallucination score", r#"{"reason": "Consistent."}"#)
            .on("Extract factual truths", r#"{"truths": ["Fact."]}"#)
            .on("Extract every claim", r#"{"claims": ["Fact."]}"#)
            .on("Faithfulness check", r#"{"verdicts": [{"verdict": "yes"}]}"#)
            .on("Explain the faithfulness score", r#"{"reason": "Grounded."}"#)
    }

    fn analyst() -> ScriptedBackend {
        ScriptedBackend::new().with_tool_reply(json!({
            "content_tone": "Persuasive",
            "content_topic": "Running shoes",
            "suggested_keywords": ["shoes"],
            "search_queries": ["light shoes", "running shoes sale", "spring shoes"]
        }))
    }

    fn services(judge: Arc<ScriptedBackend>) -> Services {
        Services {
            judge,
            analyst: Arc::new(analyst()),
            cache: Arc::new(NoCache),
        }
    }

    fn blog_request() -> ContentRequest {
        ContentRequest::new(
            "Our new shoes are light. You will love them!\n\nOrder today.",
            "Spring shoe line launch, 200g per shoe.",
            "Blog",
        )
    }

    #[test]
    fn test_unknown_content_type_lists_allowed() {
        let request = ContentRequest::new("text", "ref", "Poem");
        let result = Content::new(request, &sample_catalog(), &services(Arc::new(judge())));

        match result {
            Err(ContentError::UnknownContentType { content_type, allowed }) => {
                assert_eq!(content_type, "Poem");
                assert_eq!(allowed, vec!["Blog", "Email"]);
            }
            Ok(_) => panic!("expected an unknown content type error"),
        }
    }

    #[test]
    fn test_reference_text_unchanged_without_context() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        assert_eq!(content.reference_text(), "Spring shoe line launch, 200g per shoe.");
    }

    #[test]
    fn test_augment_reference_format() {
        let mut extra = BTreeMap::new();
        extra.insert("audience".to_string(), "Trail runners".to_string());
        extra.insert("brand_voice".to_string(), "Playful".to_string());

        let augmented = augment_reference("Launch brief", &extra);
        assert_eq!(
            augmented,
            "Core Information : \nLaunch brief\n___________________\
             \n audience : \n Trail runners\n___________________\
             \n brand_voice : \n Playful\n___________________"
        );
    }

    #[tokio::test]
    async fn test_extra_context_reaches_reference_metrics() {
        let judge = Arc::new(judge());
        let request = blog_request().with_context("audience", "Trail runners");
        let content = Content::new(request, &sample_catalog(), &services(judge.clone())).unwrap();

        assert!(content.reference_text().contains("\n audience : \n Trail runners\n"));
        content.get_llm_metrics().await.unwrap();

        let calls = judge.calls();
        let hallucination = calls.iter().find(|c| c.starts_with("Hallucination check")).unwrap();
        assert!(hallucination.contains("Trail runners"));
        let truths = calls.iter().find(|c| c.starts_with("Extract factual truths")).unwrap();
        assert!(truths.contains("Trail runners"));
        let coverage = calls
            .iter()
            .find(|c| c.starts_with("Score the test case") && c.contains("Metric: Coverage"))
            .unwrap();
        assert!(coverage.contains("Trail runners"));
    }

    #[test]
    fn test_statistical_metrics_keys() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        let stats = content.get_statistical_metrics();

        let keys: BTreeSet<&str> = stats.keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = [
            "sentiment",
            "reading_ease",
            "word_count",
            "paragraph_count",
            "sentence_count",
            "words_per_sentence",
            "lexical_diversity",
            "content_length",
        ]
        .into_iter()
        .collect();
        assert_eq!(keys, expected);
        assert_eq!(stats["paragraph_count"], 2.0);
        assert_eq!(stats["sentence_count"], 3.0);
    }

    #[tokio::test]
    async fn test_llm_metrics_keys_for_blog() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        let metrics = content.get_llm_metrics().await.unwrap();

        let keys: BTreeSet<&str> = metrics.keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = [
            "Hallucination Score",
            "Faithfulness Score",
            "Coverage",
            "Clarity",
            "Tone Consistency",
        ]
        .into_iter()
        .collect();
        assert_eq!(keys, expected);
        assert_eq!(metrics["Coverage"].score, 0.7);
    }

    #[tokio::test]
    async fn test_llm_metrics_merge_order() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        let metrics = content.get_llm_metrics().await.unwrap();

        let keys: Vec<&str> = metrics.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["Hallucination Score", "Faithfulness Score", "Coverage", "Tone Consistency", "Clarity"]
        );
    }

    #[tokio::test]
    async fn test_llm_metrics_reuse_cache() {
        let judge = Arc::new(judge());
        let services = Services {
            judge: judge.clone(),
            analyst: Arc::new(analyst()),
            cache: Arc::new(MemoryCache::new()),
        };

        let first = Content::new(blog_request(), &sample_catalog(), &services).unwrap();
        let first_scores = first.get_llm_metrics().await.unwrap();
        let calls_after_first = judge.calls().len();

        let second = Content::new(blog_request(), &sample_catalog(), &services).unwrap();
        let second_scores = second.get_llm_metrics().await.unwrap();

        assert_eq!(first_scores, second_scores);
        assert_eq!(judge.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_content_insights() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        let insight = content.get_content_insights().await.unwrap();

        assert_eq!(insight.tone, ContentTone::Persuasive);
        assert_eq!(insight.search_queries.len(), 3);
    }

    #[test]
    fn test_keyword_density_passthrough() {
        let content = Content::new(blog_request(), &sample_catalog(), &services(Arc::new(judge()))).unwrap();
        assert!(content.keyword_density("shoes") > 0.0);
        assert_eq!(content.keyword_density(""), 0.0);
    }
}
