use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model used for grading when a request does not name one
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// A piece of generated content to evaluate
#[derive(Debug, Clone, Default)]
pub struct ContentRequest {
    /// The generated marketing content
    pub generated_content: String,
    /// Source material the content was generated from
    pub reference_text: String,
    /// Content category, must be present in the category catalog
    pub content_type: String,
    /// Grading model
    pub model_name: String,
    /// Additional context folded into the reference text
    pub extra_context: BTreeMap<String, String>,
}

impl ContentRequest {
    pub fn new(
        generated_content: impl Into<String>,
        reference_text: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            generated_content: generated_content.into(),
            reference_text: reference_text.into(),
            content_type: content_type.into(),
            model_name: DEFAULT_MODEL.to_string(),
            extra_context: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_context.insert(key.into(), value.into());
        self
    }
}

/// One row of a metric catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Metric name, used as the result key
    pub name: String,
    /// Natural-language grading rubric
    pub criteria: String,
    /// Whether grading compares the content against the reference text
    pub requires_reference: bool,
}

/// Score and justification from an LLM-judged metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub score: f64,
    pub reason: String,
}

/// LLM-judged results keyed by metric name, in grading order
pub type MetricScores = IndexMap<String, MetricResult>;

/// Default statistical metrics for a piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalMetrics {
    /// Sentiment polarity in [0, 1]
    pub sentiment: f64,
    /// Flesch reading ease
    pub reading_ease: f64,
    pub word_count: usize,
    pub paragraph_count: usize,
    pub sentence_count: usize,
    pub words_per_sentence: f64,
    /// Unique tokens over total tokens
    pub lexical_diversity: f64,
    /// Length in characters
    pub content_length: usize,
}

impl StatisticalMetrics {
    /// Flatten into a metric name to value mapping
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("sentiment".to_string(), self.sentiment),
            ("reading_ease".to_string(), self.reading_ease),
            ("word_count".to_string(), self.word_count as f64),
            ("paragraph_count".to_string(), self.paragraph_count as f64),
            ("sentence_count".to_string(), self.sentence_count as f64),
            ("words_per_sentence".to_string(), self.words_per_sentence),
            ("lexical_diversity".to_string(), self.lexical_diversity),
            ("content_length".to_string(), self.content_length as f64),
        ])
    }
}

/// Complete evaluation of a single content request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentReport {
    pub content_type: String,
    pub model: String,
    pub statistics: BTreeMap<String, f64>,
    /// Density in percent for each requested keyword
    pub keyword_density: BTreeMap<String, f64>,
    pub llm_metrics: MetricScores,
    pub insights: crate::insights::ContentInsight,
}
