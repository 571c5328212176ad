use crate::cache::GradingCache;
use crate::error::EvalError;
use crate::grading::{CriteriaMetric, EvaluationParam, GradingMetric, TestCase, evaluate};
use crate::grounding::{FaithfulnessMetric, HallucinationMetric};
use crate::llm::ChatBackend;
use crate::models::{MetricDefinition, MetricScores};
use std::sync::Arc;

/// LLM-judged metrics for one piece of content
pub struct LlmMetrics {
    content: String,
    reference_text: String,
    metrics: Vec<MetricDefinition>,
    judge: Arc<dyn ChatBackend>,
    cache: Arc<dyn GradingCache>,
}

impl LlmMetrics {
    /// `metrics` is the effective catalog of the content's category, common
    /// rows first
    pub fn new(
        content: impl Into<String>,
        reference_text: impl Into<String>,
        metrics: Vec<MetricDefinition>,
        judge: Arc<dyn ChatBackend>,
        cache: Arc<dyn GradingCache>,
    ) -> Self {
        Self {
            content: content.into(),
            reference_text: reference_text.into(),
            metrics,
            judge,
            cache,
        }
    }

    /// Hallucination and faithfulness of the content against the reference text
    pub async fn get_common_deepeval_metrics(&self) -> Result<MetricScores, EvalError> {
        let hallucination_case = TestCase {
            input: String::new(),
            actual_output: self.content.clone(),
            context: vec![self.reference_text.clone()],
            ..TestCase::default()
        };
        let faithfulness_case = TestCase {
            input: String::new(),
            actual_output: self.content.clone(),
            retrieval_context: vec![self.reference_text.clone()],
            ..TestCase::default()
        };

        let hallucination: Vec<Box<dyn GradingMetric>> = vec![Box::new(HallucinationMetric)];
        let faithfulness: Vec<Box<dyn GradingMetric>> = vec![Box::new(FaithfulnessMetric)];

        let mut scores = evaluate(&hallucination_case, &hallucination, self.judge.as_ref(), self.cache.as_ref()).await?;
        scores.extend(evaluate(&faithfulness_case, &faithfulness, self.judge.as_ref(), self.cache.as_ref()).await?);

        Ok(scores)
    }

    /// Criteria metrics from the catalog, split into reference-based and
    /// content-only results
    pub async fn compute_metrics(&self) -> Result<(MetricScores, MetricScores), EvalError> {
        let mut with_reference: Vec<Box<dyn GradingMetric>> = Vec::new();
        let mut content_based: Vec<Box<dyn GradingMetric>> = Vec::new();

        for definition in &self.metrics {
            if definition.requires_reference {
                with_reference.push(Box::new(CriteriaMetric::new(
                    &definition.name,
                    &definition.criteria,
                    vec![EvaluationParam::Input, EvaluationParam::ActualOutput],
                )));
            } else {
                content_based.push(Box::new(CriteriaMetric::new(
                    &definition.name,
                    &definition.criteria,
                    vec![EvaluationParam::ActualOutput],
                )));
            }
        }

        let reference_case = TestCase {
            input: self.reference_text.clone(),
            actual_output: self.content.clone(),
            ..TestCase::default()
        };
        let content_case = TestCase {
            input: String::new(),
            actual_output: self.content.clone(),
            ..TestCase::default()
        };

        let reference_scores = evaluate(&reference_case, &with_reference, self.judge.as_ref(), self.cache.as_ref()).await?;
        let content_scores = evaluate(&content_case, &content_based, self.judge.as_ref(), self.cache.as_ref()).await?;

        Ok((reference_scores, content_scores))
    }
}
