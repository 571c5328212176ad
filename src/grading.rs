use crate::cache::GradingCache;
use crate::error::{EvalError, LlmError};
use crate::llm::{ChatBackend, complete_json};
use crate::models::{MetricResult, MetricScores};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// System prompt shared by every grading call
pub(crate) const JUDGE_SYSTEM_PROMPT: &str = "You are a meticulous evaluator of marketing content. \
     You always answer with a single JSON object and nothing else.";

/// Inputs a grading model looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCase {
    pub input: String,
    pub actual_output: String,
    /// Ground-truth passages, used by the hallucination check
    pub context: Vec<String>,
    /// Source passages, used by the faithfulness check
    pub retrieval_context: Vec<String>,
}

/// Test case fields a criteria metric is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationParam {
    Input,
    ActualOutput,
}

impl EvaluationParam {
    fn label(self) -> &'static str {
        match self {
            EvaluationParam::Input => "Input",
            EvaluationParam::ActualOutput => "Actual Output",
        }
    }

    fn value(self, test_case: &TestCase) -> &str {
        match self {
            EvaluationParam::Input => &test_case.input,
            EvaluationParam::ActualOutput => &test_case.actual_output,
        }
    }
}

/// A metric scored by a grading model
#[async_trait]
pub trait GradingMetric: Send + Sync {
    fn name(&self) -> &str;

    /// Stable description of the metric configuration, part of the cache key
    fn fingerprint(&self) -> String;

    async fn measure(&self, judge: &dyn ChatBackend, test_case: &TestCase) -> Result<MetricResult, LlmError>;
}

/// Cache key of a grading request: SHA-256 over the model, every test case
/// field and the metric fingerprint. Strings are length-prefixed and both
/// passage lists are count-prefixed.
pub fn cache_key(model: &str, test_case: &TestCase, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();

    feed(&mut hasher, model);
    feed(&mut hasher, &test_case.input);
    feed(&mut hasher, &test_case.actual_output);
    for passages in [&test_case.context, &test_case.retrieval_context] {
        hasher.update((passages.len() as u64).to_le_bytes());
        for passage in passages {
            feed(&mut hasher, passage);
        }
    }
    feed(&mut hasher, fingerprint);

    hex::encode(hasher.finalize())
}

fn feed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

/// Score every metric against one test case, in order
///
/// Cached results are reused; anything the model fails to grade aborts the
/// batch with an error naming the metric.
pub async fn evaluate(
    test_case: &TestCase,
    metrics: &[Box<dyn GradingMetric>],
    judge: &dyn ChatBackend,
    cache: &dyn GradingCache,
) -> Result<MetricScores, EvalError> {
    let mut scores = MetricScores::new();

    for metric in metrics {
        let key = cache_key(judge.model(), test_case, &metric.fingerprint());

        let result = match cache.get(&key) {
            Some(hit) => {
                debug!(metric = metric.name(), "grading cache hit");
                hit
            }
            None => {
                debug!(metric = metric.name(), model = judge.model(), "grading metric");
                let result = metric
                    .measure(judge, test_case)
                    .await
                    .map_err(|source| EvalError::Metric {
                        metric: metric.name().to_string(),
                        source,
                    })?;

                if let Err(e) = cache.put(&key, &result) {
                    warn!(metric = metric.name(), error = %e, "failed to store grading result");
                }
                result
            }
        };

        scores.insert(metric.name().to_string(), result);
    }

    Ok(scores)
}

/// Read a required string field from a model answer
pub(crate) fn string_field(value: &Value, key: &str) -> Result<String, LlmError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::MalformedResponse(format!("missing string field '{key}'")))
}

/// Read a required list of strings from a model answer
pub(crate) fn string_list(value: &Value, key: &str) -> Result<Vec<String>, LlmError> {
    let items = value
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::MalformedResponse(format!("missing list field '{key}'")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| LlmError::MalformedResponse(format!("non-string item in '{key}'")))
        })
        .collect()
}

/// Criteria-based metric: the grading model derives evaluation steps from a
/// natural-language rubric, then scores the test case against them on 0-10
pub struct CriteriaMetric {
    name: String,
    criteria: String,
    params: Vec<EvaluationParam>,
}

impl CriteriaMetric {
    pub fn new(name: impl Into<String>, criteria: impl Into<String>, params: Vec<EvaluationParam>) -> Self {
        Self {
            name: name.into(),
            criteria: criteria.into(),
            params,
        }
    }

    fn param_labels(&self) -> String {
        self.params
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn steps_prompt(&self) -> String {
        format!(
            "Generate 3-4 concise evaluation steps for judging the {labels} of a test case \
             against the criteria below. Make it clear how the {labels} relate to each other.\n\n\
             Metric: {name}\n\
             Evaluation Criteria:\n{criteria}\n\n\
             Return JSON with a single key \"steps\" holding a list of strings.",
            labels = self.param_labels(),
            name = self.name,
            criteria = self.criteria,
        )
    }

    fn score_prompt(&self, steps: &[String], test_case: &TestCase) -> String {
        let numbered_steps = steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n");

        let fields = self
            .params
            .iter()
            .map(|p| format!("{}:\n{}", p.label(), p.value(test_case)))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Score the test case below against the evaluation steps.\n\n\
             Metric: {name}\n\
             Evaluation Criteria:\n{criteria}\n\n\
             Evaluation Steps:\n{numbered_steps}\n\n\
             {fields}\n\n\
             Return JSON with two keys: \"score\", an integer from 0 (does not meet the \
             criteria at all) to 10 (fully meets them), and \"reason\", a concise justification \
             that cites the {labels} without repeating the score.",
            name = self.name,
            criteria = self.criteria,
            labels = self.param_labels(),
        )
    }
}

#[async_trait]
impl GradingMetric for CriteriaMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        format!("criteria|{}|{}|{}", self.name, self.criteria, self.param_labels())
    }

    async fn measure(&self, judge: &dyn ChatBackend, test_case: &TestCase) -> Result<MetricResult, LlmError> {
        let steps_answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &self.steps_prompt()).await?;
        let steps = string_list(&steps_answer, "steps")?;
        if steps.is_empty() {
            return Err(LlmError::MalformedResponse("no evaluation steps generated".to_string()));
        }

        let answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &self.score_prompt(&steps, test_case)).await?;
        let raw_score = answer
            .get("score")
            .and_then(Value::as_f64)
            .ok_or_else(|| LlmError::MalformedResponse("missing numeric 'score'".to_string()))?;
        let reason = string_field(&answer, "reason")?;

        Ok(MetricResult {
            score: (raw_score / 10.0).clamp(0.0, 1.0),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoCache};
    use crate::llm::testing::ScriptedBackend;
    use serde_json::json;

    fn clarity() -> Box<dyn GradingMetric> {
        Box::new(CriteriaMetric::new(
            "Clarity",
            "Is the text easy to follow?",
            vec![EvaluationParam::ActualOutput],
        ))
    }

    fn scripted_clarity() -> ScriptedBackend {
        ScriptedBackend::new()
            .on("Generate 3-4", r#"{"steps": ["Read the text", "Judge how easy it is"]}"#)
            .on("Score the test case", r#"Sure! {"score": 8, "reason": "Short sentences."}"#)
    }

    fn test_case() -> TestCase {
        TestCase {
            input: String::new(),
            actual_output: "Our shoes are light.".to_string(),
            ..TestCase::default()
        }
    }

    #[tokio::test]
    async fn test_criteria_metric_normalizes_score() {
        let judge = scripted_clarity();
        let scores = evaluate(&test_case(), &[clarity()], &judge, &NoCache).await.unwrap();

        assert_eq!(scores["Clarity"].score, 0.8);
        assert_eq!(scores["Clarity"].reason, "Short sentences.");
        assert_eq!(judge.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_score_prompt_only_shows_selected_params() {
        let judge = scripted_clarity();
        let case = TestCase {
            input: "SECRET REFERENCE".to_string(),
            actual_output: "Visible output".to_string(),
            ..TestCase::default()
        };
        evaluate(&case, &[clarity()], &judge, &NoCache).await.unwrap();

        let score_prompt = &judge.calls()[1];
        assert!(score_prompt.contains("Actual Output:\nVisible output"));
        assert!(!score_prompt.contains("SECRET REFERENCE"));
        assert!(score_prompt.contains("1. Read the text"));
    }

    #[tokio::test]
    async fn test_reference_params_include_input() {
        let judge = scripted_clarity();
        let metric: Box<dyn GradingMetric> = Box::new(CriteriaMetric::new(
            "Coverage",
            "Does the output cover the input?",
            vec![EvaluationParam::Input, EvaluationParam::ActualOutput],
        ));
        let case = TestCase {
            input: "Brief".to_string(),
            actual_output: "Draft".to_string(),
            ..TestCase::default()
        };
        evaluate(&case, &[metric], &judge, &NoCache).await.unwrap();

        let score_prompt = &judge.calls()[1];
        assert!(score_prompt.contains("Input:\nBrief"));
        assert!(score_prompt.contains("Actual Output:\nDraft"));
    }

    #[tokio::test]
    async fn test_score_is_clamped() {
        let judge = ScriptedBackend::new()
            .on("Generate 3-4", r#"{"steps": ["one"]}"#)
            .on("Score the test case", r#"{"score": 14, "reason": "Flawless."}"#);
        let scores = evaluate(&test_case(), &[clarity()], &judge, &NoCache).await.unwrap();

        assert_eq!(scores["Clarity"].score, 1.0);
    }

    #[tokio::test]
    async fn test_missing_reason_is_an_error() {
        let judge = ScriptedBackend::new()
            .on("Generate 3-4", r#"{"steps": ["one"]}"#)
            .on("Score the test case", r#"{"score": 7}"#);
        let err = evaluate(&test_case(), &[clarity()], &judge, &NoCache)
            .await
            .unwrap_err();

        assert_eq!(err.metric(), "Clarity");
        assert!(matches!(err, EvalError::Metric { source: LlmError::MalformedResponse(_), .. }));
    }

    #[tokio::test]
    async fn test_missing_score_is_an_error() {
        let judge = ScriptedBackend::new()
            .on("Generate 3-4", r#"{"steps": ["one"]}"#)
            .on("Score the test case", r#"{"reason": "forgot the score"}"#);
        let err = evaluate(&test_case(), &[clarity()], &judge, &NoCache)
            .await
            .unwrap_err();

        assert_eq!(err.metric(), "Clarity");
        assert!(matches!(err, EvalError::Metric { source: LlmError::MalformedResponse(_), .. }));
    }

    #[tokio::test]
    async fn test_model_failure_names_metric() {
        let judge = ScriptedBackend::new().fail_on("Generate 3-4");
        let err = evaluate(&test_case(), &[clarity()], &judge, &NoCache)
            .await
            .unwrap_err();

        assert_eq!(err.metric(), "Clarity");
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_grading() {
        let judge = scripted_clarity();
        let cache = MemoryCache::new();

        let first = evaluate(&test_case(), &[clarity()], &judge, &cache).await.unwrap();
        let second = evaluate(&test_case(), &[clarity()], &judge, &cache).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(judge.calls().len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_different_content_misses_cache() {
        let judge = scripted_clarity();
        let cache = MemoryCache::new();
        let other = TestCase {
            actual_output: "Different draft.".to_string(),
            ..test_case()
        };

        evaluate(&test_case(), &[clarity()], &judge, &cache).await.unwrap();
        evaluate(&other, &[clarity()], &judge, &cache).await.unwrap();

        assert_eq!(judge.calls().len(), 4);
        assert_eq!(cache.len(), 2);
    }

    struct FailingCache;

    impl GradingCache for FailingCache {
        fn get(&self, _key: &str) -> Option<MetricResult> {
            None
        }

        fn put(&self, _key: &str, _result: &MetricResult) -> Result<(), crate::error::CacheError> {
            Err(crate::error::CacheError::Poisoned)
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_keeps_score() {
        let judge = scripted_clarity();
        let scores = evaluate(&test_case(), &[clarity()], &judge, &FailingCache).await.unwrap();

        assert_eq!(scores["Clarity"].score, 0.8);
    }

    #[tokio::test]
    async fn test_results_keep_metric_order() {
        let judge = scripted_clarity();
        let metrics: Vec<Box<dyn GradingMetric>> = vec![
            Box::new(CriteriaMetric::new("Zeta", "Z", vec![EvaluationParam::ActualOutput])),
            Box::new(CriteriaMetric::new("Alpha", "A", vec![EvaluationParam::ActualOutput])),
        ];
        let scores = evaluate(&test_case(), &metrics, &judge, &NoCache).await.unwrap();

        assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_cache_key_separates_fields() {
        let a = TestCase {
            input: "ab".to_string(),
            actual_output: "c".to_string(),
            ..TestCase::default()
        };
        let b = TestCase {
            input: "a".to_string(),
            actual_output: "bc".to_string(),
            ..TestCase::default()
        };
        let c = TestCase {
            context: vec!["x".to_string()],
            ..TestCase::default()
        };
        let d = TestCase {
            retrieval_context: vec!["x".to_string()],
            ..TestCase::default()
        };

        assert_ne!(cache_key("m", &a, "f"), cache_key("m", &b, "f"));
        assert_ne!(cache_key("m", &c, "f"), cache_key("m", &d, "f"));

        let separator_in_context = TestCase {
            context: vec!["\u{1e}".to_string()],
            ..TestCase::default()
        };
        let separator_in_retrieval = TestCase {
            retrieval_context: vec!["\u{1e}".to_string()],
            ..TestCase::default()
        };
        assert_ne!(
            cache_key("m", &separator_in_context, "f"),
            cache_key("m", &separator_in_retrieval, "f")
        );

        let split = TestCase {
            context: vec!["a".to_string(), "b".to_string()],
            ..TestCase::default()
        };
        let moved = TestCase {
            context: vec!["a".to_string()],
            retrieval_context: vec!["b".to_string()],
            ..TestCase::default()
        };
        assert_ne!(cache_key("m", &split, "f"), cache_key("m", &moved, "f"));
        assert_ne!(cache_key("m", &a, "f"), cache_key("other", &a, "f"));
        assert_eq!(cache_key("m", &a, "f"), cache_key("m", &a, "f"));
        assert_eq!(cache_key("m", &a, "f").len(), 64);
    }

    #[test]
    fn test_string_list() {
        let value = json!({"steps": ["a", "b"], "bad": ["a", 1]});
        assert_eq!(string_list(&value, "steps").unwrap(), vec!["a", "b"]);
        assert!(string_list(&value, "bad").is_err());
        assert!(string_list(&value, "missing").is_err());
    }
}
