//! Grounding checks: how well generated content sticks to its source.
//!
//! Both metrics grade in several small model calls and compute the score
//! locally from the returned verdicts, so a score is always traceable to the
//! individual yes/no decisions behind it.

use crate::error::LlmError;
use crate::grading::{GradingMetric, JUDGE_SYSTEM_PROMPT, TestCase, string_field, string_list};
use crate::llm::{ChatBackend, complete_json};
use crate::models::MetricResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Verdict {
    verdict: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Verdicts {
    verdicts: Vec<Verdict>,
}

impl Verdict {
    fn is(&self, label: &str) -> bool {
        self.verdict.trim().eq_ignore_ascii_case(label)
    }
}

/// Parse a verdict list and check it has one verdict per graded item
fn parse_verdicts(answer: Value, expected: usize) -> Result<Vec<Verdict>, LlmError> {
    let Verdicts { verdicts } = serde_json::from_value(answer)
        .map_err(|e| LlmError::MalformedResponse(format!("verdicts: {e}")))?;

    if verdicts.len() != expected {
        return Err(LlmError::MalformedResponse(format!(
            "expected {expected} verdicts, got {}",
            verdicts.len()
        )));
    }

    Ok(verdicts)
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{}] {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn contradiction_notes(verdicts: &[Verdict]) -> String {
    let notes: Vec<&str> = verdicts
        .iter()
        .filter(|v| v.is("no"))
        .filter_map(|v| v.reason.as_deref())
        .collect();

    if notes.is_empty() {
        "None".to_string()
    } else {
        notes.join("\n")
    }
}

/// Fraction of context passages the output contradicts. Lower is better.
pub struct HallucinationMetric;

impl HallucinationMetric {
    pub const NAME: &'static str = "Hallucination Score";

    fn verdict_prompt(test_case: &TestCase) -> String {
        format!(
            "Hallucination check. For each numbered context passage, decide whether the actual \
             output agrees with it. Answer \"yes\" when the output is consistent with the passage \
             and \"no\" when it contradicts it. Missing detail is not a contradiction.\n\n\
             Contexts:\n{contexts}\n\n\
             Actual Output:\n{output}\n\n\
             Return JSON {{\"verdicts\": [{{\"verdict\": \"yes\" or \"no\", \"reason\": \"...\"}}]}} \
             with exactly one verdict per context, in order.",
            contexts = numbered(&test_case.context),
            output = test_case.actual_output,
        )
    }

    fn reason_prompt(score: f64, verdicts: &[Verdict]) -> String {
        format!(
            "Explain the hallucination score of {score:.2} (0 means no contradiction, 1 means \
             every context passage was contradicted) in one or two sentences.\n\n\
             Contradictions found:\n{notes}\n\n\
             Return JSON with a single key \"reason\".",
            notes = contradiction_notes(verdicts),
        )
    }
}

#[async_trait]
impl GradingMetric for HallucinationMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fingerprint(&self) -> String {
        "hallucination|v1".to_string()
    }

    async fn measure(&self, judge: &dyn ChatBackend, test_case: &TestCase) -> Result<MetricResult, LlmError> {
        if test_case.context.is_empty() {
            return Ok(MetricResult {
                score: 0.0,
                reason: "No context was provided to check against".to_string(),
            });
        }

        let answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::verdict_prompt(test_case)).await?;
        let verdicts = parse_verdicts(answer, test_case.context.len())?;

        let contradictions = verdicts.iter().filter(|v| v.is("no")).count();
        let score = contradictions as f64 / verdicts.len() as f64;

        let explanation = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::reason_prompt(score, &verdicts)).await?;

        Ok(MetricResult {
            score,
            reason: string_field(&explanation, "reason")?,
        })
    }
}

/// Fraction of the output's claims that the retrieval context does not
/// contradict. Higher is better.
pub struct FaithfulnessMetric;

impl FaithfulnessMetric {
    pub const NAME: &'static str = "Faithfulness Score";

    fn truths_prompt(test_case: &TestCase) -> String {
        format!(
            "Extract factual truths from the retrieval context below. Keep each truth a short, \
             self-contained statement.\n\n\
             Retrieval Context:\n{context}\n\n\
             Return JSON with a single key \"truths\" holding a list of strings.",
            context = test_case.retrieval_context.join("\n\n"),
        )
    }

    fn claims_prompt(test_case: &TestCase) -> String {
        format!(
            "Extract every claim the text below states as fact. Keep each claim a short, \
             self-contained statement.\n\n\
             Text:\n{output}\n\n\
             Return JSON with a single key \"claims\" holding a list of strings.",
            output = test_case.actual_output,
        )
    }

    fn verdict_prompt(truths: &[String], claims: &[String]) -> String {
        format!(
            "Faithfulness check. For each numbered claim, answer \"yes\" when the truths support \
             it, \"no\" when they contradict it and \"idk\" when they say nothing about it.\n\n\
             Truths:\n{truths}\n\n\
             Claims:\n{claims}\n\n\
             Return JSON {{\"verdicts\": [{{\"verdict\": \"yes\", \"no\" or \"idk\", \"reason\": \"...\"}}]}} \
             with exactly one verdict per claim, in order.",
            truths = numbered(truths),
            claims = numbered(claims),
        )
    }

    fn reason_prompt(score: f64, verdicts: &[Verdict]) -> String {
        format!(
            "Explain the faithfulness score of {score:.2} (1 means no claim contradicts the \
             source, 0 means every claim does) in one or two sentences.\n\n\
             Contradictions found:\n{notes}\n\n\
             Return JSON with a single key \"reason\".",
            notes = contradiction_notes(verdicts),
        )
    }
}

#[async_trait]
impl GradingMetric for FaithfulnessMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fingerprint(&self) -> String {
        "faithfulness|v1".to_string()
    }

    async fn measure(&self, judge: &dyn ChatBackend, test_case: &TestCase) -> Result<MetricResult, LlmError> {
        let truths_answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::truths_prompt(test_case)).await?;
        let truths = string_list(&truths_answer, "truths")?;

        let claims_answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::claims_prompt(test_case)).await?;
        let claims = string_list(&claims_answer, "claims")?;

        if claims.is_empty() {
            return Ok(MetricResult {
                score: 1.0,
                reason: "The output makes no factual claims".to_string(),
            });
        }

        let answer = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::verdict_prompt(&truths, &claims)).await?;
        let verdicts = parse_verdicts(answer, claims.len())?;

        let faithful = verdicts.iter().filter(|v| !v.is("no")).count();
        let score = faithful as f64 / verdicts.len() as f64;

        let explanation = complete_json(judge, JUDGE_SYSTEM_PROMPT, &Self::reason_prompt(score, &verdicts)).await?;

        Ok(MetricResult {
            score,
            reason: string_field(&explanation, "reason")?,
        })
    }
}
