use crate::models::ContentReport;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print content reports in the specified format
pub fn print_results(reports: &[ContentReport], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(reports)),
        OutputFormat::Json => print_json(reports),
    }
}

/// Render reports as plain text
pub fn render_plain(reports: &[ContentReport]) -> String {
    let mut out = String::new();

    for (i, report) in reports.iter().enumerate() {
        out.push_str(&format!("=== Content {} ({}) ===\n\n", i + 1, report.content_type));

        out.push_str("📊 STATISTICS\n");
        out.push_str("-------------\n");
        for (name, value) in &report.statistics {
            out.push_str(&format!("{:<20} {:>10.3}\n", name, value));
        }
        for (keyword, density) in &report.keyword_density {
            out.push_str(&format!("{:<20} {:>9.2}%\n", format!("density '{}'", keyword), density));
        }
        out.push('\n');

        out.push_str(&format!("🧑‍⚖️ LLM METRICS (graded by {})\n", report.model));
        out.push_str("-------------\n");
        if report.llm_metrics.is_empty() {
            out.push_str("No LLM metrics available.\n");
        }
        for (name, result) in &report.llm_metrics {
            out.push_str(&format!("  • {}: {:.3}\n", name, result.score));
            out.push_str(&format!("    {}\n", result.reason));
        }
        out.push('\n');

        out.push_str("💡 INSIGHTS\n");
        out.push_str("-------------\n");
        out.push_str(&format!("Tone: {}\n", report.insights.tone.label()));
        out.push_str(&format!("Topic: {}\n", report.insights.topic));
        out.push_str(&format!("Keywords: {}\n", report.insights.suggested_keywords.join(", ")));
        out.push_str("Search queries:\n");
        for query in &report.insights.search_queries {
            out.push_str(&format!("  • {}\n", query));
        }
        out.push('\n');

        if i < reports.len() - 1 {
            out.push_str(&format!("{}\n\n", "=".repeat(50)));
        }
    }

    out
}

/// Print results in JSON format
fn print_json(reports: &[ContentReport]) {
    match serde_json::to_string_pretty(reports) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::{ContentInsight, ContentTone};
    use crate::models::{MetricResult, MetricScores};
    use std::collections::BTreeMap;

    fn create_test_reports() -> Vec<ContentReport> {
        let mut llm_metrics = MetricScores::new();
        llm_metrics.insert(
            "Hallucination Score".to_string(),
            MetricResult {
                score: 0.25,
                reason: "One passage contradicted".to_string(),
            },
        );

        let report = ContentReport {
            content_type: "Blog".to_string(),
            model: "gpt-4o".to_string(),
            statistics: BTreeMap::from([("word_count".to_string(), 42.0)]),
            keyword_density: BTreeMap::from([("shoes".to_string(), 4.5)]),
            llm_metrics,
            insights: ContentInsight {
                tone: ContentTone::StoryTelling,
                topic: "Running".to_string(),
                suggested_keywords: vec!["run".to_string(), "shoes".to_string()],
                search_queries: vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
            },
        };

        vec![report.clone(), report]
    }

    #[test]
    fn test_plain_output_sections() {
        let text = render_plain(&create_test_reports());

        assert!(text.contains("=== Content 1 (Blog) ==="));
        assert!(text.contains("=== Content 2 (Blog) ==="));
        assert!(text.contains("word_count"));
        assert!(text.contains("density 'shoes'"));
        assert!(text.contains("• Hallucination Score: 0.250"));
        assert!(text.contains("Tone: Story-telling"));
        assert!(text.contains("Keywords: run, shoes"));
        assert_eq!(text.matches(&"=".repeat(50)).count(), 1);
    }

    #[test]
    fn test_plain_output_empty() {
        assert!(render_plain(&[]).is_empty());
    }

    #[test]
    fn test_json_output() {
        // This test mainly ensures the JSON serialization doesn't panic
        print_json(&create_test_reports());
    }
}
