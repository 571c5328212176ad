use crate::error::InsightError;
use crate::llm::{ChatBackend, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

const TOOL_NAME: &str = "content_insights";

const SYSTEM_PROMPT: &str = "You are an AI assistant with an expertise in marketing content like emails, \
     blogs, tweets and more. Follow the instructions to provide insights and details regarding the \
     content input by the user";

/// Overall tone of a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentTone {
    Formal,
    Informal,
    Friendly,
    Casual,
    Conversational,
    Descriptive,
    Persuasive,
    Technical,
    Analytical,
    Journalese,
    Poetic,
    Factual,
    Emotional,
    Satirical,
    Empathetic,
    Opinionated,
    Humorous,
    #[serde(rename = "Story-telling")]
    StoryTelling,
    Narrative,
    Expository,
    Argumentative,
    Objective,
    Subjective,
}

impl ContentTone {
    pub const ALL: [ContentTone; 23] = [
        ContentTone::Formal,
        ContentTone::Informal,
        ContentTone::Friendly,
        ContentTone::Casual,
        ContentTone::Conversational,
        ContentTone::Descriptive,
        ContentTone::Persuasive,
        ContentTone::Technical,
        ContentTone::Analytical,
        ContentTone::Journalese,
        ContentTone::Poetic,
        ContentTone::Factual,
        ContentTone::Emotional,
        ContentTone::Satirical,
        ContentTone::Empathetic,
        ContentTone::Opinionated,
        ContentTone::Humorous,
        ContentTone::StoryTelling,
        ContentTone::Narrative,
        ContentTone::Expository,
        ContentTone::Argumentative,
        ContentTone::Objective,
        ContentTone::Subjective,
    ];

    /// Label used on the wire and in reports
    pub fn label(self) -> &'static str {
        match self {
            ContentTone::Formal => "Formal",
            ContentTone::Informal => "Informal",
            ContentTone::Friendly => "Friendly",
            ContentTone::Casual => "Casual",
            ContentTone::Conversational => "Conversational",
            ContentTone::Descriptive => "Descriptive",
            ContentTone::Persuasive => "Persuasive",
            ContentTone::Technical => "Technical",
            ContentTone::Analytical => "Analytical",
            ContentTone::Journalese => "Journalese",
            ContentTone::Poetic => "Poetic",
            ContentTone::Factual => "Factual",
            ContentTone::Emotional => "Emotional",
            ContentTone::Satirical => "Satirical",
            ContentTone::Empathetic => "Empathetic",
            ContentTone::Opinionated => "Opinionated",
            ContentTone::Humorous => "Humorous",
            ContentTone::StoryTelling => "Story-telling",
            ContentTone::Narrative => "Narrative",
            ContentTone::Expository => "Expository",
            ContentTone::Argumentative => "Argumentative",
            ContentTone::Objective => "Objective",
            ContentTone::Subjective => "Subjective",
        }
    }
}

/// Tone, topic and search details of a piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInsight {
    #[serde(rename = "content_tone")]
    pub tone: ContentTone,
    #[serde(rename = "content_topic")]
    pub topic: String,
    pub suggested_keywords: Vec<String>,
    /// 3-4 search engine queries the content would be an ideal match for
    pub search_queries: Vec<String>,
}

/// Asks a chat model for [`ContentInsight`]s through a forced tool call
pub struct InsightExtractor {
    analyst: Arc<dyn ChatBackend>,
}

impl InsightExtractor {
    pub fn new(analyst: Arc<dyn ChatBackend>) -> Self {
        Self { analyst }
    }

    /// Tool definition whose schema mirrors [`ContentInsight`]
    pub fn tool() -> ToolSpec {
        let tones: Vec<&str> = ContentTone::ALL.iter().map(|t| t.label()).collect();

        ToolSpec {
            name: TOOL_NAME.to_string(),
            description: "Get basic details related to the content like tone, topics, keywords".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content_tone": {
                        "type": "string",
                        "enum": tones,
                        "description": "The overall tone of the content"
                    },
                    "content_topic": {
                        "type": "string",
                        "description": "A word/phrase/sentence which captures the central topic being talked about in the content"
                    },
                    "suggested_keywords": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "A list of major keywords relevant to the content. Cover all major keywords"
                    },
                    "search_queries": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "A list of 3-4 search engine queries for which the content would be an ideal match. Queries should be neither hyper-specific nor too generic, containing just enough information to surface this page"
                    }
                },
                "required": ["content_tone", "content_topic", "suggested_keywords", "search_queries"]
            }),
        }
    }

    fn user_prompt(category: &str, content: &str) -> String {
        format!("Category: {category} \n Content : {content} \n\n Return the content insights for the above content")
    }

    pub async fn extract(&self, category: &str, content: &str) -> Result<ContentInsight, InsightError> {
        debug!(category, model = self.analyst.model(), "extracting content insights");

        let arguments = self
            .analyst
            .call_tool(SYSTEM_PROMPT, &Self::user_prompt(category, content), &Self::tool())
            .await?;

        parse_insight(arguments)
    }
}

/// Validate tool arguments against the insight schema
fn parse_insight(arguments: Value) -> Result<ContentInsight, InsightError> {
    let insight: ContentInsight = serde_json::from_value(arguments).map_err(InsightError::Schema)?;

    if !(3..=4).contains(&insight.search_queries.len()) {
        return Err(InsightError::SearchQueryCount(insight.search_queries.len()));
    }

    Ok(insight)
}
