//! Quality metrics for generated marketing content.
//!
//! [`Content`] is the entry point: it validates a [`ContentRequest`] against
//! the [`MetricCatalog`] and exposes statistical metrics, LLM-judged metrics
//! and content insights.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod grading;
pub mod grounding;
pub mod insights;
pub mod llm;
pub mod llm_metrics;
pub mod models;
pub mod output;
pub mod runner;
pub mod text_stats;

pub use catalog::MetricCatalog;
pub use content::{Content, Services};
pub use models::{ContentRequest, MetricDefinition, MetricResult, StatisticalMetrics};
