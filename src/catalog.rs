use crate::error::CatalogError;
use crate::models::MetricDefinition;
use serde::{Deserialize, Deserializer, de};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Row of the common metrics catalog
#[derive(Debug, Deserialize)]
struct CommonRow {
    metric: String,
    metric_description: String,
    #[serde(deserialize_with = "parse_flag")]
    requires_reference: bool,
}

/// Row of the category metrics catalog
#[derive(Debug, Deserialize)]
struct CategoryRow {
    #[serde(rename = "Category")]
    category: String,
    metric: String,
    metric_description: String,
    #[serde(deserialize_with = "parse_flag")]
    requires_reference: bool,
}

/// Accept the spellings spreadsheets produce for booleans
fn parse_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" | "" => Ok(false),
        other => Err(de::Error::custom(format!("invalid boolean '{other}'"))),
    }
}

/// Metric definitions shared by every content category plus the
/// category-specific ones
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    common: Vec<MetricDefinition>,
    category: Vec<(String, MetricDefinition)>,
}

impl MetricCatalog {
    /// Load both catalogs from CSV files
    pub fn from_paths(common: &Path, category: &Path) -> Result<Self, CatalogError> {
        let open = |path: &Path| {
            File::open(path).map_err(|source| CatalogError::Open {
                path: path.to_path_buf(),
                source,
            })
        };

        Self::from_readers(open(common)?, open(category)?)
    }

    /// Load both catalogs from CSV readers
    pub fn from_readers<C: Read, K: Read>(common: C, category: K) -> Result<Self, CatalogError> {
        let common = csv_reader(common)
            .deserialize::<CommonRow>()
            .map(|row| {
                row.map(|row| MetricDefinition {
                    name: row.metric,
                    criteria: row.metric_description,
                    requires_reference: row.requires_reference,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CatalogError::Row {
                catalog: "common",
                source,
            })?;

        let category = csv_reader(category)
            .deserialize::<CategoryRow>()
            .map(|row| {
                row.map(|row| {
                    let definition = MetricDefinition {
                        name: row.metric,
                        criteria: row.metric_description,
                        requires_reference: row.requires_reference,
                    };
                    (row.category, definition)
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CatalogError::Row {
                catalog: "category",
                source,
            })?;

        Ok(Self { common, category })
    }

    /// Distinct content categories, sorted
    pub fn categories(&self) -> Vec<String> {
        self.category
            .iter()
            .map(|(category, _)| category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains_category(&self, content_type: &str) -> bool {
        self.category.iter().any(|(category, _)| category == content_type)
    }

    /// Common metrics followed by the metrics of `content_type`, in file order
    pub fn metrics_for(&self, content_type: &str) -> Vec<MetricDefinition> {
        self.common
            .iter()
            .cloned()
            .chain(
                self.category
                    .iter()
                    .filter(|(category, _)| category == content_type)
                    .map(|(_, definition)| definition.clone()),
            )
            .collect()
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}
