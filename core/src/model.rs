//! Analysis result document
//!
//! Mirrors the JSON produced by the analysis backend. Field names on the wire
//! are snake_case; the nesting (`data`, `metadata`) follows the backend envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence at or above this is counted as "high"
pub const HIGH_CONFIDENCE: f64 = 0.8;
/// Confidence at or above this (and below HIGH_CONFIDENCE) is "medium"
pub const MEDIUM_CONFIDENCE: f64 = 0.5;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Success,
    Error,
}

/// Full analysis document for one table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub data: AnalysisData,
    pub metadata: Metadata,
}

/// Payload section of the result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisData {
    pub table_info: TableInfo,
    #[serde(default)]
    pub sample_info: SampleInfo,
    #[serde(default)]
    pub columns_analysis: Vec<ColumnAnalysis>,
    #[serde(default)]
    pub summary: Summary,
}

/// Identity of the analysed table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableInfo {
    #[serde(default)]
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub total_columns: u32,
    #[serde(default)]
    pub analyzed_columns: u32,
}

/// Row counts of the sample the backend read
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SampleInfo {
    pub total_rows: u64,
    pub analyzed_rows: u64,
}

/// Per-column analysis entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnAnalysis {
    pub column_name: String,
    pub predicted_type: String,
    pub expected_type: String,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_ml: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_gen: Option<f64>,
    /// Whether predicted and expected types agree
    pub concordance: bool,
    /// Number of sampled rows the prediction is based on
    #[serde(default)]
    pub samples: u64,
    #[serde(default)]
    pub issues: Vec<String>,
    pub confidence_details: ConfidenceDetails,
}

/// Confidence breakdown across the three detection methods
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceDetails {
    pub heuristic_rules: MethodConfidence,
    pub machine_learning: MethodConfidence,
    pub generative_ai: MethodConfidence,
}

/// Confidence reported by a single detection method
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodConfidence {
    pub confidence: f64,
    pub method: String,
    pub description: String,
    /// Set by the statistical/ML method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Set by the generative method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
}

impl MethodConfidence {
    /// Method-specific metadata (model version or model type), if any
    pub fn specific_metadata(&self) -> Option<&str> {
        self.model_version
            .as_deref()
            .or(self.model_type.as_deref())
    }
}

/// Aggregate figures over all analysed columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Summary {
    pub total_columns: u32,
    pub concordant_columns: u32,
    /// Fraction of concordant columns in [0, 1]
    pub concordance_rate: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub issues_found: u32,
}

/// Column counts per confidence bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfidenceDistribution {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub analyzed_at: DateTime<Utc>,
    #[serde(alias = "client_id")]
    pub request_id: String,
    pub parameters: RequestedParameters,
}

/// Parameters the run was requested with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestedParameters {
    #[serde(default)]
    pub schema: String,
    pub table: String,
    pub sample_size: u32,
}

impl Summary {
    /// Compute the summary for a set of columns
    pub fn from_columns(columns: &[ColumnAnalysis]) -> Self {
        let mut summary = Summary {
            total_columns: columns.len() as u32,
            ..Default::default()
        };

        for column in columns {
            if column.concordance {
                summary.concordant_columns += 1;
            }
            summary.issues_found += column.issues.len() as u32;

            let bucket = &mut summary.confidence_distribution;
            if column.confidence >= HIGH_CONFIDENCE {
                bucket.high += 1;
            } else if column.confidence >= MEDIUM_CONFIDENCE {
                bucket.medium += 1;
            } else {
                bucket.low += 1;
            }
        }

        if summary.total_columns > 0 {
            summary.concordance_rate =
                f64::from(summary.concordant_columns) / f64::from(summary.total_columns);
        }

        summary
    }
}

/// Identity of a run, used to build the empty result a run starts from
#[derive(Debug, Clone, PartialEq)]
pub struct RunSeed {
    pub request_id: Uuid,
    pub schema: String,
    pub table: String,
    pub sample_size: u32,
}

impl AnalysisResult {
    /// Empty in-progress result for a freshly started run
    pub fn skeleton(seed: &RunSeed) -> Self {
        Self {
            status: AnalysisStatus::Success,
            data: AnalysisData {
                table_info: TableInfo {
                    schema: seed.schema.clone(),
                    table: seed.table.clone(),
                    total_columns: 0,
                    analyzed_columns: 0,
                },
                sample_info: SampleInfo::default(),
                columns_analysis: Vec::new(),
                summary: Summary::default(),
            },
            metadata: Metadata {
                analyzed_at: Utc::now(),
                request_id: seed.request_id.to_string(),
                parameters: RequestedParameters {
                    schema: seed.schema.clone(),
                    table: seed.table.clone(),
                    sample_size: seed.sample_size,
                },
            },
        }
    }

    pub fn columns(&self) -> &[ColumnAnalysis] {
        &self.data.columns_analysis
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnAnalysis> {
        self.data
            .columns_analysis
            .iter()
            .find(|c| c.column_name == name)
    }

    pub fn is_error(&self) -> bool {
        self.status == AnalysisStatus::Error
    }
}
