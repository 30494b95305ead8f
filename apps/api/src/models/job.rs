use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A row of `optimization_jobs` as written by the optimization backend.
/// Ids are selected as text so the poller can treat them as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OptimizationJobRow {
    pub id: String,
    pub status: String,
    pub resume_id: Option<String>,
    pub user_id: Option<String>,
    pub enhanced_resume_id: Option<String>,
    pub job_description: Option<String>,
    pub modifications: Option<Value>,
    pub match_details: Option<Value>,
    pub keywords_extracted: Option<Value>,
    pub match_count: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Parses a status column. Returns `None` for values the backend is not
    /// known to write; callers treat those as still running.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(JobStatus::Pending),
            "processing" | "running" => Some(JobStatus::Processing),
            "completed" | "complete" | "success" | "done" => Some(JobStatus::Completed),
            "error" | "failed" => Some(JobStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Severity {
    Major,
    Minor,
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("major") {
            Severity::Major
        } else {
            Severity::Minor
        }
    }
}

/// One before/after content change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(alias = "original_text", alias = "before", default)]
    pub original: String,
    #[serde(alias = "improved_text", alias = "after", alias = "enhanced", default)]
    pub improved: String,
    #[serde(rename = "type", alias = "severity", default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Minor
}

/// Response of `POST /api/optimize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub job_id: String,
    pub enhanced_resume_id: String,
    #[serde(default)]
    pub analysis: Value,
}

/// Normalized result of a completed job, ready for the comparison view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub job_id: String,
    pub resume_id: Option<String>,
    pub enhanced_resume_id: Option<String>,
    pub original_score: Option<f64>,
    pub enhanced_score: Option<f64>,
    pub score_delta: Option<f64>,
    pub matched_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub keywords_extracted: Vec<String>,
    pub match_count: u32,
    pub modifications: Vec<Modification>,
    pub major_changes: usize,
    pub minor_changes: usize,
    pub created_at: Option<DateTime<Utc>>,
}
