//! Turns a completed job row into the shape the comparison view renders.

use serde_json::Value;
use tracing::warn;

use crate::models::job::{Modification, OptimizationJobRow, OptimizationResult, Severity};

const ORIGINAL_SCORE_KEYS: [&str; 3] = ["original_score", "score_before", "before_score"];
const ENHANCED_SCORE_KEYS: [&str; 4] = ["enhanced_score", "score_after", "after_score", "new_score"];

pub fn normalize(row: &OptimizationJobRow) -> OptimizationResult {
    let details = row.match_details.as_ref();

    let original_score = details.and_then(|d| first_number(d, &ORIGINAL_SCORE_KEYS));
    let enhanced_score = details.and_then(|d| first_number(d, &ENHANCED_SCORE_KEYS));
    let score_delta = match (original_score, enhanced_score) {
        (Some(before), Some(after)) => Some(after - before),
        _ => None,
    };

    let matched_keywords = details
        .and_then(|d| d.get("matched_keywords"))
        .map(string_list)
        .unwrap_or_default();
    let missing_keywords = details
        .and_then(|d| d.get("missing_keywords"))
        .map(string_list)
        .unwrap_or_default();
    let keywords_extracted = row
        .keywords_extracted
        .as_ref()
        .map(string_list)
        .unwrap_or_default();

    let match_count = row
        .match_count
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(matched_keywords.len() as u32);

    let modifications = row
        .modifications
        .as_ref()
        .map(|m| parse_modifications(&row.id, m))
        .unwrap_or_default();
    let major_changes = modifications
        .iter()
        .filter(|m| m.severity == Severity::Major)
        .count();

    OptimizationResult {
        job_id: row.id.clone(),
        resume_id: row.resume_id.clone(),
        enhanced_resume_id: row.enhanced_resume_id.clone(),
        original_score,
        enhanced_score,
        score_delta,
        matched_keywords,
        missing_keywords,
        keywords_extracted,
        match_count,
        minor_changes: modifications.len() - major_changes,
        major_changes,
        modifications,
        created_at: row.created_at,
    }
}

fn first_number(details: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match details.get(k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

/// Accepts `["rust", ...]` or `[{"keyword": "rust"}, ...]`.
fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("keyword").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_modifications(job_id: &str, value: &Value) -> Vec<Modification> {
    let Some(items) = value.as_array() else {
        warn!(job_id, "modifications is not a list");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Modification>(item.clone()) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(job_id, "Skipping unreadable modification: {e}");
                None
            }
        })
        .collect()
}
