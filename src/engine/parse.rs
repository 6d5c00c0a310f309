//! Turning raw model text into a structured verdict.
//!
//! Models wrap JSON in prose or code fences often enough that we slice out
//! the outermost object before parsing. Anything that fails the structural
//! check becomes a [`ParseError`], which the orchestrator swaps for
//! [`fallback_verdict`] instead of surfacing it.

use crate::models::{Severity, Violation};
use serde_json::Value;
use thiserror::Error;

/// Violation type used for unparseable model output.
pub const PARSE_ERROR_KIND: &str = "PARSE_ERROR";

/// Why a model reply could not be used.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("field `{0}` is missing or has the wrong type")]
    Structure(&'static str),
}

/// The judgment part of a response, before metadata is stamped on.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub compliant: bool,
    pub score: f64,
    pub violations: Vec<Violation>,
    pub recommendations: Vec<String>,
}

/// Parse and validate a model reply.
pub fn parse_verdict(text: &str) -> Result<Verdict, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(json)?;

    let compliant = value["compliant"]
        .as_bool()
        .ok_or(ParseError::Structure("compliant"))?;
    let score = value["score"]
        .as_f64()
        .ok_or(ParseError::Structure("score"))?;
    let violations = value["violations"]
        .as_array()
        .ok_or(ParseError::Structure("violations"))?;
    let recommendations = value["recommendations"]
        .as_array()
        .ok_or(ParseError::Structure("recommendations"))?;

    Ok(Verdict {
        compliant,
        score: clamp_score(score),
        violations: violations.iter().filter_map(json_to_violation).collect(),
        recommendations: recommendations
            .iter()
            .filter_map(|r| r.as_str())
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
    })
}

/// Low-confidence verdict used in place of unusable output.
pub fn fallback_verdict(reason: &str) -> Verdict {
    Verdict {
        compliant: false,
        score: 0.0,
        violations: vec![Violation {
            severity: Severity::Medium,
            kind: PARSE_ERROR_KIND.to_string(),
            description: format!("The analysis result could not be interpreted: {}", reason),
            line_numbers: None,
            code_snippet: None,
            recommendation: "Review this file manually for compliance issues.".to_string(),
        }],
        recommendations: vec![
            "Re-run the analysis or perform a manual compliance review.".to_string(),
        ],
    }
}

/// Slice from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

fn json_to_violation(json: &Value) -> Option<Violation> {
    let object = json.as_object()?;

    let line_numbers = match (object.get("lineNumbers"), object.get("lineNumber")) {
        (Some(Value::Array(lines)), _) => Some(
            lines
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|n| u32::try_from(n).ok())
                .collect::<Vec<_>>(),
        ),
        (_, Some(line)) => line.as_u64().and_then(|n| u32::try_from(n).ok()).map(|n| vec![n]),
        _ => None,
    }
    .filter(|lines| !lines.is_empty());

    Some(Violation {
        severity: Severity::from_loose(json["severity"].as_str().unwrap_or("medium")),
        kind: json["type"].as_str().unwrap_or("UNSPECIFIED").to_string(),
        description: json["description"].as_str().unwrap_or("").to_string(),
        line_numbers,
        code_snippet: json["codeSnippet"].as_str().map(String::from),
        recommendation: json["recommendation"].as_str().unwrap_or("").to_string(),
    })
}
