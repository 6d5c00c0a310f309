//! Data models for the compliance auditor.
//!
//! Requests flowing into the analysis engine, the responses it produces,
//! and the batch-level summary types. Serialized field names follow the
//! camelCase shape the reasoning service is asked to emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compliance framework a file is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Soc2,
    Gdpr,
    Iso27001,
    Hipaa,
    Pci,
}

impl Framework {
    /// Stable lowercase identifier, used in cache keys and config files.
    pub fn id(&self) -> &'static str {
        match self {
            Framework::Soc2 => "soc2",
            Framework::Gdpr => "gdpr",
            Framework::Iso27001 => "iso27001",
            Framework::Hipaa => "hipaa",
            Framework::Pci => "pci",
        }
    }

    /// Human-readable name for reports and prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::Soc2 => "SOC 2",
            Framework::Gdpr => "GDPR",
            Framework::Iso27001 => "ISO 27001",
            Framework::Hipaa => "HIPAA",
            Framework::Pci => "PCI-DSS",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Severity level of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - hygiene, documentation gaps
    Low,
    /// Medium severity - weak controls
    Medium,
    /// High severity - missing controls
    High,
    /// Critical severity - direct exposure of protected data
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// Lenient parse for model output; unknown values map to Medium.
    pub fn from_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" | "info" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

/// A single unit of work for the analysis engine. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub code: String,
    /// Identifier used in diagnostics and error messages.
    pub file_path: String,
    pub framework: Framework,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AnalysisRequest {
    pub fn new(code: impl Into<String>, file_path: impl Into<String>, framework: Framework) -> Self {
        Self {
            code: code.into(),
            file_path: file_path.into(),
            framework,
            language: None,
            context: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A compliance violation reported for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_numbers: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    pub recommendation: String,
}

impl Violation {
    /// Returns the referenced lines as a formatted string.
    pub fn line_range(&self) -> String {
        match self.line_numbers.as_deref() {
            None | Some([]) => "-".to_string(),
            Some([only]) => only.to_string(),
            Some(lines) => lines
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Bookkeeping attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub analyzed_at: DateTime<Utc>,
    /// Milliseconds spent producing this response.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub cached: bool,
    pub model_version: String,
}

/// Result of analyzing one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub compliant: bool,
    /// 0 to 100 inclusive.
    pub score: f64,
    pub violations: Vec<Violation>,
    pub recommendations: Vec<String>,
    pub metadata: ResponseMetadata,
}

/// Aggregate statistics for one `analyze_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    /// Responses with `compliant == true`.
    pub compliant: usize,
    /// Responses with `compliant == false`.
    pub violations: usize,
    /// Items replaced by an error placeholder.
    pub failed: usize,
    /// Wall clock for the whole batch, in milliseconds.
    pub total_duration: u64,
    pub cache_hit_rate: f64,
}

impl BatchSummary {
    /// Tally a finished, input-ordered result list.
    pub fn from_results(results: &[AnalysisResponse], failed: usize, total_duration: u64) -> Self {
        let total = results.len();
        let compliant = results.iter().filter(|r| r.compliant).count();
        let cached = results.iter().filter(|r| r.metadata.cached).count();

        Self {
            total,
            compliant,
            violations: total - compliant,
            failed,
            total_duration,
            cache_hit_rate: if total == 0 {
                0.0
            } else {
                cached as f64 / total as f64
            },
        }
    }
}

/// An item that could not be analyzed inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// Position in the input list.
    pub index: usize,
    pub file_path: String,
    pub error: String,
}

/// Output of `analyze_batch`: results in input order plus the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub results: Vec<AnalysisResponse>,
    pub failures: Vec<BatchFailure>,
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(compliant: bool, cached: bool) -> AnalysisResponse {
        AnalysisResponse {
            compliant,
            score: if compliant { 95.0 } else { 40.0 },
            violations: vec![],
            recommendations: vec![],
            metadata: ResponseMetadata {
                analyzed_at: Utc::now(),
                duration_ms: 10,
                tokens_used: 100,
                cached,
                model_version: "test".to_string(),
            },
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_from_loose() {
        assert_eq!(Severity::from_loose("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_loose("info"), Severity::Low);
        assert_eq!(Severity::from_loose("whatever"), Severity::Medium);
    }

    #[test]
    fn test_violation_line_range() {
        let mut violation = Violation {
            severity: Severity::High,
            kind: "PII_LOGGING".to_string(),
            description: "Email written to logs".to_string(),
            line_numbers: Some(vec![12]),
            code_snippet: None,
            recommendation: "Mask the address".to_string(),
        };
        assert_eq!(violation.line_range(), "12");

        violation.line_numbers = Some(vec![3, 9]);
        assert_eq!(violation.line_range(), "3, 9");

        violation.line_numbers = None;
        assert_eq!(violation.line_range(), "-");
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let json = serde_json::to_value(response(true, false)).unwrap();
        assert!(json["metadata"]["analyzedAt"].is_string());
        assert_eq!(json["metadata"]["duration"], 10);
        assert_eq!(json["metadata"]["tokensUsed"], 100);
        assert_eq!(json["metadata"]["modelVersion"], "test");
    }

    #[test]
    fn test_batch_summary() {
        let results = vec![
            response(true, true),
            response(false, false),
            response(true, false),
            response(false, true),
        ];

        let summary = BatchSummary::from_results(&results, 1, 250);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.compliant, 2);
        assert_eq!(summary.violations, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration, 250);
        assert!((summary.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_batch_summary_empty() {
        let summary = BatchSummary::from_results(&[], 0, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.cache_hit_rate, 0.0);
    }
}
