//! Compliance report assembly.
//!
//! Turns a finished [`BatchOutcome`] plus the requests that produced it into
//! a [`ComplianceReport`]: per-framework rollups, per-file findings and a
//! deduplicated recommendation list. Rendering lives in [`generator`].

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::models::{
    AnalysisRequest, BatchFailure, BatchOutcome, BatchSummary, Framework, Severity, Violation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Run-level information shown at the top of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Directory that was audited.
    pub root: String,
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
    pub frameworks: Vec<Framework>,
    pub files_scanned: usize,
    pub duration_seconds: f64,
}

/// Violation counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Rollup for one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSummary {
    pub framework: Framework,
    /// Files analyzed successfully under this framework.
    pub files: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    /// Mean score over successful analyses; 0 when there were none.
    pub average_score: f64,
    pub severity: SeverityCounts,
    pub failed: usize,
}

impl FrameworkSummary {
    fn new(framework: Framework) -> Self {
        Self {
            framework,
            files: 0,
            compliant: 0,
            non_compliant: 0,
            average_score: 0.0,
            severity: SeverityCounts::default(),
            failed: 0,
        }
    }
}

/// Outcome for one file under one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFinding {
    pub file_path: String,
    pub framework: Framework,
    pub compliant: bool,
    pub score: f64,
    pub cached: bool,
    pub violations: Vec<Violation>,
    /// Set when the analysis failed and the entry is a placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileFinding {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A complete audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub metadata: ReportMetadata,
    pub summary: BatchSummary,
    pub frameworks: Vec<FrameworkSummary>,
    pub findings: Vec<FileFinding>,
    pub failures: Vec<BatchFailure>,
    pub recommendations: Vec<String>,
}

impl ComplianceReport {
    /// Assemble a report. `requests` must be the list the batch was run on,
    /// so that `outcome.results[i]` answers `requests[i]`.
    pub fn build(metadata: ReportMetadata, requests: &[AnalysisRequest], outcome: BatchOutcome) -> Self {
        let failed: HashMap<usize, &BatchFailure> =
            outcome.failures.iter().map(|f| (f.index, f)).collect();

        let mut findings = Vec::with_capacity(outcome.results.len());
        let mut recommendations = Vec::new();
        let mut seen = HashSet::new();

        for (index, (request, response)) in requests.iter().zip(outcome.results).enumerate() {
            let error = failed.get(&index).map(|f| f.error.clone());

            if error.is_none() {
                for rec in &response.recommendations {
                    let rec = rec.trim();
                    if !rec.is_empty() && seen.insert(rec.to_lowercase()) {
                        recommendations.push(rec.to_string());
                    }
                }
            }

            findings.push(FileFinding {
                file_path: request.file_path.clone(),
                framework: request.framework,
                compliant: response.compliant,
                score: response.score,
                cached: response.metadata.cached,
                violations: response.violations,
                error,
            });
        }

        let frameworks = summarize_frameworks(&metadata.frameworks, &findings);

        Self {
            metadata,
            summary: outcome.summary,
            frameworks,
            findings,
            failures: outcome.failures,
            recommendations,
        }
    }

    /// Severity counts across all frameworks.
    pub fn severity_totals(&self) -> SeverityCounts {
        let mut totals = SeverityCounts::default();
        for finding in self.findings.iter().filter(|f| !f.is_failed()) {
            for violation in &finding.violations {
                totals.add(violation.severity);
            }
        }
        totals
    }

    /// True if any successful analysis reports a violation at or above `threshold`.
    pub fn has_violation_at_or_above(&self, threshold: Severity) -> bool {
        self.findings
            .iter()
            .filter(|f| !f.is_failed())
            .flat_map(|f| f.violations.iter())
            .any(|v| v.severity >= threshold)
    }

    /// Lowest score among successful analyses.
    pub fn lowest_score(&self) -> Option<f64> {
        self.findings
            .iter()
            .filter(|f| !f.is_failed())
            .map(|f| f.score)
            .reduce(f64::min)
    }
}

fn summarize_frameworks(frameworks: &[Framework], findings: &[FileFinding]) -> Vec<FrameworkSummary> {
    let mut order: Vec<Framework> = frameworks.to_vec();
    for finding in findings {
        if !order.contains(&finding.framework) {
            order.push(finding.framework);
        }
    }

    order
        .into_iter()
        .map(|framework| {
            let mut summary = FrameworkSummary::new(framework);
            let mut score_sum = 0.0;

            for finding in findings.iter().filter(|f| f.framework == framework) {
                if finding.is_failed() {
                    summary.failed += 1;
                    continue;
                }
                summary.files += 1;
                score_sum += finding.score;
                if finding.compliant {
                    summary.compliant += 1;
                } else {
                    summary.non_compliant += 1;
                }
                for violation in &finding.violations {
                    summary.severity.add(violation.severity);
                }
            }

            if summary.files > 0 {
                summary.average_score = score_sum / summary.files as f64;
            }
            summary
        })
        .collect()
}
