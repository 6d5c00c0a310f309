//! Markdown and JSON report generation.

use super::{ComplianceReport, FileFinding, FrameworkSummary, ReportMetadata, SeverityCounts};
use crate::config::ReportConfig;
use crate::models::{Severity, Violation};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ComplianceReport, options: &ReportConfig) -> String {
    let mut output = String::new();

    output.push_str("# Compliance Audit Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(report));
    output.push_str(&generate_frameworks_section(&report.frameworks));
    output.push_str(&generate_findings_section(&report.findings, options));
    output.push_str(&generate_failures_section(report));
    output.push_str(&generate_recommendations_section(&report.recommendations));
    output.push_str("---\n\n*Report generated by complyaudit*\n");

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ComplianceReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    let frameworks = metadata
        .frameworks
        .iter()
        .map(|f| f.display_name())
        .collect::<Vec<_>>()
        .join(", ");

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Directory:** `{}`\n", metadata.root));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Frameworks:** {}\n", frameworks));
    section.push_str(&format!("- **Files Scanned:** {}\n", metadata.files_scanned));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_summary_section(report: &ComplianceReport) -> String {
    let mut section = String::new();
    let summary = &report.summary;

    section.push_str("## Summary\n\n");
    section.push_str("| Analyses | Compliant | Non-compliant | Failed | Cache Hit Rate |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {:.0}% |\n\n",
        summary.total,
        summary.compliant,
        summary.violations - summary.failed.min(summary.violations),
        summary.failed,
        summary.cache_hit_rate * 100.0
    ));

    section.push_str("### Violation Severity Breakdown\n\n");
    section.push_str(&severity_table(&report.severity_totals()));

    section
}

fn severity_table(counts: &SeverityCounts) -> String {
    format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n\
         |:---:|:---:|:---:|:---:|:---:|\n\
         | {} | {} | {} | {} | **{}** |\n\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
        counts.critical,
        counts.high,
        counts.medium,
        counts.low,
        counts.total()
    )
}

fn generate_frameworks_section(frameworks: &[FrameworkSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Frameworks\n\n");

    for summary in frameworks {
        section.push_str(&format!("### {}\n\n", summary.framework.display_name()));
        section.push_str(&format!(
            "- **Average Score:** {:.1}/100\n",
            summary.average_score
        ));
        section.push_str(&format!(
            "- **Compliant Files:** {} of {}\n",
            summary.compliant, summary.files
        ));
        if summary.failed > 0 {
            section.push_str(&format!("- **Failed Analyses:** {}\n", summary.failed));
        }
        section.push('\n');
        section.push_str(&severity_table(&summary.severity));
    }

    section
}

fn generate_findings_section(findings: &[FileFinding], options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Findings by File\n\n");

    let with_violations: Vec<_> = findings
        .iter()
        .filter(|f| !f.is_failed() && !f.violations.is_empty())
        .collect();

    if with_violations.is_empty() {
        section.push_str("No violations were found in the analyzed files.\n\n");
        return section;
    }

    for finding in with_violations {
        section.push_str(&format!(
            "### `{}` ({})\n\n",
            finding.file_path,
            finding.framework.display_name()
        ));

        let cached = if finding.cached { " | cached" } else { "" };
        section.push_str(&format!(
            "*Score: {:.0}/100 | Violations: {}{}*\n\n",
            finding.score,
            finding.violations.len(),
            cached
        ));

        let mut violations = finding.violations.clone();
        violations.sort_by(|a, b| b.severity.cmp(&a.severity));

        for violation in &violations {
            section.push_str(&generate_violation_block(violation, options));
        }
    }

    section
}

fn generate_violation_block(violation: &Violation, options: &ReportConfig) -> String {
    let mut block = String::new();

    let badge = format!(
        "{} **{}**",
        violation.severity.emoji(),
        violation.severity.to_string().to_uppercase()
    );
    block.push_str(&format!("#### {} {}\n\n", badge, violation.kind));
    block.push_str(&format!("**Lines:** {}\n\n", violation.line_range()));

    if !violation.description.is_empty() {
        block.push_str(&format!("**Description:** {}\n\n", violation.description));
    }

    if options.include_snippets {
        if let Some(ref snippet) = violation.code_snippet {
            let snippet: Vec<&str> = snippet.lines().take(options.max_snippet_lines).collect();
            block.push_str("<details>\n<summary>View Code</summary>\n\n```\n");
            block.push_str(&snippet.join("\n"));
            block.push_str("\n```\n</details>\n\n");
        }
    }

    if !violation.recommendation.is_empty() {
        block.push_str(&format!("> 💡 **Recommendation:** {}\n\n", violation.recommendation));
    }

    block.push_str("---\n\n");
    block
}

fn generate_failures_section(report: &ComplianceReport) -> String {
    if report.failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Failed Analyses\n\n");
    section.push_str("| File | Framework | Error |\n");
    section.push_str("|:---|:---|:---|\n");

    for failure in &report.failures {
        let framework = report
            .findings
            .get(failure.index)
            .map(|f| f.framework.display_name())
            .unwrap_or("-");
        section.push_str(&format!(
            "| `{}` | {} | {} |\n",
            failure.file_path,
            framework,
            failure.error.replace('|', "\\|")
        ));
    }
    section.push('\n');

    section
}

fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Recommendations\n\n");

    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}
