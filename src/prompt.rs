//! Default prompt rendering for compliance analysis.

use crate::models::{AnalysisRequest, Framework};

/// Control areas the model is steered towards for each framework.
fn focus_areas(framework: Framework) -> &'static [&'static str] {
    match framework {
        Framework::Soc2 => &[
            "access control and authorization checks",
            "audit logging of security-relevant events",
            "encryption of data in transit and at rest",
            "secrets and credential handling",
            "change management and error handling",
        ],
        Framework::Gdpr => &[
            "collection and processing of personal data",
            "consent and lawful basis checks",
            "data minimisation and retention",
            "right to erasure and data export",
            "personal data in logs or error messages",
        ],
        Framework::Iso27001 => &[
            "information classification and handling",
            "cryptographic controls and key management",
            "access control policy enforcement",
            "logging and monitoring",
            "secure development practices",
        ],
        Framework::Hipaa => &[
            "protected health information exposure",
            "access controls and unique user identification",
            "audit controls on PHI access",
            "transmission security",
            "integrity controls on health records",
        ],
        Framework::Pci => &[
            "storage of cardholder data and PANs",
            "encryption of cardholder data",
            "authentication and session handling",
            "input validation on payment flows",
            "logging that could leak card data",
        ],
    }
}

/// Render the user prompt for one request.
pub fn render_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Assess the following file for {} compliance.\n\n",
        request.framework.display_name()
    ));

    prompt.push_str("Focus on:\n");
    for area in focus_areas(request.framework) {
        prompt.push_str(&format!("- {}\n", area));
    }
    prompt.push('\n');

    prompt.push_str(&format!("File: {}\n", request.file_path));
    if let Some(ref language) = request.language {
        prompt.push_str(&format!("Language: {}\n", language));
    }
    if let Some(ref context) = request.context {
        prompt.push_str(&format!("Context: {}\n", context));
    }

    prompt.push_str("\n```\n");
    prompt.push_str(&request.code);
    prompt.push_str("\n```\n\n");

    prompt.push_str("Respond with exactly one JSON object of this shape:\n");
    prompt.push_str(RESPONSE_SHAPE);
    prompt.push_str("\nScore is 0-100 where 100 means fully compliant. ");
    prompt.push_str("Use an empty violations array when nothing is wrong.");

    prompt
}

const RESPONSE_SHAPE: &str = r#"{"compliant": true, "score": 85, "violations": [{"severity": "critical|high|medium|low", "type": "SHORT_CODE", "description": "What is wrong", "lineNumbers": [12], "codeSnippet": "offending code", "recommendation": "How to fix"}], "recommendations": ["General advice"]}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_prompt_includes_request_details() {
        let request = AnalysisRequest::new("let ssn = user.ssn;", "src/user.rs", Framework::Hipaa)
            .with_language("Rust")
            .with_context("Patient intake service");

        let prompt = render_prompt(&request);

        assert!(prompt.contains("HIPAA compliance"));
        assert!(prompt.contains("protected health information"));
        assert!(prompt.contains("File: src/user.rs"));
        assert!(prompt.contains("Language: Rust"));
        assert!(prompt.contains("Context: Patient intake service"));
        assert!(prompt.contains("let ssn = user.ssn;"));
        assert!(prompt.contains("\"recommendations\""));
    }

    #[test]
    fn test_render_prompt_omits_missing_optionals() {
        let request = AnalysisRequest::new("x = 1", "a.py", Framework::Gdpr);
        let prompt = render_prompt(&request);

        assert!(!prompt.contains("Language:"));
        assert!(!prompt.contains("Context:"));
    }
}
