//! Originality report schema and parsing.
//!
//! Checks ask for schema-constrained JSON. When a provider ignores the schema
//! (or wraps the JSON in prose) the parser looks for the first JSON object in
//! the text, and only then falls back to `KEY: value` extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::models::{QualityReport, ReportSource, RiskLevel};
use crate::error::{FolioError, Result};
use crate::util::word_count;

static SCORE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)originality[_ ]score\W{0,4}(\d+(?:\.\d+)?)").expect("valid score regex")
});

static RISK_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)risk[_ ]level\W{0,4}(low|medium|moderate|high)").expect("valid risk regex")
});

static ISSUES_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)issues[_ ]found\W{0,4}(yes|no|true|false)").expect("valid issues regex")
});

/// JSON schema sent with originality checks.
#[must_use]
pub fn report_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "originality_score": { "type": "integer", "minimum": 1, "maximum": 10 },
            "risk_level": { "type": "string", "enum": ["LOW", "MEDIUM", "HIGH"] },
            "issues_found": { "type": "boolean" },
            "issues": { "type": "array", "items": { "type": "string" } },
            "suggestions": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["originality_score", "risk_level", "issues_found"]
    })
}

#[derive(Debug, Deserialize)]
struct WireReport {
    #[serde(alias = "score", alias = "originalityScore")]
    originality_score: f64,
    #[serde(alias = "risk", alias = "riskLevel")]
    risk_level: String,
    #[serde(default, alias = "issuesFound")]
    issues_found: Option<bool>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 1;
    }
    // Clamped to 1..=10 first, so the cast is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = raw.round().clamp(1.0, 10.0) as u8;
    score
}

/// Risk implied by a score when the checker omitted one.
const fn risk_for_score(score: u8) -> RiskLevel {
    match score {
        8..=10 => RiskLevel::Low,
        5..=7 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Parse a checker response into a report for `body`.
///
/// Word count is always taken from `body`, never from the checker.
///
/// # Errors
///
/// Returns [`FolioError::ParseResponse`] when neither a JSON report nor any
/// `KEY: value` field can be found.
pub fn parse_report(response: &str, body: &str) -> Result<QualityReport> {
    let words = word_count(body);
    if let Some(report) = parse_structured(response, words) {
        return Ok(report);
    }
    parse_fallback(response, words).ok_or_else(|| {
        FolioError::ParseResponse("checker response contains no originality report".to_string())
    })
}

fn parse_structured(response: &str, words: usize) -> Option<QualityReport> {
    let trimmed = response.trim();
    let wire: WireReport = serde_json::from_str(trimmed)
        .ok()
        .or_else(|| first_json_object(trimmed).and_then(|obj| serde_json::from_str(obj).ok()))?;

    let originality_score = clamp_score(wire.originality_score);
    let risk = RiskLevel::parse(&wire.risk_level).unwrap_or_else(|| risk_for_score(originality_score));
    Some(QualityReport {
        originality_score,
        risk,
        word_count: words,
        issues_found: wire.issues_found.unwrap_or(!wire.issues.is_empty()),
        issues: wire.issues,
        suggestions: wire.suggestions,
        source: ReportSource::Structured,
    })
}

fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_fallback(response: &str, words: usize) -> Option<QualityReport> {
    let score = SCORE_FIELD
        .captures(response)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(clamp_score);
    let risk = RISK_FIELD
        .captures(response)
        .and_then(|c| RiskLevel::parse(&c[1]));

    if score.is_none() && risk.is_none() {
        return None;
    }

    let risk = risk.unwrap_or_else(|| risk_for_score(score.unwrap_or(1)));
    let originality_score = score.unwrap_or(match risk {
        RiskLevel::Low => 8,
        RiskLevel::Medium => 5,
        RiskLevel::High => 2,
    });
    let issues_found = ISSUES_FIELD.captures(response).map_or(risk == RiskLevel::High, |c| {
        matches!(c[1].to_lowercase().as_str(), "yes" | "true")
    });

    Some(QualityReport {
        originality_score,
        risk,
        word_count: words,
        issues_found,
        issues: Vec::new(),
        suggestions: Vec::new(),
        source: ReportSource::Fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "one two three four five";

    #[test]
    fn parses_schema_json() {
        let response = r#"{"originality_score": 8, "risk_level": "LOW", "issues_found": false, "issues": [], "suggestions": ["vary pacing"]}"#;
        let report = parse_report(response, BODY).unwrap();
        assert_eq!(report.originality_score, 8);
        assert_eq!(report.risk, RiskLevel::Low);
        assert!(!report.issues_found);
        assert_eq!(report.suggestions, vec!["vary pacing".to_string()]);
        assert_eq!(report.source, ReportSource::Structured);
    }

    #[test]
    fn word_count_comes_from_body_not_checker() {
        let response = r#"{"originality_score": 9, "risk_level": "LOW", "issues_found": false, "word_count": 5000}"#;
        assert_eq!(parse_report(response, BODY).unwrap().word_count, 5);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let response = "Here is my analysis:\n```json\n{\"originality_score\": 4, \"risk_level\": \"high\", \"issues\": [\"copied passage\"]}\n```";
        let report = parse_report(response, BODY).unwrap();
        assert_eq!(report.risk, RiskLevel::High);
        assert!(report.issues_found);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn clamps_score_range() {
        let high = r#"{"originality_score": 14, "risk_level": "LOW"}"#;
        let low = r#"{"originality_score": -3, "risk_level": "HIGH"}"#;
        assert_eq!(parse_report(high, BODY).unwrap().originality_score, 10);
        assert_eq!(parse_report(low, BODY).unwrap().originality_score, 1);
    }

    #[test]
    fn falls_back_to_key_value_lines() {
        let response = "ORIGINALITY_SCORE: 6\nRISK_LEVEL: MEDIUM\nISSUES_FOUND: YES\n";
        let report = parse_report(response, BODY).unwrap();
        assert_eq!(report.originality_score, 6);
        assert_eq!(report.risk, RiskLevel::Medium);
        assert!(report.issues_found);
        assert_eq!(report.source, ReportSource::Fallback);
    }

    #[test]
    fn fallback_derives_missing_risk_from_score() {
        let report = parse_report("**Originality score:** 9/10", BODY).unwrap();
        assert_eq!(report.risk, RiskLevel::Low);
        assert!(!report.issues_found);
    }

    #[test]
    fn unparseable_response_is_an_error() {
        let err = parse_report("I cannot evaluate this text.", BODY).unwrap_err();
        assert!(matches!(err, FolioError::ParseResponse(_)));
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = report_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
    }
}
