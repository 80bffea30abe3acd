//! Deterministic Markdown report generation.
//!
//! [`format_report`] is pure: same report in, byte-identical Markdown out.
//! No clock or network access; `generated_at` is supplied by the caller.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::research::SourceReference;

/// Quality signals attached to a finished report.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct QualityIndicators {
    pub quality_score: f64,
    pub warnings: Vec<String>,
    /// True when the iteration cap fired before the quality threshold.
    pub limited_sources: bool,
}

/// The finished research report, derived once at the finish step.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ResearchReport {
    pub topic: String,
    pub user_id: String,
    pub executive_summary: String,
    pub detailed_findings: String,
    pub sources: Vec<SourceReference>,
    pub iterations: u32,
    pub generated_at: DateTime<Utc>,
    pub quality_indicators: QualityIndicators,
}

/// Renders the fixed section order: title, generated stamp, executive
/// summary, detailed findings, sources (deduplicated by URL, first
/// occurrence wins, insertion order), metadata table.
pub fn format_report(report: &ResearchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.topic));
    out.push_str(&format!(
        "_Generated {}_\n\n",
        report
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    out.push_str("## Executive Summary\n\n");
    out.push_str(&report.executive_summary);
    out.push_str("\n\n");

    out.push_str("## Detailed Findings\n\n");
    out.push_str(&report.detailed_findings);
    out.push_str("\n\n");

    out.push_str("## Sources\n\n");
    let deduped = dedup_by_url(&report.sources);
    if deduped.is_empty() {
        out.push_str("_No sources gathered._\n");
    } else {
        for source in &deduped {
            out.push_str(&format!(
                "- [{}]({}) — {}\n",
                source.title, source.url, source.snippet
            ));
        }
    }
    out.push('\n');

    out.push_str("## Metadata\n\n");
    out.push_str("| field | value |\n");
    out.push_str("|-------|-------|\n");
    out.push_str(&format!("| topic | {} |\n", report.topic));
    out.push_str(&format!("| user_id | {} |\n", report.user_id));
    out.push_str(&format!("| iterations | {} |\n", report.iterations));
    out.push_str(&format!(
        "| quality_score | {:.2} |\n",
        report.quality_indicators.quality_score
    ));
    out.push_str(&format!("| source_count | {} |\n", deduped.len()));
    out
}

/// First occurrence per URL wins; order is insertion order.
fn dedup_by_url(sources: &[SourceReference]) -> Vec<&SourceReference> {
    let mut seen = std::collections::HashSet::new();
    sources
        .iter()
        .filter(|s| seen.insert(s.url.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_report() -> ResearchReport {
        ResearchReport {
            topic: "capital of France".into(),
            user_id: "00000000-0000-0000-0000-000000000001".into(),
            executive_summary: "Paris is the capital of France.".into(),
            detailed_findings: "Paris has been the capital since 987.".into(),
            sources: vec![
                SourceReference::new(
                    "Paris",
                    "https://example.com/paris",
                    "Capital city of France",
                ),
                SourceReference::new("Paris again", "https://example.com/paris", "duplicate url"),
                SourceReference::new("France", "https://example.com/france", "Country overview"),
            ],
            iterations: 2,
            generated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            quality_indicators: QualityIndicators {
                quality_score: 0.9,
                warnings: vec![],
                limited_sources: false,
            },
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let markdown = format_report(&sample_report());
        let title = markdown.find("# capital of France").unwrap();
        let summary = markdown.find("## Executive Summary").unwrap();
        let findings = markdown.find("## Detailed Findings").unwrap();
        let sources = markdown.find("## Sources").unwrap();
        let metadata = markdown.find("## Metadata").unwrap();
        assert!(title < summary && summary < findings && findings < sources && sources < metadata);
    }

    #[test]
    fn formatting_is_deterministic() {
        let report = sample_report();
        assert_eq!(format_report(&report), format_report(&report.clone()));
    }

    #[test]
    fn duplicate_urls_keep_first_occurrence() {
        let markdown = format_report(&sample_report());
        assert_eq!(markdown.matches("https://example.com/paris").count(), 1);
        assert!(markdown.contains("[Paris](https://example.com/paris)"));
        assert!(!markdown.contains("Paris again"));
        assert!(markdown.contains("| source_count | 2 |"));
    }

    #[test]
    fn empty_sources_render_placeholder() {
        let mut report = sample_report();
        report.sources.clear();
        let markdown = format_report(&report);
        assert!(markdown.contains("_No sources gathered._"));
        assert!(markdown.contains("| source_count | 0 |"));
    }
}
