//! Scoring and aggregation for a harness run: per-case outcomes plus a summary the CLI prints.

use serde::Serialize;

/// Outcome for a single fixture case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub question: String,
    pub answer: String,
    pub verification_score: Option<f32>,
    pub expected_sources: Vec<String>,
    pub cited_sources: Vec<String>,
    /// Fraction of `expected_sources` that appear among the chunks the answer actually cites,
    /// via the answer's `chunks[].source` for each index in `references`. 1.0 when
    /// `expected_sources` is empty (nothing to miss).
    pub citation_coverage: f32,
}

/// Aggregate statistics across a full fixture run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub cases: Vec<CaseResult>,
    pub mean_verification_score: Option<f32>,
    pub mean_citation_coverage: f32,
}

impl Report {
    pub fn from_cases(cases: Vec<CaseResult>) -> Self {
        let scored: Vec<f32> = cases.iter().filter_map(|c| c.verification_score).collect();
        let mean_verification_score = if scored.is_empty() {
            None
        } else {
            Some(scored.iter().sum::<f32>() / scored.len() as f32)
        };

        let mean_citation_coverage = if cases.is_empty() {
            0.0
        } else {
            cases.iter().map(|c| c.citation_coverage).sum::<f32>() / cases.len() as f32
        };

        Self {
            cases,
            mean_verification_score,
            mean_citation_coverage,
        }
    }
}

/// Coverage of `expected` by `cited`: the fraction of `expected` entries present in `cited`.
/// An empty `expected` trivially scores 1.0, matching "nothing to miss".
pub fn citation_coverage(expected: &[String], cited: &[String]) -> f32 {
    if expected.is_empty() {
        return 1.0;
    }
    let hit = expected.iter().filter(|s| cited.contains(s)).count();
    hit as f32 / expected.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_coverage_is_full_when_nothing_expected() {
        assert!((citation_coverage(&[], &["a".into()]) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn citation_coverage_is_partial_when_some_sources_missed() {
        let expected = vec!["a".to_string(), "b".to_string()];
        let cited = vec!["a".to_string()];
        assert!((citation_coverage(&expected, &cited) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn report_aggregates_mean_verification_score_over_scored_cases_only() {
        let cases = vec![
            CaseResult {
                question: "q1".into(),
                answer: "a1".into(),
                verification_score: Some(0.8),
                expected_sources: vec![],
                cited_sources: vec![],
                citation_coverage: 1.0,
            },
            CaseResult {
                question: "q2".into(),
                answer: "a2".into(),
                verification_score: None,
                expected_sources: vec![],
                cited_sources: vec![],
                citation_coverage: 1.0,
            },
        ];
        let report = Report::from_cases(cases);
        assert!((report.mean_verification_score.unwrap() - 0.8).abs() < f32::EPSILON);
    }
}
