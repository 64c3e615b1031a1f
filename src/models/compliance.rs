//! Compliance assessment data structures

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Controls evaluated per framework
pub const CONTROLS_PER_FRAMEWORK: u32 = 50;

/// Frameworks reported in every compliance assessment
pub const COMPLIANCE_FRAMEWORKS: [&str; 4] = ["SOC2", "ISO27001", "NIST-800-53", "CIS"];

/// Largest allowed deviation of a simulated framework score from the
/// overall compliance score
pub const MAX_FRAMEWORK_JITTER: f64 = 5.0;

/// Months between an assessment and the next recommended one
pub const ASSESSMENT_INTERVAL_MONTHS: u32 = 3;

/// When the assessment made at `assessed_at` should be repeated
pub fn next_assessment_due(assessed_at: DateTime<Utc>) -> DateTime<Utc> {
    assessed_at
        .checked_add_months(Months::new(ASSESSMENT_INTERVAL_MONTHS))
        .unwrap_or(assessed_at)
}

/// Batch-wide compliance posture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceAssessment {
    /// Mean per-file compliance score, 0-100
    pub overall_score: f64,
    /// Per-framework scores keyed by framework name
    pub frameworks: BTreeMap<String, FrameworkScore>,
    pub assessed_at: DateTime<Utc>,
    pub next_assessment_due: DateTime<Utc>,
}

impl Default for ComplianceAssessment {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            overall_score: 0.0,
            frameworks: BTreeMap::new(),
            assessed_at: now,
            next_assessment_due: next_assessment_due(now),
        }
    }
}

/// Score for one framework.
///
/// Framework scores are simulated from the overall compliance score; they are
/// not derived from framework-specific control checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkScore {
    pub framework: String,
    pub score: f64,
    pub total_controls: u32,
    pub passing_controls: u32,
    pub failing_controls: u32,
    pub simulated: bool,
}

impl FrameworkScore {
    /// Derive control counts proportionally from a 0-100 score
    pub fn simulated(framework: &str, score: f64) -> Self {
        let score = score.clamp(0.0, 100.0);
        let passing = ((CONTROLS_PER_FRAMEWORK as f64) * score / 100.0).floor() as u32;
        let passing = passing.min(CONTROLS_PER_FRAMEWORK);
        Self {
            framework: framework.to_string(),
            score,
            total_controls: CONTROLS_PER_FRAMEWORK,
            passing_controls: passing,
            failing_controls: CONTROLS_PER_FRAMEWORK - passing,
            simulated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_assessment_due_in_three_months() {
        let assessment = ComplianceAssessment::default();
        let expected = assessment.assessed_at.checked_add_months(Months::new(3)).unwrap();
        assert_eq!(assessment.next_assessment_due, expected);
        assert!(assessment.next_assessment_due > assessment.assessed_at);
    }

    #[test]
    fn test_control_counts_from_score() {
        let score = FrameworkScore::simulated("SOC2", 73.0);
        assert_eq!(score.passing_controls, 36);
        assert_eq!(score.failing_controls, 14);
        assert_eq!(score.passing_controls + score.failing_controls, score.total_controls);
    }

    #[test]
    fn test_control_counts_at_bounds() {
        let perfect = FrameworkScore::simulated("CIS", 100.0);
        assert_eq!(perfect.passing_controls, 50);
        assert_eq!(perfect.failing_controls, 0);

        let clamped = FrameworkScore::simulated("CIS", -3.0);
        assert_eq!(clamped.score, 0.0);
        assert_eq!(clamped.passing_controls, 0);
        assert_eq!(clamped.failing_controls, 50);
    }
}
