//! Security and compliance assessments derived from an aggregated report

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::models::{
    next_assessment_due, ComplianceAssessment, FrameworkScore, IdentifiedRisk, PolicyValidationReport,
    Recommendation, SecurityAssessment, COMPLIANCE_FRAMEWORKS, MAX_FRAMEWORK_JITTER,
};

/// Recommendation category that feeds the risk list
pub const SECURITY_CATEGORY: &str = "Security";

/// Derives assessments from aggregated results.
///
/// Framework scores are the overall compliance score plus a bounded jitter
/// drawn from a seeded generator, so two generators built with the same seed
/// produce the same scores.
#[derive(Debug, Clone)]
pub struct AssessmentGenerator {
    rng: StdRng,
    jitter: f64,
}

impl AssessmentGenerator {
    /// `seed` fixes the jitter sequence; a random seed is drawn when `None`.
    /// `jitter` is the maximum absolute deviation, clamped to
    /// [`MAX_FRAMEWORK_JITTER`]; 0 or NaN disables it.
    pub fn new(seed: Option<u64>, jitter: f64) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        let jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.abs().min(MAX_FRAMEWORK_JITTER)
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            jitter,
        }
    }

    /// Attach both assessments to `report`
    pub fn assess(&mut self, report: &mut PolicyValidationReport) {
        report.security_assessment = self.security_assessment(report);
        report.compliance_assessment = self.compliance_assessment(report.overall_compliance_score);
    }

    pub fn security_assessment(&self, report: &PolicyValidationReport) -> SecurityAssessment {
        let mut assessment = SecurityAssessment::new(report.overall_security_score);
        for severity in report.policy_results.iter().filter_map(|r| r.highest_severity) {
            assessment.tally(severity);
        }
        assessment.identified_risks = group_security_risks(&report.recommendations);
        assessment
    }

    pub fn compliance_assessment(&mut self, overall_score: f64) -> ComplianceAssessment {
        let now = Utc::now();
        let mut frameworks = BTreeMap::new();
        for framework in COMPLIANCE_FRAMEWORKS {
            let offset = if self.jitter > 0.0 {
                self.rng.random_range(-self.jitter..=self.jitter)
            } else {
                0.0
            };
            frameworks.insert(
                framework.to_string(),
                FrameworkScore::simulated(framework, overall_score + offset),
            );
        }

        ComplianceAssessment {
            overall_score,
            frameworks,
            assessed_at: now,
            next_assessment_due: next_assessment_due(now),
        }
    }
}

impl Default for AssessmentGenerator {
    fn default() -> Self {
        Self::new(None, 5.0)
    }
}

/// Merge security recommendations sharing a title (case-insensitive) into
/// one risk each, in first-seen order
pub fn group_security_risks(recommendations: &[Recommendation]) -> Vec<IdentifiedRisk> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<&Recommendation>> = BTreeMap::new();

    for recommendation in recommendations
        .iter()
        .filter(|r| r.category.eq_ignore_ascii_case(SECURITY_CATEGORY))
    {
        let key = recommendation.title.to_lowercase();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(recommendation);
    }

    order
        .iter()
        .filter_map(|key| groups.get(key))
        .filter_map(|members| merge_group(members))
        .collect()
}

fn merge_group(members: &[&Recommendation]) -> Option<IdentifiedRisk> {
    let first = members.first()?;
    let severity = members.iter().map(|m| m.severity).max()?;

    let mut affected_fields: Vec<String> = Vec::new();
    for member in members {
        if !member.affected_field.is_empty() && !affected_fields.contains(&member.affected_field) {
            affected_fields.push(member.affected_field.clone());
        }
    }

    let risk_score = members.iter().map(|m| m.impact_score).sum::<f64>() / members.len() as f64;

    Some(IdentifiedRisk {
        id: first.id.clone(),
        title: first.title.clone(),
        description: first.description.clone(),
        severity,
        affected_fields,
        mitigation: first.recommended_value.clone(),
        risk_score,
        occurrences: members.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueSeverity, ValidationResult};
    use std::path::PathBuf;

    fn recommendation(id: &str, title: &str, category: &str, severity: IssueSeverity, impact: f64, field: &str) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("{} description", id),
            category: category.to_string(),
            severity,
            impact_score: impact,
            affected_field: field.to_string(),
            recommended_value: format!("{} fix", id),
        }
    }

    fn result_with_severity(name: &str, severity: Option<IssueSeverity>) -> ValidationResult {
        let mut result = ValidationResult::unreadable(PathBuf::from(name), None, "x");
        result.highest_severity = severity;
        result
    }

    #[test]
    fn test_risks_grouped_by_title_case_insensitive() {
        let recommendations = vec![
            recommendation("R1", "Require MFA", "Security", IssueSeverity::Warning, 60.0, "grantControls"),
            recommendation("R2", "Block legacy auth", "Security", IssueSeverity::Error, 90.0, "clientAppTypes"),
            recommendation("R3", "require mfa", "security", IssueSeverity::Critical, 80.0, "grantControls"),
            recommendation("R4", "REQUIRE MFA", "Security", IssueSeverity::Warning, 70.0, "conditions.users"),
            recommendation("R5", "Require MFA", "Compliance", IssueSeverity::Critical, 10.0, "other"),
        ];

        let risks = group_security_risks(&recommendations);

        assert_eq!(risks.len(), 2);
        let mfa = &risks[0];
        assert_eq!(mfa.id, "R1");
        assert_eq!(mfa.title, "Require MFA");
        assert_eq!(mfa.description, "R1 description");
        assert_eq!(mfa.severity, IssueSeverity::Critical);
        assert_eq!(mfa.affected_fields, vec!["grantControls", "conditions.users"]);
        assert_eq!(mfa.mitigation, "R1 fix");
        assert_eq!(mfa.risk_score, 70.0);
        assert_eq!(mfa.occurrences, 3);
        assert_eq!(risks[1].id, "R2");
    }

    #[test]
    fn test_severity_tally_skips_clean_results() {
        let mut report = PolicyValidationReport::empty(PathBuf::from("/p"));
        report.policy_results = vec![
            result_with_severity("a", Some(IssueSeverity::Critical)),
            result_with_severity("b", Some(IssueSeverity::Error)),
            result_with_severity("c", Some(IssueSeverity::Warning)),
            result_with_severity("d", Some(IssueSeverity::Info)),
            result_with_severity("e", None),
        ];

        let assessment = AssessmentGenerator::new(Some(1), 5.0).security_assessment(&report);

        assert_eq!(assessment.critical_findings, 1);
        assert_eq!(assessment.high_findings, 1);
        assert_eq!(assessment.medium_findings, 1);
        assert_eq!(assessment.low_findings, 1);
    }

    #[test]
    fn test_framework_scores_within_jitter() {
        for seed in 0..50 {
            let mut generator = AssessmentGenerator::new(Some(seed), 5.0);
            let assessment = generator.compliance_assessment(62.5);

            assert_eq!(assessment.frameworks.len(), COMPLIANCE_FRAMEWORKS.len());
            for score in assessment.frameworks.values() {
                assert!((score.score - 62.5).abs() <= 5.0);
                assert_eq!(score.total_controls, 50);
                assert_eq!(score.passing_controls + score.failing_controls, 50);
                assert!(score.simulated);
            }
        }
    }

    #[test]
    fn test_framework_scores_clamped() {
        let mut generator = AssessmentGenerator::new(Some(7), 5.0);
        let assessment = generator.compliance_assessment(98.0);
        for score in assessment.frameworks.values() {
            assert!(score.score <= 100.0 && score.score >= 93.0);
        }
    }

    #[test]
    fn test_jitter_amplitude_is_clamped() {
        for jitter in [40.0, -40.0, f64::INFINITY, f64::NEG_INFINITY] {
            for seed in 0..20 {
                let assessment = AssessmentGenerator::new(Some(seed), jitter).compliance_assessment(50.0);
                for score in assessment.frameworks.values() {
                    assert!(
                        (score.score - 50.0).abs() <= MAX_FRAMEWORK_JITTER,
                        "jitter {} gave {} = {}",
                        jitter,
                        score.framework,
                        score.score
                    );
                }
            }
        }
    }

    #[test]
    fn test_nan_jitter_disables_offsets() {
        let assessment = AssessmentGenerator::new(Some(1), f64::NAN).compliance_assessment(50.0);
        for score in assessment.frameworks.values() {
            assert_eq!(score.score, 50.0);
        }
    }

    #[test]
    fn test_same_seed_same_scores() {
        let a = AssessmentGenerator::new(Some(42), 5.0).compliance_assessment(70.0);
        let b = AssessmentGenerator::new(Some(42), 5.0).compliance_assessment(70.0);
        assert_eq!(a.frameworks, b.frameworks);
    }

    #[test]
    fn test_zero_jitter_matches_overall() {
        let assessment = AssessmentGenerator::new(None, 0.0).compliance_assessment(80.0);
        for score in assessment.frameworks.values() {
            assert_eq!(score.score, 80.0);
            assert_eq!(score.passing_controls, 40);
        }
    }

    #[test]
    fn test_next_assessment_three_months_out() {
        let assessment = AssessmentGenerator::new(Some(3), 5.0).compliance_assessment(50.0);
        let expected = assessment
            .assessed_at
            .checked_add_months(chrono::Months::new(3))
            .unwrap();
        assert_eq!(assessment.next_assessment_due, expected);
    }
}
