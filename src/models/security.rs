//! Security assessment data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::validation::IssueSeverity;

/// Batch-wide security posture derived from per-file results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAssessment {
    /// Mean per-file security score, 0-100
    pub overall_score: f64,
    /// Number of files whose highest finding was critical
    pub critical_findings: usize,
    /// Number of files whose highest finding was an error
    pub high_findings: usize,
    /// Number of files whose highest finding was a warning
    pub medium_findings: usize,
    /// Number of files whose highest finding was informational
    pub low_findings: usize,
    /// Risks deduplicated by title across all files
    pub identified_risks: Vec<IdentifiedRisk>,
    pub assessed_at: DateTime<Utc>,
}

impl SecurityAssessment {
    pub fn new(overall_score: f64) -> Self {
        Self {
            overall_score,
            critical_findings: 0,
            high_findings: 0,
            medium_findings: 0,
            low_findings: 0,
            identified_risks: Vec::new(),
            assessed_at: Utc::now(),
        }
    }

    /// Count one file under the bucket matching its highest severity
    pub fn tally(&mut self, severity: IssueSeverity) {
        match severity {
            IssueSeverity::Critical => self.critical_findings += 1,
            IssueSeverity::Error => self.high_findings += 1,
            IssueSeverity::Warning => self.medium_findings += 1,
            IssueSeverity::Info => self.low_findings += 1,
        }
    }

    pub fn total_findings(&self) -> usize {
        self.critical_findings + self.high_findings + self.medium_findings + self.low_findings
    }

    /// Highest severity across the tallied buckets and identified risks,
    /// `None` when the batch produced no findings at all
    pub fn overall_risk(&self) -> Option<IssueSeverity> {
        let tallied = if self.critical_findings > 0 {
            Some(IssueSeverity::Critical)
        } else if self.high_findings > 0 {
            Some(IssueSeverity::Error)
        } else if self.medium_findings > 0 {
            Some(IssueSeverity::Warning)
        } else if self.low_findings > 0 {
            Some(IssueSeverity::Info)
        } else {
            None
        };
        let risks = self.identified_risks.iter().map(|r| r.severity).max();
        tallied.max(risks)
    }
}

impl Default for SecurityAssessment {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A security risk merged from every recommendation sharing its title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedRisk {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Highest severity across merged recommendations
    pub severity: IssueSeverity,
    /// Distinct affected fields, first-seen order
    pub affected_fields: Vec<String>,
    pub mitigation: String,
    /// Mean impact score across merged recommendations
    pub risk_score: f64,
    /// How many recommendations were merged into this risk
    pub occurrences: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_buckets() {
        let mut assessment = SecurityAssessment::new(80.0);
        assessment.tally(IssueSeverity::Critical);
        assessment.tally(IssueSeverity::Error);
        assessment.tally(IssueSeverity::Error);
        assessment.tally(IssueSeverity::Warning);
        assessment.tally(IssueSeverity::Info);

        assert_eq!(assessment.critical_findings, 1);
        assert_eq!(assessment.high_findings, 2);
        assert_eq!(assessment.medium_findings, 1);
        assert_eq!(assessment.low_findings, 1);
        assert_eq!(assessment.total_findings(), 5);
    }

    #[test]
    fn test_overall_risk() {
        let mut assessment = SecurityAssessment::new(100.0);
        assert_eq!(assessment.overall_risk(), None);

        assessment.tally(IssueSeverity::Info);
        assessment.tally(IssueSeverity::Warning);
        assert_eq!(assessment.overall_risk(), Some(IssueSeverity::Warning));

        assessment.identified_risks.push(IdentifiedRisk {
            id: "DIR001".to_string(),
            title: "Policy directory not found".to_string(),
            description: String::new(),
            severity: IssueSeverity::Critical,
            affected_fields: Vec::new(),
            mitigation: String::new(),
            risk_score: 100.0,
            occurrences: 1,
        });
        assert_eq!(assessment.overall_risk(), Some(IssueSeverity::Critical));
    }
}
