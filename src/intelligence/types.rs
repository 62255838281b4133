use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::canon::same_test;
use crate::models::{Direction, LabTestObservation, OrganSystem, RiskLevel, Severity};

/// Numeric bounds parsed from a reference-range string.
///
/// Both bounds `None` means the observation cannot be classified by range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// Set when only a comparator ("<5", ">40") was given.
    pub comparator_only: bool,
}

impl ReferenceBounds {
    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
            comparator_only: false,
        }
    }

    pub fn below(upper: f64) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
            comparator_only: true,
        }
    }

    pub fn above(lower: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            comparator_only: true,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Human-readable form used in finding messages.
    pub fn describe(&self) -> String {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => format!("{lo}-{hi}"),
            (None, Some(hi)) => format!("<{hi}"),
            (Some(lo), None) => format!(">{lo}"),
            (None, None) => "unavailable".into(),
        }
    }
}

/// One non-normal observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub test_name: String,
    pub organ_system: OrganSystem,
    pub severity: Severity,
    pub direction: Direction,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub reference_range: String,
    pub message: String,
}

/// Deterministic risk summary for one set of lab observations.
///
/// Every collection is ordered so that two classifications of the same input
/// serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub total_tests: usize,
    pub critical_count: usize,
    pub abnormal_count: usize,
    pub normal_count: usize,
    pub unclassified_count: usize,
    pub affected_organs: BTreeSet<OrganSystem>,
    pub flags: BTreeMap<String, bool>,
    pub critical_findings: Vec<RiskFinding>,
    pub abnormal_findings: Vec<RiskFinding>,
    pub justification: Vec<String>,
    pub requires_immediate_attention: bool,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl RiskReport {
    /// Critical findings, then abnormal ones.
    pub fn findings(&self) -> impl Iterator<Item = &RiskFinding> {
        self.critical_findings
            .iter()
            .chain(self.abnormal_findings.iter())
    }

    /// Finding raised for this exact observation. Repeat rows of one test
    /// are told apart by their value.
    pub fn finding_for(&self, observation: &LabTestObservation) -> Option<&RiskFinding> {
        let value = observation.raw_value.numeric()?;
        self.findings()
            .find(|f| f.value == value && same_test(&f.test_name, &observation.test_name))
    }

    /// "critical high", "abnormal low", or "not flagged".
    pub fn status_of(&self, observation: &LabTestObservation) -> String {
        self.finding_for(observation)
            .map(|f| format!("{} {}", f.severity, f.direction))
            .unwrap_or_else(|| "not flagged".to_string())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
