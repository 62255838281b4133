//! Risk Classification Engine.
//!
//! Pure and deterministic: no I/O, no clock, no randomness, no hash-ordered
//! collections in the output. The same observations and demographics always
//! yield a byte-identical [`RiskReport`], so callers recompute instead of
//! caching.

use std::collections::BTreeSet;

use super::canon::{canonicalize, organ_system_for};
use super::patterns::{evaluate_patterns, tier_recommendations};
use super::reference::{parse_reference_range, standard_bounds};
use super::types::{ReferenceBounds, RiskFinding, RiskReport};
use crate::models::{Demographics, Direction, LabTestObservation, RiskLevel, Severity};
use crate::pipeline_config::RiskConfig;

/// Classify with the default calibration.
pub fn classify(observations: &[LabTestObservation], demographics: &Demographics) -> RiskReport {
    RiskEngine::default().classify(observations, demographics)
}

/// Severity and direction of a value against its bounds.
///
/// Critical when the overshoot beyond the violated bound exceeds
/// `multiplier` times the bound-to-midpoint distance. With a single bound the
/// distance is half the bound's magnitude.
pub fn assess_value(
    value: f64,
    bounds: &ReferenceBounds,
    multiplier: f64,
) -> Option<(Severity, Option<Direction>)> {
    if bounds.is_unbounded() {
        return None;
    }

    let (overshoot, direction) = match (bounds.lower, bounds.upper) {
        (Some(lo), _) if value < lo => (lo - value, Direction::Low),
        (_, Some(hi)) if value > hi => (value - hi, Direction::High),
        _ => return Some((Severity::Normal, None)),
    };

    let reach = match (bounds.lower, bounds.upper) {
        (Some(lo), Some(hi)) => (hi - lo) / 2.0,
        (Some(b), None) | (None, Some(b)) => b.abs() / 2.0,
        (None, None) => 0.0,
    };

    let severity = if reach > 0.0 && overshoot > multiplier * reach {
        Severity::Critical
    } else {
        Severity::Abnormal
    };
    Some((severity, Some(direction)))
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn classify(
        &self,
        observations: &[LabTestObservation],
        demographics: &Demographics,
    ) -> RiskReport {
        let mut critical_findings = Vec::new();
        let mut abnormal_findings = Vec::new();
        let mut justification = Vec::new();
        let mut affected_organs = BTreeSet::new();
        let mut classified: Vec<(String, Severity)> = Vec::new();
        let mut normal_count = 0usize;
        let mut unclassified_count = 0usize;

        for obs in observations {
            let canonical = canonicalize(&obs.test_name);

            let Some(value) = obs.raw_value.numeric() else {
                unclassified_count += 1;
                continue;
            };

            let Some((bounds, range_text)) = self.resolve_bounds(obs, &canonical, demographics)
            else {
                unclassified_count += 1;
                continue;
            };

            let Some((severity, direction)) =
                assess_value(value, &bounds, self.config.critical_multiplier)
            else {
                unclassified_count += 1;
                continue;
            };

            classified.push((canonical.clone(), severity));

            let Some(direction) = direction else {
                normal_count += 1;
                continue;
            };

            let organ_system = organ_system_for(&canonical);
            affected_organs.insert(organ_system);

            let message = finding_message(
                &canonical,
                severity,
                direction,
                value,
                obs.unit.as_deref(),
                &range_text,
            );
            justification.push(message.clone());

            let finding = RiskFinding {
                test_name: canonical,
                organ_system,
                severity,
                direction,
                value,
                unit: obs.unit.clone(),
                reference_range: range_text,
                message,
            };
            if severity == Severity::Critical {
                critical_findings.push(finding);
            } else {
                abnormal_findings.push(finding);
            }
        }

        let critical_count = critical_findings.len();
        let abnormal_count = abnormal_findings.len();
        let risk_score = self.score(critical_count, abnormal_count);
        let risk_level = self.config.tiers.level_for(risk_score);

        let mut flags = evaluate_patterns(&classified, self.config.pattern_min_indicators);
        flags.insert("has_critical_findings".into(), critical_count > 0);
        flags.insert("multi_organ_involvement".into(), affected_organs.len() >= 2);
        flags.insert("unclassified_tests_present".into(), unclassified_count > 0);

        let total_tests = observations.len();
        let summary = summarize(
            total_tests,
            critical_count,
            abnormal_count,
            normal_count,
            unclassified_count,
            risk_level,
        );

        tracing::debug!(
            total_tests,
            critical_count,
            abnormal_count,
            unclassified_count,
            risk_score,
            risk_level = %risk_level,
            "Risk classification complete"
        );

        RiskReport {
            risk_level,
            risk_score,
            total_tests,
            critical_count,
            abnormal_count,
            normal_count,
            unclassified_count,
            affected_organs,
            flags,
            critical_findings,
            abnormal_findings,
            justification,
            requires_immediate_attention: critical_count > 0,
            summary,
            recommendations: tier_recommendations(risk_level),
        }
    }

    fn score(&self, critical: usize, abnormal: usize) -> u32 {
        let critical = u32::try_from(critical).unwrap_or(u32::MAX);
        let abnormal = u32::try_from(abnormal).unwrap_or(u32::MAX);
        critical
            .saturating_mul(self.config.critical_weight)
            .saturating_add(abnormal.saturating_mul(self.config.abnormal_weight))
            .min(100)
    }

    /// Bounds from the printed range, else the standard table when enabled.
    fn resolve_bounds(
        &self,
        obs: &LabTestObservation,
        canonical: &str,
        demographics: &Demographics,
    ) -> Option<(ReferenceBounds, String)> {
        if let Some(text) = obs.reference_range.as_deref() {
            let bounds = parse_reference_range(text);
            if !bounds.is_unbounded() {
                return Some((bounds, text.trim().to_string()));
            }
        }

        if self.config.standard_range_fallback {
            let bounds = standard_bounds(canonical, demographics.sex)?;
            return Some((bounds, format!("standard {}", bounds.describe())));
        }

        None
    }
}

fn finding_message(
    test: &str,
    severity: Severity,
    direction: Direction,
    value: f64,
    unit: Option<&str>,
    range_text: &str,
) -> String {
    let reading = match unit.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => format!("{value} {u}"),
        None => format!("{value}"),
    };
    let side = match direction {
        Direction::High => "above",
        Direction::Low => "below",
    };
    match severity {
        Severity::Critical => format!(
            "{test} is critically {} at {reading}, far {side} the reference range ({range_text}).",
            direction.as_str()
        ),
        _ => format!("{test} is {side} the reference range at {reading} (reference {range_text})."),
    }
}

fn summarize(
    total: usize,
    critical: usize,
    abnormal: usize,
    normal: usize,
    unclassified: usize,
    level: RiskLevel,
) -> String {
    if total == 0 {
        return "No lab tests were available to assess.".into();
    }
    let mut text = format!(
        "{total} tests assessed: {critical} critical, {abnormal} abnormal, {normal} normal"
    );
    if unclassified > 0 {
        text.push_str(&format!(", {unclassified} without a usable value or range"));
    }
    text.push_str(&format!(". Overall risk level: {level}."));
    text
}
