use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde_json::Value;

use super::dates::{find_date_in_text, parse_date};
use super::types::*;
use crate::intelligence::canonicalize;
use crate::models::lab::json_kind;
use crate::models::{ExtractionResult, ValidationError};

/// Distinct dates a test needs before it counts as a trend.
const MIN_DISTINCT_DATES: usize = 2;

/// Per-test trend series across a patient's documents, ordered by test name.
pub fn aggregate(documents: &[PatientDocument]) -> Vec<TrendSeries> {
    aggregate_with_gaps(documents).series
}

/// Like [`aggregate`], also reporting documents left out for lack of a date.
pub fn aggregate_with_gaps(documents: &[PatientDocument]) -> TrendReport {
    let mut groups: BTreeMap<String, Vec<Contribution>> = BTreeMap::new();
    let mut gaps = Vec::new();

    for (index, doc) in documents.iter().enumerate() {
        let Some((date, date_source)) = resolve_date(doc) else {
            tracing::debug!(document_id = %doc.document_id, "No resolvable date, skipping document");
            gaps.push(AggregationGap {
                document_id: doc.document_id.clone(),
                reason: "no structured date, no date in raw text, no ingestion timestamp".into(),
            });
            continue;
        };

        for test in doc.extraction.payload.lab_tests() {
            let canonical = canonicalize(&test.test_name);
            if canonical.is_empty() {
                continue;
            }
            // Qualitative results cannot join a numeric series
            let Some(value) = test.raw_value.numeric() else {
                continue;
            };
            groups.entry(canonical).or_default().push(Contribution {
                document: index,
                point: TrendPoint {
                    date,
                    value,
                    reference_range: test.reference_range.clone(),
                    source_document_id: doc.document_id.clone(),
                    date_source,
                },
                unit: test.unit.clone(),
            });
        }
    }

    let series: Vec<TrendSeries> = groups
        .into_iter()
        .filter_map(|(test_name, contributions)| build_series(test_name, contributions, documents))
        .collect();

    if !gaps.is_empty() {
        tracing::warn!(
            documents = documents.len(),
            undated = gaps.len(),
            "Documents excluded from trends"
        );
    }
    tracing::debug!(series = series.len(), "Trend aggregation complete");

    TrendReport { series, gaps }
}

/// Decode a caller-supplied document list.
///
/// A non-array is a [`ValidationError`]. Malformed elements are skipped.
pub fn documents_from_json(value: &Value) -> Result<Vec<PatientDocument>, ValidationError> {
    let items = value.as_array().ok_or_else(|| ValidationError::WrongShape {
        expected: "array of patient documents",
        found: json_kind(value).into(),
    })?;

    let documents: Vec<PatientDocument> = items
        .iter()
        .enumerate()
        .filter_map(
            |(index, item)| match serde_json::from_value::<PatientDocument>(item.clone()) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::debug!(index, error = %e, "Skipping malformed patient document");
                    None
                }
            },
        )
        .collect();

    if documents.len() < items.len() {
        tracing::warn!(
            received = items.len(),
            kept = documents.len(),
            "Dropped malformed patient documents"
        );
    }
    Ok(documents)
}

struct Contribution {
    document: usize,
    point: TrendPoint,
    unit: Option<String>,
}

fn resolve_date(doc: &PatientDocument) -> Option<(NaiveDate, DateSource)> {
    if let Some(date) = doc
        .extraction
        .payload
        .structured_dates()
        .into_iter()
        .find_map(parse_date)
    {
        return Some((date, DateSource::Structured));
    }
    if let Some(date) = raw_texts(&doc.extraction).find_map(find_date_in_text) {
        return Some((date, DateSource::RawText));
    }
    doc.ingested_at
        .map(|at| (at.date_naive(), DateSource::Ingestion))
}

fn raw_texts(extraction: &ExtractionResult) -> impl Iterator<Item = &str> {
    [&extraction.raw_text, &extraction.raw_response]
        .into_iter()
        .filter_map(|t| t.as_deref())
}

fn build_series(
    test_name: String,
    mut contributions: Vec<Contribution>,
    documents: &[PatientDocument],
) -> Option<TrendSeries> {
    let distinct: BTreeSet<NaiveDate> = contributions.iter().map(|c| c.point.date).collect();
    if distinct.len() < MIN_DISTINCT_DATES {
        return None;
    }

    // Stable: same-day points keep document order
    contributions.sort_by_key(|c| c.point.date);

    let unit = contributions.iter().rev().find_map(|c| c.unit.clone());
    let reference_range = contributions
        .iter()
        .rev()
        .find_map(|c| c.point.reference_range.clone());
    let clinical_meaning = contributions
        .iter()
        .rev()
        .find_map(|c| explained_meaning(&documents[c.document], &test_name))
        .unwrap_or_else(|| fallback_meaning(&test_name));

    Some(TrendSeries {
        test_name,
        unit,
        reference_range,
        points: contributions.into_iter().map(|c| c.point).collect(),
        clinical_meaning,
    })
}

fn explained_meaning(doc: &PatientDocument, canonical: &str) -> Option<String> {
    doc.explanation
        .as_ref()?
        .body
        .parameters()
        .iter()
        .find(|p| canonicalize(&p.test_name) == canonical)
        .map(|p| p.clinical_meaning.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn fallback_meaning(test_name: &str) -> String {
    format!("{test_name} results over time. Ask your doctor what this trend means for you.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClinicalExplanation, Confidence, ExplanationBody, ExplanationSource, ExtractionPayload,
        LabReportData, LabTestObservation, ParameterExplanation, RawValue, DEFAULT_DISCLAIMER,
    };
    use chrono::{TimeZone, Utc};

    fn lab_doc(id: &str, date: Option<&str>, tests: Vec<LabTestObservation>) -> PatientDocument {
        PatientDocument::new(
            id,
            ExtractionResult::new(
                ExtractionPayload::LabReport(LabReportData {
                    report_date: date.map(str::to_string),
                    lab_tests: tests,
                    ..Default::default()
                }),
                Confidence::High,
            ),
        )
    }

    fn explanation_for(test: &str, meaning: &str) -> ClinicalExplanation {
        ClinicalExplanation {
            overall_summary: String::new(),
            body: ExplanationBody::ParameterAnalysis {
                parameter_analysis: vec![ParameterExplanation {
                    test_name: test.into(),
                    clinical_meaning: meaning.into(),
                    ..Default::default()
                }],
            },
            risk_level: None,
            risk_explanation: None,
            recommendations: Vec::new(),
            follow_up: Vec::new(),
            disclaimer: DEFAULT_DISCLAIMER.into(),
            confidence: Confidence::Medium,
            parse_error: false,
            source: ExplanationSource::Primary,
            withheld_entries: 0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn hemoglobin_trend_across_aliases() {
        let docs = vec![
            lab_doc("b", Some("2025-02-01"), vec![LabTestObservation::new("Hemoglobin", 11.0)]),
            lab_doc("a", Some("2025-01-01"), vec![LabTestObservation::new("Hb", 9.0)]),
        ];
        let series = aggregate(&docs);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].test_name, "Hemoglobin");
        let values: Vec<f64> = series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![9.0, 11.0]);
        assert_eq!(series[0].points[0].source_document_id, "a");
        assert_eq!(series[0].change(), Some(2.0));
    }

    #[test]
    fn single_document_tests_are_dropped() {
        let docs = vec![
            lab_doc(
                "a",
                Some("01/01/2025"),
                vec![
                    LabTestObservation::new("Hb", 9.0),
                    LabTestObservation::new("TSH", 2.1),
                ],
            ),
            lab_doc("b", Some("01/02/2025"), vec![LabTestObservation::new("HGB", 10.0)]),
        ];
        let series = aggregate(&docs);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].test_name, "Hemoglobin");
        assert_eq!(series[0].points[1].date, date(2025, 2, 1));
    }

    #[test]
    fn same_day_points_do_not_make_a_trend() {
        let docs = vec![
            lab_doc("a", Some("15/01/2025"), vec![LabTestObservation::new("Hb", 9.0)]),
            lab_doc("b", Some("15-Jan-2025"), vec![LabTestObservation::new("Hb", 9.5)]),
        ];
        assert!(aggregate(&docs).is_empty());
    }

    #[test]
    fn qualitative_values_are_skipped_without_blocking_others() {
        let docs = vec![
            lab_doc(
                "a",
                Some("2025-01-01"),
                vec![
                    LabTestObservation::new("HIV", RawValue::from("Non-reactive")),
                    LabTestObservation::new("Glucose", RawValue::from("110 mg/dL")),
                ],
            ),
            lab_doc(
                "b",
                Some("2025-03-01"),
                vec![
                    LabTestObservation::new("HIV", RawValue::from("Non-reactive")),
                    LabTestObservation::new("Glucose", 98.0),
                ],
            ),
        ];
        let series = aggregate(&docs);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].points[0].value, 110.0);
    }

    #[test]
    fn date_resolution_order() {
        let ingested = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();

        let structured = lab_doc("s", Some("2025-01-10"), vec![LabTestObservation::new("Hb", 9.0)])
            .ingested_at(ingested);

        let mut from_text = lab_doc("t", Some("pending"), vec![LabTestObservation::new("Hb", 10.0)]);
        from_text.extraction.raw_text = Some("Sample collected 20/02/2025".into());

        let from_ingestion =
            lab_doc("i", None, vec![LabTestObservation::new("Hb", 11.0)]).ingested_at(ingested);

        let series = aggregate(&[from_ingestion, from_text, structured]);
        let points = &series[0].points;
        assert_eq!(
            points.iter().map(|p| p.date_source).collect::<Vec<_>>(),
            vec![DateSource::Structured, DateSource::RawText, DateSource::Ingestion]
        );
        assert_eq!(points[2].date, date(2025, 6, 1));
    }

    #[test]
    fn undated_documents_are_gaps() {
        let docs = vec![
            lab_doc("a", Some("2025-01-01"), vec![LabTestObservation::new("Hb", 9.0)]),
            lab_doc("b", Some("2025-02-01"), vec![LabTestObservation::new("Hb", 10.0)]),
            lab_doc("c", None, vec![LabTestObservation::new("Hb", 11.0)]),
        ];
        let report = aggregate_with_gaps(&docs);
        assert_eq!(report.series[0].points.len(), 2);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].document_id, "c");
    }

    #[test]
    fn meaning_from_latest_explanation_else_fallback() {
        let docs = vec![
            lab_doc("a", Some("2025-01-01"), vec![LabTestObservation::new("Hb", 9.0)])
                .with_explanation(explanation_for("Hb", "Older meaning.")),
            lab_doc("b", Some("2025-02-01"), vec![LabTestObservation::new("Hemoglobin", 10.0)])
                .with_explanation(explanation_for("Haemoglobin", "Carries oxygen.")),
            lab_doc("c", Some("2025-01-01"), vec![LabTestObservation::new("TSH", 2.0)]),
            lab_doc("d", Some("2025-02-01"), vec![LabTestObservation::new("TSH", 2.5)]),
        ];
        let series = aggregate(&docs);
        let names: Vec<&str> = series.iter().map(|s| s.test_name.as_str()).collect();
        assert_eq!(names[0], "Hemoglobin");
        assert_eq!(series[0].clinical_meaning, "Carries oxygen.");
        assert!(series[1].clinical_meaning.starts_with(&series[1].test_name));
    }

    #[test]
    fn unit_and_range_from_latest_point() {
        let docs = vec![
            lab_doc(
                "a",
                Some("2025-01-01"),
                vec![LabTestObservation::new("Hb", 9.0).with_unit("g/dl").with_range("11-15")],
            ),
            lab_doc(
                "b",
                Some("2025-02-01"),
                vec![LabTestObservation::new("Hb", 10.0).with_unit("g/dL").with_range("12-16")],
            ),
            lab_doc("c", Some("2025-03-01"), vec![LabTestObservation::new("Hb", 11.0)]),
        ];
        let series = aggregate(&docs);
        assert_eq!(series[0].unit.as_deref(), Some("g/dL"));
        assert_eq!(series[0].reference_range.as_deref(), Some("12-16"));
        assert_eq!(series[0].points[0].reference_range.as_deref(), Some("11-15"));
    }

    #[test]
    fn json_intake_rejects_non_array() {
        let err = documents_from_json(&Value::Null).unwrap_err();
        assert!(matches!(err, ValidationError::WrongShape { found, .. } if found == "null"));

        let docs = documents_from_json(&serde_json::json!([
            {"document_id": "a", "extraction": {"payload": {"kind": "lab_report"}, "confidence": "high"}},
            {"broken": true}
        ]))
        .unwrap();
        assert_eq!(docs.len(), 1);
    }
}
