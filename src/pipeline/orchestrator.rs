//! Document analysis: normalize → classify → extract → explain → translate.
//!
//! Stages run strictly in order inside one call. The pipeline holds no
//! mutable state, so one `AnalysisPipeline` can serve concurrent calls.

use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::classify::try_parse_type_decision;
use super::diagnostic::DumpDir;
use super::explain::{deterministic_explanation, parse_explanation};
use super::grounding::ground_explanation;
use super::media::{normalize, MediaType};
use super::parser::parse_extraction;
use super::pdfium::PdfiumRenderer;
use super::prompt::{
    explanation_facts, explanation_prompt, extraction_prompt, CLASSIFY_PROMPT,
    CLASSIFY_SYSTEM_PROMPT, EXPLANATION_SYSTEM_PROMPT, EXTRACTION_SYSTEM_PROMPT,
};
use super::provider::{build_provider, ImageAttachment, ModelProvider, ModelRequest};
use super::render::PageRenderer;
use super::resilience::{
    call_with_resilience, ProviderTier, Resolved, ResilienceError, RetryPolicy,
};
use super::types::{AnalysisOutcome, Stage, StageReport, StageStatus};
use super::PipelineError;
use crate::intelligence::{RiskEngine, RiskReport};
use crate::models::{
    ClinicalExplanation, Demographics, DocumentType, DocumentTypeDecision, ExplanationSource,
    ExtractionPayload, ExtractionResult, Sex,
};
use crate::pipeline_config::PipelineConfig;
use crate::translation::{is_identity_language, translate, ModelTranslator, TextTranslator};

pub struct AnalysisPipeline {
    config: PipelineConfig,
    engine: RiskEngine,
    primary: Arc<dyn ModelProvider>,
    /// Carries the fallback chain. Stages 2 and 3 use it without fallbacks.
    policy: RetryPolicy,
    renderer: Option<Arc<dyn PageRenderer>>,
    translator: Option<Arc<dyn TextTranslator>>,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig, primary: Arc<dyn ModelProvider>) -> Self {
        Self {
            engine: RiskEngine::new(config.risk.clone()),
            policy: config.resilience.retry_policy(),
            config,
            primary,
            renderer: None,
            translator: None,
        }
    }

    /// Add a stage-4 fallback provider. Order of calls is order of fallback.
    pub fn with_fallback(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.policy = self.policy.with_fallback(provider);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn TextTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Build every collaborator from configuration.
    ///
    /// Only the primary provider is required. A fallback, renderer or
    /// translator that cannot be set up is logged and left out.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let primary = build_provider(&config.providers.primary)?;
        let mut pipeline = Self::new(config.clone(), primary);

        if let Some(fallback) = &config.providers.fallback {
            match build_provider(fallback) {
                Ok(provider) => pipeline = pipeline.with_fallback(provider),
                Err(e) => warn!(error = %e, "Fallback provider unavailable, continuing without it"),
            }
        }

        match PdfiumRenderer::new(config.render.max_dimension_px) {
            Ok(renderer) => pipeline = pipeline.with_renderer(Arc::new(renderer)),
            Err(e) => warn!(error = %e, "PDF rendering unavailable, PDFs will be rejected"),
        }

        if let Some(translation) = &config.providers.translation {
            match build_provider(translation) {
                Ok(provider) => {
                    let translator =
                        ModelTranslator::new(provider, config.resilience.retry_policy())
                            .with_max_concurrent_fields(config.translation_concurrency);
                    pipeline = pipeline.with_translator(Arc::new(translator));
                }
                Err(e) => warn!(error = %e, "Translation provider unavailable"),
            }
        }

        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    /// Analyze one document end to end.
    ///
    /// Parse failures and unreadable replies degrade the result instead of
    /// failing the call. Only
    /// invalid input, rendering failures, rejected model calls and exhausted
    /// budgets in stages 2 and 3 return an error.
    pub async fn analyze(
        &self,
        bytes: &[u8],
        media_type: MediaType,
        language: &str,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let document_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "analyze",
            %document_id,
            %media_type,
            size = bytes.len(),
            language
        );
        self.run(document_id, bytes, media_type, language)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        document_id: Uuid,
        bytes: &[u8],
        media_type: MediaType,
        language: &str,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let content_hash = content_hash(bytes);
        let dump = DumpDir::for_run(&document_id);
        dump.json(
            "00-source-info.json",
            &json!({
                "document_id": document_id,
                "media_type": media_type,
                "size": bytes.len(),
                "content_hash": content_hash,
                "language": language,
            }),
        );

        let mut stages = Vec::with_capacity(5);

        // ── Stage 1: normalize ──────────────────────────────
        let image = normalize(bytes, media_type, self.renderer.clone(), &self.config.render)
            .instrument(stage_span(Stage::Normalize))
            .await?;
        dump.binary(&format!("01-normalized.{}", extension(image.media_type)), &image.bytes);
        stages.push(StageReport::local(Stage::Normalize, StageStatus::Succeeded));

        // ── Stage 2: classify ───────────────────────────────
        let (type_decision, report) = self
            .classify(&image, &dump)
            .instrument(stage_span(Stage::Classify))
            .await?;
        stages.push(report);
        let document_type = type_decision.document_type;

        // ── Stage 3: extract ────────────────────────────────
        let (extraction, report) = self
            .extract(&image, document_type, &dump)
            .instrument(stage_span(Stage::Extract))
            .await?;
        stages.push(report);

        // ── Stage 4: risk + explain ─────────────────────────
        let risk = match &extraction.payload {
            ExtractionPayload::LabReport(data) => {
                let report = self
                    .engine
                    .classify(&data.lab_tests, &demographics_of(&extraction));
                info!(
                    risk_level = %report.risk_level,
                    risk_score = report.risk_score,
                    critical = report.critical_count,
                    abnormal = report.abnormal_count,
                    "Lab values classified"
                );
                Some(report)
            }
            _ => None,
        };
        let (explanation, report) = self
            .explain(&image, &extraction, risk.as_ref(), &dump)
            .instrument(stage_span(Stage::Explain))
            .await?;
        stages.push(report);

        let mut outcome = AnalysisOutcome {
            document_id,
            content_hash,
            type_decision,
            extraction,
            risk,
            explanation,
            language: self.config.default_language.clone(),
            stages,
        };

        // ── Stage 5: translate ──────────────────────────────
        if !is_identity_language(language) {
            outcome = self
                .translate_outcome(outcome, language)
                .instrument(stage_span(Stage::Translate))
                .await;
        }

        dump.json("05-outcome.json", &outcome);
        info!(
            document_type = %outcome.type_decision.document_type,
            explanation_source = %outcome.explanation.source,
            "Document analysis complete"
        );
        Ok(outcome)
    }

    async fn classify(
        &self,
        image: &ImageAttachment,
        dump: &DumpDir,
    ) -> Result<(DocumentTypeDecision, StageReport), PipelineError> {
        let request = ModelRequest::new(CLASSIFY_SYSTEM_PROMPT, CLASSIFY_PROMPT)
            .with_image(image.clone())
            .json();
        let policy = self.policy.without_fallbacks();
        let result = call_with_resilience(Stage::Classify, &policy, &self.primary, |p, _| {
            let request = &request;
            async move { p.generate(request).await }
        })
        .await;
        let resolved = unreadable_as_empty(result, self.primary.as_ref())
            .map_err(|e| stage_error(Stage::Classify, e))?;
        dump.text("02-classify-response.txt", &resolved.value);

        let (decision, status) = match try_parse_type_decision(&resolved.value) {
            Some(decision) => (decision, StageStatus::Succeeded),
            None => {
                warn!(
                    response_len = resolved.value.len(),
                    "Classification response unusable, treating document as Other"
                );
                (
                    DocumentTypeDecision::undetermined("Classification response could not be read"),
                    StageStatus::Degraded,
                )
            }
        };
        info!(
            document_type = %decision.document_type,
            confidence = %decision.confidence,
            "Document classified"
        );

        let report = StageReport {
            stage: Stage::Classify,
            status,
            provider: Some(resolved.provider),
            attempts: resolved.attempts,
        };
        Ok((decision, report))
    }

    async fn extract(
        &self,
        image: &ImageAttachment,
        document_type: DocumentType,
        dump: &DumpDir,
    ) -> Result<(ExtractionResult, StageReport), PipelineError> {
        let prompt = extraction_prompt(document_type);
        dump.text("03-extract-prompt.txt", &prompt);
        let request = ModelRequest::new(EXTRACTION_SYSTEM_PROMPT, prompt)
            .with_image(image.clone())
            .json();
        let policy = self.policy.without_fallbacks();
        let result = call_with_resilience(Stage::Extract, &policy, &self.primary, |p, _| {
            let request = &request;
            async move { p.generate(request).await }
        })
        .await;
        let resolved = unreadable_as_empty(result, self.primary.as_ref())
            .map_err(|e| stage_error(Stage::Extract, e))?;
        dump.text("03-extract-response.txt", &resolved.value);

        let extraction = parse_extraction(document_type, &resolved.value);
        let status = if extraction.parse_error {
            StageStatus::Degraded
        } else {
            StageStatus::Succeeded
        };
        info!(
            parse_error = extraction.parse_error,
            confidence = %extraction.confidence,
            lab_tests = extraction.payload.lab_tests().len(),
            medications = extraction.payload.medications().len(),
            "Extraction parsed"
        );

        let report = StageReport {
            stage: Stage::Extract,
            status,
            provider: Some(resolved.provider),
            attempts: resolved.attempts,
        };
        Ok((extraction, report))
    }

    async fn explain(
        &self,
        image: &ImageAttachment,
        extraction: &ExtractionResult,
        risk: Option<&RiskReport>,
        dump: &DumpDir,
    ) -> Result<(ClinicalExplanation, StageReport), PipelineError> {
        let document_type = extraction.document_type();
        let facts = explanation_facts(extraction, risk);
        let with_image = explanation_prompt(&facts, document_type, true);
        let text_only = explanation_prompt(&facts, document_type, false);
        dump.text("04-explain-prompt.txt", &with_image);

        let image_request = ModelRequest::new(EXPLANATION_SYSTEM_PROMPT, with_image)
            .with_image(image.clone())
            .json();
        let text_request = ModelRequest::new(EXPLANATION_SYSTEM_PROMPT, text_only).json();

        let result = call_with_resilience(Stage::Explain, &self.policy, &self.primary, |p, tier| {
            let request = if tier == ProviderTier::Primary && p.supports_images() {
                &image_request
            } else {
                &text_request
            };
            async move { p.generate(request).await }
        })
        .await;

        match result {
            Ok(resolved) => {
                dump.text("04-explain-response.txt", &resolved.value);
                let (source, status) = match resolved.tier {
                    ProviderTier::Primary => (ExplanationSource::Primary, StageStatus::Succeeded),
                    ProviderTier::Fallback(_) => {
                        (ExplanationSource::Fallback, StageStatus::FellBack)
                    }
                };
                let report = |status: StageStatus| StageReport {
                    stage: Stage::Explain,
                    status,
                    provider: Some(resolved.provider.clone()),
                    attempts: resolved.attempts,
                };

                match parse_explanation(&resolved.value, document_type, risk, source) {
                    Ok(mut explanation) => {
                        let withheld = ground_explanation(&mut explanation, extraction, risk);
                        if withheld > 0 {
                            warn!(withheld, "Ungrounded explanation entries withheld");
                        }
                        Ok((explanation, report(status)))
                    }
                    Err(e) => {
                        warn!(error = %e, "Explanation unparseable, using deterministic explanation");
                        Ok((
                            deterministic_explanation(extraction, risk, true),
                            report(StageStatus::Degraded),
                        ))
                    }
                }
            }
            Err(ResilienceError::Exhausted { attempts, last }) => {
                warn!(
                    attempts,
                    error = %last,
                    "Every explanation provider exhausted, using deterministic explanation"
                );
                Ok((
                    deterministic_explanation(extraction, risk, false),
                    StageReport {
                        stage: Stage::Explain,
                        status: StageStatus::Degraded,
                        provider: None,
                        attempts,
                    },
                ))
            }
            Err(e) => Err(stage_error(Stage::Explain, e)),
        }
    }

    async fn translate_outcome(&self, outcome: AnalysisOutcome, language: &str) -> AnalysisOutcome {
        let Some(translator) = &self.translator else {
            warn!(
                requested = language,
                delivered = %outcome.language,
                "No translator configured, returning untranslated result"
            );
            return outcome;
        };

        match translate(&outcome, language, translator.as_ref()).await {
            Ok(translated) => {
                let mut outcome = translated.value;
                let status = if translated.report.is_complete() {
                    StageStatus::Succeeded
                } else {
                    StageStatus::Degraded
                };
                outcome.language = language.to_string();
                outcome.stages.push(StageReport::local(Stage::Translate, status));
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Translation failed, returning untranslated result");
                outcome
            }
        }
    }
}

fn stage_span(stage: Stage) -> tracing::Span {
    tracing::info_span!("stage", %stage)
}

/// A reply nobody could read is parsed as an empty one, so the stage
/// degrades instead of failing the run.
fn unreadable_as_empty(
    result: Result<Resolved<String>, ResilienceError>,
    provider: &dyn ModelProvider,
) -> Result<Resolved<String>, ResilienceError> {
    match result {
        Err(ResilienceError::Exhausted { attempts, last }) if last.is_unreadable() => {
            warn!(
                attempts,
                error = %last,
                "Model response unreadable, continuing with an empty response"
            );
            Ok(Resolved {
                value: String::new(),
                provider: provider.name().to_string(),
                tier: ProviderTier::Primary,
                attempts,
            })
        }
        other => other,
    }
}

fn stage_error(stage: Stage, error: ResilienceError) -> PipelineError {
    PipelineError::Stage {
        stage,
        attempts: error.attempts(),
        fatal: true,
        source: error.into_source(),
    }
}

fn content_hash(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

fn extension(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Pdf => "pdf",
        MediaType::Png => "png",
        MediaType::Jpeg => "jpg",
        MediaType::Webp => "webp",
        MediaType::Tiff => "tiff",
        MediaType::Bmp => "bmp",
    }
}

/// Age and sex as printed on a lab report ("45 Y", "F").
fn demographics_of(extraction: &ExtractionResult) -> Demographics {
    let ExtractionPayload::LabReport(data) = &extraction.payload else {
        return Demographics::default();
    };
    let age = data.patient_info.age.as_deref().and_then(|raw| {
        let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    });
    let sex = data.patient_info.sex.as_deref().and_then(Sex::parse_lenient);
    Demographics::new(age, sex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, RiskLevel};
    use crate::pipeline::provider::{ProviderError, Scripted, ScriptedProvider};
    use crate::pipeline::render::minimal_png;
    use crate::translation::MockTranslator;
    use std::time::Duration;

    const CLASSIFY_LAB: &str =
        r#"{"type": "lab_report", "confidence": "high", "reasoning": "Table of blood values"}"#;

    const EXTRACT_LAB: &str = r#"```json
{
  "patient_info": {"name": "A. Patient", "age": "45 Y", "sex": "F"},
  "report_date": "12/03/2024",
  "lab_tests": [
    {"test_name": "Hb", "value": "10.5", "unit": "g/dL", "reference_range": "12-16"},
    {"test_name": "Glucose", "value": 92, "unit": "mg/dL", "reference_range": "70-100"}
  ],
  "extraction_confidence": "high"
}
```"#;

    const EXPLAIN_LAB: &str = r#"{
  "overall_summary": "Your hemoglobin is below the usual range.",
  "parameter_analysis": [
    {"test_name": "Hemoglobin", "status": "low", "clinical_meaning": "Hemoglobin carries oxygen."},
    {"test_name": "Vitamin D", "status": "low", "clinical_meaning": "Not on this report."}
  ],
  "risk_level": "critical",
  "recommendations": ["Discuss the result with your doctor"]
}"#;

    const CLASSIFY_RX: &str = r#"{"type": "prescription", "confidence": "high"}"#;
    const EXTRACT_RX: &str = r#"{"medications": [{"medicine_name": "Amoxicillin", "dosage": "500 mg", "frequency": "TDS"}], "extraction_confidence": "medium"}"#;
    const EXPLAIN_RX: &str = r#"{"overall_summary": "One antibiotic.", "medication_analysis": [{"medicine_name": "Amoxicillin", "purpose": "Treats infection"}]}"#;

    fn timeout() -> ProviderError {
        ProviderError::Timeout(Duration::from_secs(1))
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.resilience.backoff_unit_ms = 1;
        config.resilience.attempt_timeout_secs = 5;
        config
    }

    /// Replies to classify, extract and explain in order, then refuses.
    fn lab_primary() -> Arc<ScriptedProvider> {
        Arc::new(
            ScriptedProvider::failing("primary", ProviderError::Unauthorized { status: 401 })
                .then(Scripted::Reply(CLASSIFY_LAB.into()))
                .then(Scripted::Reply(EXTRACT_LAB.into()))
                .then(Scripted::Reply(EXPLAIN_LAB.into())),
        )
    }

    #[tokio::test]
    async fn lab_report_end_to_end() {
        let primary = lab_primary();
        let pipeline = AnalysisPipeline::new(fast_config(), primary.clone());
        let png = minimal_png();

        let outcome = pipeline.analyze(&png, MediaType::Png, "en").await.unwrap();

        assert_eq!(outcome.type_decision.document_type, DocumentType::LabReport);
        assert_eq!(outcome.extraction.confidence, Confidence::High);
        assert!(!outcome.extraction.parse_error);
        assert_eq!(outcome.extraction.payload.lab_tests().len(), 2);

        let risk = outcome.risk.as_ref().unwrap();
        assert_eq!(risk.abnormal_count, 1);
        assert_eq!(risk.normal_count, 1);
        assert_eq!(outcome.explanation.risk_level, Some(risk.risk_level));
        assert_ne!(outcome.explanation.risk_level, Some(RiskLevel::Critical));

        assert_eq!(outcome.explanation.source, ExplanationSource::Primary);
        assert_eq!(outcome.explanation.body.parameters().len(), 1);
        assert_eq!(outcome.explanation.withheld_entries, 1);

        assert_eq!(outcome.language, "en");
        assert_eq!(outcome.content_hash, content_hash(&png));
        assert_eq!(outcome.document_id.get_version_num(), 4);
        assert_eq!(outcome.stages.len(), 4);
        let explain = outcome.stage(Stage::Explain).unwrap();
        assert_eq!(explain.status, StageStatus::Succeeded);
        assert_eq!(explain.provider.as_deref(), Some("primary"));
        assert_eq!(explain.attempts, 1);

        let requests = primary.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.image.is_some()));
        assert!(requests[2].prompt.contains("Hemoglobin"));
    }

    #[tokio::test]
    async fn explanation_falls_back_after_primary_exhausted() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", timeout())
                .then(Scripted::Reply(CLASSIFY_LAB.into()))
                .then(Scripted::Reply(EXTRACT_LAB.into())),
        );
        let secondary = Arc::new(ScriptedProvider::replying("secondary", EXPLAIN_LAB).text_only());
        let pipeline =
            AnalysisPipeline::new(fast_config(), primary.clone()).with_fallback(secondary.clone());

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert_eq!(primary.calls(), 2 + 3);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(outcome.explanation.source, ExplanationSource::Fallback);
        assert_eq!(
            outcome.explanation.overall_summary,
            "Your hemoglobin is below the usual range."
        );

        let explain = outcome.stage(Stage::Explain).unwrap();
        assert_eq!(explain.status, StageStatus::FellBack);
        assert_eq!(explain.provider.as_deref(), Some("secondary"));
        assert_eq!(explain.attempts, 4);

        let requests = secondary.requests();
        let fallback_request = &requests[0];
        assert!(fallback_request.image.is_none());
        assert!(!fallback_request.prompt.contains("image is attached"));
        assert!(fallback_request.prompt.contains("Hemoglobin"));
    }

    #[tokio::test]
    async fn every_provider_exhausted_degrades_explanation() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", timeout())
                .then(Scripted::Reply(CLASSIFY_LAB.into()))
                .then(Scripted::Reply(EXTRACT_LAB.into())),
        );
        let secondary = Arc::new(ScriptedProvider::failing("secondary", timeout()));
        let pipeline = AnalysisPipeline::new(fast_config(), primary).with_fallback(secondary);

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        let risk = outcome.risk.as_ref().unwrap();
        assert_eq!(outcome.explanation.source, ExplanationSource::Deterministic);
        assert!(!outcome.explanation.parse_error);
        assert_eq!(outcome.explanation.overall_summary, risk.summary);
        let explain = outcome.stage(Stage::Explain).unwrap();
        assert_eq!(explain.status, StageStatus::Degraded);
        assert_eq!(explain.attempts, 6);
    }

    #[tokio::test]
    async fn unparseable_explanation_is_deterministic() {
        let primary = Arc::new(
            ScriptedProvider::replying("primary", "I'm sorry, I can't explain this.")
                .then(Scripted::Reply(CLASSIFY_LAB.into()))
                .then(Scripted::Reply(EXTRACT_LAB.into())),
        );
        let pipeline = AnalysisPipeline::new(fast_config(), primary);

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert!(outcome.explanation.parse_error);
        assert_eq!(outcome.explanation.source, ExplanationSource::Deterministic);
        assert_eq!(outcome.explanation.confidence, Confidence::Low);
        assert_eq!(
            outcome.stage(Stage::Explain).unwrap().status,
            StageStatus::Degraded
        );
    }

    #[tokio::test]
    async fn extraction_exhaustion_is_fatal_and_skips_fallback() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", timeout())
                .then(Scripted::Reply(CLASSIFY_LAB.into())),
        );
        let secondary = Arc::new(ScriptedProvider::replying("secondary", EXTRACT_LAB));
        let pipeline =
            AnalysisPipeline::new(fast_config(), primary.clone()).with_fallback(secondary.clone());

        let err = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap_err();

        match &err {
            PipelineError::Stage {
                stage,
                attempts,
                fatal,
                source,
            } => {
                assert_eq!(*stage, Stage::Extract);
                assert_eq!(*attempts, 3);
                assert!(*fatal);
                assert_eq!(*source, timeout());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.stage(), Some(Stage::Extract));
        assert_eq!(primary.calls(), 1 + 3);
        assert_eq!(secondary.calls(), 0);
    }

    fn unreadable() -> ProviderError {
        ProviderError::InvalidResponse("empty message content".into())
    }

    #[tokio::test]
    async fn unreadable_explanation_falls_back() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", unreadable())
                .then(Scripted::Reply(CLASSIFY_LAB.into()))
                .then(Scripted::Reply(EXTRACT_LAB.into())),
        );
        let secondary = Arc::new(ScriptedProvider::replying("secondary", EXPLAIN_LAB));
        let pipeline =
            AnalysisPipeline::new(fast_config(), primary.clone()).with_fallback(secondary.clone());

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(outcome.explanation.source, ExplanationSource::Fallback);
        let explain = outcome.stage(Stage::Explain).unwrap();
        assert_eq!(explain.status, StageStatus::FellBack);
        assert_eq!(explain.attempts, 2);
    }

    #[tokio::test]
    async fn unreadable_extraction_degrades() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", unreadable())
                .then(Scripted::Reply(CLASSIFY_LAB.into())),
        );
        let pipeline = AnalysisPipeline::new(fast_config(), primary.clone());

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert!(outcome.extraction.parse_error);
        assert_eq!(outcome.extraction.confidence, Confidence::Low);
        assert_eq!(
            outcome.stage(Stage::Extract).unwrap().status,
            StageStatus::Degraded
        );
        assert_eq!(outcome.explanation.source, ExplanationSource::Deterministic);
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test]
    async fn rejected_classification_is_not_retried() {
        let primary = Arc::new(ScriptedProvider::failing(
            "primary",
            ProviderError::QuotaExceeded,
        ));
        let pipeline = AnalysisPipeline::new(fast_config(), primary.clone());

        let err = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: Stage::Classify,
                attempts: 1,
                fatal: true,
                ..
            }
        ));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_classification_degrades_to_other() {
        let primary = Arc::new(
            ScriptedProvider::replying("primary", r#"{"title": "Letter", "summary": "A referral letter."}"#)
                .then(Scripted::Reply("no idea what this is, honestly".into())),
        );
        let pipeline = AnalysisPipeline::new(fast_config(), primary);

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert_eq!(outcome.type_decision.document_type, DocumentType::Other);
        assert_eq!(outcome.type_decision.confidence, Confidence::Low);
        assert_eq!(
            outcome.stage(Stage::Classify).unwrap().status,
            StageStatus::Degraded
        );
        assert!(outcome.risk.is_none());
    }

    #[tokio::test]
    async fn prescription_has_no_risk_report() {
        let primary = Arc::new(
            ScriptedProvider::failing("primary", ProviderError::QuotaExceeded)
                .then(Scripted::Reply(CLASSIFY_RX.into()))
                .then(Scripted::Reply(EXTRACT_RX.into()))
                .then(Scripted::Reply(EXPLAIN_RX.into())),
        );
        let pipeline = AnalysisPipeline::new(fast_config(), primary);

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "en")
            .await
            .unwrap();

        assert!(outcome.risk.is_none());
        assert!(outcome.explanation.risk_level.is_none());
        assert_eq!(outcome.extraction.payload.medications()[0].name, "Amoxicillin");
        assert_eq!(outcome.explanation.withheld_entries, 0);
    }

    #[tokio::test]
    async fn translates_when_language_requested() {
        let pipeline = AnalysisPipeline::new(fast_config(), lab_primary())
            .with_translator(Arc::new(MockTranslator::new()));

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "hi")
            .await
            .unwrap();

        assert_eq!(outcome.language, "hi");
        assert!(outcome.explanation.overall_summary.starts_with("[hi] "));
        assert_eq!(
            outcome.extraction.payload.lab_tests()[0].test_name,
            "Hb"
        );
        assert_eq!(
            outcome.stage(Stage::Translate).unwrap().status,
            StageStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn missing_translator_keeps_default_language() {
        let pipeline = AnalysisPipeline::new(fast_config(), lab_primary());

        let outcome = pipeline
            .analyze(&minimal_png(), MediaType::Png, "hi")
            .await
            .unwrap();

        assert_eq!(outcome.language, "en");
        assert!(outcome.stage(Stage::Translate).is_none());
    }

    #[tokio::test]
    async fn empty_document_fails_before_any_model_call() {
        let primary = lab_primary();
        let pipeline = AnalysisPipeline::new(fast_config(), primary.clone());

        let err = pipeline.analyze(&[], MediaType::Png, "en").await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(err.stage(), Some(Stage::Normalize));
        assert_eq!(primary.calls(), 0);
    }

    #[test]
    fn demographics_from_patient_info() {
        let extraction = parse_extraction(DocumentType::LabReport, EXTRACT_LAB);
        let d = demographics_of(&extraction);
        assert_eq!(d.age, Some(45));
        assert_eq!(d.sex, Some(Sex::Female));
    }
}
