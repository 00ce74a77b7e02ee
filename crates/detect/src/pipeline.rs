use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{BackendError, ExtractionError, PipelineError};
use crate::llm::{CompletionBackend, CompletionRequest, GenerationParams, Stage, UserContent};
use crate::prompt::DetectorSpec;
use crate::recovery::RecoveryChain;
use crate::schema::{
    AnalysisRequest, ClassificationResult, DetectorKind, ExtractionQuality, PipelineOutcome,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Budget for both backend calls of one run combined.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Two-stage detector engine: free-text analysis, then structured
/// classification with fallback. Holds no per-request state.
pub struct Pipeline {
    backend: Arc<dyn CompletionBackend>,
    recovery: RecoveryChain,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: PipelineConfig) -> Self {
        Self {
            backend,
            recovery: RecoveryChain::default(),
            config,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryChain) -> Self {
        self.recovery = recovery;
        self
    }

    pub async fn run(
        &self,
        kind: DetectorKind,
        request: &AnalysisRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let spec = DetectorSpec::get(kind);
        self.run_spec(spec, request)
            .instrument(info_span!("detector", detector = %kind))
            .await
    }

    async fn run_spec(
        &self,
        spec: &DetectorSpec,
        request: &AnalysisRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        if request.modality() != spec.input_modality() {
            return Err(PipelineError::InvalidInput(format!(
                "{} expects {:?} input",
                spec.kind, spec.input_modality()
            )));
        }
        let user = spec.analysis_template.render(request)?;
        let deadline = Instant::now() + self.config.request_timeout;

        // Stage 1: any failure here ends the request.
        let started = Instant::now();
        let analysis = self
            .call(
                Stage::Analysis,
                spec.analysis_system_prompt,
                &user,
                GenerationParams::analysis(),
                deadline,
            )
            .await
            .map_err(|e| {
                error!(error = %e, "analysis call failed");
                PipelineError::Analysis(e)
            })?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "analysis complete");

        // Stage 2: failures are absorbed by the fallback classifier.
        let started = Instant::now();
        let (result, quality) = match self.classify(spec, &analysis, deadline).await {
            Ok(result) => (result, ExtractionQuality::Extracted),
            Err(e) => {
                warn!(error = %e, "structured extraction failed, using fallback classifier");
                (spec.fallback.classify(request), ExtractionQuality::Fallback)
            }
        };
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "classification complete");

        info!(
            prediction_class = %result.prediction_class,
            confidence = result.confidence,
            quality = ?quality,
            "detector run finished"
        );
        Ok(PipelineOutcome::new(analysis, result, quality))
    }

    async fn classify(
        &self,
        spec: &DetectorSpec,
        analysis: &str,
        deadline: Instant,
    ) -> Result<ClassificationResult, ExtractionError> {
        let user = UserContent::Text(analysis.to_string());
        let raw = self
            .call(
                Stage::Classification,
                spec.classification_system_prompt,
                &user,
                GenerationParams::classification(),
                deadline,
            )
            .await
            .map_err(ExtractionError::Backend)?;

        self.recovery.extract(&raw, spec).inspect_err(|_| {
            debug!(raw = %raw, "unusable classification output");
        })
    }

    async fn call(
        &self,
        stage: Stage,
        system_prompt: &str,
        user: &UserContent,
        params: GenerationParams,
        deadline: Instant,
    ) -> Result<String, BackendError> {
        let request = CompletionRequest {
            stage,
            system_prompt,
            user,
            params,
        };
        timeout_at(deadline, self.backend.complete(request))
            .await
            .unwrap_or(Err(BackendError::TimedOut(self.config.request_timeout)))
    }
}
