//! Two-stage medical screening detectors on top of a generative text backend.
//!
//! Stage 1 asks the backend for a free-text expert analysis. Stage 2 asks it
//! to restate that analysis as a JSON classification, which is parsed through
//! a [`RecoveryChain`] and falls back to a deterministic [`FallbackRule`] when
//! nothing usable comes back.

pub mod error;
pub mod fallback;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod recovery;
pub mod schema;

pub use error::{BackendError, ExtractionError, PipelineError};
pub use fallback::FallbackRule;
pub use llm::{
    ChatCompletionsClient, CompletionBackend, CompletionRequest, GenerationParams, Stage,
    UserContent,
};
pub use pipeline::{Pipeline, PipelineConfig};
pub use prompt::{DetectorSpec, PATIENT_FIELDS};
pub use recovery::{RecoveryChain, RecoveryStrategy};
pub use schema::{
    AnalysisRequest, ClassificationResult, DetectorKind, ExtractionQuality, InputModality,
    PipelineOutcome, UnknownDetector,
};
