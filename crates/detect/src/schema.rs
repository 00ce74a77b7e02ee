use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The four screening domains served by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    /// Cognitive decline screening from brain MRI.
    Alzheimer,
    /// Mass lesion screening from brain MRI.
    BrainTumor,
    /// Retinal severity grading from fundus images.
    DiabeticRetinopathy,
    /// Cardiac risk screening from tabular patient data.
    HeartDisease,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::Alzheimer,
        DetectorKind::BrainTumor,
        DetectorKind::DiabeticRetinopathy,
        DetectorKind::HeartDisease,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            DetectorKind::Alzheimer => "alzheimer",
            DetectorKind::BrainTumor => "brain-tumor",
            DetectorKind::DiabeticRetinopathy => "diabetic-retinopathy",
            DetectorKind::HeartDisease => "heart-disease",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown detector: {0}")]
pub struct UnknownDetector(pub String);

impl FromStr for DetectorKind {
    type Err = UnknownDetector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectorKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| UnknownDetector(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Image,
    Tabular,
}

/// Raw input for one detector run. Exactly one variant, matching the
/// detector's modality.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    Image { image_url: String },
    Tabular { fields: BTreeMap<String, String> },
}

impl AnalysisRequest {
    pub fn image(url: impl Into<String>) -> Self {
        AnalysisRequest::Image {
            image_url: url.into(),
        }
    }

    pub fn modality(&self) -> InputModality {
        match self {
            AnalysisRequest::Image { .. } => InputModality::Image,
            AnalysisRequest::Tabular { .. } => InputModality::Tabular,
        }
    }

    /// Look up a tabular field. Image requests have no fields.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            AnalysisRequest::Tabular { fields } => fields.get(name).map(String::as_str),
            AnalysisRequest::Image { .. } => None,
        }
    }
}

/// A label plus a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub confidence: f64,
    pub prediction_class: String,
}

/// Which path produced the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionQuality {
    Extracted,
    Fallback,
}

/// Final result handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub analysis: String,
    pub confidence: f64,
    pub prediction_class: String,
    #[serde(skip)]
    pub quality: ExtractionQuality,
}

impl PipelineOutcome {
    pub fn new(analysis: String, result: ClassificationResult, quality: ExtractionQuality) -> Self {
        Self {
            analysis,
            confidence: result.confidence,
            prediction_class: result.prediction_class,
            quality,
        }
    }
}
