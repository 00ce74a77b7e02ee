use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::error::ExtractionError;
use crate::prompt::DetectorSpec;
use crate::schema::ClassificationResult;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").unwrap());
static CLOSING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").unwrap());

/// The classification object as the backend emitted it, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "PredictionFields")]
pub struct RawPrediction {
    pub confidence: f64,
    pub prediction_class: String,
}

/// Wire shape: either label key may appear, or both.
#[derive(Deserialize)]
struct PredictionFields {
    confidence: f64,
    prediction_class: Option<String>,
    label: Option<String>,
}

impl TryFrom<PredictionFields> for RawPrediction {
    type Error = &'static str;

    fn try_from(fields: PredictionFields) -> Result<Self, Self::Error> {
        let prediction_class = fields
            .prediction_class
            .or(fields.label)
            .ok_or("missing field `prediction_class`")?;

        Ok(RawPrediction {
            confidence: fields.confidence,
            prediction_class,
        })
    }
}

impl RawPrediction {
    /// Clamp the confidence and resolve the label against the detector's set.
    pub fn validate(self, spec: &DetectorSpec) -> Result<ClassificationResult, ExtractionError> {
        let label = spec
            .canonical_label(&self.prediction_class)
            .ok_or(ExtractionError::LabelOutOfSet(self.prediction_class))?;

        Ok(ClassificationResult {
            confidence: self.confidence.clamp(0.0, 1.0),
            prediction_class: label.to_string(),
        })
    }
}

/// One way of turning raw backend text into a prediction.
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, raw: &str) -> Option<RawPrediction>;
}

/// The text is the JSON object and nothing else.
pub struct DirectJson;

impl RecoveryStrategy for DirectJson {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn attempt(&self, raw: &str) -> Option<RawPrediction> {
        serde_json::from_str(raw).ok()
    }
}

/// The object is wrapped in a markdown code fence, with or without a
/// language tag.
pub struct FenceStripped;

impl RecoveryStrategy for FenceStripped {
    fn name(&self) -> &'static str {
        "fence-stripped"
    }

    fn attempt(&self, raw: &str) -> Option<RawPrediction> {
        serde_json::from_str(&strip_code_fence(raw)).ok()
    }
}

pub fn strip_code_fence(raw: &str) -> String {
    let without_open = OPENING_FENCE.replace(raw, "");
    CLOSING_FENCE.replace(&without_open, "").trim().to_string()
}

/// Ordered list of strategies; the first one that parses wins.
pub struct RecoveryChain {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl Default for RecoveryChain {
    fn default() -> Self {
        Self::new(vec![Box::new(DirectJson), Box::new(FenceStripped)])
    }
}

impl RecoveryChain {
    pub fn new(strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Returns the parsed prediction and the name of the strategy that produced it.
    pub fn parse(&self, raw: &str) -> Result<(RawPrediction, &'static str), ExtractionError> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.attempt(raw).map(|p| (p, strategy.name())))
            .ok_or(ExtractionError::Unparseable)
    }

    /// Parse then validate against `spec`.
    pub fn extract(
        &self,
        raw: &str,
        spec: &DetectorSpec,
    ) -> Result<ClassificationResult, ExtractionError> {
        let (prediction, strategy) = self.parse(raw)?;
        tracing::debug!(strategy, "classification output parsed");
        prediction.validate(spec)
    }
}
