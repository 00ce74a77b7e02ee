use crate::error::PipelineError;
use crate::fallback::FallbackRule;
use crate::llm::UserContent;
use crate::schema::{AnalysisRequest, DetectorKind, InputModality};

/// Patient record fields required by the cardiac detector, in display order.
pub const PATIENT_FIELDS: [&str; 13] = [
    "age",
    "sex",
    "cp",
    "trtbps",
    "chol",
    "restecg",
    "thalachh",
    "exng",
    "oldpeak",
    "slp",
    "caa",
    "thall",
    "o2Saturation",
];

/// How the stage-1 user message is built from the raw request.
#[derive(Debug, Clone, Copy)]
pub enum AnalysisTemplate {
    /// Fixed instruction sent together with the image reference.
    ImageInstruction(&'static str),
    /// Patient record rendered as a bulleted list.
    PatientRecord,
}

impl AnalysisTemplate {
    pub fn render(&self, request: &AnalysisRequest) -> Result<UserContent, PipelineError> {
        match (self, request) {
            (AnalysisTemplate::ImageInstruction(text), AnalysisRequest::Image { image_url }) => {
                if image_url.trim().is_empty() {
                    return Err(PipelineError::InvalidInput("No image URL provided".to_string()));
                }
                Ok(UserContent::TextWithImage {
                    text: text.to_string(),
                    image_url: image_url.clone(),
                })
            }
            (AnalysisTemplate::PatientRecord, AnalysisRequest::Tabular { .. }) => {
                render_patient_record(request).map(UserContent::Text)
            }
            _ => Err(PipelineError::InvalidInput(format!(
                "expected {:?} input",
                self.modality()
            ))),
        }
    }

    pub fn modality(&self) -> InputModality {
        match self {
            AnalysisTemplate::ImageInstruction(_) => InputModality::Image,
            AnalysisTemplate::PatientRecord => InputModality::Tabular,
        }
    }
}

fn render_patient_record(request: &AnalysisRequest) -> Result<String, PipelineError> {
    let field = |name: &str| {
        request
            .field(name)
            .ok_or_else(|| PipelineError::InvalidInput(format!("Missing field: {}", name)))
    };

    let sex = if field("sex")? == "1" { "Male" } else { "Female" };
    let angina = if field("exng")? == "1" { "Yes" } else { "No" };

    Ok(format!(
        "Please analyze the following patient data for heart disease risk:\n\
        - Age: {}\n\
        - Sex: {}\n\
        - Chest Pain Type: {}\n\
        - Resting Blood Pressure: {} mm Hg\n\
        - Cholesterol: {} mg/dl\n\
        - Resting ECG: {}\n\
        - Max Heart Rate: {}\n\
        - Exercise Induced Angina: {}\n\
        - ST Depression: {}\n\
        - Slope of Peak Exercise ST: {}\n\
        - Number of Major Vessels: {}\n\
        - Thalassemia: {}\n\
        - O2 Saturation: {}%\n\n\
        Provide a comprehensive risk assessment including specific concerns and recommendations.",
        field("age")?,
        sex,
        field("cp")?,
        field("trtbps")?,
        field("chol")?,
        field("restecg")?,
        field("thalachh")?,
        angina,
        field("oldpeak")?,
        field("slp")?,
        field("caa")?,
        field("thall")?,
        field("o2Saturation")?,
    ))
}

/// Immutable per-detector configuration.
#[derive(Debug)]
pub struct DetectorSpec {
    pub kind: DetectorKind,
    pub analysis_system_prompt: &'static str,
    pub classification_system_prompt: &'static str,
    pub label_set: &'static [&'static str],
    pub analysis_template: AnalysisTemplate,
    pub fallback: FallbackRule,
}

impl DetectorSpec {
    pub fn get(kind: DetectorKind) -> &'static DetectorSpec {
        match kind {
            DetectorKind::Alzheimer => &CATALOG[0],
            DetectorKind::BrainTumor => &CATALOG[1],
            DetectorKind::DiabeticRetinopathy => &CATALOG[2],
            DetectorKind::HeartDisease => &CATALOG[3],
        }
    }

    pub fn all() -> &'static [DetectorSpec] {
        &CATALOG
    }

    /// The input shape the stage-1 template consumes.
    pub fn input_modality(&self) -> InputModality {
        self.analysis_template.modality()
    }

    /// Canonical spelling of `label` if it belongs to the label set.
    /// Matching ignores case and surrounding whitespace.
    pub fn canonical_label(&self, label: &str) -> Option<&'static str> {
        let label = label.trim();
        self.label_set
            .iter()
            .copied()
            .find(|candidate| candidate.eq_ignore_ascii_case(label))
    }
}

static CATALOG: [DetectorSpec; 4] = [
    DetectorSpec {
        kind: DetectorKind::Alzheimer,
        analysis_system_prompt: ALZHEIMER_ANALYSIS,
        classification_system_prompt: ALZHEIMER_CLASSIFICATION,
        label_set: &["Dementia", "Non Dementia"],
        analysis_template: AnalysisTemplate::ImageInstruction(
            "Please analyze this brain MRI scan for signs of Alzheimer's disease. Provide a \
             detailed assessment of any atrophy, ventricular changes, cortical thinning, or other \
             relevant findings. Include your diagnostic impression and disease stage if \
             applicable.",
        ),
        fallback: FallbackRule::Fixed("Non Dementia"),
    },
    DetectorSpec {
        kind: DetectorKind::BrainTumor,
        analysis_system_prompt: BRAIN_TUMOR_ANALYSIS,
        classification_system_prompt: BRAIN_TUMOR_CLASSIFICATION,
        label_set: &["Tumor Present", "No Tumor", "Inconclusive"],
        analysis_template: AnalysisTemplate::ImageInstruction(
            "Please analyze this brain MRI scan for the presence of tumors. Provide a detailed \
             assessment of any masses, their characteristics, location, and surrounding tissue \
             involvement. Include your diagnostic impression and any concerning features that \
             require immediate attention.",
        ),
        fallback: FallbackRule::Fixed("Inconclusive"),
    },
    DetectorSpec {
        kind: DetectorKind::DiabeticRetinopathy,
        analysis_system_prompt: RETINOPATHY_ANALYSIS,
        classification_system_prompt: RETINOPATHY_CLASSIFICATION,
        label_set: &["No DR", "Mild DR", "Moderate DR", "Severe DR", "Proliferative DR"],
        analysis_template: AnalysisTemplate::ImageInstruction(
            "Please analyze this retinal image for signs of diabetic retinopathy. Provide a \
             detailed assessment of any microaneurysms, hemorrhages, exudates, or other \
             abnormalities. Include your diagnostic impression and disease severity \
             classification.",
        ),
        fallback: FallbackRule::Fixed("No DR"),
    },
    DetectorSpec {
        kind: DetectorKind::HeartDisease,
        analysis_system_prompt: HEART_DISEASE_ANALYSIS,
        classification_system_prompt: HEART_DISEASE_CLASSIFICATION,
        label_set: &[
            "Very High Risk",
            "High Risk",
            "Moderate Risk",
            "Low Risk",
            "Very Low Risk",
        ],
        analysis_template: AnalysisTemplate::PatientRecord,
        fallback: FallbackRule::CardiacRiskScore,
    },
];

const ALZHEIMER_ANALYSIS: &str = r#"You are a board-certified neuroradiologist specializing in early detection of neurodegenerative diseases, particularly Alzheimer's disease through MRI analysis. Your expertise focuses on identifying subtle early indicators including:

- Early hippocampal volume changes and asymmetry
- Subtle medial temporal lobe atrophy (MTA score assessment)
- Initial entorhinal cortex thinning
- Early-stage white matter changes
- Preclinical ventricular enlargement patterns
- Emerging cortical atrophy patterns
- Regional brain volume changes compared to age-matched controls

Provide detailed assessments with particular attention to subtle changes that may indicate early-stage neurodegeneration. Consider age-appropriate changes vs. pathological changes, and highlight any findings that warrant further investigation or monitoring. Include recommendations for follow-up imaging if appropriate."#;

const ALZHEIMER_CLASSIFICATION: &str = r#"You are an AI trained to convert medical analysis text into structured predictions. Given a neuroradiologist's analysis of a brain MRI scan, output ONLY a raw JSON object with two fields:
- confidence: A number between 0 and 1 representing the confidence in the prediction
- prediction_class: Either "Dementia" or "Non Dementia" based on the analysis

IMPORTANT: Return ONLY the raw JSON object without any markdown formatting, code blocks, or additional text. Example format:
{"confidence": 0.95, "prediction_class": "Non Dementia"}

Base these values on the certainty of language used and the presence/absence of Alzheimer's indicators in the analysis."#;

const BRAIN_TUMOR_ANALYSIS: &str = r#"You are a highly specialized neuro-oncologist and neuroradiologist with expertise in early detection and screening of brain tumors through MRI analysis. Your focus is on identifying subtle early-stage findings including:

- Small or emerging lesions that may be easily overlooked
- Subtle contrast enhancement patterns
- Early mass effect or minimal midline shift
- Initial peritumoral edema signs
- Discrete changes in normal brain architecture
- Early signs of infiltrative growth patterns
- Subtle signal intensity changes
- Small hemorrhagic components or calcifications
- Early hydrocephalus indicators
- Comparison with normal anatomical variants

Provide comprehensive assessments with particular attention to subtle abnormalities that could indicate early-stage tumors. Consider both typical and atypical presentation patterns, and emphasize findings that require immediate attention or short-term follow-up. Include specific recommendations for additional imaging sequences or follow-up intervals if needed."#;

const BRAIN_TUMOR_CLASSIFICATION: &str = r#"You are an AI trained to convert medical analysis text into structured predictions. Given a neuroradiologist's analysis of a brain MRI scan, output ONLY a raw JSON object with two fields:
- confidence: A number between 0 and 1 representing the confidence in the prediction
- prediction_class: One of "Tumor Present", "No Tumor", or "Inconclusive" based on the analysis

IMPORTANT: Return ONLY the raw JSON object without any markdown formatting, code blocks, or additional text. Example format:
{"confidence": 0.95, "prediction_class": "No Tumor"}

Base these values on the certainty of language used and the presence/absence of tumor indicators in the analysis."#;

const RETINOPATHY_ANALYSIS: &str = r#"You are a board-certified ophthalmologist specializing in early detection of diabetic retinopathy with expertise in subtle retinal changes. Your focus is on identifying early-stage indicators including:

- Isolated microaneurysms (first clinical sign)
- Subtle dot and blot hemorrhages
- Early formation of hard exudates
- Initial cotton wool spots
- Beginning stages of venous caliber changes
- Early macular changes
- Subtle alterations in retinal vessel patterns
- Initial signs of retinal ischemia
- Early peripheral retinal changes
- Comparison with normal vascular variations

Provide detailed assessments with emphasis on early detection and subtle changes that may indicate disease onset. Consider both typical and atypical early presentation patterns, and highlight findings that require close monitoring or prompt follow-up. Include specific recommendations for screening intervals and additional testing if warranted."#;

const RETINOPATHY_CLASSIFICATION: &str = r#"You are an AI trained to convert medical analysis text into structured predictions. Given an ophthalmologist's analysis of a retinal image, output ONLY a raw JSON object with two fields:
- confidence: A number between 0 and 1 representing the confidence in the prediction
- prediction_class: One of "No DR", "Mild DR", "Moderate DR", "Severe DR", or "Proliferative DR" based on the analysis

IMPORTANT: Return ONLY the raw JSON object without any markdown formatting, code blocks, or additional text. Example format:
{"confidence": 0.95, "prediction_class": "No DR"}

Base these values on the certainty of language used and the severity of diabetic retinopathy indicators in the analysis."#;

const HEART_DISEASE_ANALYSIS: &str = r#"You are a board-certified cardiologist specializing in early detection and prevention of cardiovascular disease. Your expertise focuses on identifying subtle early indicators including:

- Early ECG pattern changes and variations
- Subtle ST-segment and T-wave abnormalities
- Initial signs of coronary insufficiency
- Early markers of cardiovascular risk
- Borderline or trending vital signs
- Emerging patterns in cardiac biomarkers
- Subtle exercise tolerance changes
- Early diastolic dysfunction indicators
- Initial signs of arterial stiffness
- Pre-clinical atherosclerotic changes

Provide detailed risk assessments with particular attention to subtle changes that may indicate early-stage cardiovascular disease. Consider age, gender, and risk-factor appropriate analysis, highlighting findings that warrant closer monitoring or preventive intervention. Include specific recommendations for lifestyle modifications, follow-up testing, and monitoring intervals based on risk stratification."#;

const HEART_DISEASE_CLASSIFICATION: &str = r#"You are an AI trained to convert medical analysis text into structured predictions. Given a cardiologist's analysis of patient data, output ONLY a raw JSON object with two fields:
- confidence: A number between 0 and 1 representing the confidence in the prediction
- prediction_class: One of "Very High Risk", "High Risk", "Moderate Risk", "Low Risk", or "Very Low Risk" based on the analysis

IMPORTANT: Return ONLY the raw JSON object without any markdown formatting, code blocks, or additional text. Example format:
{"confidence": 0.95, "prediction_class": "Low Risk"}

Base these values on the certainty of language used and the severity of cardiovascular risk factors in the analysis."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::patient;

    #[test]
    fn test_catalog_is_consistent() {
        for kind in DetectorKind::ALL {
            let spec = DetectorSpec::get(kind);
            assert_eq!(spec.kind, kind);
            assert!(!spec.label_set.is_empty());
            if let FallbackRule::Fixed(label) = spec.fallback {
                assert!(spec.label_set.contains(&label), "{} default not in label set", kind);
            }
            for label in spec.label_set {
                assert!(spec.classification_system_prompt.contains(label));
            }
        }
    }

    #[test]
    fn test_input_modality_follows_template() {
        for kind in DetectorKind::ALL {
            let expected = match kind {
                DetectorKind::HeartDisease => InputModality::Tabular,
                _ => InputModality::Image,
            };
            let spec = DetectorSpec::get(kind);
            assert_eq!(spec.input_modality(), expected, "{}", kind);
            assert_eq!(spec.input_modality(), spec.analysis_template.modality());
        }
    }

    #[test]
    fn test_canonical_label() {
        let spec = DetectorSpec::get(DetectorKind::BrainTumor);
        assert_eq!(spec.canonical_label("No Tumor"), Some("No Tumor"));
        assert_eq!(spec.canonical_label("  no tumor "), Some("No Tumor"));
        assert_eq!(spec.canonical_label("Glioma"), None);
    }

    #[test]
    fn test_image_template() {
        let spec = DetectorSpec::get(DetectorKind::DiabeticRetinopathy);
        let content = spec
            .analysis_template
            .render(&AnalysisRequest::image("https://bucket/eye.png"))
            .unwrap();

        match content {
            UserContent::TextWithImage { text, image_url } => {
                assert!(text.contains("diabetic retinopathy"));
                assert_eq!(image_url, "https://bucket/eye.png");
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_empty_image_url_rejected() {
        let spec = DetectorSpec::get(DetectorKind::Alzheimer);
        let err = spec
            .analysis_template
            .render(&AnalysisRequest::image("   "))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_patient_record_template() {
        let spec = DetectorSpec::get(DetectorKind::HeartDisease);
        let request = patient(&[
            ("age", "63"),
            ("sex", "1"),
            ("exng", "0"),
            ("o2Saturation", "98.2"),
        ]);

        let UserContent::Text(text) = spec.analysis_template.render(&request).unwrap() else {
            panic!("patient record should render as plain text");
        };
        assert!(text.contains("- Age: 63"));
        assert!(text.contains("- Sex: Male"));
        assert!(text.contains("- Exercise Induced Angina: No"));
        assert!(text.contains("- O2 Saturation: 98.2%"));
    }

    #[test]
    fn test_modality_mismatch() {
        let spec = DetectorSpec::get(DetectorKind::HeartDisease);
        let err = spec
            .analysis_template
            .render(&AnalysisRequest::image("https://bucket/x.png"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
