use crate::schema::{AnalysisRequest, ClassificationResult};

/// Confidence reported when an image detector falls back to its default label.
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.5;

/// Risk tiers by descending severity, each with the score it must exceed.
const RISK_TIERS: [(f64, &str); 4] = [
    (0.7, "Very High Risk"),
    (0.5, "High Risk"),
    (0.3, "Moderate Risk"),
    (0.1, "Low Risk"),
];
const LOWEST_RISK_TIER: &str = "Very Low Risk";

/// Deterministic classification used when the classification stage yields
/// nothing usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackRule {
    /// Fixed "unable to determine" label at [`DEFAULT_FALLBACK_CONFIDENCE`].
    Fixed(&'static str),
    /// Mean of five binary risk indicators over the patient record.
    CardiacRiskScore,
}

impl FallbackRule {
    pub fn classify(&self, request: &AnalysisRequest) -> ClassificationResult {
        match self {
            FallbackRule::Fixed(label) => ClassificationResult {
                confidence: DEFAULT_FALLBACK_CONFIDENCE,
                prediction_class: label.to_string(),
            },
            FallbackRule::CardiacRiskScore => {
                let score = cardiac_risk_score(request);
                ClassificationResult {
                    confidence: score,
                    prediction_class: risk_tier(score).to_string(),
                }
            }
        }
    }
}

/// Fraction of the five indicators that are positive, in `[0, 1]`.
pub fn cardiac_risk_score(request: &AnalysisRequest) -> f64 {
    let int_above = |name: &str, threshold: i64| {
        request
            .field(name)
            .and_then(parse_leading_int)
            .is_some_and(|value| value > threshold)
    };

    let indicators = [
        int_above("age", 55),
        int_above("trtbps", 140),
        int_above("chol", 200),
        request.field("exng") == Some("1"),
        int_above("caa", 0),
    ];

    let positives = indicators.iter().filter(|&&hit| hit).count();
    positives as f64 / indicators.len() as f64
}

/// Map a score to its tier. Each cut point is exclusive, so a score sitting
/// exactly on a boundary lands in the lower tier.
pub fn risk_tier(score: f64) -> &'static str {
    RISK_TIERS
        .iter()
        .find(|(cut, _)| score > *cut)
        .map(|(_, tier)| *tier)
        .unwrap_or(LOWEST_RISK_TIER)
}

/// Integer prefix of a numeric string: leading whitespace, optional sign,
/// then digits. `"140.9"` reads as 140, `"abc"` as nothing. Digit runs too
/// long for an `i64` saturate toward their sign.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }

    let value = match digits.parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::patient;

    #[test]
    fn test_fixed_rule() {
        let result = FallbackRule::Fixed("Inconclusive").classify(&AnalysisRequest::image("u"));
        assert_eq!(result.prediction_class, "Inconclusive");
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_four_of_five_is_very_high_risk() {
        let request = patient(&[
            ("age", "63"),
            ("trtbps", "150"),
            ("chol", "240"),
            ("exng", "1"),
            ("caa", "0"),
        ]);

        let result = FallbackRule::CardiacRiskScore.classify(&request);
        assert!((result.confidence - 0.8).abs() < 1e-9);
        assert_eq!(result.prediction_class, "Very High Risk");
    }

    #[test]
    fn test_no_indicators_is_very_low_risk() {
        let request = patient(&[("age", "40"), ("trtbps", "120"), ("chol", "180")]);

        let result = FallbackRule::CardiacRiskScore.classify(&request);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.prediction_class, "Very Low Risk");
    }

    #[test]
    fn test_thresholds_are_strict() {
        // Values exactly on each threshold do not count.
        let request = patient(&[
            ("age", "55"),
            ("trtbps", "140"),
            ("chol", "200"),
            ("caa", "0"),
        ]);
        assert_eq!(cardiac_risk_score(&request), 0.0);

        let request = patient(&[("age", "56"), ("trtbps", "141"), ("chol", "201")]);
        let result = FallbackRule::CardiacRiskScore.classify(&request);
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.prediction_class, "High Risk");
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(risk_tier(1.0), "Very High Risk");
        assert_eq!(risk_tier(0.7), "High Risk");
        assert_eq!(risk_tier(0.4), "Moderate Risk");
        assert_eq!(risk_tier(0.2), "Low Risk");
        assert_eq!(risk_tier(0.1), "Very Low Risk");
    }

    #[test]
    fn test_unparseable_fields_count_as_negative() {
        let request = patient(&[
            ("age", "sixty"),
            ("trtbps", ""),
            ("chol", "  250mg"),
            ("caa", "2"),
        ]);
        // Only chol and caa parse above their thresholds.
        assert!((cardiac_risk_score(&request) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("140.9"), Some(140));
        assert_eq!(parse_leading_int("  56 "), Some(56));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int("99999999999999999999"), Some(i64::MAX));
        assert_eq!(parse_leading_int("-99999999999999999999"), Some(i64::MIN));
    }

    #[test]
    fn test_oversized_values_still_count() {
        let request = patient(&[("age", "99999999999999999999")]);

        let result = FallbackRule::CardiacRiskScore.classify(&request);
        assert!((result.confidence - 0.2).abs() < 1e-9);
        assert_eq!(result.prediction_class, "Low Risk");

        let request = patient(&[("caa", "-99999999999999999999")]);
        assert_eq!(cardiac_risk_score(&request), 0.0);
    }
}
