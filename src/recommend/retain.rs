use serde::{Deserialize, Serialize};

use super::{Confidence, ConfidenceDistribution, Recommendation, RecommendationInput, RecommendationKind};
use crate::analyzers::HeaderCategory;

const VENDOR_FACTOR: f64 = 0.8;
const SEMANTIC_FACTOR: f64 = 0.7;
const OPTIMAL_BAND_FACTOR: f64 = 0.8;
const OUTSIDE_BAND_FACTOR: f64 = 0.6;
const OPTIMAL_BAND: (f64, f64) = (0.1, 0.8);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub confidence_distribution: ConfidenceDistribution,
    /// Mean confidence value, 0 when nothing qualified.
    pub average_confidence: f64,
}

/// Unweighted mean of the vendor, semantic and frequency-band factors that apply.
pub fn retention_confidence(has_vendor: bool, category: HeaderCategory, frequency: f64) -> f64 {
    let mut factors = Vec::with_capacity(3);
    if has_vendor {
        factors.push(VENDOR_FACTOR);
    }
    if category != HeaderCategory::Unknown {
        factors.push(SEMANTIC_FACTOR);
    }
    let (low, high) = OPTIMAL_BAND;
    factors.push(if (low..=high).contains(&frequency) {
        OPTIMAL_BAND_FACTOR
    } else {
        OUTSIDE_BAND_FACTOR
    });
    factors.iter().sum::<f64>() / factors.len() as f64
}

pub fn generate_retention(input: &RecommendationInput<'_>) -> RetentionRecommendations {
    let min_occurrences = input.options.min_occurrences;
    let vendors = &input.vendors.analyzer_specific;
    let semantics = &input.semantics.analyzer_specific;

    let mut recommendations = Vec::new();
    for pattern in input.headers.patterns.values() {
        if pattern.site_count < min_occurrences || !pattern.frequency.is_finite() {
            continue;
        }
        let vendor = vendors.header_vendors.get(&pattern.pattern);
        let category = semantics.category_of(&pattern.pattern);
        if vendor.is_none() && category == HeaderCategory::Unknown {
            continue;
        }

        let mut reasons = Vec::new();
        if let Some(vendor) = vendor {
            reasons.push(format!("attributed to {} ({})", vendor.vendor, vendor.category));
        }
        if category != HeaderCategory::Unknown {
            reasons.push(format!("{category} header"));
        }
        reasons.push(format!("frequency {:.1}%", pattern.frequency * 100.0));

        recommendations.push(Recommendation {
            kind: RecommendationKind::Retain,
            pattern: pattern.pattern.clone(),
            action: RecommendationKind::Retain,
            confidence: Confidence::new(retention_confidence(vendor.is_some(), category, pattern.frequency)),
            reasoning: input.with_bias_note(&pattern.pattern, reasons.join(", ")),
        });
    }

    let average_confidence = if recommendations.is_empty() {
        0.0
    } else {
        recommendations.iter().map(|r| r.confidence.value).sum::<f64>() / recommendations.len() as f64
    };
    RetentionRecommendations {
        confidence_distribution: ConfidenceDistribution::from_recommendations(&recommendations),
        average_confidence,
        recommendations,
    }
}
