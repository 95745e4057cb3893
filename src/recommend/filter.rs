use serde::{Deserialize, Serialize};

use super::{Confidence, ConfidenceDistribution, Recommendation, RecommendationInput, RecommendationKind};
use crate::analyzers::HeaderCategory;

const SECURITY_GENERIC_FREQUENCY: f64 = 0.3;
const NOISE_FREQUENCY: f64 = 0.05;
const STRUCTURAL_FREQUENCY: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub confidence_distribution: ConfidenceDistribution,
    pub patterns_considered: usize,
    pub filter_count: usize,
    pub retain_count: usize,
}

/// First matching rule wins: common security header, then rare noise, then structural,
/// then ambiguous.
fn decide(category: HeaderCategory, frequency: f64) -> (RecommendationKind, String) {
    let pct = frequency * 100.0;
    if category == HeaderCategory::Security && frequency > SECURITY_GENERIC_FREQUENCY {
        (
            RecommendationKind::Filter,
            format!("generic security header present on {pct:.1}% of sites"),
        )
    } else if frequency < NOISE_FREQUENCY {
        (
            RecommendationKind::Filter,
            format!("noise: seen on only {pct:.1}% of sites"),
        )
    } else if frequency > STRUCTURAL_FREQUENCY {
        (
            RecommendationKind::Retain,
            format!("likely structural: present on {pct:.1}% of sites"),
        )
    } else {
        (
            RecommendationKind::Retain,
            format!("moderate frequency ({pct:.1}%), ambiguous signal"),
        )
    }
}

pub fn generate_filtering(input: &RecommendationInput<'_>) -> FilteringRecommendations {
    let min_occurrences = input.options.min_occurrences;
    let semantics = &input.semantics.analyzer_specific;

    let recommendations: Vec<Recommendation> = input
        .headers
        .patterns
        .values()
        .filter(|p| p.site_count >= min_occurrences && p.frequency.is_finite())
        .map(|pattern| {
            let category = semantics.category_of(&pattern.pattern);
            let (action, reasoning) = decide(category, pattern.frequency);
            Recommendation {
                kind: RecommendationKind::Filter,
                pattern: pattern.pattern.clone(),
                action,
                confidence: Confidence::new(input.header_confidence(pattern)),
                reasoning: input.with_bias_note(&pattern.pattern, reasoning),
            }
        })
        .collect();

    let filter_count = recommendations
        .iter()
        .filter(|r| r.action == RecommendationKind::Filter)
        .count();
    FilteringRecommendations {
        confidence_distribution: ConfidenceDistribution::from_recommendations(&recommendations),
        patterns_considered: input.headers.patterns.len(),
        retain_count: recommendations.len() - filter_count,
        filter_count,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_apply_in_order() {
        assert_eq!(decide(HeaderCategory::Security, 0.5).0, RecommendationKind::Filter);
        assert_eq!(decide(HeaderCategory::Security, 0.2).0, RecommendationKind::Retain);
        assert_eq!(decide(HeaderCategory::Security, 0.01).0, RecommendationKind::Filter);
        assert_eq!(decide(HeaderCategory::Custom, 0.04).0, RecommendationKind::Filter);
        assert!(decide(HeaderCategory::Custom, 0.04).1.starts_with("noise"));
        assert!(decide(HeaderCategory::Standard, 0.95).1.starts_with("likely structural"));
        assert!(decide(HeaderCategory::Custom, 0.4).1.contains("ambiguous"));
        // A security header over 0.7 is still caught by the first rule.
        assert!(decide(HeaderCategory::Security, 0.9).1.starts_with("generic security"));
    }
}
