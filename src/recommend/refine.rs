use serde::{Deserialize, Serialize};

use super::{Confidence, ConfidenceDistribution, Recommendation, RecommendationInput, RecommendationKind};

const MIN_REFINE_FREQUENCY: f64 = 0.1;
/// Underived estimates for the vendor-qualified sub-pattern.
const FREQUENCY_ESTIMATE: f64 = 0.8;
const SITE_COUNT_ESTIMATE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementSuggestion {
    pub recommendation: Recommendation,
    pub refined_pattern: String,
    pub estimated_frequency: f64,
    pub estimated_site_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRecommendations {
    pub suggestions: Vec<RefinementSuggestion>,
    pub confidence_distribution: ConfidenceDistribution,
}

fn vendor_slug(vendor: &str) -> String {
    let mut slug = String::with_capacity(vendor.len());
    for c in vendor.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub fn refined_pattern_name(pattern: &str, vendor: &str) -> String {
    format!("{pattern}:{}", vendor_slug(vendor))
}

pub fn generate_refinements(input: &RecommendationInput<'_>) -> RefinementRecommendations {
    let vendors = &input.vendors.analyzer_specific;
    let mut suggestions = Vec::new();

    for pattern in input.headers.patterns.values() {
        if !pattern.frequency.is_finite() || pattern.frequency < MIN_REFINE_FREQUENCY {
            continue;
        }
        let Some(vendor) = vendors.header_vendors.get(&pattern.pattern) else {
            continue;
        };

        let refined_pattern = refined_pattern_name(&pattern.pattern, &vendor.vendor);
        let estimated_frequency = FREQUENCY_ESTIMATE * pattern.frequency;
        let estimated_site_count = (SITE_COUNT_ESTIMATE * pattern.site_count as f64).round() as usize;
        let reasoning = format!(
            "{} is attributed to {}; qualify it as {} (estimated {:.1}% of sites, ~{} sites; estimates, not measurements)",
            pattern.pattern,
            vendor.vendor,
            refined_pattern,
            estimated_frequency * 100.0,
            estimated_site_count
        );

        suggestions.push(RefinementSuggestion {
            recommendation: Recommendation {
                kind: RecommendationKind::Refine,
                pattern: pattern.pattern.clone(),
                action: RecommendationKind::Refine,
                confidence: Confidence::new(input.header_confidence(pattern)),
                reasoning: input.with_bias_note(&pattern.pattern, reasoning),
            },
            refined_pattern,
            estimated_frequency,
            estimated_site_count,
        });
    }

    RefinementRecommendations {
        confidence_distribution: ConfidenceDistribution::from_recommendations(
            suggestions.iter().map(|s| &s.recommendation),
        ),
        suggestions,
    }
}
