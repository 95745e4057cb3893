pub mod filter;
pub mod refine;
pub mod retain;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::analyzers::{
    header_pattern_confidence, HeaderSpecificData, SemanticSpecificData, VendorSpecificData,
};
use crate::bias::BiasAnalysis;
use crate::options::AnalysisOptions;
use crate::stats::{AnalysisResult, PatternData};

pub use filter::{generate_filtering, FilteringRecommendations};
pub use refine::{generate_refinements, RefinementRecommendations, RefinementSuggestion};
pub use retain::{generate_retention, RetentionRecommendations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Filter,
    Retain,
    Refine,
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecommendationKind::Filter => "filter",
            RecommendationKind::Retain => "retain",
            RecommendationKind::Refine => "refine",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_value(value: f64) -> Self {
        if !value.is_finite() || value < 0.4 {
            ConfidenceLevel::Low
        } else if value < 0.65 {
            ConfidenceLevel::Medium
        } else if value < 0.85 {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::VeryHigh
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub value: f64,
    pub level: ConfidenceLevel,
}

impl Confidence {
    /// Clamps into `[0, 1]`; non-finite input becomes 0.
    pub fn new(value: f64) -> Self {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            value,
            level: ConfidenceLevel::from_value(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub pattern: String,
    pub action: RecommendationKind,
    pub confidence: Confidence,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceDistribution {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub very_high: f64,
}

impl ConfidenceDistribution {
    /// An empty input yields an even split rather than NaN shares.
    pub fn from_recommendations<'a>(recs: impl IntoIterator<Item = &'a Recommendation>) -> Self {
        let mut counts = [0usize; 4];
        for rec in recs {
            let slot = match rec.confidence.level {
                ConfidenceLevel::Low => 0,
                ConfidenceLevel::Medium => 1,
                ConfidenceLevel::High => 2,
                ConfidenceLevel::VeryHigh => 3,
            };
            counts[slot] += 1;
        }
        let total: usize = counts.iter().sum();
        if total == 0 {
            return Self {
                low: 0.25,
                medium: 0.25,
                high: 0.25,
                very_high: 0.25,
            };
        }
        let share = |n: usize| n as f64 / total as f64;
        Self {
            low: share(counts[0]),
            medium: share(counts[1]),
            high: share(counts[2]),
            very_high: share(counts[3]),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendationInput<'a> {
    pub headers: &'a AnalysisResult<HeaderSpecificData>,
    pub vendors: &'a AnalysisResult<VendorSpecificData>,
    pub semantics: &'a AnalysisResult<SemanticSpecificData>,
    pub bias: Option<&'a BiasAnalysis>,
    pub options: &'a AnalysisOptions,
}

impl RecommendationInput<'_> {
    /// Header confidence heuristic as computed by the header analyzer, recomputed from
    /// the stored label count when the analyzer did not record one.
    fn header_confidence(&self, pattern: &PatternData) -> f64 {
        let specific = &self.headers.analyzer_specific;
        specific
            .pattern_confidence
            .get(&pattern.pattern)
            .copied()
            .unwrap_or_else(|| {
                let labels = specific.cms_label_counts.get(&pattern.pattern).copied().unwrap_or(0);
                header_pattern_confidence(pattern.frequency, labels)
            })
    }

    /// Bias note appended to reasoning, when bias data covers the header.
    fn bias_note(&self, pattern: &str) -> Option<String> {
        let correlation = self.bias?.correlation("headers", pattern)?;
        Some(if correlation.discriminative {
            format!(
                "discriminative across CMS labels (p={:.3}, specificity {:.2})",
                correlation.p_value, correlation.platform_specificity
            )
        } else {
            format!(
                "not discriminative across CMS labels (p={:.3})",
                correlation.p_value
            )
        })
    }

    fn with_bias_note(&self, pattern: &str, reasoning: String) -> String {
        match self.bias_note(pattern) {
            Some(note) => format!("{reasoning}; {note}"),
            None => reasoning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSet {
    pub filtering: FilteringRecommendations,
    pub retention: RetentionRecommendations,
    pub refinement: RefinementRecommendations,
}

pub fn generate_recommendations(input: &RecommendationInput<'_>) -> RecommendationSet {
    let set = RecommendationSet {
        filtering: generate_filtering(input),
        retention: generate_retention(input),
        refinement: generate_refinements(input),
    };
    info!(
        action = "complete",
        component = "recommendations",
        filtering = set.filtering.recommendations.len(),
        retention = set.retention.recommendations.len(),
        refinement = set.refinement.suggestions.len(),
        "Recommendations generated"
    );
    set
}
