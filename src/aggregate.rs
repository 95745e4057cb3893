use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::analyzers::{
    HeaderSpecificData, MetaSpecificData, ScriptSpecificData, SemanticSpecificData,
    VendorSpecificData,
};
use crate::bias::BiasAnalysis;
use crate::corpus::{FilteringStats, PreprocessedData};
use crate::error::AnalysisError;
use crate::options::AnalysisOptions;
use crate::recommend::RecommendationSet;
use crate::stats::{rank_patterns, AnalysisResult, PatternData};

const FREQUENCY_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct AnalyzerOutputs {
    pub headers: AnalysisResult<HeaderSpecificData>,
    pub meta_tags: AnalysisResult<MetaSpecificData>,
    pub scripts: AnalysisResult<ScriptSpecificData>,
    pub vendors: AnalysisResult<VendorSpecificData>,
    pub semantics: AnalysisResult<SemanticSpecificData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPattern {
    pub pattern: String,
    pub site_count: usize,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionSummary {
    pub pattern_count: usize,
    pub top_patterns: Vec<TopPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_sites: usize,
    pub dimensions: BTreeMap<String, DimensionSummary>,
    pub filtering_stats: FilteringStats,
    pub min_occurrences: usize,
    pub min_sites: usize,
    pub statistically_unreliable: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResults {
    pub headers: AnalysisResult<HeaderSpecificData>,
    pub meta_tags: AnalysisResult<MetaSpecificData>,
    pub scripts: AnalysisResult<ScriptSpecificData>,
    pub vendors: AnalysisResult<VendorSpecificData>,
    pub semantics: AnalysisResult<SemanticSpecificData>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<BiasAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<RecommendationSet>,
}

impl AggregatedResults {
    /// `(dimension, patterns)` pairs in a fixed order.
    pub fn dimensions(&self) -> [(&'static str, &BTreeMap<String, PatternData>); 5] {
        [
            ("headers", &self.headers.patterns),
            ("metaTags", &self.meta_tags.patterns),
            ("scripts", &self.scripts.patterns),
            ("vendors", &self.vendors.patterns),
            ("semantics", &self.semantics.patterns),
        ]
    }
}

pub fn validate_result<T>(
    result: &AnalysisResult<T>,
    expected_total: usize,
    min_occurrences: usize,
) -> Result<(), AnalysisError> {
    let analyzer = &result.metadata.analyzer;
    if result.total_sites != expected_total {
        return Err(AnalysisError::TotalSitesMismatch {
            analyzer: analyzer.clone(),
            expected: expected_total,
            actual: result.total_sites,
        });
    }
    for (key, pattern) in &result.patterns {
        validate_pattern(analyzer, key, pattern, expected_total, min_occurrences)?;
    }
    Ok(())
}

fn validate_pattern(
    analyzer: &str,
    key: &str,
    pattern: &PatternData,
    total_sites: usize,
    min_occurrences: usize,
) -> Result<(), AnalysisError> {
    let frequency = pattern.frequency;
    if !frequency.is_finite() || !(0.0..=1.0).contains(&frequency) {
        return Err(AnalysisError::FrequencyOutOfRange {
            analyzer: analyzer.to_string(),
            pattern: key.to_string(),
            frequency,
        });
    }
    if pattern.site_count > total_sites {
        return Err(AnalysisError::SiteCountExceedsTotal {
            analyzer: analyzer.to_string(),
            pattern: key.to_string(),
            site_count: pattern.site_count,
            total_sites,
        });
    }
    let expected = crate::stats::frequency(pattern.site_count, total_sites);
    if (frequency - expected).abs() >= FREQUENCY_TOLERANCE {
        return Err(AnalysisError::FrequencyMismatch {
            analyzer: analyzer.to_string(),
            pattern: key.to_string(),
            frequency,
            site_count: pattern.site_count,
            total_sites,
        });
    }
    if pattern.site_count < min_occurrences {
        return Err(AnalysisError::BelowMinOccurrences {
            analyzer: analyzer.to_string(),
            pattern: key.to_string(),
            site_count: pattern.site_count,
            min_occurrences,
        });
    }
    for example in &pattern.examples {
        let exceeds_occurrences = pattern
            .occurrence_count
            .is_some_and(|occurrences| example.site_count > occurrences);
        if example.site_count > pattern.site_count
            || exceeds_occurrences
            || example.frequency > frequency + FREQUENCY_TOLERANCE
        {
            return Err(AnalysisError::ExampleExceedsPattern {
                analyzer: analyzer.to_string(),
                pattern: key.to_string(),
                example: example.value.clone(),
            });
        }
    }
    Ok(())
}

/// Top `n` patterns by frequency, ties broken by pattern name.
pub fn top_patterns(patterns: &BTreeMap<String, PatternData>, n: usize) -> Vec<TopPattern> {
    rank_patterns(patterns)
        .into_iter()
        .take(n)
        .map(|p| TopPattern {
            pattern: p.pattern.clone(),
            site_count: p.site_count,
            frequency: p.frequency,
        })
        .collect()
}

/// Merges analyzer outputs. Never repairs inconsistent input: any invariant violation is
/// returned as an [`AnalysisError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(
        &self,
        data: &PreprocessedData,
        outputs: AnalyzerOutputs,
        options: &AnalysisOptions,
    ) -> Result<AggregatedResults, AnalysisError> {
        let total = data.total_sites;
        let min = options.min_occurrences;
        validate_result(&outputs.headers, total, min)?;
        validate_result(&outputs.meta_tags, total, min)?;
        validate_result(&outputs.scripts, total, min)?;
        validate_result(&outputs.vendors, total, min)?;
        validate_result(&outputs.semantics, total, min)?;

        let mut results = AggregatedResults {
            headers: outputs.headers,
            meta_tags: outputs.meta_tags,
            scripts: outputs.scripts,
            vendors: outputs.vendors,
            semantics: outputs.semantics,
            summary: Summary {
                total_sites: total,
                dimensions: BTreeMap::new(),
                filtering_stats: data.filtering_stats.clone(),
                min_occurrences: options.min_occurrences,
                min_sites: options.min_sites,
                statistically_unreliable: !data.is_reliable(options.min_sites),
                warnings: Vec::new(),
                generated_at: Utc::now(),
            },
            bias: None,
            recommendations: None,
        };

        let dimensions: BTreeMap<String, DimensionSummary> = results
            .dimensions()
            .into_iter()
            .map(|(name, patterns)| {
                (
                    name.to_string(),
                    DimensionSummary {
                        pattern_count: patterns.len(),
                        top_patterns: top_patterns(patterns, options.top_patterns),
                    },
                )
            })
            .collect();
        results.summary.dimensions = dimensions;

        let warnings = &mut results.summary.warnings;
        if results.summary.statistically_unreliable {
            warn!(
                action = "check",
                component = "aggregator",
                total_sites = total,
                min_sites = options.min_sites,
                "Corpus below minimum size, results are statistically unreliable"
            );
            warnings.push(format!(
                "corpus has {} sites, fewer than the {} required for reliable statistics",
                total, options.min_sites
            ));
        }
        if data.filtering_stats.sites_filtered_out > 0 {
            warnings.push(format!(
                "{} corpus records were skipped during preprocessing",
                data.filtering_stats.sites_filtered_out
            ));
        }

        info!(
            action = "complete",
            component = "aggregator",
            total_sites = total,
            header_patterns = results.headers.patterns.len(),
            "Analyzer results aggregated"
        );
        Ok(results)
    }
}
