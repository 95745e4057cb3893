use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::options::AnalysisOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternExample {
    pub value: String,
    pub site_count: usize,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternData {
    pub pattern: String,
    pub site_count: usize,
    pub sites: BTreeSet<String>,
    /// `site_count / total_sites`.
    pub frequency: f64,
    #[serde(default)]
    pub examples: Vec<PatternExample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub analyzer: String,
    pub analyzed_at: DateTime<Utc>,
    /// Distinct patterns before the `min_occurrences` cut.
    pub total_patterns_found: usize,
    pub total_patterns_after_filtering: usize,
    pub options: AnalysisOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult<T> {
    pub patterns: BTreeMap<String, PatternData>,
    pub total_sites: usize,
    pub metadata: AnalysisMetadata,
    pub analyzer_specific: T,
}

impl<T> AnalysisResult<T> {
    pub fn ranked(&self) -> Vec<&PatternData> {
        rank_patterns(&self.patterns)
    }
}

/// Patterns ordered by frequency, ties broken by pattern name.
pub fn rank_patterns(patterns: &BTreeMap<String, PatternData>) -> Vec<&PatternData> {
    let mut ranked: Vec<&PatternData> = patterns.values().collect();
    ranked.sort_by(|a, b| {
        b.frequency
            .total_cmp(&a.frequency)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    ranked
}

pub fn frequency(site_count: usize, total_sites: usize) -> f64 {
    if total_sites == 0 {
        0.0
    } else {
        site_count as f64 / total_sites as f64
    }
}
