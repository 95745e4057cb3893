use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use super::{build_result, FrequencyAnalyzer, PatternCounter};
use crate::corpus::PreprocessedData;
use crate::detection::UNKNOWN_CMS;
use crate::options::{AnalysisOptions, PageType};
use crate::stats::AnalysisResult;

/// Transport headers present on nearly every response; dropped under semantic filtering.
pub const UNIVERSAL_HEADERS: &[&str] = &[
    "date",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-encoding",
    "vary",
    "accept-ranges",
    "content-type",
];

const GENERIC_LABEL_THRESHOLD: usize = 3;
const GENERIC_PENALTY: f64 = 0.5;
const DISCRIMINATIVE_BOOST: f64 = 1.2;

/// `clamp(1 - frequency, 0.1, 1)`, halved when the header shows up under more than three
/// CMS labels, boosted by 1.2 under exactly one, then clamped again.
pub fn header_pattern_confidence(frequency: f64, distinct_cms_labels: usize) -> f64 {
    let frequency = if frequency.is_finite() { frequency } else { 1.0 };
    let mut confidence = (1.0 - frequency).clamp(0.1, 1.0);
    if distinct_cms_labels > GENERIC_LABEL_THRESHOLD {
        confidence *= GENERIC_PENALTY;
    } else if distinct_cms_labels == 1 {
        confidence *= DISCRIMINATIVE_BOOST;
    }
    confidence.clamp(0.1, 1.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSpecificData {
    pub page_type: PageType,
    pub pattern_confidence: BTreeMap<String, f64>,
    /// Distinct CMS labels (`Unknown` excluded) among each pattern's sites.
    pub cms_label_counts: BTreeMap<String, usize>,
    /// Universal headers dropped by semantic filtering, with the sites that sent them.
    pub filtered_universal: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAnalyzer;

impl FrequencyAnalyzer for HeaderAnalyzer {
    type Specific = HeaderSpecificData;

    fn name(&self) -> &'static str {
        "headers"
    }

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<HeaderSpecificData> {
        let start_time = Instant::now();
        let page_type = options.page_type;
        let filtering = options.semantic_filtering;

        let counter = PatternCounter::count_sites(data, |site_id, site, acc| {
            for (name, values) in site.headers_for(page_type) {
                if filtering && UNIVERSAL_HEADERS.contains(&name.as_str()) {
                    continue;
                }
                for value in values {
                    acc.observe(site_id, name, Some(value));
                }
            }
        });

        let mut filtered_universal = BTreeMap::new();
        if filtering {
            for site in data.sites.values() {
                for name in site.headers_for(page_type).keys() {
                    if UNIVERSAL_HEADERS.contains(&name.as_str()) {
                        *filtered_universal.entry(name.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let patterns_found = counter.len();
        let patterns = counter.finish(data.total_sites, options.min_occurrences, true);

        let mut specific = HeaderSpecificData {
            page_type,
            filtered_universal,
            ..HeaderSpecificData::default()
        };
        for (name, pattern) in &patterns {
            let labels: BTreeSet<&str> = pattern
                .sites
                .iter()
                .filter_map(|id| data.sites.get(id))
                .map(|site| site.cms_label())
                .filter(|label| *label != UNKNOWN_CMS)
                .collect();
            specific
                .pattern_confidence
                .insert(name.clone(), header_pattern_confidence(pattern.frequency, labels.len()));
            specific.cms_label_counts.insert(name.clone(), labels.len());
        }

        build_result(
            self.name(),
            patterns,
            patterns_found,
            data,
            options,
            specific,
            start_time,
        )
    }
}
