use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use super::{build_result, FrequencyAnalyzer, PatternCounter};
use crate::corpus::PreprocessedData;
use crate::options::AnalysisOptions;
use crate::stats::AnalysisResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaSpecificData {
    /// Retained patterns per attribute kind (`name`, `property`, `http-equiv`).
    pub patterns_by_kind: BTreeMap<String, usize>,
    pub sites_with_meta: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetaAnalyzer;

impl FrequencyAnalyzer for MetaAnalyzer {
    type Specific = MetaSpecificData;

    fn name(&self) -> &'static str {
        "meta-tags"
    }

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<MetaSpecificData> {
        let start_time = Instant::now();
        let counter = PatternCounter::count_sites(data, |site_id, site, acc| {
            for (key, values) in &site.meta_tags {
                for value in values {
                    acc.observe(site_id, key, Some(value));
                }
            }
        });

        let patterns_found = counter.len();
        let patterns = counter.finish(data.total_sites, options.min_occurrences, true);

        let mut specific = MetaSpecificData {
            sites_with_meta: data.sites.values().filter(|s| !s.meta_tags.is_empty()).count(),
            ..MetaSpecificData::default()
        };
        for key in patterns.keys() {
            let kind = key.split_once(':').map_or(key.as_str(), |(kind, _)| kind);
            *specific.patterns_by_kind.entry(kind.to_string()).or_insert(0) += 1;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{corpus, site};

    #[test]
    fn generator_values_keep_versions() {
        let mut a = site("https://a.com", Some("WordPress"));
        a.meta_tags.entry("name:generator".into()).or_default().insert("WordPress 6.5".into());
        let mut b = site("https://b.com", Some("WordPress"));
        b.meta_tags.entry("name:generator".into()).or_default().insert("WordPress 6.4".into());
        b.meta_tags.entry("property:og:type".into()).or_default().insert("website".into());

        let options = AnalysisOptions {
            min_occurrences: 1,
            ..AnalysisOptions::default()
        };
        let result = MetaAnalyzer.analyze(&corpus(vec![a, b]), &options);
        let generator = &result.patterns["name:generator"];
        assert_eq!(generator.site_count, 2);
        let values: Vec<&str> = generator.examples.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["WordPress 6.4", "WordPress 6.5"]);
        assert_eq!(result.analyzer_specific.patterns_by_kind["property"], 1);
        assert_eq!(result.analyzer_specific.sites_with_meta, 2);
    }
}
