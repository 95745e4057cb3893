use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

use super::{build_result, FrequencyAnalyzer, PatternCounter};
use crate::corpus::PreprocessedData;
use crate::domain;
use crate::options::AnalysisOptions;
use crate::stats::AnalysisResult;

/// Substrings that mark a platform's inline bootstrap code.
pub const INLINE_MARKERS: &[&str] = &[
    "wp-emoji",
    "drupalSettings",
    "Joomla.",
    "window.Parameters",
    "jQuery",
    "gtag(",
    "dataLayer",
];

const PATH_SEGMENTS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSpecificData {
    pub first_party_patterns: usize,
    pub third_party_patterns: usize,
    pub inline_patterns: usize,
    /// Script sources that could not be resolved to a URL.
    pub unresolved_sources: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptAnalyzer;

impl FrequencyAnalyzer for ScriptAnalyzer {
    type Specific = ScriptSpecificData;

    fn name(&self) -> &'static str {
        "scripts"
    }

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<ScriptSpecificData> {
        let start_time = Instant::now();
        let counter = PatternCounter::count_sites(data, |site_id, site, acc| {
            // Same path under different query strings counts once.
            let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
            for src in &site.scripts {
                let Some(script) = domain::resolve_script(src, &site.url) else {
                    continue;
                };
                let pattern = if script.first_party {
                    format!("path:{}", domain::path_prefix(&script.path, PATH_SEGMENTS))
                } else if domain::has_valid_tld(&script.host) {
                    format!("host:{}", script.host)
                } else {
                    continue;
                };
                seen.insert((pattern, script.display()));
            }
            for (pattern, example) in &seen {
                acc.observe(site_id, pattern, Some(example));
            }

            for marker in INLINE_MARKERS {
                if site.inline_scripts.iter().any(|body| body.contains(marker)) {
                    acc.observe(site_id, &format!("inline:{marker}"), None);
                }
            }
        });

        let unresolved_sources = data
            .sites
            .values()
            .flat_map(|site| site.scripts.iter().map(move |src| (src, &site.url)))
            .filter(|(src, url)| domain::resolve_script(src, url).is_none())
            .count();

        let patterns_found = counter.len();
        let patterns = counter.finish(data.total_sites, options.min_occurrences, true);

        let count_prefix = |prefix: &str| patterns.keys().filter(|k| k.starts_with(prefix)).count();
        let specific = ScriptSpecificData {
            first_party_patterns: count_prefix("path:"),
            third_party_patterns: count_prefix("host:"),
            inline_patterns: count_prefix("inline:"),
            unresolved_sources,
        };

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
