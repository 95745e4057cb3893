use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::corpus::{PreprocessedData, SiteData};
use crate::stats::{frequency, PatternData, PatternExample};

pub const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Default)]
struct Tally {
    sites: BTreeSet<String>,
    occurrences: usize,
    values: BTreeMap<String, BTreeSet<String>>,
}

impl Tally {
    fn absorb(&mut self, other: Tally) {
        self.sites.extend(other.sites);
        self.occurrences += other.occurrences;
        for (value, sites) in other.values {
            self.values.entry(value).or_default().extend(sites);
        }
    }
}

/// Partial per-pattern counts for a slice of the corpus. Counters built on different
/// threads merge into the same totals regardless of order.
#[derive(Debug, Default)]
pub struct PatternCounter {
    patterns: BTreeMap<String, Tally>,
}

impl PatternCounter {
    /// Records that `site_id` exhibits `pattern`, optionally with a sample `value`. Each
    /// call is one occurrence; site counts are deduplicated.
    pub fn observe(&mut self, site_id: &str, pattern: &str, value: Option<&str>) {
        let tally = self.patterns.entry(pattern.to_string()).or_default();
        tally.occurrences += 1;
        if !tally.sites.contains(site_id) {
            tally.sites.insert(site_id.to_string());
        }
        if let Some(value) = value {
            tally
                .values
                .entry(value.to_string())
                .or_default()
                .insert(site_id.to_string());
        }
    }

    pub fn merge(mut self, other: PatternCounter) -> PatternCounter {
        for (pattern, tally) in other.patterns {
            self.patterns.entry(pattern).or_default().absorb(tally);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Map-reduce over every site: `per_site` fills a thread-local counter, partial
    /// counters are merged afterwards.
    pub fn count_sites<F>(data: &PreprocessedData, per_site: F) -> PatternCounter
    where
        F: Fn(&str, &SiteData, &mut PatternCounter) + Sync,
    {
        data.sites
            .par_iter()
            .fold(PatternCounter::default, |mut acc, (site_id, site)| {
                per_site(site_id, site, &mut acc);
                acc
            })
            .reduce(PatternCounter::default, PatternCounter::merge)
    }

    /// Turns the tallies into [`PatternData`], dropping patterns seen on fewer than
    /// `min_occurrences` sites.
    pub fn finish(
        self,
        total_sites: usize,
        min_occurrences: usize,
        with_occurrences: bool,
    ) -> BTreeMap<String, PatternData> {
        self.patterns
            .into_iter()
            .filter(|(_, tally)| tally.sites.len() >= min_occurrences)
            .map(|(pattern, tally)| {
                let site_count = tally.sites.len();
                let mut examples: Vec<PatternExample> = tally
                    .values
                    .into_iter()
                    .map(|(value, sites)| PatternExample {
                        frequency: frequency(sites.len(), total_sites),
                        site_count: sites.len(),
                        value,
                    })
                    .collect();
                examples.sort_by(|a, b| {
                    b.site_count
                        .cmp(&a.site_count)
                        .then_with(|| a.value.cmp(&b.value))
                });
                examples.truncate(MAX_EXAMPLES);

                let data = PatternData {
                    pattern: pattern.clone(),
                    site_count,
                    frequency: frequency(site_count, total_sites),
                    sites: tally.sites,
                    examples,
                    occurrence_count: with_occurrences.then_some(tally.occurrences),
                    metadata: BTreeMap::new(),
                };
                (pattern, data)
            })
            .collect()
    }
}
