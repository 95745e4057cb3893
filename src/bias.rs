use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{info, warn};

use crate::corpus::PreprocessedData;
use crate::stats::PatternData;

pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;
/// Share above which one CMS is reported as dominating the corpus.
pub const DOMINANCE_THRESHOLD: f64 = 0.6;

const CIRCULARITY_NOTE: &str = "CMS labels in the corpus were produced by the same heuristic detector whose signals are being measured; correlations can reinforce the detector's existing blind spots.";
const SHARE_NOTE: &str = "Correlation shares split 1/k evenly across the k CMS labels a pattern was seen under; they are not conditional probabilities.";
const PRIOR_NOTE: &str = "Chi-square statistics compare against a uniform prior over corpus labels, so a dominant CMS makes its common patterns look discriminative.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsDistribution {
    pub counts: BTreeMap<String, usize>,
    pub shares: BTreeMap<String, f64>,
    /// Herfindahl index of the label shares: 1 means a single label.
    pub concentration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant: Option<String>,
}

impl CmsDistribution {
    pub fn from_corpus(data: &PreprocessedData) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for site in data.sites.values() {
            *counts.entry(site.cms_label().to_string()).or_insert(0) += 1;
        }
        let total = data.total_sites.max(1) as f64;
        let shares: BTreeMap<String, f64> = counts
            .iter()
            .map(|(label, count)| (label.clone(), *count as f64 / total))
            .collect();
        let concentration = shares.values().map(|s| s * s).sum();
        let dominant = shares
            .iter()
            .filter(|(_, share)| **share > DOMINANCE_THRESHOLD)
            .map(|(label, _)| label.clone())
            .next();
        Self {
            counts,
            shares,
            concentration,
            dominant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCorrelation {
    pub pattern: String,
    pub site_count: usize,
    pub cms_counts: BTreeMap<String, usize>,
    /// `1/k` for each of the `k` labels the pattern was seen under.
    pub correlation: BTreeMap<String, f64>,
    /// Largest single-label share of the pattern's sites.
    pub platform_specificity: f64,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub discriminative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasAnalysis {
    pub corpus_distribution: CmsDistribution,
    /// Dimension name, then pattern key.
    pub correlations: BTreeMap<String, BTreeMap<String, PatternCorrelation>>,
    pub discriminative_patterns: BTreeMap<String, Vec<String>>,
    pub significance_level: f64,
    pub limitations: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BiasAnalysis {
    pub fn correlation(&self, dimension: &str, pattern: &str) -> Option<&PatternCorrelation> {
        self.correlations.get(dimension)?.get(pattern)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BiasEngine {
    pub significance_level: f64,
}

impl Default for BiasEngine {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
        }
    }
}

impl BiasEngine {
    pub fn analyze(
        &self,
        data: &PreprocessedData,
        dimensions: &[(&str, &BTreeMap<String, PatternData>)],
    ) -> BiasAnalysis {
        let start_time = Instant::now();
        let distribution = CmsDistribution::from_corpus(data);
        let labels: BTreeSet<&str> = distribution.counts.keys().map(String::as_str).collect();

        let mut correlations = BTreeMap::new();
        let mut discriminative_patterns = BTreeMap::new();
        for (dimension, patterns) in dimensions {
            let per_pattern: BTreeMap<String, PatternCorrelation> = patterns
                .iter()
                .map(|(key, pattern)| (key.clone(), self.correlate(data, pattern, &labels)))
                .collect();
            let flagged: Vec<String> = per_pattern
                .values()
                .filter(|c| c.discriminative)
                .map(|c| c.pattern.clone())
                .collect();
            discriminative_patterns.insert(dimension.to_string(), flagged);
            correlations.insert(dimension.to_string(), per_pattern);
        }

        let mut warnings = Vec::new();
        if let Some(dominant) = &distribution.dominant {
            warn!(action = "check", component = "bias", dominant_cms = %dominant, concentration = distribution.concentration, "Corpus dominated by one CMS label");
            warnings.push(format!(
                "corpus is dominated by {dominant}; pattern frequencies mostly reflect that platform"
            ));
        }
        if labels.len() < 2 {
            warnings.push("fewer than two CMS labels in corpus; no pattern can be discriminative".to_string());
        }

        info!(
            action = "complete",
            component = "bias",
            cms_labels = labels.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Bias analysis completed"
        );

        BiasAnalysis {
            corpus_distribution: distribution,
            correlations,
            discriminative_patterns,
            significance_level: self.significance_level,
            limitations: vec![
                CIRCULARITY_NOTE.to_string(),
                SHARE_NOTE.to_string(),
                PRIOR_NOTE.to_string(),
            ],
            warnings,
        }
    }

    fn correlate(
        &self,
        data: &PreprocessedData,
        pattern: &PatternData,
        labels: &BTreeSet<&str>,
    ) -> PatternCorrelation {
        let mut cms_counts: BTreeMap<String, usize> = BTreeMap::new();
        for site in pattern.sites.iter().filter_map(|id| data.sites.get(id)) {
            *cms_counts.entry(site.cms_label().to_string()).or_insert(0) += 1;
        }
        let observed: usize = cms_counts.values().sum();

        let k = cms_counts.len();
        let correlation = cms_counts
            .keys()
            .map(|label| (label.clone(), 1.0 / k as f64))
            .collect();
        let platform_specificity = cms_counts
            .values()
            .max()
            .map_or(0.0, |max| *max as f64 / observed.max(1) as f64);

        let (chi_square, degrees_of_freedom, p_value) = uniform_chi_square(&cms_counts, labels, observed);
        let discriminative = labels.len() >= 2 && p_value < self.significance_level;

        PatternCorrelation {
            pattern: pattern.pattern.clone(),
            site_count: pattern.site_count,
            cms_counts,
            correlation,
            platform_specificity,
            chi_square,
            degrees_of_freedom,
            p_value,
            discriminative,
        }
    }
}

/// Goodness of fit of the pattern's label counts against an even split over every
/// corpus label. Returns `(statistic, degrees of freedom, p-value)`.
fn uniform_chi_square(
    cms_counts: &BTreeMap<String, usize>,
    labels: &BTreeSet<&str>,
    observed: usize,
) -> (f64, usize, f64) {
    if labels.len() < 2 || observed == 0 {
        return (0.0, 0, 1.0);
    }
    let expected = observed as f64 / labels.len() as f64;
    let statistic: f64 = labels
        .iter()
        .map(|label| {
            let o = cms_counts.get(*label).copied().unwrap_or(0) as f64;
            (o - expected).powi(2) / expected
        })
        .sum();
    let df = labels.len() - 1;
    let p_value = match ChiSquared::new(df as f64) {
        Ok(dist) => (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
        Err(_) => 1.0,
    };
    (statistic, df, p_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{corpus, site};
    use std::collections::BTreeSet;

    fn pattern_over(name: &str, sites: &[&str], total: usize) -> PatternData {
        PatternData {
            pattern: name.into(),
            site_count: sites.len(),
            sites: sites.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            frequency: sites.len() as f64 / total as f64,
            examples: Vec::new(),
            occurrence_count: None,
            metadata: BTreeMap::new(),
        }
    }

    fn mixed_corpus() -> PreprocessedData {
        let mut sites = Vec::new();
        for i in 0..20 {
            sites.push(site(&format!("https://wp{i}.com"), Some("WordPress")));
            sites.push(site(&format!("https://dr{i}.com"), Some("Drupal")));
        }
        corpus(sites)
    }

    #[test]
    fn single_label_patterns_are_discriminative() {
        let data = mixed_corpus();
        let wp_sites: Vec<String> = (0..20).map(|i| format!("wp{i}.com")).collect();
        let wp_refs: Vec<&str> = wp_sites.iter().map(String::as_str).collect();
        let pattern = pattern_over("x-pingback", &wp_refs, 40);
        let patterns: BTreeMap<String, PatternData> = [("x-pingback".to_string(), pattern)].into();

        let bias = BiasEngine::default().analyze(&data, &[("headers", &patterns)]);
        let c = bias.correlation("headers", "x-pingback").unwrap();
        assert_eq!(c.correlation["WordPress"], 1.0);
        assert_eq!(c.platform_specificity, 1.0);
        assert_eq!(c.degrees_of_freedom, 1);
        assert!((c.chi_square - 20.0).abs() < 1e-9);
        assert!(c.discriminative);
        assert_eq!(bias.discriminative_patterns["headers"], vec!["x-pingback".to_string()]);
        assert!((bias.corpus_distribution.concentration - 0.5).abs() < 1e-9);
        assert_eq!(bias.limitations.len(), 3);
    }

    #[test]
    fn evenly_spread_patterns_are_not_discriminative() {
        let data = mixed_corpus();
        let sites = ["wp0.com", "wp1.com", "dr0.com", "dr1.com"];
        let patterns: BTreeMap<String, PatternData> =
            [("server".to_string(), pattern_over("server", &sites, 40))].into();
        let bias = BiasEngine::default().analyze(&data, &[("headers", &patterns)]);
        let c = bias.correlation("headers", "server").unwrap();
        assert_eq!(c.correlation["WordPress"], 0.5);
        assert_eq!(c.chi_square, 0.0);
        assert!(c.p_value > 0.99);
        assert!(!c.discriminative);
    }

    #[test]
    fn single_label_corpus_never_flags() {
        let data = corpus(vec![site("https://a.com", Some("WordPress")), site("https://b.com", Some("WordPress"))]);
        let patterns: BTreeMap<String, PatternData> =
            [("server".to_string(), pattern_over("server", &["a.com", "b.com"], 2))].into();
        let bias = BiasEngine::default().analyze(&data, &[("headers", &patterns)]);
        let c = bias.correlation("headers", "server").unwrap();
        assert!(!c.discriminative);
        assert_eq!(c.p_value, 1.0);
        assert_eq!(bias.corpus_distribution.dominant.as_deref(), Some("WordPress"));
        assert_eq!(bias.warnings.len(), 2);
    }
}
