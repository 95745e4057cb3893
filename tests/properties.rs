use std::collections::BTreeSet;

use cmsprobe::detection::{select_best_version, HintConfidence, VersionHint, VersionSource};
use cmsprobe::snapshot::{DetectionDataPoint, HeaderValue};
use cmsprobe::{run_analysis, AnalysisOptions, PreprocessedData, SiteData, TechnologyTable};
use proptest::prelude::*;

const HEADER_POOL: &[&str] = &[
    "server",
    "x-powered-by",
    "cf-ray",
    "x-drupal-cache",
    "x-wp-total",
    "strict-transport-security",
    "x-custom-id",
    "cache-control",
];
const LABEL_POOL: &[&str] = &["WordPress", "Drupal", "Joomla", "Duda", "unknown"];

fn arb_site() -> impl Strategy<Value = (usize, BTreeSet<usize>, u8)> {
    (
        0..LABEL_POOL.len(),
        prop::collection::btree_set(0..HEADER_POOL.len(), 0..HEADER_POOL.len()),
        0u8..3,
    )
}

fn build_corpus(specs: &[(usize, BTreeSet<usize>, u8)]) -> PreprocessedData {
    let sites = specs
        .iter()
        .enumerate()
        .map(|(i, (label, headers, variant))| {
            let mut point = DetectionDataPoint::new(
                format!("https://host{i}.example.com/"),
                "2024-01-01T00:00:00Z".parse().unwrap(),
            );
            for &h in headers {
                point
                    .http_headers
                    .insert(HEADER_POOL[h].to_string(), HeaderValue::from(format!("v{variant}").as_str()));
            }
            SiteData::from_snapshot(&point, Some(LABEL_POOL[*label]), None).unwrap()
        })
        .collect();
    PreprocessedData::from_sites(sites)
}

fn arb_hint() -> impl Strategy<Value = VersionHint> {
    (
        prop::sample::select(vec![
            "5.9", "6.4", "6.4.2", "10.1", "9", "10", "10a", "6.5", "6.5-RC1", "6.5.1", "6.05",
        ]),
        prop::sample::select(vec![
            VersionSource::MetaGenerator,
            VersionSource::HttpHeader,
            VersionSource::ScriptPath,
        ]),
        prop::sample::select(vec![HintConfidence::Low, HintConfidence::Medium, HintConfidence::High]),
    )
        .prop_map(|(version, source, confidence)| VersionHint {
            version: version.to_string(),
            source,
            confidence,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pattern_statistics_stay_consistent(
        specs in prop::collection::vec(arb_site(), 0..40),
        min_occurrences in 1usize..6,
    ) {
        let data = build_corpus(&specs);
        let options = AnalysisOptions {
            min_occurrences,
            min_sites: 10,
            ..AnalysisOptions::default()
        };

        let results = run_analysis(&data, &options, &TechnologyTable::builtin().unwrap()).unwrap();

        prop_assert_eq!(results.summary.total_sites, specs.len());
        prop_assert_eq!(results.summary.statistically_unreliable, specs.len() < 10);
        for (name, patterns) in results.dimensions() {
            for (key, pattern) in patterns {
                prop_assert_eq!(key, &pattern.pattern);
                prop_assert!(pattern.site_count >= min_occurrences, "{}/{}", name, key);
                prop_assert!(pattern.site_count <= specs.len());
                prop_assert_eq!(pattern.sites.len(), pattern.site_count);
                let expected = pattern.site_count as f64 / specs.len() as f64;
                prop_assert!((pattern.frequency - expected).abs() < 1e-9);
                for example in &pattern.examples {
                    prop_assert!(example.site_count <= pattern.site_count);
                }
            }
        }
    }

    #[test]
    fn header_site_counts_match_a_direct_count(specs in prop::collection::vec(arb_site(), 1..30)) {
        let data = build_corpus(&specs);
        let options = AnalysisOptions { min_occurrences: 1, ..AnalysisOptions::default() };

        let results = run_analysis(&data, &options, &TechnologyTable::builtin().unwrap()).unwrap();

        for (idx, name) in HEADER_POOL.iter().enumerate() {
            let direct = specs.iter().filter(|(_, headers, _)| headers.contains(&idx)).count();
            let counted = results.headers.patterns.get(*name).map_or(0, |p| p.site_count);
            prop_assert_eq!(counted, direct, "{}", name);
        }
    }

    #[test]
    fn best_version_ignores_hint_order(
        (hints, shuffled) in prop::collection::vec(arb_hint(), 1..8)
            .prop_flat_map(|hints| (Just(hints.clone()), Just(hints).prop_shuffle()))
    ) {
        let mut reversed = hints.clone();
        reversed.reverse();

        let forward = select_best_version(&hints).map(|h| h.version.clone());
        let backward = select_best_version(&reversed).map(|h| h.version.clone());
        let permuted = select_best_version(&shuffled).map(|h| h.version.clone());

        prop_assert!(forward.is_some());
        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &permuted);
    }
}
