use cmsprobe::analyzers::HeaderCategory;
use cmsprobe::error::AnalysisError;
use cmsprobe::recommend::{ConfidenceDistribution, ConfidenceLevel, RecommendationKind};
use cmsprobe::snapshot::{DetectionDataPoint, HeaderValue, ScriptInfo};
use cmsprobe::{
    run_analysis, AggregatedResults, AnalysisOptions, PreprocessedData, SiteData, TechnologyTable,
};

const LABELS: [&str; 4] = ["WordPress", "Drupal", "Joomla", "Duda"];

fn site(i: usize, label: Option<&str>, headers: &[(&str, &str)]) -> SiteData {
    let mut point = DetectionDataPoint::new(
        format!("https://site{i}.example.com/"),
        "2024-05-01T00:00:00Z".parse().unwrap(),
    );
    for (name, value) in headers {
        point.http_headers.insert(name.to_string(), HeaderValue::from(*value));
    }
    SiteData::from_snapshot(&point, label, None).unwrap()
}

fn options(min_occurrences: usize, min_sites: usize) -> AnalysisOptions {
    AnalysisOptions {
        min_occurrences,
        min_sites,
        include_recommendations: true,
        ..AnalysisOptions::default()
    }
}

fn analyze(sites: Vec<SiteData>, options: &AnalysisOptions) -> AggregatedResults {
    let data = PreprocessedData::from_sites(sites);
    run_analysis(&data, options, &TechnologyTable::builtin().unwrap()).unwrap()
}

#[test]
fn powered_by_on_forty_of_a_hundred_sites() {
    let sites = (0..100)
        .map(|i| {
            let label = LABELS[i % LABELS.len()];
            if i < 40 {
                site(i, Some(label), &[("X-Powered-By", "WordPress"), ("content-type", "text/html")])
            } else {
                site(i, Some(label), &[("content-type", "text/html")])
            }
        })
        .collect();

    let results = analyze(sites, &options(10, 50));

    let powered_by = &results.headers.patterns["x-powered-by"];
    assert_eq!(powered_by.site_count, 40);
    assert!((powered_by.frequency - 0.4).abs() < 1e-9);
    assert_eq!(powered_by.sites.len(), 40);
    assert!(!results.summary.statistically_unreliable);

    let recs = results.recommendations.as_ref().unwrap();
    let rec = recs
        .filtering
        .recommendations
        .iter()
        .find(|r| r.pattern == "x-powered-by")
        .unwrap();
    assert_eq!(rec.action, RecommendationKind::Retain);
    assert_eq!(rec.kind, RecommendationKind::Filter);
}

#[test]
fn ubiquitous_header_across_four_platforms_gets_floor_confidence() {
    let sites = (0..100)
        .map(|i| {
            let label = LABELS[i % LABELS.len()];
            if i < 95 {
                site(i, Some(label), &[("x-custom-thing", "1")])
            } else {
                site(i, Some(label), &[("x-other", "1")])
            }
        })
        .collect();

    let results = analyze(sites, &options(5, 10));

    let confidence = results.headers.analyzer_specific.pattern_confidence["x-custom-thing"];
    assert!((confidence - 0.1).abs() < 1e-9);

    let recs = results.recommendations.as_ref().unwrap();
    let rec = recs
        .filtering
        .recommendations
        .iter()
        .find(|r| r.pattern == "x-custom-thing")
        .unwrap();
    assert_eq!(rec.action, RecommendationKind::Retain);
    assert!(rec.reasoning.contains("structural"));
    assert!((rec.confidence.value - 0.1).abs() < 1e-9);
    assert_eq!(rec.confidence.level, ConfidenceLevel::Low);

    assert_eq!(
        results.semantics.analyzer_specific.category_of("x-custom-thing"),
        HeaderCategory::Custom
    );
    assert!(recs
        .retention
        .recommendations
        .iter()
        .any(|r| r.pattern == "x-custom-thing"));
}

#[test]
fn common_security_header_is_filtered() {
    let sites = (0..20)
        .map(|i| {
            if i < 10 {
                site(i, Some("WordPress"), &[("Strict-Transport-Security", "max-age=31536000")])
            } else {
                site(i, Some("Drupal"), &[("server", "nginx")])
            }
        })
        .collect();

    let results = analyze(sites, &options(2, 10));
    let recs = results.recommendations.as_ref().unwrap();
    let rec = recs
        .filtering
        .recommendations
        .iter()
        .find(|r| r.pattern == "strict-transport-security")
        .unwrap();
    assert_eq!(rec.action, RecommendationKind::Filter);
    assert!(recs.filtering.filter_count >= 1);
}

#[test]
fn header_names_fold_case_across_sites() {
    let sites = vec![
        site(1, None, &[("X-Powered-By", "PHP/8.2")]),
        site(2, None, &[("x-powered-by", "PHP/8.2")]),
        site(3, None, &[("X-POWERED-BY", "Express")]),
    ];

    let results = analyze(sites, &options(1, 1));

    assert_eq!(
        results.headers.patterns.keys().filter(|k| k.contains("powered")).count(),
        1
    );
    let pattern = &results.headers.patterns["x-powered-by"];
    assert_eq!(pattern.site_count, 3);
    assert!((pattern.frequency - 1.0).abs() < 1e-9);
    let php = pattern.examples.iter().find(|e| e.value == "PHP/8.2").unwrap();
    assert_eq!(php.site_count, 2);
}

#[test]
fn every_result_agrees_on_total_sites() {
    let sites = (0..12)
        .map(|i| site(i, Some(LABELS[i % 2]), &[("server", "nginx"), ("cf-ray", "abc-IAD")]))
        .collect();

    let results = analyze(sites, &options(1, 5));

    assert_eq!(results.summary.total_sites, 12);
    for (name, patterns) in results.dimensions() {
        for pattern in patterns.values() {
            assert!(pattern.site_count <= 12, "{name}/{} exceeds corpus", pattern.pattern);
        }
    }
    assert_eq!(results.headers.total_sites, 12);
    assert_eq!(results.meta_tags.total_sites, 12);
    assert_eq!(results.scripts.total_sites, 12);
    assert_eq!(results.vendors.total_sites, 12);
    assert_eq!(results.semantics.total_sites, 12);
}

#[test]
fn vendor_headers_are_attributed() {
    let sites = (0..10)
        .map(|i| site(i, Some("WordPress"), &[("cf-ray", "8a1b2c3d4e5f-IAD"), ("server", "cloudflare")]))
        .collect();

    let results = analyze(sites, &options(1, 5));

    let vendor = &results.vendors.analyzer_specific.header_vendors["cf-ray"];
    assert_eq!(vendor.vendor, "Cloudflare");
    let refinements = &results.recommendations.as_ref().unwrap().refinement;
    let suggestion = refinements
        .suggestions
        .iter()
        .find(|s| s.recommendation.pattern == "cf-ray")
        .unwrap();
    assert_eq!(suggestion.refined_pattern, "cf-ray:cloudflare");
    assert_eq!(suggestion.estimated_site_count, 6);
}

#[test]
fn repeated_runs_produce_identical_patterns() {
    let build = || -> Vec<SiteData> {
        (0..30)
            .map(|i| {
                let mut headers = vec![("server", "nginx")];
                if i % 3 == 0 {
                    headers.push(("x-drupal-cache", "HIT"));
                }
                if i % 5 == 0 {
                    headers.push(("x-pingback", "https://example.com/xmlrpc.php"));
                }
                site(i, Some(LABELS[i % LABELS.len()]), &headers)
            })
            .collect()
    };
    let opts = options(2, 10);

    let first = analyze(build(), &opts);
    let second = analyze(build(), &opts);

    for ((name, a), (_, b)) in first.dimensions().into_iter().zip(second.dimensions()) {
        assert_eq!(a, b, "{name} differs between runs");
    }
    assert_eq!(first.summary.dimensions, second.summary.dimensions);
    assert_eq!(
        first.bias.as_ref().unwrap().discriminative_patterns,
        second.bias.as_ref().unwrap().discriminative_patterns
    );
}

#[test]
fn small_corpus_is_flagged_not_rejected() {
    let sites = (0..3).map(|i| site(i, Some("WordPress"), &[("server", "nginx")])).collect();

    let results = analyze(sites, &options(1, 10));

    assert!(results.summary.statistically_unreliable);
    assert_eq!(results.headers.patterns["server"].site_count, 3);
}

#[test]
fn empty_corpus_yields_empty_results() {
    let results = analyze(Vec::new(), &options(1, 10));

    assert_eq!(results.summary.total_sites, 0);
    assert!(results.headers.patterns.is_empty());
    assert!(results.summary.statistically_unreliable);

    let even = ConfidenceDistribution {
        low: 0.25,
        medium: 0.25,
        high: 0.25,
        very_high: 0.25,
    };
    let recs = results.recommendations.as_ref().unwrap();
    assert!(recs.filtering.recommendations.is_empty());
    assert_eq!(recs.filtering.filter_count, 0);
    assert_eq!(recs.filtering.retain_count, 0);
    assert_eq!(recs.filtering.confidence_distribution, even);
    assert!(recs.retention.recommendations.is_empty());
    assert_eq!(recs.retention.average_confidence, 0.0);
    assert_eq!(recs.retention.confidence_distribution, even);
    assert!(recs.refinement.suggestions.is_empty());
    assert_eq!(recs.refinement.confidence_distribution, even);
}

#[test]
fn scripts_on_a_sibling_subdomain_count_as_first_party() {
    let sites = ["ibm", "cnn", "bbc"]
        .iter()
        .map(|name| {
            let mut point = DetectionDataPoint::new(
                format!("https://www.{name}.com/"),
                "2024-05-01T00:00:00Z".parse().unwrap(),
            );
            point.scripts.push(ScriptInfo {
                src: Some(format!("https://cdn.{name}.com/assets/js/app.js")),
                ..Default::default()
            });
            SiteData::from_snapshot(&point, None, None).unwrap()
        })
        .collect();

    let results = analyze(sites, &options(1, 1));

    assert_eq!(results.scripts.patterns["path:/assets/js"].site_count, 3);
    assert!(results.scripts.patterns.keys().all(|k| !k.starts_with("host:")));
}

#[test]
fn scripts_split_into_first_party_and_hosts() {
    let sites = (0..6)
        .map(|i| {
            let mut point = DetectionDataPoint::new(
                format!("https://shop{i}.example.org/"),
                "2024-05-01T00:00:00Z".parse().unwrap(),
            );
            point.scripts.push(ScriptInfo {
                src: Some("/wp-content/plugins/cart/cart.js".into()),
                ..Default::default()
            });
            point.scripts.push(ScriptInfo {
                src: Some("https://www.googletagmanager.com/gtm.js?id=GTM-1".into()),
                ..Default::default()
            });
            SiteData::from_snapshot(&point, Some("WordPress"), None).unwrap()
        })
        .collect();

    let results = analyze(sites, &options(2, 5));

    assert_eq!(results.scripts.patterns["path:/wp-content/plugins"].site_count, 6);
    assert_eq!(results.scripts.patterns["host:googletagmanager.com"].site_count, 6);
}

#[test]
fn results_survive_a_json_round_trip() {
    let sites = (0..10)
        .map(|i| site(i, Some(LABELS[i % LABELS.len()]), &[("server", "nginx"), ("x-wp-total", "4")]))
        .collect();
    let results = analyze(sites, &options(1, 5));

    let json = serde_json::to_string(&results).unwrap();
    let restored: AggregatedResults = serde_json::from_str(&json).unwrap();

    assert!(restored.recommendations.is_some());
    assert!(restored.bias.is_some());
    assert_eq!(restored, results);
}

#[test]
fn inconsistent_results_are_fatal() {
    use cmsprobe::aggregate::validate_result;
    use cmsprobe::stats::{AnalysisMetadata, AnalysisResult, PatternData};
    use std::collections::{BTreeMap, BTreeSet};

    let mut patterns = BTreeMap::new();
    patterns.insert(
        "server".to_string(),
        PatternData {
            pattern: "server".into(),
            site_count: 3,
            sites: BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]),
            frequency: 0.9,
            examples: Vec::new(),
            occurrence_count: None,
            metadata: BTreeMap::new(),
        },
    );
    let result = AnalysisResult {
        patterns,
        total_sites: 10,
        metadata: AnalysisMetadata {
            analyzer: "headers".into(),
            analyzed_at: chrono::Utc::now(),
            total_patterns_found: 1,
            total_patterns_after_filtering: 1,
            options: AnalysisOptions::default(),
        },
        analyzer_specific: (),
    };

    let err = validate_result(&result, 10, 1).unwrap_err();
    assert!(matches!(err, AnalysisError::FrequencyMismatch { .. }));
}
