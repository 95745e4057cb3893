use std::sync::Arc;
use std::time::Duration;

use cmsprobe::detection::signatures::WORDPRESS;
use cmsprobe::detection::{
    CmsDetector, DetectionStrategy, Detector, DetectorConfig, PartialDetectionResult,
    WeightedStrategy, UNKNOWN_CMS,
};
use cmsprobe::snapshot::{DetectionDataPoint, HeaderValue, MetaTag, ScriptInfo};

struct Fixed {
    name: &'static str,
    confidence: f64,
    delay: Duration,
    timeout: Duration,
}

impl Fixed {
    fn instant(name: &'static str, confidence: f64) -> Arc<dyn DetectionStrategy> {
        Arc::new(Fixed {
            name,
            confidence,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        })
    }
}

impl DetectionStrategy for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, _snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        PartialDetectionResult {
            confidence: self.confidence,
            evidence: vec![format!("{} fired", self.name)],
            ..PartialDetectionResult::none()
        }
    }
}

struct Panicking;

impl DetectionStrategy for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn detect(&self, _snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        panic!("strategy blew up")
    }
}

fn blank(url: &str) -> DetectionDataPoint {
    DetectionDataPoint::new(url, "2024-05-01T00:00:00Z".parse().unwrap())
}

fn wordpress_snapshot() -> DetectionDataPoint {
    let mut point = blank("https://blog.example.com/");
    point.meta_tags.push(MetaTag {
        name: Some("generator".into()),
        content: "WordPress 6.5".into(),
        ..Default::default()
    });
    point.scripts.push(ScriptInfo {
        src: Some("/wp-includes/js/jquery/jquery.min.js".into()),
        ..Default::default()
    });
    point
        .http_headers
        .insert("Link".into(), HeaderValue::from("<https://blog.example.com/wp-json/>; rel=\"https://api.w.org/\""));
    point
}

#[tokio::test]
async fn builtin_signatures_classify_wordpress_with_generator_version() {
    let detector = Detector::with_builtin_signatures(DetectorConfig::default()).unwrap();
    let result = detector.classify(Arc::new(wordpress_snapshot())).await;

    assert_eq!(result.cms, WORDPRESS);
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    assert_eq!(result.version.as_deref(), Some("6.5"));
    assert_eq!(result.candidate_scores.len(), detector.candidates().len());
    assert!(result
        .candidate_scores
        .iter()
        .all(|(cms, score)| cms == WORDPRESS || *score < result.confidence));
}

#[tokio::test]
async fn empty_snapshot_is_unknown() {
    let detector = Detector::with_builtin_signatures(DetectorConfig::default()).unwrap();
    let result = detector.classify(Arc::new(blank("https://plain.example.org"))).await;

    assert_eq!(result.cms, UNKNOWN_CMS);
    assert!(result.is_unknown());
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.version, None);
}

#[tokio::test]
async fn slow_strategy_times_out_without_blocking_the_others() {
    let slow: Arc<dyn DetectionStrategy> = Arc::new(Fixed {
        name: "slow",
        confidence: 1.0,
        delay: Duration::from_millis(500),
        timeout: Duration::from_millis(50),
    });
    let detector = Detector::new(
        vec![
            CmsDetector::new("Alpha", vec![WeightedStrategy::new(slow, 1.0)]),
            CmsDetector::new("Beta", vec![WeightedStrategy::new(Fixed::instant("fast", 0.6), 1.0)]),
        ],
        DetectorConfig::default(),
    );

    let result = detector.classify(Arc::new(blank("https://example.com"))).await;

    assert_eq!(result.cms, "Beta");
    assert!((result.confidence - 0.6).abs() < 1e-9);
    assert_eq!(result.candidate_scores["Alpha"], 0.0);
    let slow_evidence = result
        .evidence_per_strategy
        .iter()
        .find(|e| e.strategy == "slow")
        .unwrap();
    assert_eq!(slow_evidence.confidence, 0.0);
    assert!(slow_evidence.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn configured_timeout_overrides_strategy_timeouts() {
    let slow: Arc<dyn DetectionStrategy> = Arc::new(Fixed {
        name: "slow",
        confidence: 0.9,
        delay: Duration::from_millis(400),
        timeout: Duration::from_secs(5),
    });
    let config = DetectorConfig {
        strategy_timeout: Some(Duration::from_millis(40)),
        ..DetectorConfig::default()
    };
    let detector = Detector::new(
        vec![CmsDetector::new("Alpha", vec![WeightedStrategy::new(slow, 1.0)])],
        config,
    );

    let result = detector.classify(Arc::new(blank("https://example.com"))).await;

    assert_eq!(result.cms, UNKNOWN_CMS);
    assert!(result.evidence_per_strategy[0].error.is_some());
}

#[tokio::test]
async fn panicking_strategy_only_loses_its_own_contribution() {
    let detector = Detector::new(
        vec![CmsDetector::new(
            "Alpha",
            vec![
                WeightedStrategy::new(Arc::new(Panicking), 1.0),
                WeightedStrategy::new(Fixed::instant("steady", 0.8), 1.0),
            ],
        )],
        DetectorConfig::default(),
    );

    let result = detector.classify(Arc::new(blank("https://example.com"))).await;

    assert_eq!(result.cms, "Alpha");
    assert!((result.confidence - 0.4).abs() < 1e-9);
    let failed = result
        .evidence_per_strategy
        .iter()
        .find(|e| e.strategy == "panicking")
        .unwrap();
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn ties_go_to_the_earlier_candidate() {
    let detector = Detector::new(
        vec![
            CmsDetector::new("First", vec![WeightedStrategy::new(Fixed::instant("a", 0.5), 1.0)]),
            CmsDetector::new("Second", vec![WeightedStrategy::new(Fixed::instant("b", 0.5), 1.0)]),
        ],
        DetectorConfig::default(),
    );

    let result = detector.classify(Arc::new(blank("https://example.com"))).await;
    assert_eq!(result.cms, "First");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn classify_many_keeps_input_order() {
    let detector = Arc::new(Detector::with_builtin_signatures(DetectorConfig::default()).unwrap());
    let snapshots = vec![
        blank("https://one.example.com"),
        wordpress_snapshot(),
        blank("https://three.example.com"),
    ];

    let results = detector.classify_many(snapshots).await;

    let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        ["https://one.example.com", "https://blog.example.com/", "https://three.example.com"]
    );
    assert_eq!(results[1].cms, WORDPRESS);
    assert!(results[0].is_unknown() && results[2].is_unknown());
}
