use std::time::Duration;

use super::strategy::{
    DetectionStrategy, PartialDetectionResult, SignalRule, SignalScore, DEFAULT_STRATEGY_TIMEOUT,
};
use crate::snapshot::DetectionDataPoint;

/// robots.txt evidence. Rules see each directive line lower-cased with whitespace
/// collapsed, so `Disallow:   /wp-admin/` matches `disallow: /wp-admin/`.
pub struct RobotsTxtStrategy {
    rules: Vec<SignalRule>,
    timeout: Duration,
}

impl RobotsTxtStrategy {
    pub fn new(rules: Vec<SignalRule>) -> Self {
        Self {
            rules,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }
}

pub fn normalized_directives(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .map(|line| {
            line.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_lowercase()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

impl DetectionStrategy for RobotsTxtStrategy {
    fn name(&self) -> &str {
        "robots-txt"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        let Some(robots) = snapshot.robots_txt.as_ref() else {
            return PartialDetectionResult::none();
        };
        if !robots.accessible && robots.content.trim().is_empty() {
            return PartialDetectionResult::none();
        }

        let lines = normalized_directives(&robots.content);
        let mut score = SignalScore::new();
        for rule in &self.rules {
            if let Some((line, _)) = rule.first_hit(lines.iter().map(String::as_str)) {
                score.record(rule, line, None);
            }
        }
        score.finish(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RobotsTxtCapture;
    use chrono::Utc;

    #[test]
    fn directives_are_normalized_before_matching() {
        let strategy = RobotsTxtStrategy::new(vec![SignalRule::literal(
            "robots:wp-admin",
            "disallow: /wp-admin/",
            0.6,
        )]);
        let mut point = DetectionDataPoint::new("https://example.com", Utc::now());
        point.robots_txt = Some(RobotsTxtCapture {
            content: "User-agent: *\nDisallow:    /wp-admin/   # admin\n".into(),
            accessible: true,
            ..Default::default()
        });
        let result = strategy.detect(&point, &point.url);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn comments_are_ignored() {
        assert_eq!(
            normalized_directives("# Disallow: /administrator/\nAllow: /"),
            vec!["allow: /".to_string()]
        );
    }

    #[test]
    fn missing_robots_is_a_miss() {
        let strategy = RobotsTxtStrategy::new(vec![SignalRule::literal("r", "disallow", 0.1)]);
        let point = DetectionDataPoint::new("https://example.com", Utc::now());
        assert_eq!(strategy.detect(&point, &point.url), PartialDetectionResult::none());
    }
}
