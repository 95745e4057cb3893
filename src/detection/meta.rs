use std::time::Duration;

use super::strategy::{
    DetectionStrategy, PartialDetectionResult, SignalRule, SignalScore, DEFAULT_STRATEGY_TIMEOUT,
};
use super::version::VersionSource;
use crate::snapshot::DetectionDataPoint;

/// A rule over the content of meta tags identified by `kind` (`name`, `property`,
/// `http-equiv`) and `key`.
#[derive(Debug, Clone)]
pub struct MetaRule {
    pub kind: &'static str,
    pub key: String,
    pub rule: SignalRule,
}

impl MetaRule {
    pub fn named(key: &str, rule: SignalRule) -> Self {
        Self {
            kind: "name",
            key: key.to_ascii_lowercase(),
            rule,
        }
    }

    pub fn property(key: &str, rule: SignalRule) -> Self {
        Self {
            kind: "property",
            key: key.to_ascii_lowercase(),
            rule,
        }
    }
}

pub struct MetaTagStrategy {
    rules: Vec<MetaRule>,
    timeout: Duration,
}

impl MetaTagStrategy {
    pub fn new(rules: Vec<MetaRule>) -> Self {
        Self {
            rules,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }
}

impl DetectionStrategy for MetaTagStrategy {
    fn name(&self) -> &str {
        "meta-tags"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        let mut score = SignalScore::new();
        for meta_rule in &self.rules {
            let contents = snapshot.meta_tags.iter().filter_map(|tag| match tag.key() {
                Some((kind, key))
                    if kind == meta_rule.kind && key.trim().eq_ignore_ascii_case(&meta_rule.key) =>
                {
                    Some(tag.content.as_str())
                }
                _ => None,
            });
            if let Some((content, version)) = meta_rule.rule.first_hit(contents) {
                let location = format!("{}={}: {}", meta_rule.kind, meta_rule.key, content);
                score.record(&meta_rule.rule, &location, version);
            }
        }
        score.finish(Some(VersionSource::MetaGenerator))
    }
}
