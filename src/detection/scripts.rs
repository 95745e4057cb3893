use std::time::Duration;

use super::strategy::{
    DetectionStrategy, PartialDetectionResult, SignalRule, SignalScore, DEFAULT_STRATEGY_TIMEOUT,
};
use super::version::VersionSource;
use crate::snapshot::DetectionDataPoint;

/// Script URL and inline-script evidence. Versions come from asset query strings such as
/// `?ver=6.4.2`.
pub struct ScriptStrategy {
    src_rules: Vec<SignalRule>,
    inline_rules: Vec<SignalRule>,
    timeout: Duration,
}

impl ScriptStrategy {
    pub fn new(src_rules: Vec<SignalRule>, inline_rules: Vec<SignalRule>) -> Self {
        Self {
            src_rules,
            inline_rules,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }
}

impl DetectionStrategy for ScriptStrategy {
    fn name(&self) -> &str {
        "script-urls"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        if snapshot.scripts.is_empty() {
            return PartialDetectionResult::none();
        }
        let mut score = SignalScore::new();

        for rule in &self.src_rules {
            if let Some((src, version)) = rule.first_hit(snapshot.script_sources()) {
                score.record(rule, src, version);
            }
        }

        let inline_bodies = snapshot
            .scripts
            .iter()
            .filter(|s| s.src.is_none())
            .filter_map(|s| s.content.as_deref());
        let inline_bodies: Vec<&str> = inline_bodies.collect();
        for rule in &self.inline_rules {
            if rule.first_hit(inline_bodies.iter().copied()).is_some() {
                score.record(rule, "inline script", None);
            }
        }

        score.finish(Some(VersionSource::ScriptPath))
    }
}
