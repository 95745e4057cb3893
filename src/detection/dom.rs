use std::time::Duration;

use super::strategy::{
    DetectionStrategy, PartialDetectionResult, SignalRule, SignalScore, DEFAULT_STRATEGY_TIMEOUT,
};
use crate::snapshot::DetectionDataPoint;

#[derive(Debug, Clone)]
pub enum DomRule {
    /// Searched in the raw HTML and in every captured element sample.
    Markup(SignalRule),
    /// Satisfied when the renderer captured at least one element for this selector.
    Selector { selector: String, weight: f64 },
}

pub struct DomStrategy {
    rules: Vec<DomRule>,
    timeout: Duration,
}

impl DomStrategy {
    pub fn new(rules: Vec<DomRule>) -> Self {
        Self {
            rules,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }
}

impl DetectionStrategy for DomStrategy {
    fn name(&self) -> &str {
        "dom-structure"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        let html = snapshot.html_content.as_deref().unwrap_or_default();
        if html.is_empty() && snapshot.dom_elements.is_empty() {
            return PartialDetectionResult::none();
        }

        let mut score = SignalScore::new();
        for rule in &self.rules {
            match rule {
                DomRule::Markup(signal) => {
                    let haystacks = std::iter::once(html).chain(
                        snapshot
                            .dom_elements
                            .iter()
                            .filter_map(|e| e.sample.as_deref()),
                    );
                    if signal.first_hit(haystacks).is_some() {
                        score.record(signal, "html", None);
                    }
                }
                DomRule::Selector { selector, weight } => {
                    let found = snapshot
                        .dom_elements
                        .iter()
                        .find(|e| e.count > 0 && e.selector.trim() == selector.as_str());
                    if let Some(element) = found {
                        let signal = SignalRule::literal(&format!("selector:{selector}"), selector, *weight);
                        score.record(&signal, &format!("{} x{}", element.selector, element.count), None);
                    }
                }
            }
        }
        score.finish(None)
    }
}
