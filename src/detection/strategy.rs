use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::version::{HintConfidence, VersionHint, VersionSource};
use crate::error::SignatureError;
use crate::snapshot::DetectionDataPoint;

pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(5);

/// One evidence source evaluated against an already-captured snapshot for one CMS.
///
/// Implementations are pure over the snapshot. They report failures through
/// [`PartialDetectionResult::failed`] instead of panicking; the detector still isolates
/// panics and timeouts so a misbehaving strategy only costs its own contribution.
///
/// `detect` runs on the blocking pool. A timeout only discards the result; the call keeps
/// its thread until it returns, so implementations must terminate and never block on I/O
/// or loop without bound.
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration {
        DEFAULT_STRATEGY_TIMEOUT
    }

    fn detect(&self, snapshot: &DetectionDataPoint, url: &str) -> PartialDetectionResult;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDetectionResult {
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionHint>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PartialDetectionResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Clamps confidence into `[0, 1]`, mapping non-finite values to zero.
    pub fn sanitized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.error.is_some() {
            self.confidence = 0.0;
        }
        self
    }

    pub fn is_match(&self) -> bool {
        self.error.is_none() && self.confidence > 0.0
    }
}

/// Literal needles match case-insensitively; regexes match as written and may carry a
/// version capture group.
#[derive(Debug, Clone)]
pub enum Matcher {
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    pub fn literal(needle: &str) -> Self {
        Matcher::Substring(needle.to_ascii_lowercase())
    }

    pub fn regex(pattern: &str) -> Result<Self, SignatureError> {
        Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|source| SignatureError::InvalidRegex {
                origin: "signature table".to_string(),
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Returns `Some(capture)` on a match, where the inner option is the first capture
    /// group if the matcher has one and it participated.
    pub fn find(&self, haystack: &str) -> Option<Option<String>> {
        match self {
            Matcher::Substring(needle) => haystack
                .to_ascii_lowercase()
                .contains(needle.as_str())
                .then_some(None),
            Matcher::Pattern(regex) => regex.captures(haystack).map(|caps| {
                caps.get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|v| !v.is_empty())
            }),
        }
    }
}

/// A weighted signal. `id` doubles as the evidence label.
#[derive(Debug, Clone)]
pub struct SignalRule {
    pub id: String,
    pub matcher: Matcher,
    pub weight: f64,
    pub extract_version: bool,
}

impl SignalRule {
    pub fn literal(id: &str, needle: &str, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            matcher: Matcher::literal(needle),
            weight,
            extract_version: false,
        }
    }

    pub fn regex(id: &str, pattern: &str, weight: f64) -> Result<Self, SignatureError> {
        Ok(Self {
            id: id.to_string(),
            matcher: Matcher::regex(pattern)?,
            weight,
            extract_version: false,
        })
    }

    pub fn versioned(id: &str, pattern: &str, weight: f64) -> Result<Self, SignatureError> {
        Ok(Self {
            extract_version: true,
            ..Self::regex(id, pattern, weight)?
        })
    }

    /// Runs the rule over each haystack and stops at the first hit.
    pub fn first_hit<'a>(
        &self,
        haystacks: impl IntoIterator<Item = &'a str>,
    ) -> Option<(&'a str, Option<String>)> {
        haystacks.into_iter().find_map(|h| {
            self.matcher
                .find(h)
                .map(|capture| (h, capture.filter(|_| self.extract_version)))
        })
    }
}

/// Additive score accumulator: every matched rule adds its weight once, the total is
/// clamped to `[0, 1]`.
#[derive(Debug, Default)]
pub struct SignalScore {
    total: f64,
    evidence: Vec<String>,
    version: Option<String>,
}

impl SignalScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: &SignalRule, location: &str, version: Option<String>) {
        self.total += rule.weight;
        self.evidence.push(format!("{} ({})", rule.id, truncate(location, 80)));
        if self.version.is_none() {
            self.version = version;
        }
    }

    pub fn finish(self, version_source: Option<VersionSource>) -> PartialDetectionResult {
        let confidence = self.total.clamp(0.0, 1.0);
        let version = match (self.version, version_source) {
            (Some(version), Some(source)) => Some(VersionHint {
                version,
                source,
                confidence: HintConfidence::from_score(confidence),
            }),
            _ => None,
        };
        PartialDetectionResult {
            confidence,
            version,
            evidence: self.evidence,
            error: None,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matcher_ignores_case() {
        let m = Matcher::literal("WordPress");
        assert_eq!(m.find("Powered by wordpress"), Some(None));
        assert_eq!(m.find("Drupal"), None);
    }

    #[test]
    fn regex_matcher_returns_first_group() {
        let m = Matcher::regex(r"(?i)wordpress\s*([0-9.]+)?").unwrap();
        assert_eq!(m.find("WordPress 6.4.2"), Some(Some("6.4.2".to_string())));
        assert_eq!(m.find("WordPress"), Some(None));
    }

    #[test]
    fn score_is_additive_and_clamped() {
        let strong = SignalRule::literal("a", "x", 0.7);
        let also = SignalRule::literal("b", "y", 0.6);
        let mut score = SignalScore::new();
        score.record(&strong, "x", None);
        score.record(&also, "y", Some("1.0".into()));
        let result = score.finish(Some(VersionSource::HttpHeader));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.evidence.len(), 2);
        let hint = result.version.unwrap();
        assert_eq!(hint.version, "1.0");
        assert_eq!(hint.confidence, HintConfidence::High);
    }

    #[test]
    fn sanitized_zeroes_failures_and_nan() {
        let mut r = PartialDetectionResult::failed("boom");
        r.confidence = 0.8;
        assert_eq!(r.sanitized().confidence, 0.0);
        let nan = PartialDetectionResult {
            confidence: f64::NAN,
            ..Default::default()
        };
        assert_eq!(nan.sanitized().confidence, 0.0);
    }

    #[test]
    fn invalid_regex_is_reported() {
        assert!(SignalRule::regex("bad", "(unclosed", 0.1).is_err());
    }
}
