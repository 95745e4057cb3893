use std::time::Duration;

use super::strategy::{
    DetectionStrategy, PartialDetectionResult, SignalRule, SignalScore, DEFAULT_STRATEGY_TIMEOUT,
};
use super::version::VersionSource;
use crate::error::SignatureError;
use crate::snapshot::DetectionDataPoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderName {
    Named(String),
    /// Search every header.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIn {
    Name,
    Value,
    Both,
}

#[derive(Debug, Clone)]
pub struct HeaderPattern {
    pub header: HeaderName,
    pub rule: SignalRule,
    pub search_in: SearchIn,
}

impl HeaderPattern {
    /// Matches when the named header's value contains `needle`.
    pub fn value_contains(header: &str, needle: &str, weight: f64) -> Self {
        Self {
            header: HeaderName::Named(header.to_ascii_lowercase()),
            rule: SignalRule::literal(&format!("header:{header}"), needle, weight),
            search_in: SearchIn::Value,
        }
    }

    /// Matches when the named header's value matches `pattern`; the first capture group
    /// becomes the version.
    pub fn value_version(header: &str, pattern: &str, weight: f64) -> Result<Self, SignatureError> {
        Ok(Self {
            header: HeaderName::Named(header.to_ascii_lowercase()),
            rule: SignalRule::versioned(&format!("header:{header}"), pattern, weight)?,
            search_in: SearchIn::Value,
        })
    }

    pub fn value_matches(header: &str, pattern: &str, weight: f64) -> Result<Self, SignatureError> {
        Ok(Self {
            header: HeaderName::Named(header.to_ascii_lowercase()),
            rule: SignalRule::regex(&format!("header:{header}"), pattern, weight)?,
            search_in: SearchIn::Value,
        })
    }

    pub fn present(header: &str, weight: f64) -> Self {
        Self {
            header: HeaderName::Named(header.to_ascii_lowercase()),
            rule: SignalRule::literal(&format!("header:{header}"), header, weight),
            search_in: SearchIn::Name,
        }
    }

    /// Matches when any header name matches `pattern`.
    pub fn any_name(pattern: &str, weight: f64) -> Result<Self, SignatureError> {
        Ok(Self {
            header: HeaderName::Any,
            rule: SignalRule::regex(&format!("header-name:{pattern}"), pattern, weight)?,
            search_in: SearchIn::Name,
        })
    }

    /// Matches when any header value contains `needle`.
    pub fn any_value(needle: &str, weight: f64) -> Self {
        Self {
            header: HeaderName::Any,
            rule: SignalRule::literal(&format!("header-value:{needle}"), needle, weight),
            search_in: SearchIn::Value,
        }
    }

    fn matches(&self, name: &str, value: &str) -> Option<Option<String>> {
        if let HeaderName::Named(expected) = &self.header {
            if !name.eq_ignore_ascii_case(expected) {
                return None;
            }
            // A named header searched by name only needs to be present.
            if self.search_in == SearchIn::Name {
                return Some(None);
            }
        }
        let version = |found: Option<String>| found.filter(|_| self.rule.extract_version);
        match self.search_in {
            SearchIn::Name => self.rule.matcher.find(name).map(version),
            SearchIn::Value => self.rule.matcher.find(value).map(version),
            SearchIn::Both => self
                .rule
                .matcher
                .find(name)
                .or_else(|| self.rule.matcher.find(value))
                .map(version),
        }
    }
}

pub struct HeaderStrategy {
    patterns: Vec<HeaderPattern>,
    timeout: Duration,
}

impl HeaderStrategy {
    pub fn new(patterns: Vec<HeaderPattern>) -> Self {
        Self {
            patterns,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rule_count(&self) -> usize {
        self.patterns.len()
    }
}

impl DetectionStrategy for HeaderStrategy {
    fn name(&self) -> &str {
        "http-headers"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn detect(&self, snapshot: &DetectionDataPoint, _url: &str) -> PartialDetectionResult {
        if snapshot.http_headers.is_empty() {
            return PartialDetectionResult::none();
        }
        let headers: Vec<(String, String)> = snapshot
            .http_headers
            .iter()
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.joined()))
            .collect();

        let mut score = SignalScore::new();
        for pattern in &self.patterns {
            let hit = headers.iter().find_map(|(name, value)| {
                pattern
                    .matches(name, value)
                    .map(|version| (format!("{name}: {value}"), version))
            });
            if let Some((location, version)) = hit {
                score.record(&pattern.rule, &location, version);
            }
        }
        score.finish(Some(VersionSource::HttpHeader))
    }
}
