use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A header value as captured by the renderer. Some headers (`set-cookie`, `link`)
/// arrive as several values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// Flattens the value into one string, joining repeated values with `"; "`.
    pub fn joined(&self) -> String {
        match self {
            HeaderValue::Single(value) => value.clone(),
            HeaderValue::Multiple(values) => values.join("; "),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Single(value.to_string())
    }
}

pub type HeaderMap = BTreeMap<String, HeaderValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_equiv: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl MetaTag {
    /// Returns the identifying attribute of the tag as `(kind, value)`, preferring
    /// `name`, then `property`, then `http-equiv`.
    pub fn key(&self) -> Option<(&'static str, &str)> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(("name", name));
        }
        if let Some(property) = self.property.as_deref().filter(|p| !p.trim().is_empty()) {
            return Some(("property", property));
        }
        self.http_equiv
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .map(|h| ("http-equiv", h))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default)]
    pub inline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomElement {
    pub selector: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsTxtCapture {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub accessible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub http_headers: HeaderMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedDetection {
    pub detector: String,
    pub cms: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureError {
    pub stage: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDataPoint {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_version: Option<String>,
    #[serde(default)]
    pub http_headers: HeaderMap,
    #[serde(default)]
    pub meta_tags: Vec<MetaTag>,
    #[serde(default)]
    pub scripts: Vec<ScriptInfo>,
    #[serde(default)]
    pub dom_elements: Vec<DomElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots_txt: Option<RobotsTxtCapture>,
    #[serde(default)]
    pub detection_results: Vec<RecordedDetection>,
    #[serde(default)]
    pub errors: Vec<CaptureError>,
}

impl DetectionDataPoint {
    pub fn new(url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            timestamp,
            original_url: None,
            final_url: None,
            status_code: None,
            user_agent: None,
            capture_version: None,
            http_headers: HeaderMap::new(),
            meta_tags: Vec::new(),
            scripts: Vec::new(),
            dom_elements: Vec::new(),
            html_content: None,
            robots_txt: None,
            detection_results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn effective_url(&self) -> &str {
        self.final_url.as_deref().unwrap_or(&self.url)
    }

    /// Highest-confidence recorded detection, skipping `Unknown` labels.
    pub fn best_recorded_detection(&self) -> Option<&RecordedDetection> {
        self.detection_results
            .iter()
            .filter(|d| d.confidence > 0.0 && !d.cms.eq_ignore_ascii_case("unknown"))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn script_sources(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| s.src.as_deref())
    }

    pub fn meta_content(&self, kind: &str, key: &str) -> Option<&str> {
        self.meta_tags.iter().find_map(|tag| match tag.key() {
            Some((k, v)) if k == kind && v.eq_ignore_ascii_case(key) => Some(tag.content.as_str()),
            _ => None,
        })
    }
}
