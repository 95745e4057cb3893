use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use super::{build_result, FrequencyAnalyzer, PatternCounter};
use crate::corpus::PreprocessedData;
use crate::options::AnalysisOptions;
use crate::stats::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderCategory {
    Security,
    Caching,
    Cms,
    Infrastructure,
    Analytics,
    Custom,
    Standard,
    Unknown,
}

impl HeaderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderCategory::Security => "security",
            HeaderCategory::Caching => "caching",
            HeaderCategory::Cms => "cms",
            HeaderCategory::Infrastructure => "infrastructure",
            HeaderCategory::Analytics => "analytics",
            HeaderCategory::Custom => "custom",
            HeaderCategory::Standard => "standard",
            HeaderCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HeaderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SECURITY: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "x-xss-protection",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
    "feature-policy",
    "cross-origin-opener-policy",
    "cross-origin-embedder-policy",
    "cross-origin-resource-policy",
    "expect-ct",
    "x-permitted-cross-domain-policies",
];

const CACHING: &[&str] = &[
    "cache-control",
    "expires",
    "etag",
    "last-modified",
    "age",
    "pragma",
    "x-cache",
    "x-cache-hits",
    "x-cache-status",
    "x-proxy-cache",
    "cf-cache-status",
    "surrogate-control",
    "surrogate-key",
    "x-varnish",
];

const CMS_PREFIXES: &[&str] = &["x-wp-", "x-drupal-", "x-joomla", "x-duda"];
const CMS_NAMES: &[&str] = &["x-generator", "x-pingback", "x-redirect-by", "x-content-encoded-by"];

const INFRASTRUCTURE: &[&str] = &[
    "server",
    "via",
    "x-powered-by",
    "x-served-by",
    "x-request-id",
    "x-runtime",
    "x-timer",
    "x-backend-server",
    "x-hosted-by",
    "alt-svc",
];
const INFRASTRUCTURE_PREFIXES: &[&str] = &["cf-", "x-amz-", "x-akamai-", "x-fastly-", "fastly-", "x-vercel-", "x-nf-"];

const ANALYTICS_FRAGMENTS: &[&str] = &["analytics", "tracking", "x-ga-", "x-clarity"];

const STANDARD: &[&str] = &[
    "date",
    "content-type",
    "content-length",
    "content-encoding",
    "content-language",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "vary",
    "accept-ranges",
    "location",
    "set-cookie",
    "link",
    "allow",
    "server-timing",
    "nel",
    "report-to",
];
const STANDARD_PREFIXES: &[&str] = &["access-control-"];

/// Classifies a normalized header name. CMS markers are checked first so `x-wp-total`
/// is never filed as a custom header.
pub fn categorize_header(name: &str) -> HeaderCategory {
    let name = name.trim().to_ascii_lowercase();
    let name = name.as_str();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| name.starts_with(p));

    if starts(CMS_PREFIXES) || CMS_NAMES.contains(&name) {
        HeaderCategory::Cms
    } else if SECURITY.contains(&name) {
        HeaderCategory::Security
    } else if CACHING.contains(&name) {
        HeaderCategory::Caching
    } else if INFRASTRUCTURE.contains(&name) || starts(INFRASTRUCTURE_PREFIXES) {
        HeaderCategory::Infrastructure
    } else if ANALYTICS_FRAGMENTS.iter().any(|f| name.contains(f)) {
        HeaderCategory::Analytics
    } else if STANDARD.contains(&name) || starts(STANDARD_PREFIXES) {
        HeaderCategory::Standard
    } else if name.starts_with("x-") {
        HeaderCategory::Custom
    } else {
        HeaderCategory::Unknown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSpecificData {
    pub header_categories: BTreeMap<String, HeaderCategory>,
    /// Distinct header names per category.
    pub category_header_counts: BTreeMap<HeaderCategory, usize>,
}

impl SemanticSpecificData {
    pub fn category_of(&self, header: &str) -> HeaderCategory {
        self.header_categories
            .get(header)
            .copied()
            .unwrap_or_else(|| categorize_header(header))
    }
}

/// Counts sites per header category; pattern keys are category names and examples are
/// the header names that put a site in the category.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticAnalyzer;

impl FrequencyAnalyzer for SemanticAnalyzer {
    type Specific = SemanticSpecificData;

    fn name(&self) -> &'static str {
        "semantic"
    }

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<SemanticSpecificData> {
        let start_time = Instant::now();
        let page_type = options.page_type;

        let counter = PatternCounter::count_sites(data, |site_id, site, acc| {
            for name in site.headers_for(page_type).keys() {
                acc.observe(site_id, categorize_header(name).as_str(), Some(name));
            }
        });

        let header_names: BTreeSet<&String> = data
            .sites
            .values()
            .flat_map(|site| site.headers_for(page_type).keys())
            .collect();
        let mut specific = SemanticSpecificData::default();
        for name in header_names {
            let category = categorize_header(name);
            specific.header_categories.insert(name.clone(), category);
            *specific.category_header_counts.entry(category).or_insert(0) += 1;
        }

        let patterns_found = counter.len();
        let patterns = counter.finish(data.total_sites, options.min_occurrences, true);

        build_result(
            self.name(),
            patterns,
            patterns_found,
            data,
            options,
            specific,
            start_time,
        )
    }
}
