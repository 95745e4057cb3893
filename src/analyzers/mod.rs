pub mod counter;
pub mod headers;
pub mod meta;
pub mod scripts;
pub mod semantic;
pub mod vendor;

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

use crate::corpus::PreprocessedData;
use crate::options::AnalysisOptions;
use crate::stats::{AnalysisMetadata, AnalysisResult, PatternData};

pub use counter::{PatternCounter, MAX_EXAMPLES};
pub use headers::{header_pattern_confidence, HeaderAnalyzer, HeaderSpecificData, UNIVERSAL_HEADERS};
pub use meta::{MetaAnalyzer, MetaSpecificData};
pub use scripts::{ScriptAnalyzer, ScriptSpecificData, INLINE_MARKERS};
pub use semantic::{categorize_header, HeaderCategory, SemanticAnalyzer, SemanticSpecificData};
pub use vendor::{VendorAnalyzer, VendorSpecificData};

/// One dimension of corpus frequency analysis. Every implementation counts distinct
/// sites per pattern over the same `PreprocessedData`, applies `min_occurrences` and
/// reports `total_sites` unchanged.
pub trait FrequencyAnalyzer: Sync {
    type Specific: Send;

    fn name(&self) -> &'static str;

    fn analyze(
        &self,
        data: &PreprocessedData,
        options: &AnalysisOptions,
    ) -> AnalysisResult<Self::Specific>;
}

pub(crate) fn build_result<T>(
    analyzer: &'static str,
    patterns: BTreeMap<String, PatternData>,
    patterns_found: usize,
    data: &PreprocessedData,
    options: &AnalysisOptions,
    analyzer_specific: T,
    start_time: Instant,
) -> AnalysisResult<T> {
    info!(
        action = "complete",
        component = "analyzer",
        analyzer = analyzer,
        patterns_found = patterns_found,
        patterns_kept = patterns.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Frequency analysis completed"
    );
    AnalysisResult {
        total_sites: data.total_sites,
        metadata: AnalysisMetadata {
            analyzer: analyzer.to_string(),
            analyzed_at: Utc::now(),
            total_patterns_found: patterns_found,
            total_patterns_after_filtering: patterns.len(),
            options: options.clone(),
        },
        patterns,
        analyzer_specific,
    }
}
