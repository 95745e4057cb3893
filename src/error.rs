use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus directory not found: {0:?}")]
    MissingDirectory(PathBuf),

    #[error("failed to read corpus index {path:?}")]
    IndexRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse corpus index {path:?}")]
    IndexParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Internal-consistency failures found while merging analyzer output. These point at a
/// defect in the pipeline, never at bad input.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("analyzer '{analyzer}' reported {actual} total sites, corpus has {expected}")]
    TotalSitesMismatch {
        analyzer: String,
        expected: usize,
        actual: usize,
    },

    #[error("analyzer '{analyzer}' pattern '{pattern}' has frequency {frequency} outside [0, 1]")]
    FrequencyOutOfRange {
        analyzer: String,
        pattern: String,
        frequency: f64,
    },

    #[error("analyzer '{analyzer}' pattern '{pattern}' frequency {frequency} disagrees with {site_count}/{total_sites}")]
    FrequencyMismatch {
        analyzer: String,
        pattern: String,
        frequency: f64,
        site_count: usize,
        total_sites: usize,
    },

    #[error("analyzer '{analyzer}' pattern '{pattern}' counts {site_count} sites, more than {total_sites} in corpus")]
    SiteCountExceedsTotal {
        analyzer: String,
        pattern: String,
        site_count: usize,
        total_sites: usize,
    },

    #[error("analyzer '{analyzer}' pattern '{pattern}' example '{example}' exceeds its pattern counts")]
    ExampleExceedsPattern {
        analyzer: String,
        pattern: String,
        example: String,
    },

    #[error("analyzer '{analyzer}' kept pattern '{pattern}' with {site_count} sites, below minimum {min_occurrences}")]
    BelowMinOccurrences {
        analyzer: String,
        pattern: String,
        site_count: usize,
        min_occurrences: usize,
    },
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid pattern '{pattern}' in {origin}")]
    InvalidRegex {
        origin: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed technology rule at line {line}: {reason}")]
    MalformedRule { line: usize, reason: String },
}
