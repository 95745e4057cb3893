//! Per-snapshot CMS classification: one strategy per evidence source, run concurrently
//! and combined per candidate CMS.

pub mod detector;
pub mod dom;
pub mod headers;
pub mod meta;
pub mod robots;
pub mod scripts;
pub mod signatures;
pub mod strategy;
pub mod version;

pub use detector::{
    ClassificationResult, CmsDetector, Detector, DetectorConfig, StrategyEvidence,
    WeightedStrategy, UNKNOWN_CMS,
};
pub use strategy::{DetectionStrategy, Matcher, PartialDetectionResult, SignalRule};
pub use version::{select_best_version, HintConfidence, VersionHint, VersionSource};
