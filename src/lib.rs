pub mod aggregate;
pub mod analyzers;
pub mod args;
pub mod bias;
pub mod corpus;
pub mod detection;
pub mod domain;
pub mod error;
pub mod options;
pub mod patterns;
pub mod pipeline;
pub mod recommend;
pub mod snapshot;
pub mod stats;
pub mod utils;

pub use aggregate::{AggregatedResults, Aggregator, AnalyzerOutputs, Summary};
pub use args::Args;
pub use bias::{BiasAnalysis, BiasEngine};
pub use corpus::{preprocess_corpus, PreprocessedData, SiteData};
pub use detection::{select_best_version, ClassificationResult, Detector, DetectorConfig};
pub use error::{AnalysisError, CorpusError, SignatureError};
pub use options::{AnalysisOptions, PageType};
pub use patterns::{load_technology_patterns, TechnologyTable};
pub use pipeline::{analyze_corpus, run_analysis};
pub use snapshot::DetectionDataPoint;
pub use stats::{AnalysisResult, PatternData};
