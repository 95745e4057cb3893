use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::detection::DetectorConfig;

use crate::options::{
    AnalysisOptions, PageType, DEFAULT_MIN_OCCURRENCES, DEFAULT_MIN_SITES, DEFAULT_TOP_PATTERNS,
};

#[derive(Parser, Debug)]
#[command(
    name = "cmsprobe",
    about = "Fingerprint website CMS platforms and mine snapshot corpora for detection signals",
    version,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Measure pattern frequencies across a corpus of captured snapshots
    Analyze(AnalyzeArgs),
    /// Classify a single captured snapshot
    Detect(DetectArgs),
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Corpus directory containing index.json
    pub corpus_dir: PathBuf,

    /// Minimum number of sites a pattern must appear on
    #[arg(long, default_value_t = DEFAULT_MIN_OCCURRENCES)]
    pub min_occurrences: usize,

    /// Corpus size below which results are flagged unreliable
    #[arg(long, default_value_t = DEFAULT_MIN_SITES)]
    pub min_sites: usize,

    /// Which responses contribute headers
    #[arg(long, value_enum, default_value_t = PageType::All)]
    pub page_type: PageType,

    /// Drop universal transport headers from header analysis
    #[arg(long)]
    pub semantic_filtering: bool,

    /// Generate filter/retain/refine recommendations
    #[arg(long)]
    pub recommendations: bool,

    /// Only include snapshots captured on or after this date
    #[arg(long)]
    pub date_start: Option<String>,

    /// Only include snapshots captured on or before this date
    #[arg(long)]
    pub date_end: Option<String>,

    /// Number of top patterns to display per dimension
    #[arg(short, long, default_value_t = DEFAULT_TOP_PATTERNS)]
    pub top: usize,

    /// Number of worker threads for corpus reads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Path to custom technology table
    #[arg(long)]
    pub technologies: Option<PathBuf>,

    /// Write full results as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AnalyzeArgs {
    pub fn options(&self) -> anyhow::Result<AnalysisOptions> {
        Ok(AnalysisOptions {
            min_occurrences: self.min_occurrences,
            min_sites: self.min_sites,
            include_recommendations: self.recommendations,
            page_type: self.page_type,
            semantic_filtering: self.semantic_filtering,
            date_range: crate::utils::parse_date_range(
                self.date_start.as_deref(),
                self.date_end.as_deref(),
            )?,
            top_patterns: self.top,
        })
    }
}

#[derive(clap::Args, Debug)]
pub struct DetectArgs {
    /// Snapshot JSON file
    pub snapshot: PathBuf,

    /// Override every strategy's timeout, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print the classification as JSON
    #[arg(long)]
    pub json: bool,
}

impl DetectArgs {
    /// Without `--timeout-ms` each strategy keeps its own timeout.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            strategy_timeout: self.timeout_ms.map(Duration::from_millis),
            ..DetectorConfig::default()
        }
    }
}
