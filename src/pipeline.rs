use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::aggregate::{AggregatedResults, Aggregator, AnalyzerOutputs};
use crate::analyzers::{
    FrequencyAnalyzer, HeaderAnalyzer, MetaAnalyzer, ScriptAnalyzer, SemanticAnalyzer,
    VendorAnalyzer,
};
use crate::bias::BiasEngine;
use crate::corpus::{preprocess_corpus, PreprocessedData};
use crate::detection::{ClassificationResult, Detector, DetectorConfig};
use crate::error::AnalysisError;
use crate::options::AnalysisOptions;
use crate::patterns::TechnologyTable;
use crate::recommend::{generate_recommendations, RecommendationInput, RecommendationKind};
use crate::snapshot::DetectionDataPoint;
use crate::utils::{format_number, format_percent};

pub fn default_workers() -> usize {
    std::cmp::min(num_cpus::get(), 8)
}

/// Runs the five analyzers concurrently over an already preprocessed corpus, then
/// aggregates, measures bias and, when asked, builds recommendations.
pub fn run_analysis(
    data: &PreprocessedData,
    options: &AnalysisOptions,
    technologies: &TechnologyTable,
) -> Result<AggregatedResults, AnalysisError> {
    let start_time = Instant::now();
    if !data.is_reliable(options.min_sites) {
        warn!(
            action = "check",
            component = "pipeline",
            total_sites = data.total_sites,
            min_sites = options.min_sites,
            "Corpus smaller than min_sites, continuing with unreliable statistics"
        );
    }

    let vendor_analyzer = VendorAnalyzer::new(technologies);
    let ((headers, meta_tags), (scripts, (vendors, semantics))) = rayon::join(
        || {
            rayon::join(
                || HeaderAnalyzer.analyze(data, options),
                || MetaAnalyzer.analyze(data, options),
            )
        },
        || {
            rayon::join(
                || ScriptAnalyzer.analyze(data, options),
                || {
                    rayon::join(
                        || vendor_analyzer.analyze(data, options),
                        || SemanticAnalyzer.analyze(data, options),
                    )
                },
            )
        },
    );

    let outputs = AnalyzerOutputs {
        headers,
        meta_tags,
        scripts,
        vendors,
        semantics,
    };
    let mut results = Aggregator.aggregate(data, outputs, options)?;

    let bias = BiasEngine::default().analyze(data, &results.dimensions());
    if options.include_recommendations {
        let input = RecommendationInput {
            headers: &results.headers,
            vendors: &results.vendors,
            semantics: &results.semantics,
            bias: Some(&bias),
            options,
        };
        results.recommendations = Some(generate_recommendations(&input));
    }
    results.bias = Some(bias);

    info!(
        action = "complete",
        component = "pipeline",
        total_sites = data.total_sites,
        duration_ms = start_time.elapsed().as_millis(),
        "Analysis completed"
    );
    Ok(results)
}

pub fn analyze_corpus(
    corpus_dir: &Path,
    options: &AnalysisOptions,
    technologies: &TechnologyTable,
    workers: usize,
) -> Result<AggregatedResults> {
    let total_start_time = Instant::now();
    info!(action = "start", component = "pipeline", corpus_dir = ?corpus_dir, "Starting corpus analysis");

    let data = preprocess_corpus(corpus_dir, options.date_range, workers)?;
    let results = run_analysis(&data, options, technologies)
        .context("Analyzer results failed consistency checks")?;

    info!(
        action = "complete",
        component = "corpus_analysis",
        duration_ms = total_start_time.elapsed().as_millis(),
        "Corpus analysis completed successfully"
    );
    Ok(results)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    info!(action = "write", component = "output", file_path = ?path, "Results written");
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<DetectionDataPoint> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse snapshot {:?}", path))
}

pub async fn detect_snapshot(path: &Path, config: DetectorConfig) -> Result<ClassificationResult> {
    let snapshot = load_snapshot(path)?;
    let detector = Detector::with_builtin_signatures(config)
        .context("Failed to compile built-in signatures")?;
    Ok(detector.classify(Arc::new(snapshot)).await)
}

pub fn print_classification(result: &ClassificationResult) {
    println!("\n--- CMS Detection: {} ---", result.url);
    match &result.version {
        Some(version) => println!("Result: {} {} ({} confidence)", result.cms, version, format_percent(result.confidence)),
        None => println!("Result: {} ({} confidence)", result.cms, format_percent(result.confidence)),
    }
    println!("\nCandidate scores:");
    for (cms, score) in &result.candidate_scores {
        println!("- {}: {}", cms, format_percent(*score));
    }
    println!("\nStrategy evidence:");
    for evidence in result.evidence_per_strategy.iter().filter(|e| e.confidence > 0.0 || e.error.is_some()) {
        let detail = match &evidence.error {
            Some(error) => format!("error: {error}"),
            None => evidence.evidence.join(", "),
        };
        println!(
            "- {} / {}: {} [{}]",
            evidence.cms,
            evidence.strategy,
            format_percent(evidence.confidence),
            detail
        );
    }
    println!("\nCompleted in {}ms", format_number(result.execution_time_ms as usize));
}

pub fn print_analysis_results(result: &AggregatedResults, top: usize) {
    let summary = &result.summary;
    println!("\n--- Corpus Frequency Analysis ---");
    println!("Sites analyzed: {}", format_number(summary.total_sites));
    println!(
        "Records in index: {}, skipped: {}",
        format_number(summary.filtering_stats.sites_in_index),
        format_number(summary.filtering_stats.sites_filtered_out)
    );
    for (reason, count) in &summary.filtering_stats.reasons {
        println!("  - {:?}: {}", reason, format_number(*count));
    }
    if summary.statistically_unreliable {
        println!(
            "WARNING: fewer than {} sites, results are statistically unreliable",
            format_number(summary.min_sites)
        );
    }

    for (name, dimension) in &summary.dimensions {
        println!(
            "\nTop {} {} patterns (of {}):",
            std::cmp::min(top, dimension.top_patterns.len()),
            name,
            format_number(dimension.pattern_count)
        );
        for pattern in dimension.top_patterns.iter().take(top) {
            println!(
                "- {}: {} sites ({})",
                pattern.pattern,
                format_number(pattern.site_count),
                format_percent(pattern.frequency)
            );
        }
    }

    if let Some(bias) = &result.bias {
        println!("\nCMS distribution:");
        for (cms, count) in &bias.corpus_distribution.counts {
            let share = bias.corpus_distribution.shares.get(cms).copied().unwrap_or(0.0);
            println!("- {}: {} sites ({})", cms, format_number(*count), format_percent(share));
        }
        if let Some(discriminative) = bias.discriminative_patterns.get("headers") {
            println!("Discriminative header patterns: {}", format_number(discriminative.len()));
        }
        for warning in &bias.warnings {
            println!("Note: {warning}");
        }
    }

    if let Some(recs) = &result.recommendations {
        println!(
            "\nFiltering: {} filter, {} retain",
            format_number(recs.filtering.filter_count),
            format_number(recs.filtering.retain_count)
        );
        for rec in recs
            .filtering
            .recommendations
            .iter()
            .filter(|r| r.action == RecommendationKind::Filter)
            .take(top)
        {
            println!("- filter {}: {}", rec.pattern, rec.reasoning);
        }
        println!(
            "Retention: {} patterns (average confidence {})",
            format_number(recs.retention.recommendations.len()),
            format_percent(recs.retention.average_confidence)
        );
        println!("Refinement: {} suggestions", format_number(recs.refinement.suggestions.len()));
        for suggestion in recs.refinement.suggestions.iter().take(top) {
            println!(
                "- {} -> {} (~{} sites)",
                suggestion.recommendation.pattern,
                suggestion.refined_pattern,
                format_number(suggestion.estimated_site_count)
            );
        }
    }

    for warning in &summary.warnings {
        println!("Warning: {warning}");
    }
}
