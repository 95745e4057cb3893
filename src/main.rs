use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use cmsprobe::args::{AnalyzeArgs, Command, DetectArgs};
use cmsprobe::{patterns, pipeline, utils, Args};

fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let options = args.options()?;
    let technologies = patterns::load_technology_patterns(args.technologies.as_deref())?;
    let workers = args.workers.unwrap_or_else(pipeline::default_workers);

    let result = pipeline::analyze_corpus(&args.corpus_dir, &options, &technologies, workers)?;
    pipeline::print_analysis_results(&result, args.top);
    if let Some(output) = &args.output {
        pipeline::write_json(output, &result)?;
    }
    Ok(())
}

fn run_detect(args: &DetectArgs) -> Result<()> {
    let config = args.detector_config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(pipeline::detect_snapshot(&args.snapshot, config))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        pipeline::print_classification(&result);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.verbose);
    utils::validate_args(&args)?;

    let outcome = match &args.command {
        Command::Analyze(analyze) => run_analyze(analyze),
        Command::Detect(detect) => run_detect(detect),
    };

    if let Err(e) = outcome {
        error!(action = "exit", component = "main", error = %format!("{e:#}"), "Command failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
