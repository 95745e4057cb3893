use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, Command};
use crate::options::{parse_date_bound, DateRange};

pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

pub fn format_number(num: usize) -> String {
    let digits = num.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(c);
    }
    formatted
}

pub fn format_percent(fraction: f64) -> String {
    if fraction.is_finite() {
        format!("{:.1}%", fraction * 100.0)
    } else {
        "n/a".to_string()
    }
}

/// Parses `--date-start`/`--date-end` into a range; `None` when neither is given.
pub fn parse_date_range(start: Option<&str>, end: Option<&str>) -> anyhow::Result<Option<DateRange>> {
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    let parse = |raw: Option<&str>, end_of_day: bool, flag: &str| -> anyhow::Result<_> {
        match raw {
            None => Ok(None),
            Some(raw) => match parse_date_bound(raw, end_of_day) {
                Some(bound) => Ok(Some(bound)),
                None => anyhow::bail!("{flag} must be RFC 3339 or YYYY-MM-DD, got '{raw}'"),
            },
        }
    };
    Ok(Some(DateRange {
        start: parse(start, false, "--date-start")?,
        end: parse(end, true, "--date-end")?,
    }))
}

pub fn validate_args(args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Analyze(analyze) => {
            if analyze.top == 0 {
                anyhow::bail!("--top must be greater than 0");
            }

            if let Some(workers) = analyze.workers {
                if workers == 0 {
                    anyhow::bail!("--workers must be greater than 0");
                }
            }

            if !analyze.corpus_dir.is_dir() {
                anyhow::bail!("Corpus directory not found: {:?}", analyze.corpus_dir);
            }

            let range = parse_date_range(analyze.date_start.as_deref(), analyze.date_end.as_deref())?;
            if range.is_some_and(|r| r.is_inverted()) {
                anyhow::bail!("--date-start must not be after --date-end");
            }
        }
        Command::Detect(detect) => {
            if detect.timeout_ms == Some(0) {
                anyhow::bail!("--timeout-ms must be greater than 0");
            }
        }
    }

    Ok(())
}
