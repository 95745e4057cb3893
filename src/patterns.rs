use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::SignatureError;

// Include default technology table at compile time
const DEFAULT_TECHNOLOGIES: &str = include_str!("../default_technologies.txt");
const DEFAULT_TECHNOLOGY_FILE: &str = "technologies.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TechnologyTarget {
    HeaderName,
    HeaderValue,
    ScriptHost,
}

impl TechnologyTarget {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "header-name" => Some(TechnologyTarget::HeaderName),
            "header-value" => Some(TechnologyTarget::HeaderValue),
            "script-host" => Some(TechnologyTarget::ScriptHost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TechnologyPattern {
    pub vendor: String,
    pub category: String,
    pub target: TechnologyTarget,
    pub regex: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorAttribution {
    pub vendor: String,
    pub category: String,
}

/// Rule order matters: the first matching rule attributes a header.
#[derive(Debug, Clone, Default)]
pub struct TechnologyTable {
    patterns: Vec<TechnologyPattern>,
}

impl TechnologyTable {
    pub fn new(patterns: Vec<TechnologyPattern>) -> Self {
        Self { patterns }
    }

    pub fn builtin() -> Result<Self, SignatureError> {
        parse_technology_table(DEFAULT_TECHNOLOGIES, "embedded defaults", true).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn first_match(&self, target: TechnologyTarget, text: &str) -> Option<&TechnologyPattern> {
        self.patterns
            .iter()
            .find(|p| p.target == target && p.regex.is_match(text))
    }

    pub fn vendor_for_header(&self, header_name: &str) -> Option<VendorAttribution> {
        self.first_match(TechnologyTarget::HeaderName, header_name)
            .map(attribution)
    }

    pub fn vendor_for_header_value(&self, value: &str) -> Option<VendorAttribution> {
        self.first_match(TechnologyTarget::HeaderValue, value)
            .map(attribution)
    }

    pub fn vendor_for_script_host(&self, host: &str) -> Option<VendorAttribution> {
        self.first_match(TechnologyTarget::ScriptHost, host)
            .map(attribution)
    }
}

fn attribution(pattern: &TechnologyPattern) -> VendorAttribution {
    VendorAttribution {
        vendor: pattern.vendor.clone(),
        category: pattern.category.clone(),
    }
}

/// Parses `vendor|category|target|regex` lines; blank lines and `#` comments are skipped.
/// In strict mode the first bad line is an error, otherwise it is logged and skipped.
pub fn parse_technology_table(
    content: &str,
    origin: &str,
    strict: bool,
) -> Result<Vec<TechnologyPattern>, SignatureError> {
    let mut patterns = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_rule(line, line_num + 1, origin) {
            Ok(pattern) => patterns.push(pattern),
            Err(e) if strict => return Err(e),
            Err(e) => {
                warn!(action = "parse", component = "technology_rule", line_number = line_num + 1, error = %e, "Invalid technology rule")
            }
        }
    }
    Ok(patterns)
}

fn parse_rule(line: &str, line_num: usize, origin: &str) -> Result<TechnologyPattern, SignatureError> {
    let fields: Vec<&str> = line.splitn(4, '|').map(str::trim).collect();
    let [vendor, category, target, regex] = fields.as_slice() else {
        return Err(SignatureError::MalformedRule {
            line: line_num,
            reason: "expected vendor|category|target|regex".to_string(),
        });
    };
    if vendor.is_empty() {
        return Err(SignatureError::MalformedRule {
            line: line_num,
            reason: "empty vendor".to_string(),
        });
    }
    let target = TechnologyTarget::parse(target).ok_or_else(|| SignatureError::MalformedRule {
        line: line_num,
        reason: format!("unknown target '{target}'"),
    })?;
    let regex = Regex::new(regex).map_err(|source| SignatureError::InvalidRegex {
        origin: format!("{origin}:{line_num}"),
        pattern: regex.to_string(),
        source,
    })?;
    Ok(TechnologyPattern {
        vendor: vendor.to_string(),
        category: category.to_lowercase(),
        target,
        regex,
    })
}

/// Loads the technology table from `path`, else from `technologies.txt` in the working
/// directory, else from the embedded defaults.
pub fn load_technology_patterns(path: Option<&Path>) -> Result<TechnologyTable> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "technology_loading",
        "Starting technology table loading"
    );

    let table = if let Some(path) = path {
        info!(action = "load", component = "technology_file", file_path = ?path, "Loading technologies from specified file");
        if !path.exists() {
            anyhow::bail!("Technology file not found: {:?}", path);
        }
        let content = fs::read_to_string(path)?;
        let origin = path.display().to_string();
        TechnologyTable::new(parse_technology_table(&content, &origin, true)?)
    } else {
        let default_file = Path::new(DEFAULT_TECHNOLOGY_FILE);
        let mut table = TechnologyTable::default();
        if default_file.exists() {
            info!(action = "load", component = "default_technology_file", file_path = ?default_file, "Loading technologies from default file");
            let content = fs::read_to_string(default_file)?;
            table = TechnologyTable::new(parse_technology_table(&content, DEFAULT_TECHNOLOGY_FILE, false)?);
        }
        if table.is_empty() {
            info!(
                action = "load",
                component = "embedded_technologies",
                "Using embedded default technologies"
            );
            table = TechnologyTable::builtin().context("Failed to compile embedded technology table")?;
        }
        table
    };

    info!(
        action = "complete",
        component = "technology_loading",
        rule_count = table.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Successfully compiled technology rules"
    );
    Ok(table)
}
