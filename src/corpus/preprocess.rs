use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::index::{load_index, IndexEntry};
use super::normalize::{canonical_cms_label, normalize_header_value, normalize_name, normalize_value};
use crate::domain;
use crate::options::{DateRange, PageType};
use crate::snapshot::{DetectionDataPoint, HeaderMap};

pub type ValueSets = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterReason {
    MissingFile,
    Unreadable,
    Malformed,
    OutsideDateRange,
    DuplicateUrl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringStats {
    pub sites_in_index: usize,
    pub sites_loaded: usize,
    pub sites_filtered_out: usize,
    pub reasons: BTreeMap<FilterReason, usize>,
}

impl FilteringStats {
    pub fn record(&mut self, reason: FilterReason) {
        self.sites_filtered_out += 1;
        *self.reasons.entry(reason).or_insert(0) += 1;
    }

    fn merge(&mut self, other: FilteringStats) {
        self.sites_filtered_out += other.sites_filtered_out;
        for (reason, count) in other.reasons {
            *self.reasons.entry(reason).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteData {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cms: Option<String>,
    pub confidence: f64,
    pub captured_at: DateTime<Utc>,
    /// Union of main page and robots.txt response headers.
    pub headers: ValueSets,
    pub mainpage_headers: ValueSets,
    pub robots_headers: ValueSets,
    pub meta_tags: ValueSets,
    pub scripts: BTreeSet<String>,
    pub inline_scripts: BTreeSet<String>,
}

fn header_sets(headers: &HeaderMap) -> ValueSets {
    let mut sets = ValueSets::new();
    for (name, value) in headers {
        let name = normalize_name(name);
        if name.is_empty() {
            continue;
        }
        sets.entry(name)
            .or_default()
            .insert(normalize_header_value(value));
    }
    sets
}

fn union(a: &ValueSets, b: &ValueSets) -> ValueSets {
    let mut merged = a.clone();
    for (name, values) in b {
        merged
            .entry(name.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
    merged
}

impl SiteData {
    /// Builds the normalized view. The explicit label wins over labels recorded in the
    /// snapshot's own detection results.
    pub fn from_snapshot(
        snapshot: &DetectionDataPoint,
        label: Option<&str>,
        label_confidence: Option<f64>,
    ) -> Option<SiteData> {
        domain::parse_url(&snapshot.url)?;

        let recorded = snapshot.best_recorded_detection();
        let (cms, confidence) = match canonical_cms_label(label) {
            Some(cms) => (Some(cms), label_confidence.unwrap_or(1.0)),
            None => match recorded {
                Some(d) => (canonical_cms_label(Some(&d.cms)), d.confidence),
                None => (None, 0.0),
            },
        };

        let mainpage_headers = header_sets(&snapshot.http_headers);
        let robots_headers = snapshot
            .robots_txt
            .as_ref()
            .map(|r| header_sets(&r.http_headers))
            .unwrap_or_default();

        let mut meta_tags = ValueSets::new();
        for tag in &snapshot.meta_tags {
            if let Some((kind, key)) = tag.key() {
                let key = normalize_name(key);
                if key.is_empty() {
                    continue;
                }
                meta_tags
                    .entry(format!("{kind}:{key}"))
                    .or_default()
                    .insert(normalize_value(&tag.content));
            }
        }

        let scripts = snapshot
            .script_sources()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let inline_scripts = snapshot
            .scripts
            .iter()
            .filter(|s| s.src.is_none())
            .filter_map(|s| s.content.as_deref())
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .collect();

        Some(SiteData {
            url: snapshot.effective_url().to_string(),
            cms,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            captured_at: snapshot.timestamp,
            headers: union(&mainpage_headers, &robots_headers),
            mainpage_headers,
            robots_headers,
            meta_tags,
            scripts,
            inline_scripts,
        })
    }

    pub fn headers_for(&self, page_type: PageType) -> &ValueSets {
        match page_type {
            PageType::All => &self.headers,
            PageType::Mainpage => &self.mainpage_headers,
            PageType::Robots => &self.robots_headers,
        }
    }

    /// Label used when grouping by CMS; unlabeled sites group under `Unknown`.
    pub fn cms_label(&self) -> &str {
        self.cms.as_deref().unwrap_or(crate::detection::UNKNOWN_CMS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_dir: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// The analyzed corpus: sites keyed by [`domain::site_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessedData {
    pub sites: BTreeMap<String, SiteData>,
    pub total_sites: usize,
    pub filtering_stats: FilteringStats,
    pub metadata: PreprocessMetadata,
}

impl PreprocessedData {
    /// Builds the corpus from already-normalized sites, keeping the latest capture per
    /// site key.
    pub fn from_sites(sites: Vec<SiteData>) -> Self {
        let sites_in_index = sites.len();
        let mut stats = FilteringStats {
            sites_in_index,
            ..FilteringStats::default()
        };
        let sites = dedupe(sites, &mut stats);
        stats.sites_loaded = sites.len();
        PreprocessedData {
            total_sites: sites.len(),
            sites,
            filtering_stats: stats,
            metadata: PreprocessMetadata {
                corpus_dir: None,
                loaded_at: Utc::now(),
                date_range: None,
            },
        }
    }

    pub fn is_reliable(&self, min_sites: usize) -> bool {
        self.total_sites >= min_sites
    }

    /// Distinct CMS labels present in the corpus, `Unknown` included.
    pub fn cms_labels(&self) -> BTreeSet<&str> {
        self.sites.values().map(SiteData::cms_label).collect()
    }
}

fn dedupe(sites: Vec<SiteData>, stats: &mut FilteringStats) -> BTreeMap<String, SiteData> {
    let mut by_key: BTreeMap<String, SiteData> = BTreeMap::new();
    for site in sites {
        let Some(key) = domain::site_key(&site.url) else {
            stats.record(FilterReason::Malformed);
            continue;
        };
        match by_key.get(&key) {
            None => {
                by_key.insert(key, site);
            }
            Some(existing) => {
                stats.record(FilterReason::DuplicateUrl);
                let newer = (site.captured_at, std::cmp::Reverse(&site.url))
                    > (existing.captured_at, std::cmp::Reverse(&existing.url));
                if newer {
                    by_key.insert(key, site);
                }
            }
        }
    }
    by_key
}

#[derive(Default)]
struct LoadBatch {
    sites: Vec<SiteData>,
    stats: FilteringStats,
}

fn load_entry(
    entry: &IndexEntry,
    corpus_dir: &Path,
    date_range: Option<&DateRange>,
) -> std::result::Result<SiteData, FilterReason> {
    if let (Some(range), Some(ts)) = (date_range, entry.timestamp) {
        if !range.contains(ts) {
            return Err(FilterReason::OutsideDateRange);
        }
    }

    let path = entry.resolve(corpus_dir);
    if !path.exists() {
        return Err(FilterReason::MissingFile);
    }
    let content = fs::read_to_string(&path).map_err(|_| FilterReason::Unreadable)?;
    let snapshot: DetectionDataPoint =
        serde_json::from_str(&content).map_err(|_| FilterReason::Malformed)?;

    if let Some(range) = date_range {
        if entry.timestamp.is_none() && !range.contains(snapshot.timestamp) {
            return Err(FilterReason::OutsideDateRange);
        }
    }

    SiteData::from_snapshot(&snapshot, entry.cms.as_deref(), entry.confidence)
        .ok_or(FilterReason::Malformed)
}

/// Loads every indexed snapshot on a pool of `workers` threads (which also bounds the
/// number of files open at once), normalizes them and drops unusable records. Dropped
/// records are tallied in [`FilteringStats`], never counted in `total_sites`.
pub fn preprocess_corpus(
    corpus_dir: &Path,
    date_range: Option<DateRange>,
    workers: usize,
) -> Result<PreprocessedData> {
    let start_time = Instant::now();
    info!(action = "start", component = "preprocessor", corpus_dir = ?corpus_dir, workers = workers, "Starting corpus preprocessing");

    let entries = load_index(corpus_dir)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .context("Failed to build corpus reader pool")?;

    let batches: Vec<LoadBatch> = pool.install(|| {
        entries
            .par_iter()
            .fold(LoadBatch::default, |mut acc, entry| {
                match load_entry(entry, corpus_dir, date_range.as_ref()) {
                    Ok(site) => acc.sites.push(site),
                    Err(reason) => {
                        debug!(action = "skip", component = "preprocessor", url = %entry.url, reason = ?reason, "Record filtered out");
                        acc.stats.record(reason);
                    }
                }
                acc
            })
            .collect()
    });

    let mut stats = FilteringStats {
        sites_in_index: entries.len(),
        ..FilteringStats::default()
    };
    let mut loaded = Vec::new();
    for batch in batches {
        loaded.extend(batch.sites);
        stats.merge(batch.stats);
    }

    let sites = dedupe(loaded, &mut stats);
    stats.sites_loaded = sites.len();

    if stats.sites_filtered_out > 0 {
        warn!(
            action = "filtered",
            component = "preprocessor",
            filtered_out = stats.sites_filtered_out,
            reasons = ?stats.reasons,
            "Some corpus records were skipped"
        );
    }
    info!(
        action = "complete",
        component = "preprocessor",
        total_sites = sites.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Corpus preprocessing completed"
    );

    Ok(PreprocessedData {
        total_sites: sites.len(),
        sites,
        filtering_stats: stats,
        metadata: PreprocessMetadata {
            corpus_dir: Some(corpus_dir.to_path_buf()),
            loaded_at: Utc::now(),
            date_range,
        },
    })
}
