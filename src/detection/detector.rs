use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::signatures::builtin_detectors;
use super::strategy::{DetectionStrategy, PartialDetectionResult};
use super::version::{select_best_version, VersionHint};
use crate::error::SignatureError;
use crate::snapshot::DetectionDataPoint;

pub const UNKNOWN_CMS: &str = "Unknown";
pub const DEFAULT_SITE_DEADLINE_CAP: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENT_SITES: usize = 3;
// Slack for task scheduling between a strategy's own timeout and the site deadline.
const DEADLINE_GRACE: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct WeightedStrategy {
    pub strategy: Arc<dyn DetectionStrategy>,
    pub weight: f64,
}

impl WeightedStrategy {
    pub fn new(strategy: Arc<dyn DetectionStrategy>, weight: f64) -> Self {
        Self { strategy, weight }
    }
}

#[derive(Clone)]
pub struct CmsDetector {
    pub cms: String,
    pub strategies: Vec<WeightedStrategy>,
}

impl CmsDetector {
    pub fn new(cms: &str, strategies: Vec<WeightedStrategy>) -> Self {
        Self {
            cms: cms.to_string(),
            strategies,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Hard cap on the per-site deadline.
    pub site_deadline_cap: Duration,
    /// Concurrent snapshots in [`Detector::classify_many`].
    pub max_concurrent_sites: usize,
    /// Replaces every strategy's own timeout when set.
    pub strategy_timeout: Option<Duration>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            site_deadline_cap: DEFAULT_SITE_DEADLINE_CAP,
            max_concurrent_sites: DEFAULT_MAX_CONCURRENT_SITES,
            strategy_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEvidence {
    pub cms: String,
    pub strategy: String,
    pub weight: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionHint>,
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub url: String,
    pub cms: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub candidate_scores: BTreeMap<String, f64>,
    pub evidence_per_strategy: Vec<StrategyEvidence>,
    pub execution_time_ms: u64,
}

impl ClassificationResult {
    pub fn is_unknown(&self) -> bool {
        self.cms == UNKNOWN_CMS
    }
}

pub struct Detector {
    candidates: Vec<CmsDetector>,
    config: DetectorConfig,
}

type Outcome = (usize, usize, PartialDetectionResult, Duration);

impl Detector {
    pub fn new(candidates: Vec<CmsDetector>, config: DetectorConfig) -> Self {
        Self { candidates, config }
    }

    pub fn with_builtin_signatures(config: DetectorConfig) -> Result<Self, SignatureError> {
        Ok(Self::new(builtin_detectors()?, config))
    }

    pub fn candidates(&self) -> &[CmsDetector] {
        &self.candidates
    }

    fn timeout_for(&self, strategy: &dyn DetectionStrategy) -> Duration {
        self.config
            .strategy_timeout
            .unwrap_or_else(|| strategy.timeout())
    }

    /// Longest strategy timeout, capped by the configured per-site deadline.
    pub fn site_deadline(&self) -> Duration {
        self.candidates
            .iter()
            .flat_map(|c| c.strategies.iter())
            .map(|s| self.timeout_for(s.strategy.as_ref()))
            .max()
            .unwrap_or(Duration::ZERO)
            .min(self.config.site_deadline_cap)
    }

    /// Runs every strategy of every candidate concurrently against the snapshot and picks
    /// the candidate with the highest weighted confidence. Strategies that fail, panic or
    /// exceed their timeout count as zero-confidence non-matches.
    pub async fn classify(&self, snapshot: Arc<DetectionDataPoint>) -> ClassificationResult {
        let started = Instant::now();
        let url = snapshot.effective_url().to_string();
        debug!(action = "start", component = "detector", url = %url, "Classifying snapshot");

        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        for (candidate_idx, candidate) in self.candidates.iter().enumerate() {
            for (strategy_idx, weighted) in candidate.strategies.iter().enumerate() {
                let strategy = Arc::clone(&weighted.strategy);
                let snapshot = Arc::clone(&snapshot);
                let url = url.clone();
                let timeout = self.timeout_for(strategy.as_ref());
                tasks.spawn(async move {
                    let strategy_started = Instant::now();
                    // Blocking tasks cannot be cancelled; a timed-out call still holds its thread.
                    let handle =
                        tokio::task::spawn_blocking(move || strategy.detect(&snapshot, &url));
                    let result = match tokio::time::timeout(timeout, handle).await {
                        Ok(Ok(result)) => result.sanitized(),
                        Ok(Err(join_error)) => {
                            PartialDetectionResult::failed(format!("strategy aborted: {join_error}"))
                        }
                        Err(_) => PartialDetectionResult::failed(format!(
                            "timed out after {}ms",
                            timeout.as_millis()
                        )),
                    };
                    (candidate_idx, strategy_idx, result, strategy_started.elapsed())
                });
            }
        }

        let mut outcomes: Vec<Vec<Option<(PartialDetectionResult, Duration)>>> = self
            .candidates
            .iter()
            .map(|c| vec![None; c.strategies.len()])
            .collect();

        let deadline = self.site_deadline();
        let collected = tokio::time::timeout(deadline + DEADLINE_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((c, s, result, elapsed)) => outcomes[c][s] = Some((result, elapsed)),
                    Err(e) => warn!(action = "join", component = "detector", error = %e, "Strategy task failed"),
                }
            }
        })
        .await;
        if collected.is_err() {
            warn!(
                action = "deadline",
                component = "detector",
                url = %url,
                deadline_ms = deadline.as_millis(),
                "Site deadline exceeded, remaining strategies count as non-matches"
            );
            tasks.abort_all();
        }

        let mut evidence_per_strategy = Vec::new();
        let mut candidate_scores = BTreeMap::new();
        let mut best: Option<(usize, f64)> = None;

        for (candidate_idx, candidate) in self.candidates.iter().enumerate() {
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (strategy_idx, weighted) in candidate.strategies.iter().enumerate() {
                let (result, elapsed) = outcomes[candidate_idx][strategy_idx]
                    .take()
                    .unwrap_or_else(|| {
                        (
                            PartialDetectionResult::failed("site deadline exceeded"),
                            deadline,
                        )
                    });
                weighted_sum += result.confidence * weighted.weight;
                weight_total += weighted.weight;
                evidence_per_strategy.push(StrategyEvidence {
                    cms: candidate.cms.clone(),
                    strategy: weighted.strategy.name().to_string(),
                    weight: weighted.weight,
                    confidence: result.confidence,
                    version: result.version,
                    evidence: result.evidence,
                    error: result.error,
                    execution_time_ms: elapsed.as_millis() as u64,
                });
            }
            let score = if weight_total > 0.0 {
                (weighted_sum / weight_total).clamp(0.0, 1.0)
            } else {
                0.0
            };
            candidate_scores.insert(candidate.cms.clone(), score);
            // Strict comparison keeps the earlier candidate on ties.
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate_idx, score));
            }
        }

        let (cms, confidence, version) = match best {
            Some((idx, score)) => {
                let winner = &self.candidates[idx].cms;
                let hints: Vec<VersionHint> = evidence_per_strategy
                    .iter()
                    .filter(|e| &e.cms == winner)
                    .filter_map(|e| e.version.clone())
                    .collect();
                let version = select_best_version(&hints).map(|h| h.version.clone());
                (winner.clone(), score, version)
            }
            None => (UNKNOWN_CMS.to_string(), 0.0, None),
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            action = "classified",
            component = "detector",
            url = %url,
            cms = %cms,
            confidence = confidence,
            version = ?version,
            duration_ms = execution_time_ms,
            "Snapshot classified"
        );

        ClassificationResult {
            url,
            cms,
            confidence,
            version,
            candidate_scores,
            evidence_per_strategy,
            execution_time_ms,
        }
    }

    /// Classifies many snapshots with at most `max_concurrent_sites` in flight. Results
    /// keep input order.
    pub async fn classify_many(
        self: Arc<Self>,
        snapshots: Vec<DetectionDataPoint>,
    ) -> Vec<ClassificationResult> {
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent_sites.max(1)));
        let mut tasks = JoinSet::new();
        let total = snapshots.len();

        for (idx, snapshot) in snapshots.into_iter().enumerate() {
            let detector = Arc::clone(&self);
            let gate = Arc::clone(&gate);
            tasks.spawn(async move {
                let _permit = gate.acquire_owned().await.ok();
                (idx, detector.classify(Arc::new(snapshot)).await)
            });
        }

        let mut results: Vec<Option<ClassificationResult>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(action = "join", component = "detector", error = %e, "Classification task failed"),
            }
        }
        results.into_iter().flatten().collect()
    }
}
