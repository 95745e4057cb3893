use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    MetaGenerator,
    HttpHeader,
    ScriptPath,
}

impl VersionSource {
    pub fn priority(self) -> u8 {
        match self {
            VersionSource::MetaGenerator => 3,
            VersionSource::HttpHeader => 2,
            VersionSource::ScriptPath => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintConfidence {
    Low,
    Medium,
    High,
}

impl HintConfidence {
    pub fn rank(self) -> u8 {
        match self {
            HintConfidence::High => 3,
            HintConfidence::Medium => 2,
            HintConfidence::Low => 1,
        }
    }

    /// Buckets the confidence of the strategy that produced the hint.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            HintConfidence::High
        } else if score >= 0.4 {
            HintConfidence::Medium
        } else {
            HintConfidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHint {
    pub version: String,
    pub source: VersionSource,
    pub confidence: HintConfidence,
}

// Variant order is the segment order: text < absent < number, so `6.5-rc1` < `6.5` <
// `6.5.1` and `10a` < `9` < `10`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Text(&'a str),
    Absent,
    Number(u64),
}

impl<'a> Segment<'a> {
    fn parse(raw: Option<&'a str>) -> Self {
        match raw {
            None => Segment::Absent,
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) => Segment::Number(n),
                Err(_) => Segment::Text(raw),
            },
        }
    }
}

/// Orders dotted versions segment by segment (`5.10` > `5.9`). Numeric segments rank
/// above a missing segment, which ranks above text, so pre-release suffixes sort below
/// the release. A total order: identical segment lists fall back to the raw strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-']);
    let mut right = b.split(['.', '-']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (l, r) => {
                let ord = Segment::parse(l).cmp(&Segment::parse(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Picks the most trustworthy hint: source priority first
/// (meta-generator > http-header > script-path), then hint confidence, then the greatest
/// version. The outcome is independent of input order.
pub fn select_best_version(hints: &[VersionHint]) -> Option<&VersionHint> {
    hints
        .iter()
        .filter(|h| !h.version.trim().is_empty())
        .max_by(|a, b| {
            a.source
                .priority()
                .cmp(&b.source.priority())
                .then_with(|| a.confidence.rank().cmp(&b.confidence.rank()))
                .then_with(|| compare_versions(&a.version, &b.version))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(version: &str, source: VersionSource, confidence: HintConfidence) -> VersionHint {
        VersionHint {
            version: version.to_string(),
            source,
            confidence,
        }
    }

    #[test]
    fn source_priority_beats_confidence() {
        let hints = vec![
            hint("5.2", VersionSource::HttpHeader, HintConfidence::High),
            hint("5.4", VersionSource::MetaGenerator, HintConfidence::Medium),
        ];
        assert_eq!(select_best_version(&hints).unwrap().version, "5.4");

        let reversed: Vec<_> = hints.into_iter().rev().collect();
        assert_eq!(select_best_version(&reversed).unwrap().version, "5.4");
    }

    #[test]
    fn confidence_breaks_ties_within_source() {
        let hints = vec![
            hint("6.1", VersionSource::ScriptPath, HintConfidence::Low),
            hint("6.3", VersionSource::ScriptPath, HintConfidence::High),
            hint("6.2", VersionSource::ScriptPath, HintConfidence::Medium),
        ];
        assert_eq!(select_best_version(&hints).unwrap().version, "6.3");
    }

    #[test]
    fn full_ties_resolve_to_greatest_version() {
        let a = hint("5.10", VersionSource::HttpHeader, HintConfidence::High);
        let b = hint("5.9", VersionSource::HttpHeader, HintConfidence::High);
        assert_eq!(select_best_version(&[a.clone(), b.clone()]).unwrap().version, "5.10");
        assert_eq!(select_best_version(&[b, a]).unwrap().version, "5.10");
    }

    #[test]
    fn mixed_segments_compare_consistently() {
        assert_eq!(compare_versions("10", "9"), Ordering::Greater);
        assert_eq!(compare_versions("9", "10a"), Ordering::Greater);
        assert_eq!(compare_versions("10", "10a"), Ordering::Greater);
        assert_eq!(compare_versions("6.5", "6.5-RC1"), Ordering::Greater);
        assert_eq!(compare_versions("6.5.1", "6.5"), Ordering::Greater);
        assert_eq!(compare_versions("6.5-RC2", "6.5-RC1"), Ordering::Greater);
        assert_eq!(compare_versions("6.05", "6.5"), Ordering::Less);
    }

    #[test]
    fn alphanumeric_ties_do_not_depend_on_order() {
        let pick = |versions: &[&str]| {
            let hints: Vec<_> = versions
                .iter()
                .map(|v| hint(v, VersionSource::ScriptPath, HintConfidence::Medium))
                .collect();
            select_best_version(&hints).unwrap().version.clone()
        };
        assert_eq!(pick(&["9", "10", "10a"]), "10");
        assert_eq!(pick(&["10a", "9", "10"]), "10");
        assert_eq!(pick(&["10", "10a", "9"]), "10");
    }

    #[test]
    fn empty_hints_yield_none() {
        assert!(select_best_version(&[]).is_none());
        let blank = hint("  ", VersionSource::MetaGenerator, HintConfidence::High);
        assert!(select_best_version(&[blank]).is_none());
    }
}
