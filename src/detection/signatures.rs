//! Built-in signatures for the tracked CMS families.
//!
//! Weights are tuned constants, not learned values. Each table is additive within one
//! strategy and clamped to 1.0 by the scorer.

use std::sync::Arc;

use super::detector::{CmsDetector, WeightedStrategy};
use super::dom::{DomRule, DomStrategy};
use super::headers::{HeaderPattern, HeaderStrategy};
use super::meta::{MetaRule, MetaTagStrategy};
use super::robots::RobotsTxtStrategy;
use super::scripts::ScriptStrategy;
use super::strategy::SignalRule;
use crate::error::SignatureError;

pub const WORDPRESS: &str = "WordPress";
pub const DRUPAL: &str = "Drupal";
pub const JOOMLA: &str = "Joomla";
pub const DUDA: &str = "Duda";

pub const HEADER_WEIGHT: f64 = 0.25;
pub const META_WEIGHT: f64 = 0.3;
pub const DOM_WEIGHT: f64 = 0.15;
pub const SCRIPT_WEIGHT: f64 = 0.2;
pub const ROBOTS_WEIGHT: f64 = 0.1;

struct Signatures {
    headers: Vec<HeaderPattern>,
    meta: Vec<MetaRule>,
    dom: Vec<DomRule>,
    script_src: Vec<SignalRule>,
    script_inline: Vec<SignalRule>,
    robots: Vec<SignalRule>,
}

impl Signatures {
    fn into_detector(self, cms: &str) -> CmsDetector {
        CmsDetector::new(
            cms,
            vec![
                WeightedStrategy::new(Arc::new(HeaderStrategy::new(self.headers)), HEADER_WEIGHT),
                WeightedStrategy::new(Arc::new(MetaTagStrategy::new(self.meta)), META_WEIGHT),
                WeightedStrategy::new(Arc::new(DomStrategy::new(self.dom)), DOM_WEIGHT),
                WeightedStrategy::new(
                    Arc::new(ScriptStrategy::new(self.script_src, self.script_inline)),
                    SCRIPT_WEIGHT,
                ),
                WeightedStrategy::new(Arc::new(RobotsTxtStrategy::new(self.robots)), ROBOTS_WEIGHT),
            ],
        )
    }
}

fn markup(id: &str, needle: &str, weight: f64) -> DomRule {
    DomRule::Markup(SignalRule::literal(id, needle, weight))
}

fn selector(selector: &str, weight: f64) -> DomRule {
    DomRule::Selector {
        selector: selector.to_string(),
        weight,
    }
}

fn wordpress() -> Result<Signatures, SignatureError> {
    Ok(Signatures {
        headers: vec![
            HeaderPattern::value_version("x-powered-by", r"(?i)wordpress(?:/|\s+)?([0-9]+(?:\.[0-9]+)*)?", 0.5)?,
            HeaderPattern::value_contains("link", "api.w.org", 0.4),
            HeaderPattern::any_value("/wp-json/", 0.3),
            HeaderPattern::any_name("^x-wp-", 0.3)?,
            HeaderPattern::present("x-pingback", 0.3),
            HeaderPattern::value_contains("x-redirect-by", "wordpress", 0.4),
            HeaderPattern::value_matches("set-cookie", r"wordpress_|wp-settings-", 0.3)?,
        ],
        meta: vec![MetaRule::named(
            "generator",
            SignalRule::versioned("meta:generator", r"(?i)^\s*wordpress\s*([0-9]+(?:\.[0-9]+)*)?", 0.9)?,
        )],
        dom: vec![
            markup("dom:wp-content", "/wp-content/", 0.4),
            markup("dom:wp-includes", "/wp-includes/", 0.4),
            markup("dom:wp-block", "wp-block-", 0.2),
            selector("link[rel='https://api.w.org/']", 0.2),
        ],
        script_src: vec![
            SignalRule::regex("script:wp-path", r"/wp-(?:content|includes)/", 0.5)?,
            SignalRule::versioned(
                "script:wp-core-version",
                r"/wp-includes/js/(?:wp-embed|wp-emoji-release|comment-reply)[^?]*\?(?:.*&)?ver=([0-9]+(?:\.[0-9]+)+)",
                0.2,
            )?,
        ],
        script_inline: vec![
            SignalRule::literal("inline:wp-emoji", "_wpemojiSettings", 0.3),
            SignalRule::literal("inline:wp-ajax", "admin-ajax.php", 0.2),
        ],
        robots: vec![
            SignalRule::literal("robots:wp-admin", "disallow: /wp-admin/", 0.6),
            SignalRule::literal("robots:admin-ajax", "allow: /wp-admin/admin-ajax.php", 0.3),
            SignalRule::literal("robots:wp-sitemap", "wp-sitemap.xml", 0.2),
        ],
    })
}

fn drupal() -> Result<Signatures, SignatureError> {
    Ok(Signatures {
        headers: vec![
            HeaderPattern::value_version("x-generator", r"(?i)drupal\s*([0-9]+(?:\.[0-9]+)*)?", 0.6)?,
            HeaderPattern::present("x-drupal-cache", 0.5),
            HeaderPattern::present("x-drupal-dynamic-cache", 0.5),
            HeaderPattern::any_name("^x-drupal-", 0.3)?,
            HeaderPattern::value_contains("expires", "19 Nov 1978", 0.3),
        ],
        meta: vec![MetaRule::named(
            "generator",
            SignalRule::versioned("meta:generator", r"(?i)^\s*drupal\s*([0-9]+(?:\.[0-9]+)*)?", 0.9)?,
        )],
        dom: vec![
            markup("dom:drupal-settings", "drupal-settings-json", 0.4),
            markup("dom:drupal-selector", "data-drupal-selector", 0.4),
            markup("dom:sites-files", "/sites/default/files/", 0.3),
            markup("dom:drupal-settings-legacy", "Drupal.settings", 0.3),
        ],
        script_src: vec![
            SignalRule::regex("script:drupal-js", r"/(?:core/)?misc/drupal\.js", 0.5)?,
            SignalRule::regex("script:sites-path", r"/sites/(?:all|default)/", 0.3)?,
            SignalRule::versioned("script:drupal-core-version", r"/core/misc/drupal\.js\?v=([0-9]+(?:\.[0-9]+)+)", 0.2)?,
        ],
        script_inline: vec![SignalRule::literal("inline:drupal-settings", "drupalSettings", 0.4)],
        robots: vec![
            SignalRule::literal("robots:core", "disallow: /core/", 0.4),
            SignalRule::literal("robots:profiles", "disallow: /profiles/", 0.3),
            SignalRule::literal("robots:index-user", "disallow: /index.php/user/", 0.2),
        ],
    })
}

fn joomla() -> Result<Signatures, SignatureError> {
    Ok(Signatures {
        headers: vec![
            HeaderPattern::value_contains("x-content-encoded-by", "joomla", 0.6),
            HeaderPattern::value_version("x-powered-by", r"(?i)joomla!?\s*([0-9]+(?:\.[0-9]+)*)?", 0.5)?,
        ],
        meta: vec![MetaRule::named(
            "generator",
            SignalRule::versioned(
                "meta:generator",
                r"(?i)^\s*joomla!?(?:\s*-\s*open source content management)?(?:\s*version)?\s*([0-9]+(?:\.[0-9]+)*)?",
                0.9,
            )?,
        )],
        dom: vec![
            markup("dom:media-jui", "/media/jui/", 0.4),
            markup("dom:script-options", "joomla-script-options", 0.4),
            markup("dom:com-option", "option=com_", 0.3),
        ],
        script_src: vec![
            SignalRule::literal("script:media-jui", "/media/jui/js/", 0.4),
            SignalRule::literal("script:media-system", "/media/system/js/", 0.4),
        ],
        script_inline: vec![SignalRule::literal("inline:joomla-jtext", "Joomla.JText", 0.3)],
        robots: vec![
            SignalRule::literal("robots:administrator", "disallow: /administrator/", 0.6),
            SignalRule::literal("robots:components", "disallow: /components/", 0.2),
        ],
    })
}

fn duda() -> Result<Signatures, SignatureError> {
    Ok(Signatures {
        headers: vec![
            HeaderPattern::any_value("multiscreensite", 0.4),
            HeaderPattern::any_value("cdn-website.com", 0.4),
        ],
        meta: vec![MetaRule::named(
            "generator",
            SignalRule::literal("meta:generator", "duda", 0.8),
        )],
        dom: vec![
            selector("#dmRoot", 0.3),
            markup("dom:dm-body", "dmBody", 0.4),
            markup("dom:cdn-website", "irp.cdn-website.com", 0.4),
        ],
        script_src: vec![
            SignalRule::literal("script:cdn-website", "cdn-website.com", 0.5),
            SignalRule::literal("script:multiscreensite", "multiscreensite.com", 0.5),
        ],
        script_inline: vec![
            SignalRule::literal("inline:window-parameters", "window.Parameters", 0.3),
            SignalRule::literal("inline:dm-api", "dmAPI", 0.3),
        ],
        robots: vec![SignalRule::literal("robots:dm-path", "disallow: /_dm/", 0.3)],
    })
}

/// Detectors for WordPress, Drupal, Joomla and Duda in that order; the order breaks
/// exact confidence ties.
pub fn builtin_detectors() -> Result<Vec<CmsDetector>, SignatureError> {
    Ok(vec![
        wordpress()?.into_detector(WORDPRESS),
        drupal()?.into_detector(DRUPAL),
        joomla()?.into_detector(JOOMLA),
        duda()?.into_detector(DUDA),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_compile() {
        let detectors = builtin_detectors().unwrap();
        let names: Vec<&str> = detectors.iter().map(|d| d.cms.as_str()).collect();
        assert_eq!(names, vec![WORDPRESS, DRUPAL, JOOMLA, DUDA]);
        for detector in &detectors {
            assert_eq!(detector.strategies.len(), 5);
            let total: f64 = detector.strategies.iter().map(|s| s.weight).sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }
}
