use crate::snapshot::HeaderValue;

/// Stands in for a header or meta tag that is present with an empty value.
pub const EMPTY_VALUE: &str = "<empty>";
pub const MAX_VALUE_CHARS: usize = 200;
pub const TRUNCATION_MARKER: &str = "...";

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Trims, strips one pair of surrounding quotes, maps empty to [`EMPTY_VALUE`] and cuts
/// values past [`MAX_VALUE_CHARS`] characters, appending [`TRUNCATION_MARKER`].
pub fn normalize_value(raw: &str) -> String {
    let value = strip_quotes(raw.trim()).trim();
    if value.is_empty() {
        return EMPTY_VALUE.to_string();
    }
    if value.chars().count() > MAX_VALUE_CHARS {
        let mut cut: String = value.chars().take(MAX_VALUE_CHARS).collect();
        cut.push_str(TRUNCATION_MARKER);
        return cut;
    }
    value.to_string()
}

pub fn normalize_header_value(value: &HeaderValue) -> String {
    normalize_value(&value.joined())
}

/// Canonical CMS label. Version-suffixed and punctuated variants of the tracked families
/// collapse to one label; `unknown` and blank labels become `None`.
pub fn canonical_cms_label(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let lowered = raw.to_lowercase();
    if lowered.is_empty() || lowered == "unknown" || lowered == "none" {
        return None;
    }
    let family = lowered
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace())
        .trim_end_matches('!');
    let label = match family {
        "wordpress" => "WordPress",
        "drupal" => "Drupal",
        "joomla" => "Joomla",
        "duda" => "Duda",
        _ => return Some(raw.to_string()),
    };
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_trimmed_and_unquoted() {
        assert_eq!(normalize_value("  \"nginx\" "), "nginx");
        assert_eq!(normalize_value("'abc'"), "abc");
        assert_eq!(normalize_value("\""), "\"");
    }

    #[test]
    fn empty_values_get_a_sentinel() {
        assert_eq!(normalize_value(""), EMPTY_VALUE);
        assert_eq!(normalize_value("  \"\"  "), EMPTY_VALUE);
    }

    #[test]
    fn long_values_are_truncated_with_marker() {
        let long = "é".repeat(250);
        let normalized = normalize_value(&long);
        assert_eq!(normalized.chars().count(), MAX_VALUE_CHARS + TRUNCATION_MARKER.len());
        assert!(normalized.ends_with(TRUNCATION_MARKER));
        let exact = "a".repeat(MAX_VALUE_CHARS);
        assert_eq!(normalize_value(&exact), exact);
    }

    #[test]
    fn array_headers_join_with_semicolon() {
        let value = HeaderValue::Multiple(vec!["a=1".into(), "b=2".into()]);
        assert_eq!(normalize_header_value(&value), "a=1; b=2");
    }

    #[test]
    fn cms_labels_collapse_variants() {
        assert_eq!(canonical_cms_label(Some("Drupal 7")).as_deref(), Some("Drupal"));
        assert_eq!(canonical_cms_label(Some("joomla!")).as_deref(), Some("Joomla"));
        assert_eq!(canonical_cms_label(Some("WORDPRESS")).as_deref(), Some("WordPress"));
        assert_eq!(canonical_cms_label(Some("Shopify")).as_deref(), Some("Shopify"));
        assert_eq!(canonical_cms_label(Some("Unknown")), None);
        assert_eq!(canonical_cms_label(Some("  ")), None);
        assert_eq!(canonical_cms_label(None), None);
    }

    #[test]
    fn names_are_case_folded() {
        assert_eq!(normalize_name(" X-Powered-By "), "x-powered-by");
    }
}
