use regex::Regex;
use std::sync::OnceLock;
use url::Url;

// Shared hosting and CDN suffixes whose per-tenant subdomains collapse to one host.
const SHARED_HOST_PATTERNS: &[&str] = &[
    r"^.+\.(cloudfront\.net)$",
    r"^.+\.(amazonaws\.com)$",
    r"^.+\.(herokuapp\.com)$",
    r"^.+\.(netlify\.app)$",
    r"^.+\.(vercel\.app)$",
    r"^.+\.(github\.io)$",
    r"^.+\.(firebaseapp\.com)$",
    r"^.+\.(appspot\.com)$",
    r"^.+\.(azurewebsites\.net)$",
    r"^.+\.(akamaihd\.net)$",
    r"^.+\.(fastly\.net)$",
    r"^.+\.(b-cdn\.net)$",
    r"^.+\.(stackpathcdn\.com)$",
    r"^.+\.(kxcdn\.com)$",
    r"^.+\.(multiscreensite\.com)$",
];

fn shared_host_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SHARED_HOST_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

pub fn has_valid_tld(domain: &str) -> bool {
    if domain.is_empty() || domain.len() < 3 || !domain.contains('.') {
        return false;
    }

    if let Some(last_dot) = domain.rfind('.') {
        if last_dot == domain.len() - 1 {
            return false;
        }
        let tld = &domain[last_dot + 1..];
        tld.len() >= 2
            && tld
                .chars()
                .all(|c| c.is_ascii_lowercase() && c.is_ascii_alphabetic())
    } else {
        false
    }
}

pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    }
}

/// Collapses tenant subdomains of shared hosting/CDN providers (`d1x.cloudfront.net`
/// becomes `cloudfront.net`).
pub fn collapse_shared_host(host: &str) -> String {
    let host = normalize_host(host);
    for pattern in shared_host_patterns() {
        if let Some(captures) = pattern.captures(&host) {
            if let Some(matched) = captures.get(1) {
                return matched.as_str().to_string();
            }
        }
    }
    host
}

// Second-level labels that country-code registries sell under (`co.uk`, `com.au`).
const COUNTRY_SECOND_LEVEL: &[&str] = &[
    "ac", "co", "com", "edu", "gob", "gov", "govt", "ltd", "mil", "ne", "net", "nic", "or",
    "org", "plc", "sch",
];

/// Registrable part of a host: the last two labels, or three under a country-code
/// second level such as `example.co.uk`.
pub fn base_domain(host: &str) -> String {
    let host = normalize_host(host);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        return host;
    }
    let tld = parts[parts.len() - 1];
    let second = parts[parts.len() - 2];
    let keep = if tld.len() == 2 && COUNTRY_SECOND_LEVEL.contains(&second) {
        3
    } else {
        2
    };
    parts[parts.len() - keep..].join(".")
}

pub fn is_first_party(script_host: &str, site_host: &str) -> bool {
    base_domain(script_host) == base_domain(site_host)
}

pub fn parse_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{raw}")))
        .ok()
        .filter(|u| u.host_str().is_some())
}

/// Stable identity for a site: normalized host plus path without trailing slash, query or
/// fragment. `https://WWW.Example.com/` and `http://example.com` share a key.
pub fn site_key(raw: &str) -> Option<String> {
    let url = parse_url(raw)?;
    let host = normalize_host(url.host_str()?);
    let path = url.path().trim_end_matches('/');
    if path.is_empty() {
        Some(host)
    } else {
        Some(format!("{host}{path}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRef {
    pub host: String,
    pub path: String,
    pub first_party: bool,
}

impl ScriptRef {
    /// `host/path` without scheme, used as a sample value.
    pub fn display(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

/// Resolves a script `src` against the page URL. Protocol-relative and relative sources
/// are first-party unless they resolve to another registrable domain.
pub fn resolve_script(src: &str, page_url: &str) -> Option<ScriptRef> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") || src.starts_with("blob:") {
        return None;
    }
    let page = parse_url(page_url);
    let resolved = match Url::parse(src) {
        Ok(url) => url,
        Err(_) => page.as_ref()?.join(src).ok()?,
    };
    let raw_host = resolved.host_str()?;
    let first_party = page
        .as_ref()
        .and_then(|p| p.host_str())
        .map(|site_host| is_first_party(raw_host, site_host))
        .unwrap_or(false);
    Some(ScriptRef {
        host: collapse_shared_host(raw_host),
        path: resolved.path().to_string(),
        first_party,
    })
}

/// Leading directory segments of a path: `/wp-content/plugins/x/y.js` with two segments
/// gives `/wp-content/plugins`. Files at the root map to `/`.
pub fn path_prefix(path: &str, segments: usize) -> String {
    let dirs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let dir_count = dirs.len().saturating_sub(1);
    let take = dir_count.min(segments);
    if take == 0 {
        return "/".to_string();
    }
    format!("/{}", dirs[..take].join("/").to_ascii_lowercase())
}
