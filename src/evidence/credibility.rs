//! Domain-reputation credibility scoring for sources.
//!
//! A URL is normalized to its registered domain and looked up in a static
//! reputation table. Resolution order:
//!
//! 1. exact domain match
//! 2. top-level-domain match (`gov`, `edu`)
//! 3. suffix match against any known domain (`blog.nature.com` -> `nature.com`)
//! 4. [`UNKNOWN_DOMAIN_CREDIBILITY`]
//!
//! URLs that cannot be parsed score [`MALFORMED_URL_CREDIBILITY`].

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

/// Score for a well-formed URL whose domain is not in the table.
pub const UNKNOWN_DOMAIN_CREDIBILITY: f64 = 0.5;

/// Score for a URL whose domain cannot be extracted.
pub const MALFORMED_URL_CREDIBILITY: f64 = 0.4;

/// Domain recorded on sources whose URL cannot be parsed.
pub const UNKNOWN_DOMAIN: &str = "unknown";

static DOMAIN_CREDIBILITY: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    HashMap::from([
        // Primary academic / institutional
        ("nature.com", 0.95),
        ("science.org", 0.95),
        ("sciencedirect.com", 0.93),
        ("arxiv.org", 0.88),
        ("pubmed.ncbi.nlm.nih.gov", 0.92),
        ("nih.gov", 0.92),
        ("ieee.org", 0.90),
        ("acm.org", 0.90),
        ("springer.com", 0.88),
        ("link.springer.com", 0.88),
        ("wiley.com", 0.88),
        ("pnas.org", 0.93),
        ("cell.com", 0.93),
        ("iopscience.iop.org", 0.90),
        ("academic.oup.com", 0.90),
        ("nationalmaglab.org", 0.88),
        ("home.cern", 0.92),
        ("cern.ch", 0.92),
        ("indico.cern.ch", 0.90),
        ("physicsworld.com", 0.80),
        ("scitechdaily.com", 0.65),
        // Top-level domains
        ("gov", 0.85),
        ("edu", 0.82),
        // Quality journalism / encyclopedic
        ("reuters.com", 0.82),
        ("apnews.com", 0.82),
        ("bbc.com", 0.78),
        ("nytimes.com", 0.78),
        ("theguardian.com", 0.75),
        ("economist.com", 0.80),
        ("wikipedia.org", 0.72),
        ("britannica.com", 0.78),
        ("technologyreview.com", 0.78),
        ("ans.org", 0.80),
        ("iter.org", 0.82),
        // Tech / industry
        ("github.com", 0.70),
        ("stackoverflow.com", 0.68),
        ("arstechnica.com", 0.72),
        ("wired.com", 0.68),
        ("cfs.energy", 0.72),
        // Blogs / forums
        ("medium.com", 0.45),
        ("substack.com", 0.45),
        ("reddit.com", 0.35),
        ("quora.com", 0.35),
    ])
});

// scheme://[userinfo@]host[:port][/...]
static AUTHORITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(?:[^@/?#]*@)?([^/?#:]+)(?::\d*)?(?:[/?#]|$)")
        .expect("invalid regex")
});

static HOST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9.\-]*[a-z0-9])?$").expect("invalid regex"));

/// Extract the registered domain from a URL, lowercased and without `www.`.
///
/// Returns `None` for anything that does not carry a usable host.
pub fn normalize_domain(url: &str) -> Option<String> {
    let caps = AUTHORITY_PATTERN.captures(url.trim())?;
    let host = caps.get(1)?.as_str().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).trim_end_matches('.');

    if host.is_empty() || !HOST_PATTERN.is_match(host) {
        return None;
    }
    Some(host.to_string())
}

/// Score an already-normalized domain.
pub fn score_domain(domain: &str) -> f64 {
    if let Some(score) = DOMAIN_CREDIBILITY.get(domain) {
        return *score;
    }

    let tld = domain.rsplit('.').next().unwrap_or(domain);
    if let Some(score) = DOMAIN_CREDIBILITY.get(tld) {
        return *score;
    }

    // Longest matching suffix wins so nested entries (indico.cern.ch) beat
    // their parents regardless of table iteration order.
    DOMAIN_CREDIBILITY
        .iter()
        .filter(|(known, _)| {
            domain
                .strip_suffix(*known)
                .is_some_and(|prefix| prefix.ends_with('.'))
        })
        .max_by_key(|(known, _)| known.len())
        .map(|(_, score)| *score)
        .unwrap_or(UNKNOWN_DOMAIN_CREDIBILITY)
}

/// Score a URL's credibility in [0, 1]. Never fails.
pub fn score_url(url: &str) -> f64 {
    match normalize_domain(url) {
        Some(domain) => score_domain(&domain),
        None => {
            warn!(url, "could not extract domain, using malformed-url credibility");
            MALFORMED_URL_CREDIBILITY
        }
    }
}

/// Number of entries in the reputation table.
pub fn table_size() -> usize {
    DOMAIN_CREDIBILITY.len()
}
