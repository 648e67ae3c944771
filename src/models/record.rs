//! The extraction record and its identity derivation.

use serde::{Deserialize, Serialize};
use url::Url;

/// Column order of the persisted store. The downstream indexing stage
/// depends on these names; changing them is a breaking change.
pub const CSV_COLUMNS: &[&str] = &[
    "identity",
    "title",
    "url",
    "rating",
    "vote_count",
    "duration",
    "blurb",
];

/// One discovered catalog entry.
///
/// `identity` is the stable external key (e.g. `tt0123456`) and is the
/// only required field. All other fields are best-effort: an empty
/// string means the field was present in the source layout but could
/// not be extracted, never that extraction was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub identity: String,
    pub title: String,
    pub url: String,
    pub rating: String,
    pub vote_count: String,
    pub duration: String,
    pub blurb: String,
}

impl ExtractionRecord {
    /// Build a record from a raw item link, deriving the canonical URL
    /// and identity. Returns `None` when no identity can be derived,
    /// since such a record cannot be deduplicated.
    pub fn from_link(href: &str) -> Option<Self> {
        let url = canonical_url(href);
        let identity = identity_from_url(&url);
        if identity.is_empty() {
            return None;
        }
        Some(Self {
            identity,
            title: String::new(),
            url,
            rating: String::new(),
            vote_count: String::new(),
            duration: String::new(),
            blurb: String::new(),
        })
    }
}

/// Strip query parameters and fragments so the same title always maps
/// to the same URL regardless of tracking parameters.
pub fn canonical_url(href: &str) -> String {
    match Url::parse(href) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        // Relative or malformed links: best-effort strip.
        Err(_) => href.split(['?', '#']).next().unwrap_or("").to_string(),
    }
}

/// Parse the catalog identity out of a canonical title URL.
///
/// Expects a path segment of the form `/title/<id>/`; anything else
/// yields an empty string.
pub fn identity_from_url(url: &str) -> String {
    let Some(rest) = url.split("/title/").nth(1) else {
        return String::new();
    };
    rest.split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .to_string()
}
