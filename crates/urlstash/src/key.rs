//! Deterministic mapping from URLs to cache paths.
//!
//! The scheme is stable; changing it orphans every existing cache entry.
//! For `https://api.example.com/v2/games.json?id=7&page=2` the key is
//! `api.example.com/v2_games_id_7.json`:
//!
//! - the host becomes a subdirectory (lowercased, with characters other
//!   than `a-z`, `0-9`, `.` and `-` squashed to `_`), unless disabled in
//!   the configuration
//! - the path keeps a trailing extension of up to 8 alphanumeric
//!   characters, lowercased; anything else falls back to `html`
//! - the rest of the path is squashed with `[^A-Za-z0-9]+` -> `_`; an
//!   empty result becomes `index`
//! - query parameters whose lowercased name ends in `id` or `ids` are
//!   appended as `_name_value`; every other parameter is dropped, so URLs
//!   differing only in dropped parameters share one entry
//! - names longer than 150 bytes are truncated and suffixed with a
//!   SHA-256 fragment of the full URL to stay unique

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use ureq::http::Uri;

/// Runs of characters that are squashed to a single `_`.
static SANITIZE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("invalid sanitize regex"));

/// Longest extension taken over from the URL path.
const MAX_EXTENSION_LEN: usize = 8;

/// Extension used when the URL path does not carry a usable one.
const FALLBACK_EXTENSION: &str = "html";

/// Longest file name emitted before truncation kicks in.
const MAX_FILE_NAME_LEN: usize = 150;

/// Stem length kept when a name is truncated.
const TRUNCATED_STEM_LEN: usize = 100;

/// Relative path of a cache entry below the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `url` following the scheme documented on this
    /// module. The same URL always yields the same key.
    pub fn for_url(url: &str, include_host: bool) -> Self {
        let (host, path, query) = split_url(url);
        let (raw_stem, extension) = split_extension(&path);
        let mut stem = sanitize(raw_stem);
        if stem.is_empty() {
            stem = "index".to_owned();
        }
        if let Some(query) = query {
            for (name, value) in significant_params(&query) {
                stem.push('_');
                stem.push_str(&name);
                stem.push('_');
                stem.push_str(&value);
            }
        }
        let mut name = format!("{stem}.{extension}");
        if name.len() > MAX_FILE_NAME_LEN {
            // The stem is pure ASCII at this point, so byte slicing is safe.
            name = format!(
                "{}_{}.{extension}",
                &stem[..TRUNCATED_STEM_LEN],
                short_digest(url)
            );
        }
        match host {
            Some(host) if include_host => Self(format!("{}/{name}", sanitize_host(&host))),
            _ => Self(name),
        }
    }

    /// Key chosen by the caller instead of derived from a URL.
    ///
    /// The name is used verbatim; the store still validates it on access.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The key as a relative path.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a URL into host, path, and query. Unparseable locators are kept
/// whole as the path so they still map to some key.
fn split_url(url: &str) -> (Option<String>, String, Option<String>) {
    match url.parse::<Uri>() {
        Ok(uri) => (
            uri.host().map(str::to_owned),
            uri.path().to_owned(),
            uri.query().map(str::to_owned),
        ),
        Err(_) => (None, url.to_owned(), None),
    }
}

/// Split a trailing extension off the final path segment.
fn split_extension(path: &str) -> (&str, String) {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, extension)) = last_segment.rsplit_once('.')
        && !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        let stem = &path[..path.len() - extension.len() - 1];
        return (stem, extension.to_ascii_lowercase());
    }
    (path, String::from(FALLBACK_EXTENSION))
}

fn sanitize(text: &str) -> String {
    SANITIZE_PATTERN
        .replace_all(text, "_")
        .trim_matches('_')
        .to_owned()
}

fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Query parameters that survive into the key, in order of appearance.
fn significant_params(query: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for pair in query.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if name.ends_with("id") || name.ends_with("ids") {
            params.push((sanitize(&name), sanitize(value)));
        }
    }
    params
}

/// First 16 hex characters of the SHA-256 of `url`.
fn short_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_page() {
        let key = CacheKey::for_url("https://example.com/games/overview", true);
        assert_eq!(key.as_str(), "example.com/games_overview.html");
    }

    #[test]
    fn test_json_extension_is_kept() {
        let key = CacheKey::for_url("https://api.example.com/v2/products.json", true);
        assert_eq!(key.as_str(), "api.example.com/v2_products.json");
    }

    #[test]
    fn test_extension_is_lowercased() {
        let key = CacheKey::for_url("https://example.com/art/COVER.JPG", true);
        assert_eq!(key.as_str(), "example.com/art_COVER.jpg");
    }

    #[test]
    fn test_long_extension_falls_back_to_html() {
        let key = CacheKey::for_url("https://example.com/page.fragment1x", true);
        assert_eq!(key.as_str(), "example.com/page_fragment1x.html");
    }

    #[test]
    fn test_id_parameters_are_appended() {
        let key = CacheKey::for_url(
            "https://api.example.com/appdetails?appids=440&lang=en",
            true,
        );
        assert_eq!(key.as_str(), "api.example.com/appdetails_appids_440.html");
    }

    #[test]
    fn test_id_parameters_keep_url_order() {
        let key = CacheKey::for_url(
            "https://api.example.com/lookup?appid=1&lang=en&bundleids=2",
            true,
        );
        assert_eq!(
            key.as_str(),
            "api.example.com/lookup_appid_1_bundleids_2.html"
        );
    }

    #[test]
    fn test_dropped_parameters_share_an_entry() {
        let first = CacheKey::for_url("https://example.com/list?page=2", true);
        let second = CacheKey::for_url("https://example.com/list?page=3", true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_ids_get_different_entries() {
        let first = CacheKey::for_url("https://example.com/item?id=7", true);
        let second = CacheKey::for_url("https://example.com/item?id=8", true);
        assert_ne!(first, second);
    }

    #[test]
    fn test_root_path_becomes_index() {
        let key = CacheKey::for_url("https://example.com/", true);
        assert_eq!(key.as_str(), "example.com/index.html");
    }

    #[test]
    fn test_without_host_directory() {
        let key = CacheKey::for_url("https://example.com/games/overview", false);
        assert_eq!(key.as_str(), "games_overview.html");
    }

    #[test]
    fn test_host_is_lowercased() {
        let key = CacheKey::for_url("https://Store.Example.COM/page", true);
        assert_eq!(key.as_str(), "store.example.com/page.html");
    }

    #[test]
    fn test_unparseable_locator_still_maps() {
        let key = CacheKey::for_url("not a url at all", true);
        assert_eq!(key.as_str(), "not_a_url_at_all.html");
    }

    #[test]
    fn test_same_url_is_deterministic() {
        let url = "https://example.com/games?ids=1,2,3";
        assert_eq!(
            CacheKey::for_url(url, true),
            CacheKey::for_url(url, true)
        );
    }

    #[test]
    fn test_overlong_name_is_truncated_and_hashed() {
        let url = format!("https://example.com/{}", "segment/".repeat(40));
        let key = CacheKey::for_url(&url, true);

        let name = key.as_str().rsplit('/').next().unwrap();
        assert!(name.len() <= MAX_FILE_NAME_LEN);
        assert!(name.ends_with(".html"));
    }

    #[test]
    fn test_overlong_names_stay_unique() {
        let first = format!("https://example.com/{}/a", "segment/".repeat(40));
        let second = format!("https://example.com/{}/b", "segment/".repeat(40));
        assert_ne!(
            CacheKey::for_url(&first, true),
            CacheKey::for_url(&second, true)
        );
    }

    #[test]
    fn test_named_key_is_verbatim() {
        let key = CacheKey::named("exports/library.json");
        assert_eq!(key.as_str(), "exports/library.json");
    }
}
