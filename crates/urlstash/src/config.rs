//! Downloader configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default pause between network requests.
const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// Default timeout for the whole of one HTTP exchange.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a [`Downloader`](crate::Downloader).
///
/// Built once at startup with the builder methods and then handed to
/// [`Downloader::new`](crate::Downloader::new); the downloader keeps the
/// configuration immutable from then on.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub(crate) cache_dir: PathBuf,
    pub(crate) delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) max_age: Option<Duration>,
    pub(crate) include_host: bool,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) cookies: Vec<(String, String)>,
}

impl DownloaderConfig {
    /// Configuration with defaults, caching under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            delay: DEFAULT_DELAY,
            timeout: DEFAULT_TIMEOUT,
            max_age: None,
            include_host: true,
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Set the base pause between network requests.
    ///
    /// The actual pause is jittered between 0.5x and 1.5x of this value,
    /// counted from the moment the previous request completed. Zero
    /// disables pacing.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the timeout for a complete HTTP exchange.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Treat cache entries older than `max_age` as missing.
    ///
    /// By default entries never go stale.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Whether cache paths start with a per-host subdirectory. On by default.
    #[must_use]
    pub fn include_host(mut self, include_host: bool) -> Self {
        self.include_host = include_host;
        self
    }

    /// Add a header sent with every request. May be called repeatedly.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a cookie sent with every request. May be called repeatedly.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Headers for outgoing requests, with cookies folded into a single
    /// `Cookie` header.
    pub(crate) fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_owned(), cookie));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::new("cache");

        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.delay, Duration::from_millis(200));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_age, None);
        assert!(config.include_host);
        assert!(config.headers.is_empty());
        assert!(config.cookies.is_empty());
    }

    #[test]
    fn test_builder_chaining() {
        let config = DownloaderConfig::new("cache")
            .delay(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .max_age(Duration::from_secs(86400))
            .include_host(false);

        assert_eq!(config.delay, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_age, Some(Duration::from_secs(86400)));
        assert!(!config.include_host);
    }

    #[test]
    fn test_request_headers_without_cookies() {
        let config = DownloaderConfig::new("cache")
            .header("User-Agent", "urlstash-test")
            .header("Accept", "application/json");

        assert_eq!(
            config.request_headers(),
            vec![
                ("User-Agent".to_owned(), "urlstash-test".to_owned()),
                ("Accept".to_owned(), "application/json".to_owned()),
            ]
        );
    }

    #[test]
    fn test_cookies_fold_into_one_header() {
        let config = DownloaderConfig::new("cache")
            .cookie("session", "abc123")
            .cookie("region", "eu");

        assert_eq!(
            config.request_headers(),
            vec![("Cookie".to_owned(), "session=abc123; region=eu".to_owned())]
        );
    }
}
