//! Caching HTTP downloader.
//!
//! Downloads are fetched once and stored on disk, one file per URL, so
//! repeated runs of a scraping or syncing job hit the network only for
//! resources they have not seen before. The main pieces:
//!
//! - [`Downloader`]: the fetch front end, pairing an HTTP client with an
//!   on-disk [`EntryStore`]
//! - [`DownloaderConfig`]: immutable settings built once at startup
//! - [`FetchOptions`]: per-call flags (`force`, `allow_missing`)
//! - [`CacheKey`]: deterministic mapping from URL to store path
//! - [`Fetcher`]: transport trait, swappable for tests
//!
//! # Example
//!
//! ```no_run
//! use urlstash::{Downloader, DownloaderConfig, FetchOptions};
//!
//! # fn main() -> Result<(), urlstash::FetchError> {
//! let config = DownloaderConfig::new("cache")
//!     .delay(std::time::Duration::from_millis(500))
//!     .header("User-Agent", "urlstash-demo");
//! let downloader = Downloader::new(config)?;
//!
//! // First call downloads, later calls read the cache.
//! let bytes = downloader.fetch("https://example.com/catalog", FetchOptions::default())?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

mod config;
mod downloader;
mod error;
mod http;
mod key;
mod pacer;

pub use config::DownloaderConfig;
pub use downloader::{Downloader, FetchOptions};
pub use error::FetchError;
pub use http::{Fetcher, RemoteResponse};
pub use key::CacheKey;
pub use urlstash_store::EntryStore;
