//! The caching downloader.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use urlstash_store::EntryStore;

use crate::config::DownloaderConfig;
use crate::error::FetchError;
use crate::http::{Fetcher, UreqFetcher};
use crate::key::CacheKey;
use crate::pacer::Pacer;

/// Statuses meaning "the resource does not exist".
const NOT_FOUND_STATUSES: [u16; 2] = [404, 410];

/// Per-call fetch flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache lookup and download unconditionally, replacing any
    /// existing entry.
    pub force: bool,
    /// Treat a remote not-found (HTTP 404 or 410) as the absent result
    /// instead of an error.
    pub allow_missing: bool,
}

/// Payload from one raw fetch plus how it was obtained.
struct Fetched {
    bytes: Vec<u8>,
    /// Whether the bytes came over the network in this call.
    downloaded: bool,
    /// Final URL when the download was redirected.
    redirected_to: Option<String>,
}

/// Caching front end over a blocking HTTP transport.
///
/// Every fetch is synchronous: a cache hit is a plain file read, a miss
/// waits out the pacing window, performs one GET, and stores the payload
/// before returning it. There are no automatic retries; a failed download
/// surfaces as an error and leaves any previously cached payload in place.
pub struct Downloader {
    config: DownloaderConfig,
    store: EntryStore,
    fetcher: Box<dyn Fetcher>,
    pacer: Mutex<Pacer>,
}

impl Downloader {
    /// Create a downloader over the real HTTP transport.
    pub fn new(config: DownloaderConfig) -> io::Result<Self> {
        let fetcher = UreqFetcher::new(config.timeout, config.request_headers());
        Self::with_fetcher(config, Box::new(fetcher))
    }

    /// Create a downloader with a custom transport, for tests and for
    /// callers that bring their own HTTP stack.
    pub fn with_fetcher(config: DownloaderConfig, fetcher: Box<dyn Fetcher>) -> io::Result<Self> {
        let store = EntryStore::new(&config.cache_dir)?.max_age(config.max_age);
        let pacer = Mutex::new(Pacer::new(config.delay));
        Ok(Self {
            config,
            store,
            fetcher,
            pacer,
        })
    }

    /// Directory the store and backups live in.
    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Fetch the payload behind `url`, preferring the on-disk cache.
    ///
    /// A cache hit never touches the network. On a miss, or when
    /// [`FetchOptions::force`] is set, the URL is downloaded once, stored,
    /// and returned. `Ok(None)` is only possible with
    /// [`FetchOptions::allow_missing`], when the server reports the
    /// resource gone; absence itself is never cached, so the next call
    /// asks the network again.
    pub fn fetch(&self, url: &str, options: FetchOptions) -> Result<Option<Vec<u8>>, FetchError> {
        let key = self.derived_key(url)?;
        Ok(self.fetch_raw(url, &key, options)?.map(|fetched| fetched.bytes))
    }

    /// Like [`Downloader::fetch`] with a caller-chosen entry name instead
    /// of the derived key, for URLs whose payload identity lives elsewhere
    /// (request parameters, session state).
    pub fn fetch_named(
        &self,
        url: &str,
        entry_name: &str,
        options: FetchOptions,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        validate_locator(url)?;
        let key = CacheKey::named(entry_name);
        Ok(self.fetch_raw(url, &key, options)?.map(|fetched| fetched.bytes))
    }

    /// Fetch and decode a UTF-8 text payload.
    pub fn fetch_text(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<Option<String>, FetchError> {
        let key = self.derived_key(url)?;
        self.fetch_decoded(url, &key, options, decode_text)
    }

    /// Fetch and decode a JSON payload.
    pub fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<Option<T>, FetchError> {
        let key = self.derived_key(url)?;
        self.fetch_decoded(url, &key, options, decode_json)
    }

    /// Fetch and decode a JSON payload stored under a caller-chosen name.
    pub fn fetch_json_named<T: DeserializeOwned>(
        &self,
        url: &str,
        entry_name: &str,
        options: FetchOptions,
    ) -> Result<Option<T>, FetchError> {
        validate_locator(url)?;
        let key = CacheKey::named(entry_name);
        self.fetch_decoded(url, &key, options, decode_json)
    }

    /// Fetch and decode an XML payload.
    pub fn fetch_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<Option<T>, FetchError> {
        let key = self.derived_key(url)?;
        self.fetch_decoded(url, &key, options, decode_xml)
    }

    /// Fetch and decode an XML payload stored under a caller-chosen name.
    pub fn fetch_xml_named<T: DeserializeOwned>(
        &self,
        url: &str,
        entry_name: &str,
        options: FetchOptions,
    ) -> Result<Option<T>, FetchError> {
        validate_locator(url)?;
        let key = CacheKey::named(entry_name);
        self.fetch_decoded(url, &key, options, decode_xml)
    }

    /// Copy `source` into the cache directory under a date-stamped name.
    ///
    /// The copy is named after the source with today's date spliced in
    /// before the extension (`library.db` becomes `library.2024-05-01.db`).
    /// A stem that already contains spaces gets a space before the date
    /// instead of a dot. Returns the path of the copy.
    pub fn backup(&self, source: &Path) -> Result<PathBuf, FetchError> {
        let Some(stem) = source.file_stem().and_then(|stem| stem.to_str()) else {
            return Err(FetchError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("backup source {} has no usable file name", source.display()),
            )));
        };
        let separator = if stem.contains(' ') { ' ' } else { '.' };
        let extension = source
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| format!(".{extension}"))
            .unwrap_or_default();
        let date = chrono::Local::now().date_naive();
        let destination = self
            .config
            .cache_dir
            .join(format!("{stem}{separator}{date}{extension}"));
        if let Err(e) = fs::copy(source, &destination) {
            tracing::warn!(source = %source.display(), error = %e, "backup failed");
            return Err(e.into());
        }
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "backup written"
        );
        Ok(destination)
    }

    /// Cache lookup, then a single paced download.
    fn fetch_raw(
        &self,
        url: &str,
        key: &CacheKey,
        options: FetchOptions,
    ) -> Result<Option<Fetched>, FetchError> {
        if !options.force
            && let Some(bytes) = self.store.load(key.as_str())?
        {
            tracing::debug!(url = %url, key = %key, "serving from cache");
            return Ok(Some(Fetched {
                bytes,
                downloaded: false,
                redirected_to: None,
            }));
        }

        self.pace();
        tracing::debug!(url = %url, "downloading");
        let response = self.fetcher.get(url)?;
        self.mark_request_finished();

        if let Some(final_url) = &response.redirected_to {
            tracing::info!(url = %url, final_url = %final_url, "request was redirected");
        }
        if options.allow_missing && NOT_FOUND_STATUSES.contains(&response.status) {
            tracing::debug!(url = %url, status = response.status, "resource reported absent");
            return Ok(None);
        }
        if !(200..300).contains(&response.status) {
            tracing::warn!(url = %url, status = response.status, "HTTP error status");
            return Err(FetchError::HttpStatus {
                status: response.status,
                body: String::from_utf8_lossy(&response.bytes).into_owned(),
            });
        }

        self.store.save(key.as_str(), &response.bytes)?;
        Ok(Some(Fetched {
            bytes: response.bytes,
            downloaded: true,
            redirected_to: response.redirected_to,
        }))
    }

    fn fetch_decoded<T>(
        &self,
        url: &str,
        key: &CacheKey,
        options: FetchOptions,
        decode: impl FnOnce(&[u8]) -> Result<T, FetchError>,
    ) -> Result<Option<T>, FetchError> {
        let Some(fetched) = self.fetch_raw(url, key, options)? else {
            return Ok(None);
        };
        match decode(&fetched.bytes) {
            Ok(value) => Ok(Some(value)),
            Err(error) => Err(self.decode_failed(url, key, &fetched, error)),
        }
    }

    /// Tell apart the ways a payload can fail to decode and clean up after
    /// a fresh download that turned out to be unusable.
    fn decode_failed(
        &self,
        url: &str,
        key: &CacheKey,
        fetched: &Fetched,
        error: FetchError,
    ) -> FetchError {
        if fetched.bytes.is_empty() {
            tracing::error!(url = %url, "payload is empty; nothing to decode");
        }
        if !fetched.downloaded {
            tracing::error!(url = %url, key = %key, error = %error, "cached payload failed to decode");
            return error;
        }
        // An undecodable payload must not satisfy future cache reads.
        if let Err(e) = self.store.remove(key.as_str()) {
            tracing::warn!(key = %key, error = %e, "failed to drop undecodable cache entry");
        }
        if let Some(final_url) = &fetched.redirected_to
            && final_url.contains("login")
        {
            tracing::error!(
                url = %url,
                final_url = %final_url,
                "redirected to a login page; credentials missing or expired"
            );
            return FetchError::AuthRequired {
                url: url.to_owned(),
            };
        }
        tracing::error!(url = %url, error = %error, "downloaded payload failed to decode");
        error
    }

    fn derived_key(&self, url: &str) -> Result<CacheKey, FetchError> {
        validate_locator(url)?;
        Ok(CacheKey::for_url(url, self.config.include_host))
    }

    fn pace(&self) {
        self.pacer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause();
    }

    fn mark_request_finished(&self) {
        self.pacer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark();
    }
}

fn validate_locator(url: &str) -> Result<(), FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::InvalidLocator(url.to_owned()));
    }
    Ok(())
}

fn decode_text(bytes: &[u8]) -> Result<String, FetchError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn decode_xml<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    Ok(quick_xml::de::from_str(std::str::from_utf8(bytes)?)?)
}
