//! Error type for fetch operations.

use std::str::Utf8Error;

/// Error from a [`Downloader`](crate::Downloader) operation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connection, TLS, timeout, or a
    /// malformed URL.
    #[error("network error")]
    Network(#[from] ureq::Error),

    /// The server answered with a non-success status code.
    #[error("HTTP error: {status} - {body}")]
    HttpStatus {
        /// Status code of the response.
        status: u16,
        /// Response body, decoded leniently for the error message.
        body: String,
    },

    /// The on-disk store could not be read or written.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The locator was empty or otherwise unusable.
    #[error("invalid locator {0:?}")]
    InvalidLocator(String),

    /// The payload is not valid UTF-8 text.
    #[error("text decode error")]
    Utf8(#[from] Utf8Error),

    /// The payload is not valid JSON for the requested type.
    #[error("JSON decode error")]
    Json(#[from] serde_json::Error),

    /// The payload is not valid XML for the requested type.
    #[error("XML decode error")]
    Xml(#[from] quick_xml::DeError),

    /// The request was redirected to a login page, which usually means
    /// missing or expired credentials.
    #[error("redirected to a login page while fetching {url}")]
    AuthRequired {
        /// URL the fetch started from.
        url: String,
    },
}
