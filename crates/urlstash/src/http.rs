//! HTTP transport behind the downloader.

use std::time::Duration;

use ureq::{Agent, ResponseExt};

use crate::error::FetchError;

/// Outcome of one HTTP exchange, status and body included.
#[derive(Debug)]
pub struct RemoteResponse {
    /// Final status code.
    pub status: u16,
    /// Body bytes, also for error statuses.
    pub bytes: Vec<u8>,
    /// Final URL when the request was redirected away from the original.
    pub redirected_to: Option<String>,
}

/// Blocking transport used by the downloader.
///
/// The downloader reaches the network only through this trait, which keeps
/// tests off the wire. Implementations return `Ok` for every HTTP status;
/// errors are reserved for transport failures.
pub trait Fetcher: Send + Sync {
    /// Perform a single blocking GET without retrying.
    fn get(&self, url: &str) -> Result<RemoteResponse, FetchError>;
}

/// Create an HTTP agent with the given timeout.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// [`Fetcher`] backed by a pooled [`ureq::Agent`].
pub(crate) struct UreqFetcher {
    agent: Agent,
    headers: Vec<(String, String)>,
}

impl UreqFetcher {
    pub(crate) fn new(timeout: Duration, headers: Vec<(String, String)>) -> Self {
        Self {
            agent: create_agent(timeout),
            headers,
        }
    }
}

impl Fetcher for UreqFetcher {
    fn get(&self, url: &str) -> Result<RemoteResponse, FetchError> {
        let mut request = self.agent.get(url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let response = request.call()?;
        let status = response.status().as_u16();
        let final_url = response.get_uri().to_string();
        let redirected_to = (final_url != url).then_some(final_url);
        let bytes = response.into_body().read_to_vec()?;
        Ok(RemoteResponse {
            status,
            bytes,
            redirected_to,
        })
    }
}
