//! The I/O seam between the pipeline and the network.
//!
//! # Design
//! `Transport` is the only place a request actually leaves the process.
//! Everything above it works on plain `HttpRequest` / `HttpResponse` data, so
//! tests swap in a scripted transport and production code uses
//! `UreqTransport`, a blocking agent with no cookie handling of its own.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one HTTP round-trip.
///
/// Implementations must hand back 4xx/5xx responses as data. Only failures
/// that produce no status at all (DNS, connect, I/O) should be `Err`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by a `ureq` agent.
///
/// The agent is cheap to clone and safe to share between threads. No timeout
/// is set unless the caller asks for one. Redirects are not followed, so a
/// 3xx response (and any `Set-Cookie` on it) reaches the pipeline unchanged.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Bound every call (connect, send and receive) by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent as-is.
    pub fn from_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.as_str();
        let headers = &request.headers;

        let result = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(url), headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(url), headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(url), headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(url), headers).send_empty(),
        };

        let mut response = match result {
            Ok(response) => response,
            // Agents from `from_agent` may still treat statuses as errors.
            Err(ureq::Error::StatusCode(status)) => {
                return Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: String::new(),
                });
            }
            Err(err) => return Err(ApiError::Transport(err.to_string())),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = body_text(status, response.body_mut().read_to_vec())?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Turn the raw body read into text without losing an error status.
///
/// Failure statuses always produce a response so `classify` sees them: an
/// unreadable body becomes empty and invalid UTF-8 is replaced. Success bodies
/// must be readable UTF-8.
fn body_text(status: u16, read: Result<Vec<u8>, ureq::Error>) -> Result<String, ApiError> {
    let failed = status >= 400;
    match read {
        Ok(bytes) if failed => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(bytes) => String::from_utf8(bytes)
            .map_err(|e| ApiError::DeserializationError(e.to_string())),
        Err(err) if failed => {
            debug!(status, error = %err, "dropping unreadable error body");
            Ok(String::new())
        }
        Err(err) => Err(ApiError::Transport(err.to_string())),
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
