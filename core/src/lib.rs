//! Synchronous client for the Keywhiz secret-management admin API.
//!
//! # Overview
//! `KeywhizClient` exposes one method per admin action (clients, groups,
//! secrets and the memberships between them). Every method funnels through
//! `HttpPipeline`, which builds a plain-data `HttpRequest`, executes it on a
//! `Transport` and classifies the status into `ApiError`.
//!
//! # Design
//! - The only mutable state is the `Session` cookie jar, filled by `login`.
//! - The pipeline never retries, caches or imposes timeouts; configure the
//!   transport (`UreqTransport::with_timeout`) for bounded latency.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock;

pub use client::KeywhizClient;
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use pipeline::{classify, HttpPipeline};
pub use session::Session;
pub use transport::{Transport, UreqTransport};
pub use types::{
    Client, ClientDetailResponse, ClientId, CreateClientRequest, CreateGroupRequest,
    CreateSecretRequest, Group, GroupDetailResponse, GroupId, LoginRequest, SanitizedSecret,
    SecretDetailResponse, SecretId,
};
