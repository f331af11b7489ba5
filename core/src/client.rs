//! Typed operations against the Keywhiz admin API.
//!
//! # Design
//! Every operation has the same shape: check arguments locally, build the
//! payload, resolve the endpoint, call one pipeline primitive and decode the
//! body. Argument checks fail before anything is sent. All status handling
//! lives in the pipeline; the only operation that looks at a status itself
//! is `is_logged_in`.
//!
//! Calls block the current thread until the exchange completes.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::error::{ApiError, ErrorKind};
use crate::pipeline::{decode, HttpPipeline};
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    Client, ClientDetailResponse, ClientId, CreateClientRequest, CreateGroupRequest,
    CreateSecretRequest, Group, GroupDetailResponse, GroupId, LoginRequest, SanitizedSecret,
    SecretDetailResponse, SecretId,
};

/// Client for a Keywhiz server.
///
/// Call `login` first; the session it establishes authenticates every later
/// call made through this instance. Instances can be shared across threads,
/// but logging in again while other calls are in flight is racy.
#[derive(Debug)]
pub struct KeywhizClient<T = UreqTransport> {
    pipeline: HttpPipeline<T>,
}

impl KeywhizClient<UreqTransport> {
    /// Client using a default blocking `ureq` transport.
    pub fn with_default_transport(base_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, UreqTransport::new())
    }
}

impl<T: Transport> KeywhizClient<T> {
    pub fn new(base_url: &str, transport: T) -> Result<Self, ApiError> {
        Ok(Self {
            pipeline: HttpPipeline::new(base_url, transport)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.pipeline.base_url()
    }

    pub fn transport(&self) -> &T {
        self.pipeline.transport()
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Log in to the server. Later requests from this client are authenticated.
    pub fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let url = self.pipeline.url(&["admin", "login"], &[])?;
        let cookies = self.pipeline.post_json_capturing_session(&url, &request)?;
        info!(username, cookies, "logged in to keywhiz");
        Ok(())
    }

    /// Whether the current session is accepted by the server.
    ///
    /// Only 401 means "not logged in"; any other failure, 403 included, is
    /// returned as an error.
    pub fn is_logged_in(&self) -> Result<bool, ApiError> {
        let url = self.pipeline.url(&["admin", "me"], &[])?;
        match self.pipeline.get(&url) {
            Ok(_) => Ok(true),
            Err(ApiError::Status(ErrorKind::Unauthorized)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn all_groups(&self) -> Result<Vec<Group>, ApiError> {
        let url = self.pipeline.url(&["admin", "groups", ""], &[])?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn create_group(&self, name: &str, description: &str) -> Result<GroupDetailResponse, ApiError> {
        require_non_empty(name, "group name must not be empty")?;
        let request = CreateGroupRequest {
            name: name.to_string(),
            description: description.to_string(),
        };
        let url = self.pipeline.url(&["admin", "groups"], &[])?;
        decode(&self.pipeline.post_json(&url, &request)?)
    }

    pub fn group_details_for_id(&self, group_id: GroupId) -> Result<GroupDetailResponse, ApiError> {
        let url = self.group_url(group_id)?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn delete_group_with_id(&self, group_id: GroupId) -> Result<(), ApiError> {
        let url = self.group_url(group_id)?;
        self.pipeline.delete(&url)?;
        Ok(())
    }

    pub fn get_group_by_name(&self, name: &str) -> Result<Group, ApiError> {
        require_non_empty(name, "group name must not be empty")?;
        let url = self.pipeline.url(&["admin", "groups"], &[("name", name)])?;
        decode(&self.pipeline.get(&url)?)
    }

    fn group_url(&self, group_id: GroupId) -> Result<Url, ApiError> {
        self.pipeline.url(&["admin", "groups", &group_id.to_string()], &[])
    }

    // -----------------------------------------------------------------------
    // Secrets
    // -----------------------------------------------------------------------

    pub fn all_secrets(&self) -> Result<Vec<SanitizedSecret>, ApiError> {
        let url = self.pipeline.url(&["admin", "secrets"], &[])?;
        decode(&self.pipeline.get(&url)?)
    }

    /// Create a secret. `content` is sent base64-encoded.
    pub fn create_secret(
        &self,
        name: &str,
        description: &str,
        content: &[u8],
        with_version: bool,
        metadata: &BTreeMap<String, String>,
    ) -> Result<SecretDetailResponse, ApiError> {
        require_non_empty(name, "secret name must not be empty")?;
        if content.is_empty() {
            return Err(ApiError::InvalidArgument("Content must not be empty"));
        }
        let request = CreateSecretRequest {
            name: name.to_string(),
            description: description.to_string(),
            content: STANDARD.encode(content),
            with_version,
            metadata: metadata.clone(),
        };
        let url = self.pipeline.url(&["admin", "secrets"], &[])?;
        decode(&self.pipeline.post_json(&url, &request)?)
    }

    pub fn secret_details_for_id(&self, secret_id: SecretId) -> Result<SecretDetailResponse, ApiError> {
        let url = self.secret_url(secret_id)?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn delete_secret_with_id(&self, secret_id: SecretId) -> Result<(), ApiError> {
        let url = self.secret_url(secret_id)?;
        self.pipeline.delete(&url)?;
        Ok(())
    }

    /// Ask the named server-side generator for secrets. `params` is whatever
    /// that generator expects.
    pub fn generate_secrets<P>(&self, generator_name: &str, params: &P) -> Result<Vec<SanitizedSecret>, ApiError>
    where
        P: Serialize + ?Sized,
    {
        require_non_empty(generator_name, "generator name must not be empty")?;
        let url = self
            .pipeline
            .url(&["admin", "secrets", "generators", generator_name], &[])?;
        decode(&self.pipeline.post_json(&url, params)?)
    }

    /// Batch form of `generate_secrets`: one parameter object per secret.
    pub fn batch_generate_secrets<P>(&self, generator_name: &str, params: &[P]) -> Result<Vec<SanitizedSecret>, ApiError>
    where
        P: Serialize,
    {
        require_non_empty(generator_name, "generator name must not be empty")?;
        let url = self
            .pipeline
            .url(&["admin", "secrets", "generators", generator_name, "batch"], &[])?;
        decode(&self.pipeline.post_json(&url, params)?)
    }

    pub fn get_sanitized_secret_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<SanitizedSecret, ApiError> {
        require_non_empty(name, "secret name must not be empty")?;
        let url = self
            .pipeline
            .url(&["admin", "secrets"], &[("name", name), ("version", version)])?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn get_versions_for_secret_name(&self, name: &str) -> Result<Vec<String>, ApiError> {
        let url = self
            .pipeline
            .url(&["admin", "secrets", "versions"], &[("name", name)])?;
        decode(&self.pipeline.get(&url)?)
    }

    fn secret_url(&self, secret_id: SecretId) -> Result<Url, ApiError> {
        self.pipeline.url(&["admin", "secrets", &secret_id.to_string()], &[])
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    pub fn all_clients(&self) -> Result<Vec<Client>, ApiError> {
        let url = self.pipeline.url(&["admin", "clients", ""], &[])?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn create_client(&self, name: &str) -> Result<ClientDetailResponse, ApiError> {
        require_non_empty(name, "client name must not be empty")?;
        let request = CreateClientRequest {
            name: name.to_string(),
        };
        let url = self.pipeline.url(&["admin", "clients"], &[])?;
        decode(&self.pipeline.post_json(&url, &request)?)
    }

    pub fn client_details_for_id(&self, client_id: ClientId) -> Result<ClientDetailResponse, ApiError> {
        let url = self.client_url(client_id)?;
        decode(&self.pipeline.get(&url)?)
    }

    pub fn delete_client_with_id(&self, client_id: ClientId) -> Result<(), ApiError> {
        let url = self.client_url(client_id)?;
        self.pipeline.delete(&url)?;
        Ok(())
    }

    pub fn get_client_by_name(&self, name: &str) -> Result<Client, ApiError> {
        require_non_empty(name, "client name must not be empty")?;
        let url = self.pipeline.url(&["admin", "clients"], &[("name", name)])?;
        decode(&self.pipeline.get(&url)?)
    }

    fn client_url(&self, client_id: ClientId) -> Result<Url, ApiError> {
        self.pipeline.url(&["admin", "clients", &client_id.to_string()], &[])
    }

    // -----------------------------------------------------------------------
    // Memberships
    // -----------------------------------------------------------------------

    pub fn enroll_client_in_group_by_ids(&self, client_id: ClientId, group_id: GroupId) -> Result<(), ApiError> {
        let url = self.client_membership_url(client_id, group_id)?;
        self.pipeline.put_empty(&url)?;
        Ok(())
    }

    pub fn evict_client_from_group_by_ids(&self, client_id: ClientId, group_id: GroupId) -> Result<(), ApiError> {
        let url = self.client_membership_url(client_id, group_id)?;
        self.pipeline.delete(&url)?;
        Ok(())
    }

    pub fn grant_secret_to_group_by_ids(&self, secret_id: SecretId, group_id: GroupId) -> Result<(), ApiError> {
        let url = self.secret_membership_url(secret_id, group_id)?;
        self.pipeline.put_empty(&url)?;
        Ok(())
    }

    pub fn revoke_secret_from_group_by_ids(&self, secret_id: SecretId, group_id: GroupId) -> Result<(), ApiError> {
        let url = self.secret_membership_url(secret_id, group_id)?;
        self.pipeline.delete(&url)?;
        Ok(())
    }

    fn client_membership_url(&self, client_id: ClientId, group_id: GroupId) -> Result<Url, ApiError> {
        self.pipeline.url(
            &[
                "admin",
                "memberships",
                "clients",
                &client_id.to_string(),
                "groups",
                &group_id.to_string(),
            ],
            &[],
        )
    }

    fn secret_membership_url(&self, secret_id: SecretId, group_id: GroupId) -> Result<Url, ApiError> {
        self.pipeline.url(
            &[
                "admin",
                "memberships",
                "secrets",
                &secret_id.to_string(),
                "groups",
                &group_id.to_string(),
            ],
            &[],
        )
    }
}

fn require_non_empty(value: &str, message: &'static str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::InvalidArgument(message));
    }
    Ok(())
}
