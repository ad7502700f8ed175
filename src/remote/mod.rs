//! Remote services touched during reconciliation: the Nexus repository
//! manager (repositories and chart components) and the Docker registry.
//!
//! The traits are the seams the reconciliation engines are written against;
//! [`nexus::NexusClient`] and [`docker::DockerRegistryClient`] are the HTTP
//! implementations. A missing remote object is always reported as
//! [`ApiError::NotFound`] so callers can treat it as "already removed".

pub mod docker;
pub mod nexus;

pub use docker::{DEFAULT_DOCKER_URL, DockerRegistryClient};
pub use nexus::{DEFAULT_NEXUS_URL, NexusClient};

use crate::cluster::Credentials;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method} {url} failed")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {detail}")]
    Decode { url: String, detail: String },

    #[error("invalid repository name pattern {pattern}: {detail}")]
    InvalidPattern { pattern: String, detail: String },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Repository settings as listed by Nexus.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEntry {
    pub name: String,
    #[serde(default)]
    pub format: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub storage: Option<StorageAttributes>,
    #[serde(default)]
    pub group: Option<GroupAttributes>,
}

fn default_online() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageAttributes {
    pub blob_store_name: String,
    #[serde(default)]
    pub strict_content_type_validation: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttributes {
    #[serde(default)]
    pub member_names: Vec<String>,
}

const DEFAULT_BLOB_STORE: &str = "default";

/// Full replacement of a group repository's settings, members included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupUpdate {
    pub name: String,
    pub format: String,
    pub online: bool,
    pub blob_store_name: String,
    pub strict_content_type_validation: bool,
    pub member_names: Vec<String>,
}

impl GroupUpdate {
    /// Keep `entry`'s current settings and swap its member list.
    pub fn replacing_members(entry: &RepositoryEntry, member_names: Vec<String>) -> Self {
        let (blob_store_name, strict_content_type_validation) = match &entry.storage {
            Some(storage) => (
                storage.blob_store_name.clone(),
                storage.strict_content_type_validation,
            ),
            None => (DEFAULT_BLOB_STORE.to_string(), true),
        };
        Self {
            name: entry.name.clone(),
            format: entry.format.clone(),
            online: entry.online,
            blob_store_name,
            strict_content_type_validation,
            member_names,
        }
    }
}

/// A component stored in a Nexus repository (used for helm charts).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ChartComponent {
    pub id: String,
    #[serde(default)]
    pub repository: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
}

pub trait RepositoryApi {
    /// Repositories whose name matches the regular expression `name_pattern`.
    fn list_repositories(&self, name_pattern: &str) -> Result<Vec<RepositoryEntry>, ApiError>;

    fn update_group_members(&self, update: &GroupUpdate) -> Result<(), ApiError>;

    fn delete_repository(&self, name: &str) -> Result<(), ApiError>;
}

pub trait ImageRegistry {
    fn delete_image(&self, name: &str, version: &str) -> Result<(), ApiError>;
}

pub trait ChartRegistry {
    /// Every component in `repository`, following pagination to the end.
    fn list_components(&self, repository: &str) -> Result<Vec<ChartComponent>, ApiError>;

    fn delete_component(&self, id: &str) -> Result<(), ApiError>;
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent(concat!("productcatalog/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn with_auth(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(creds) => request.basic_auth(&creds.username, Some(creds.password())),
        None => request,
    }
}

/// Send `request`, mapping 404 to [`ApiError::NotFound`] and any other
/// non-success status to [`ApiError::Status`].
pub(crate) fn send(
    request: RequestBuilder,
    method: &str,
    url: &str,
    resource: &str,
) -> Result<Response, ApiError> {
    tracing::debug!(method, url, "sending request");
    let response = request.send().map_err(|source| ApiError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found(resource));
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ApiError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    Ok(response)
}
