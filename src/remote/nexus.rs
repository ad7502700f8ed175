//! Nexus REST client (`/service/rest/v1`).

use super::{
    ApiError, ChartComponent, ChartRegistry, GroupUpdate, RepositoryApi, RepositoryEntry,
    http_client, join_url, send, with_auth,
};
use crate::cluster::Credentials;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_NEXUS_URL: &str = "https://packages.local/service/rest";

pub struct NexusClient {
    base_url: String,
    credentials: Option<Credentials>,
    client: Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComponentPage {
    #[serde(default)]
    items: Vec<ChartComponent>,
    #[serde(default)]
    continuation_token: Option<String>,
}

impl NexusClient {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            client: http_client(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn component_page(
        &self,
        repository: &str,
        token: Option<&str>,
    ) -> Result<ComponentPage, ApiError> {
        let url = self.url("v1/components");
        let mut request = with_auth(self.client.get(&url), self.credentials.as_ref())
            .query(&[("repository", repository)]);
        if let Some(token) = token {
            request = request.query(&[("continuationToken", token)]);
        }
        let response = send(request, "GET", &url, &format!("repository {repository}"))?;
        response.json().map_err(|err| ApiError::Decode {
            url,
            detail: err.to_string(),
        })
    }
}

impl RepositoryApi for NexusClient {
    fn list_repositories(&self, name_pattern: &str) -> Result<Vec<RepositoryEntry>, ApiError> {
        let pattern = Regex::new(name_pattern).map_err(|err| ApiError::InvalidPattern {
            pattern: name_pattern.to_string(),
            detail: err.to_string(),
        })?;
        let url = self.url("v1/repositorySettings");
        let request = with_auth(self.client.get(&url), self.credentials.as_ref());
        let response = send(request, "GET", &url, "repository settings")?;
        let entries: Vec<RepositoryEntry> = response.json().map_err(|err| ApiError::Decode {
            url,
            detail: err.to_string(),
        })?;
        Ok(entries
            .into_iter()
            .filter(|entry| pattern.is_match(&entry.name))
            .collect())
    }

    fn update_group_members(&self, update: &GroupUpdate) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "v1/repositories/{}/group/{}",
            update.format, update.name
        ));
        let body = json!({
            "name": update.name,
            "online": update.online,
            "storage": {
                "blobStoreName": update.blob_store_name,
                "strictContentTypeValidation": update.strict_content_type_validation,
            },
            "group": {"memberNames": update.member_names},
        });
        let request = with_auth(self.client.put(&url), self.credentials.as_ref()).json(&body);
        send(request, "PUT", &url, &format!("group repository {}", update.name))?;
        Ok(())
    }

    fn delete_repository(&self, name: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("v1/repositories/{name}"));
        let request = with_auth(self.client.delete(&url), self.credentials.as_ref());
        send(request, "DELETE", &url, &format!("repository {name}"))?;
        Ok(())
    }
}

impl ChartRegistry for NexusClient {
    fn list_components(&self, repository: &str) -> Result<Vec<ChartComponent>, ApiError> {
        let mut components = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.component_page(repository, token.as_deref())?;
            components.extend(page.items);
            match page.continuation_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        tracing::debug!(repository, count = components.len(), "listed components");
        Ok(components)
    }

    fn delete_component(&self, id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("v1/components/{id}"));
        let request = with_auth(self.client.delete(&url), self.credentials.as_ref());
        send(request, "DELETE", &url, &format!("component {id}"))?;
        Ok(())
    }
}
