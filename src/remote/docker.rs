//! Docker registry v2 client.
//!
//! Deleting by tag is not part of the registry API: the tag is first resolved
//! to its manifest digest, then the manifest is deleted by digest.

use super::{ApiError, ImageRegistry, http_client, join_url, send, with_auth};
use crate::cluster::Credentials;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;

pub const DEFAULT_DOCKER_URL: &str = "https://registry.local/v2";

const DIGEST_HEADER: &str = "Docker-Content-Digest";
const MANIFEST_MEDIA_TYPES: &str = "application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.oci.image.index.v1+json";

pub struct DockerRegistryClient {
    base_url: String,
    credentials: Option<Credentials>,
    client: Client,
}

impl DockerRegistryClient {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            client: http_client(),
        }
    }

    fn manifest_url(&self, name: &str, reference: &str) -> String {
        join_url(&self.base_url, &format!("{name}/manifests/{reference}"))
    }

    fn digest_for(&self, name: &str, version: &str) -> Result<String, ApiError> {
        let url = self.manifest_url(name, version);
        let request = with_auth(self.client.head(&url), self.credentials.as_ref())
            .header(ACCEPT, MANIFEST_MEDIA_TYPES);
        let response = send(request, "HEAD", &url, &format!("{name}:{version}"))?;
        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode {
                url,
                detail: format!("response carries no {DIGEST_HEADER} header"),
            })
    }
}

impl ImageRegistry for DockerRegistryClient {
    fn delete_image(&self, name: &str, version: &str) -> Result<(), ApiError> {
        // An image recorded without a tag cannot exist in the registry.
        if version.is_empty() {
            return Err(ApiError::not_found(name));
        }
        let digest = self.digest_for(name, version)?;
        let url = self.manifest_url(name, &digest);
        let request = with_auth(self.client.delete(&url), self.credentials.as_ref());
        send(request, "DELETE", &url, &format!("{name}:{version}"))?;
        Ok(())
    }
}
