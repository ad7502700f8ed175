//! In-memory representation of one installed product version.
//!
//! Records are built once per catalog read from the decoded ConfigMap value
//! and never change afterwards. The raw `data` mapping is kept verbatim for
//! schema validation and write-back; everything the reconcilers need (images,
//! charts, repositories) is derived at construction so call sites never branch
//! on key presence themselves.

use crate::catalog::identity::{Artifact, ProductKey, RepoKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub const COMPONENT_VERSIONS_KEY: &str = "component_versions";
pub const DOCKER_KEY: &str = "docker";
pub const HELM_KEY: &str = "helm";
pub const REPOSITORIES_KEY: &str = "repositories";

/// Namespace used for images synthesized from legacy entries:
/// `cray/cray-<product>`.
pub const LEGACY_IMAGE_NAMESPACE: &str = "cray";

/// Where a record's image list came from.
///
/// Older catalog entries stored a single image version under
/// `component_versions.<product>`; newer ones declare a `docker` list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ArtifactSource {
    Legacy(Artifact),
    Declared(Vec<Artifact>),
}

impl ArtifactSource {
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            ArtifactSource::Legacy(artifact) => std::slice::from_ref(artifact),
            ArtifactSource::Declared(artifacts) => artifacts,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ArtifactSource::Legacy(_))
    }
}

/// One entry of `component_versions.repositories`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDecl {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: RepoKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ProductVersionRecord {
    key: ProductKey,
    data: Value,
    images: ArtifactSource,
    charts: Vec<Artifact>,
    repositories: Vec<RepositoryDecl>,
}

impl ProductVersionRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>, data: Value) -> Self {
        let key = ProductKey::new(name, version);
        let components = data.get(COMPONENT_VERSIONS_KEY);
        let images = image_source(&key.name, components);
        let charts = declared_artifacts(components.and_then(|c| c.get(HELM_KEY)));
        let repositories = declared_repositories(components.and_then(|c| c.get(REPOSITORIES_KEY)));
        Self {
            key,
            data,
            images,
            charts,
            repositories,
        }
    }

    pub fn key(&self) -> &ProductKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    /// The raw version data exactly as decoded from the catalog.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn image_source(&self) -> &ArtifactSource {
        &self.images
    }

    /// Images in declaration order; legacy entries yield exactly one.
    pub fn docker_images(&self) -> &[Artifact] {
        self.images.artifacts()
    }

    pub fn helm_charts(&self) -> &[Artifact] {
        &self.charts
    }

    pub fn repositories(&self) -> &[RepositoryDecl] {
        &self.repositories
    }

    pub fn group_repositories(&self) -> Vec<&RepositoryDecl> {
        self.repositories
            .iter()
            .filter(|repo| repo.kind == RepoKind::Group)
            .collect()
    }

    /// Hosted repositories declared directly plus every group member.
    ///
    /// A hosted repository may only ever appear as a group member, so both
    /// sources are needed to find everything that belongs to this version.
    pub fn hosted_repository_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .repositories
            .iter()
            .filter(|repo| repo.kind == RepoKind::Hosted)
            .map(|repo| repo.name.clone())
            .collect();
        for group in self.group_repositories() {
            names.extend(group.members.iter().cloned());
        }
        names
    }

    /// `<product>-<version>-<dist>`
    pub fn hosted_repo_name(&self, dist: &str) -> String {
        format!("{}-{}-{}", self.key.name, self.key.version, dist)
    }

    /// `<product>-<dist>`
    pub fn group_repo_name(&self, dist: &str) -> String {
        format!("{}-{}", self.key.name, dist)
    }

    pub fn is_active(&self) -> bool {
        self.data
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Clone URL of the product's configuration repository, if recorded.
    pub fn clone_url(&self) -> Option<&str> {
        self.data
            .pointer("/configuration/clone_url")
            .and_then(Value::as_str)
    }
}

fn image_source(product: &str, components: Option<&Value>) -> ArtifactSource {
    match components.and_then(Value::as_object) {
        Some(map) if map.contains_key(DOCKER_KEY) => {
            ArtifactSource::Declared(declared_artifacts(map.get(DOCKER_KEY)))
        }
        _ => {
            // The legacy version lives under the product's own key and may be
            // missing; the synthesized image is still reported.
            let name = format!("{LEGACY_IMAGE_NAMESPACE}/{LEGACY_IMAGE_NAMESPACE}-{product}");
            let version = components
                .and_then(|c| c.get(product))
                .and_then(scalar_string);
            ArtifactSource::Legacy(Artifact { name, version })
        }
    }
}

fn declared_artifacts(value: Option<&Value>) -> Vec<Artifact> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name").and_then(scalar_string)?;
            Some(Artifact {
                name,
                version: item.get("version").and_then(scalar_string),
            })
        })
        .collect()
}

fn declared_repositories(value: Option<&Value>) -> Vec<RepositoryDecl> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match RepositoryDecl::deserialize(item) {
            Ok(decl) => Some(decl),
            Err(err) => {
                tracing::debug!("Skipping repository entry {item}: {err}");
                None
            }
        })
        .collect()
}

/// YAML happily turns `1.0` into a float; versions are tokens, so accept both.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
