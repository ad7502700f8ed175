#![allow(dead_code)]

use anyhow::{Context, Result};
use productcatalog::catalog::{CatalogLocation, ProductKey};
use productcatalog::cluster::{ConfigMapReader, MemoryConfigMaps};
use productcatalog::gateway::{CatalogMutation, CatalogMutator};
use productcatalog::remote::{
    ApiError, ChartComponent, ChartRegistry, GroupAttributes, GroupUpdate, ImageRegistry,
    RepositoryApi, RepositoryEntry, StorageAttributes,
};
use productcatalog::CatalogError;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub const SAT: &str = "\
2.0.0:
  component_versions:
    docker:
    - name: cray/cray-sat
      version: 1.0.0
    - name: cray/sat-cfs-install
      version: 1.4.0
    helm:
    - name: cray-sat
      version: 0.1.0
    repositories:
    - name: sat-sle-15sp2
      type: group
      members:
      - sat-2.0.0-sle-15sp2
    - name: sat-2.0.0-sle-15sp2
      type: hosted
2.0.1:
  active: true
  component_versions:
    docker:
    - name: cray/cray-sat
      version: 1.0.1
    - name: cray/sat-cfs-install
      version: 1.4.0
    helm:
    - name: cray-sat
      version: 0.2.0
    repositories:
    - name: sat-sle-15sp2
      type: group
      members:
      - sat-2.0.1-sle-15sp2
    - name: sat-2.0.1-sle-15sp2
      type: hosted
";

pub const COS: &str = "\
2.0.0:
  component_versions:
    docker:
    - name: cray/cray-cos
      version: 1.0.0
    - name: cray/cos-boot
      version: 1.0.0
    - name: cray/cos-config-service
      version: 1.0.0
2.0.1:
  component_versions:
    docker:
    - name: cray/cray-cos
      version: 1.0.1
    - name: cray/cos-config-service
      version: 1.0.0
";

pub const OTHER_PRODUCT: &str = "\
2.0.0:
  component_versions:
    docker:
    - name: cray/cray-sat
      version: 1.0.1
";

pub const LEGACY_PRODUCT: &str = "\
1.0.0:
  component_versions:
    legacy_product: 0.9.0
";

/// Shares `cray/cos-config-service:1.0.0` with both cos versions and
/// `cray-sat:0.2.0` with sat 2.0.1.
pub const THIRD: &str = "\
1.0.0:
  component_versions:
    docker:
    - name: cray/cos-config-service
      version: 1.0.0
    helm:
    - name: cray-sat
      version: 0.2.0
    - name: third-solo
      version: 1.0.0
    - name: third-solo2
      version: 1.0.0
    repositories:
    - name: third-1.0.0-a
      type: hosted
    - name: third-1.0.0-b
      type: hosted
";

pub fn location() -> CatalogLocation {
    CatalogLocation::default()
}

/// Cluster holding the standard catalog fixture.
pub fn cluster() -> MemoryConfigMaps {
    let cluster = MemoryConfigMaps::new();
    let location = location();
    for (product, text) in [
        ("sat", SAT),
        ("cos", COS),
        ("other_product", OTHER_PRODUCT),
        ("legacy_product", LEGACY_PRODUCT),
    ] {
        cluster.set_entry(&location.name, &location.namespace, product, text);
    }
    cluster
}

/// Standard fixture plus the `third` product.
pub fn cluster_with_third() -> MemoryConfigMaps {
    let cluster = cluster();
    let location = location();
    cluster.set_entry(&location.name, &location.namespace, "third", THIRD);
    cluster
}

/// Records every mutation and applies it to the in-memory cluster, the way
/// the real catalog scripts update the ConfigMap.
pub struct RecordingMutator<'a> {
    cluster: &'a MemoryConfigMaps,
    location: CatalogLocation,
    pub calls: RefCell<Vec<(ProductKey, CatalogMutation)>>,
}

impl<'a> RecordingMutator<'a> {
    pub fn new(cluster: &'a MemoryConfigMaps) -> Self {
        Self {
            cluster,
            location: location(),
            calls: RefCell::default(),
        }
    }

    pub fn calls(&self) -> Vec<(ProductKey, CatalogMutation)> {
        self.calls.borrow().clone()
    }

    fn write_back(&self, product: &ProductKey, mutation: &CatalogMutation) -> Result<()> {
        let data = self
            .cluster
            .read_config_map(&self.location.name, &self.location.namespace)?
            .unwrap_or_default();
        let text = data.get(&product.name).cloned().unwrap_or_default();
        let mut versions: Map<String, Value> = if text.trim().is_empty() {
            Map::new()
        } else {
            serde_yaml_ng::from_str(&text).context("decoding fixture entry")?
        };
        match mutation {
            CatalogMutation::Remove => {
                versions.remove(&product.version);
            }
            CatalogMutation::Activate => {
                if let Some(Value::Object(entry)) = versions.get_mut(&product.version) {
                    entry.insert("active".to_string(), Value::Bool(true));
                }
            }
            CatalogMutation::Overwrite(data) => {
                versions.insert(product.version.clone(), data.clone());
            }
        }
        let text = serde_yaml_ng::to_string(&versions)?;
        self.cluster
            .set_entry(&self.location.name, &self.location.namespace, &product.name, &text);
        Ok(())
    }
}

impl CatalogMutator for RecordingMutator<'_> {
    fn apply(&self, product: &ProductKey, mutation: &CatalogMutation) -> Result<(), CatalogError> {
        self.calls
            .borrow_mut()
            .push((product.clone(), mutation.clone()));
        self.write_back(product, mutation)
            .map_err(|err| CatalogError::CatalogMutationFailed {
                action: "applying",
                product: product.clone(),
                detail: format!("{err:#}"),
            })
    }
}

fn server_error(item: &str) -> ApiError {
    ApiError::Status {
        method: "DELETE".to_string(),
        url: format!("https://mock/{item}"),
        status: 500,
        body: "internal error".to_string(),
    }
}

/// Nexus stand-in serving repositories and chart components.
#[derive(Default)]
pub struct MockNexus {
    pub repositories: RefCell<Vec<RepositoryEntry>>,
    pub components: RefCell<Vec<ChartComponent>>,
    pub failing: BTreeSet<String>,
    pub updates: RefCell<Vec<GroupUpdate>>,
    pub deleted_repositories: RefCell<Vec<String>>,
    pub deleted_components: RefCell<Vec<String>>,
    pub component_listings: RefCell<usize>,
}

impl MockNexus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosted(self, name: &str) -> Self {
        self.repositories.borrow_mut().push(RepositoryEntry {
            name: name.to_string(),
            format: "raw".to_string(),
            kind: "hosted".to_string(),
            online: true,
            storage: Some(StorageAttributes {
                blob_store_name: "default".to_string(),
                strict_content_type_validation: true,
            }),
            group: None,
        });
        self
    }

    pub fn with_group(self, name: &str, members: &[&str]) -> Self {
        self.repositories.borrow_mut().push(RepositoryEntry {
            name: name.to_string(),
            format: "raw".to_string(),
            kind: "group".to_string(),
            online: true,
            storage: Some(StorageAttributes {
                blob_store_name: "sat".to_string(),
                strict_content_type_validation: false,
            }),
            group: Some(GroupAttributes {
                member_names: members.iter().map(|m| m.to_string()).collect(),
            }),
        });
        self
    }

    pub fn with_chart(self, id: &str, name: &str, version: &str) -> Self {
        self.components.borrow_mut().push(ChartComponent {
            id: id.to_string(),
            repository: "charts".to_string(),
            name: name.to_string(),
            version: version.to_string(),
        });
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn group_members(&self, name: &str) -> Vec<String> {
        self.repositories
            .borrow()
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.group.as_ref())
            .map(|group| group.member_names.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.updates.borrow().len()
            + self.deleted_repositories.borrow().len()
            + self.deleted_components.borrow().len()
            + *self.component_listings.borrow()
    }
}

impl RepositoryApi for MockNexus {
    fn list_repositories(&self, name_pattern: &str) -> Result<Vec<RepositoryEntry>, ApiError> {
        let pattern = regex::Regex::new(name_pattern).map_err(|err| ApiError::InvalidPattern {
            pattern: name_pattern.to_string(),
            detail: err.to_string(),
        })?;
        Ok(self
            .repositories
            .borrow()
            .iter()
            .filter(|entry| pattern.is_match(&entry.name))
            .cloned()
            .collect())
    }

    fn update_group_members(&self, update: &GroupUpdate) -> Result<(), ApiError> {
        self.updates.borrow_mut().push(update.clone());
        let mut repositories = self.repositories.borrow_mut();
        let entry = repositories
            .iter_mut()
            .find(|entry| entry.name == update.name)
            .ok_or_else(|| ApiError::not_found(&update.name))?;
        entry.group = Some(GroupAttributes {
            member_names: update.member_names.clone(),
        });
        Ok(())
    }

    fn delete_repository(&self, name: &str) -> Result<(), ApiError> {
        self.deleted_repositories.borrow_mut().push(name.to_string());
        if self.failing.contains(name) {
            return Err(server_error(name));
        }
        let mut repositories = self.repositories.borrow_mut();
        let before = repositories.len();
        repositories.retain(|entry| entry.name != name);
        if repositories.len() == before {
            return Err(ApiError::not_found(name));
        }
        Ok(())
    }
}

impl ChartRegistry for MockNexus {
    fn list_components(&self, repository: &str) -> Result<Vec<ChartComponent>, ApiError> {
        *self.component_listings.borrow_mut() += 1;
        Ok(self
            .components
            .borrow()
            .iter()
            .filter(|component| component.repository == repository)
            .cloned()
            .collect())
    }

    fn delete_component(&self, id: &str) -> Result<(), ApiError> {
        self.deleted_components.borrow_mut().push(id.to_string());
        if self.failing.contains(id) {
            return Err(server_error(id));
        }
        let mut components = self.components.borrow_mut();
        let before = components.len();
        components.retain(|component| component.id != id);
        if components.len() == before {
            return Err(ApiError::not_found(id));
        }
        Ok(())
    }
}

/// Docker registry stand-in holding `(name, tag)` pairs.
#[derive(Default)]
pub struct MockRegistry {
    pub images: RefCell<BTreeSet<(String, String)>>,
    pub failing: BTreeSet<String>,
    pub calls: RefCell<Vec<(String, String)>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, name: &str, version: &str) -> Self {
        self.images
            .borrow_mut()
            .insert((name.to_string(), version.to_string()));
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
}

impl ImageRegistry for MockRegistry {
    fn delete_image(&self, name: &str, version: &str) -> Result<(), ApiError> {
        self.calls
            .borrow_mut()
            .push((name.to_string(), version.to_string()));
        if self.failing.contains(name) {
            return Err(server_error(name));
        }
        if self
            .images
            .borrow_mut()
            .remove(&(name.to_string(), version.to_string()))
        {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("{name}:{version}")))
        }
    }
}

/// Every image the standard fixture declares.
pub fn populated_registry() -> MockRegistry {
    [
        ("cray/cray-sat", "1.0.0"),
        ("cray/cray-sat", "1.0.1"),
        ("cray/sat-cfs-install", "1.4.0"),
        ("cray/cray-cos", "1.0.0"),
        ("cray/cray-cos", "1.0.1"),
        ("cray/cos-boot", "1.0.0"),
        ("cray/cos-config-service", "1.0.0"),
        ("cray/cray-legacy_product", "0.9.0"),
    ]
    .into_iter()
    .fold(MockRegistry::new(), |registry, (name, version)| {
        registry.with_image(name, version)
    })
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(Arc::clone(&self.0))
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with INFO logs captured; returns its value and the log text.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    let bytes = sink.0.lock().map(|guard| guard.clone()).unwrap_or_default();
    (value, String::from_utf8_lossy(&bytes).into_owned())
}

pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}
