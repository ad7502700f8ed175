//! Read access to the ConfigMap backing the product catalog and to the secret
//! holding repository credentials.
//!
//! Readers return `Ok(None)` when the object exists but carries no `data`
//! block; reachability problems are errors. The catalog store decides how each
//! case maps onto the catalog error taxonomy.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// `data` block of a ConfigMap or secret.
pub type ObjectData = BTreeMap<String, String>;

pub trait ConfigMapReader {
    fn read_config_map(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>>;

    /// Secret values are returned exactly as stored (base64 encoded).
    fn read_secret(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>>;
}

/// Reads objects by invoking `kubectl get ... -o json`.
pub struct KubectlReader {
    program: PathBuf,
}

impl KubectlReader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn get_object(&self, kind: &str, name: &str, namespace: &str) -> Result<Option<ObjectData>> {
        let output = Command::new(&self.program)
            .args(["get", kind, name, "--namespace", namespace, "--output", "json"])
            .output()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} get {kind} {namespace}/{name} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let value: Value = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing {kind} {namespace}/{name}"))?;
        Ok(data_block(&value))
    }
}

impl ConfigMapReader for KubectlReader {
    fn read_config_map(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>> {
        self.get_object("configmap", name, namespace)
    }

    fn read_secret(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>> {
        self.get_object("secret", name, namespace)
    }
}

/// Reads a ConfigMap manifest (YAML or JSON) from disk.
///
/// Useful for dry runs against an exported catalog. Secrets are never
/// available from a manifest file.
pub struct ManifestFileReader {
    path: PathBuf,
}

impl ManifestFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigMapReader for ManifestFileReader {
    fn read_config_map(&self, name: &str, _namespace: &str) -> Result<Option<ObjectData>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let value: Value = serde_yaml_ng::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        if let Some(declared) = value.pointer("/metadata/name").and_then(Value::as_str) {
            if declared != name {
                bail!(
                    "{} holds ConfigMap {declared}, expected {name}",
                    self.path.display()
                );
            }
        }
        Ok(data_block(&value))
    }

    fn read_secret(&self, _name: &str, _namespace: &str) -> Result<Option<ObjectData>> {
        Ok(None)
    }
}

/// In-memory objects keyed by `(namespace, name)`.
///
/// Writes are visible to later reads, which lets callers simulate the
/// external mutation process updating the catalog between reads.
#[derive(Default)]
pub struct MemoryConfigMaps {
    config_maps: RefCell<BTreeMap<(String, String), Option<ObjectData>>>,
    secrets: RefCell<BTreeMap<(String, String), Option<ObjectData>>>,
}

impl MemoryConfigMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_config_map(&self, name: &str, namespace: &str, data: Option<ObjectData>) {
        self.config_maps
            .borrow_mut()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn insert_secret(&self, name: &str, namespace: &str, data: Option<ObjectData>) {
        self.secrets
            .borrow_mut()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Replace one product's serialized versions inside a ConfigMap.
    pub fn set_entry(&self, name: &str, namespace: &str, product: &str, text: &str) {
        let mut maps = self.config_maps.borrow_mut();
        let data = maps
            .entry((namespace.to_string(), name.to_string()))
            .or_insert_with(|| Some(ObjectData::new()))
            .get_or_insert_with(ObjectData::new);
        data.insert(product.to_string(), text.to_string());
    }
}

impl ConfigMapReader for MemoryConfigMaps {
    fn read_config_map(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>> {
        match self
            .config_maps
            .borrow()
            .get(&(namespace.to_string(), name.to_string()))
        {
            Some(data) => Ok(data.clone()),
            None => bail!("configmaps \"{name}\" not found in namespace {namespace}"),
        }
    }

    fn read_secret(&self, name: &str, namespace: &str) -> Result<Option<ObjectData>> {
        match self
            .secrets
            .borrow()
            .get(&(namespace.to_string(), name.to_string()))
        {
            Some(data) => Ok(data.clone()),
            None => bail!("secrets \"{name}\" not found in namespace {namespace}"),
        }
    }
}

fn data_block(object: &Value) -> Option<ObjectData> {
    let data = object.get("data")?.as_object()?;
    Some(
        data.iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect(),
    )
}

/// HTTP basic-auth credentials for the repository manager and registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Decode `username`/`password` from a secret.
    ///
    /// Any problem is downgraded to a warning: clients then fall back to
    /// unauthenticated requests.
    pub fn from_secret(reader: &dyn ConfigMapReader, name: &str, namespace: &str) -> Option<Self> {
        let data = match reader.read_secret(name, namespace) {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::warn!("unable to read Kubernetes secret {namespace}/{name}: no data");
                return None;
            }
            Err(err) => {
                tracing::warn!("unable to read Kubernetes secret {namespace}/{name}: {err:#}");
                return None;
            }
        };
        match (decode_field(&data, "username"), decode_field(&data, "password")) {
            (Ok(username), Ok(password)) => Some(Self::new(username, password)),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!("unable to use Kubernetes secret {namespace}/{name}: {err:#}");
                None
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn decode_field(data: &ObjectData, key: &str) -> Result<String> {
    let raw = data
        .get(key)
        .with_context(|| format!("secret has no '{key}' field"))?;
    let bytes = STANDARD
        .decode(raw.trim())
        .with_context(|| format!("'{key}' is not valid base64"))?;
    String::from_utf8(bytes).with_context(|| format!("'{key}' is not valid UTF-8"))
}
