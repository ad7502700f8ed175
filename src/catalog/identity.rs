use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identity of one installed product version (`sat` + `2.0.1`).
///
/// Versions are opaque tokens: they are compared for equality only and never
/// parsed as semver.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ProductKey {
    pub name: String,
    pub version: String,
}

impl ProductKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        self.name == name && self.version == version
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A container image or chart identified by `(name, version)`.
///
/// `version` is optional only for images synthesized from legacy catalog
/// entries that never recorded one.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub version: Option<String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Artifact families tracked for cross-product sharing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    Image,
    Chart,
}

impl ArtifactClass {
    /// Human label used in notices ("Docker image", "helm chart").
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactClass::Image => "Docker image",
            ArtifactClass::Chart => "helm chart",
        }
    }
}

/// Repository type declared in a catalog entry.
///
/// `Other` keeps entries with types this crate does not act on (proxy
/// repositories, typos) visible instead of failing the whole record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepoKind {
    Hosted,
    Group,
    Other(String),
}

impl Serialize for RepoKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RepoKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_str(&value))
    }
}

/// Entries without a `type` land here.
impl Default for RepoKind {
    fn default() -> Self {
        RepoKind::Other(String::new())
    }
}

impl RepoKind {
    pub fn as_str(&self) -> &str {
        match self {
            RepoKind::Hosted => "hosted",
            RepoKind::Group => "group",
            RepoKind::Other(value) => value.as_str(),
        }
    }

    pub(crate) fn from_str(value: &str) -> Self {
        match value {
            "hosted" => RepoKind::Hosted,
            "group" => RepoKind::Group,
            other => RepoKind::Other(other.to_string()),
        }
    }
}
