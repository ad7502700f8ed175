//! Product catalog wiring.
//!
//! The catalog is a ConfigMap whose keys are product names and whose values
//! are YAML mappings of version to version data. `ProductCatalog` is a loaded,
//! validated snapshot; `CatalogStore` pairs reads with the mutation gateway.

pub mod identity;
pub mod index;
pub mod model;
pub mod schema;
pub mod store;

pub use identity::{Artifact, ArtifactClass, ProductKey, RepoKind};
pub use index::{CatalogLocation, DEFAULT_CATALOG_NAME, DEFAULT_CATALOG_NAMESPACE, ProductCatalog};
pub use model::{ArtifactSource, ProductVersionRecord, RepositoryDecl};
pub use schema::{AcceptAll, JsonSchemaValidator, RecordValidator};
pub use store::CatalogStore;
