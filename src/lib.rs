//! Product catalog reconciliation.
//!
//! Installed product versions are recorded in a Kubernetes ConfigMap (the
//! product catalog). This crate loads that catalog into an immutable snapshot
//! and uses it to remove a version's Docker images, helm charts and hosted
//! package repositories without touching artifacts other versions still
//! declare, to activate a version's repositories, and to persist catalog
//! changes through the external `catalog_update`/`catalog_delete` programs.
//!
//! Every engine takes the snapshot as an explicit argument; nothing keeps a
//! global record list. Best-effort loops attempt every item and fold failures
//! into a single [`CatalogError::PartialFailure`] at the end.

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod remote;
pub mod repos;
pub mod runtime;
pub mod telemetry;
pub mod xref;

pub use catalog::{
    Artifact, ArtifactClass, CatalogLocation, CatalogStore, ProductCatalog, ProductKey,
    ProductVersionRecord, RecordValidator,
};
pub use cluster::{ConfigMapReader, Credentials, MemoryConfigMaps};
pub use error::{CatalogError, ItemFailure, OperationKind};
pub use gateway::{CatalogMutation, CatalogMutator, GatewayConfig, ProcessMutator};
pub use manager::{ProductManager, Remotes, UninstallSummary};
pub use remote::{ApiError, ChartComponent, ChartRegistry, ImageRegistry, RepositoryApi};
pub use repos::{ActivationReport, UninstallReport};
pub use xref::{PlannedArtifact, RemovalPlan, RemovalReport};
