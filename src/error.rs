//! Error taxonomy for catalog reads, lookups and reconciliation runs.
//!
//! Fatal kinds abort the requested operation immediately. Per-item failures
//! inside best-effort loops are collected as [`ItemFailure`]s and surface once,
//! after every item was attempted, as [`CatalogError::PartialFailure`].

use crate::catalog::ProductKey;
use crate::remote::ApiError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unable to read {location} ConfigMap: {detail}")]
    CatalogUnavailable { location: String, detail: String },

    #[error("Failed to load {location} ConfigMap data for product '{product}': {detail}")]
    CatalogCorrupt {
        location: String,
        product: String,
        detail: String,
    },

    #[error("Product catalog contains more than one record for {0}")]
    DuplicateRecord(ProductKey),

    #[error("No installed products with name {name} and version {version}.")]
    RecordNotFound { name: String, version: String },

    #[error("Multiple installed products with name {name} and version {version}.")]
    RecordAmbiguous { name: String, version: String },

    #[error("No repository named {name} found.")]
    RepositoryNotFound { name: String },

    #[error("More than one repository named {name} found.")]
    RepositoryAmbiguous { name: String },

    #[error("Failed {action}: {source}")]
    ExternalOperationFailed {
        action: String,
        #[source]
        source: ApiError,
    },

    #[error("Error {action} {product} in product catalog: {detail}")]
    CatalogMutationFailed {
        action: &'static str,
        product: ProductKey,
        detail: String,
    },

    #[error("Product catalog data for {product} is missing {detail}")]
    CatalogDataMissing { product: ProductKey, detail: String },

    #[error(
        "One or more errors occurred {operation} for {} {}.",
        .product.name,
        .product.version
    )]
    PartialFailure {
        operation: OperationKind,
        product: ProductKey,
        failures: Vec<ItemFailure>,
    },
}

impl CatalogError {
    pub fn not_found(name: &str, version: &str) -> Self {
        CatalogError::RecordNotFound {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Per-item failures carried by an aggregate error; empty otherwise.
    pub fn failures(&self) -> &[ItemFailure] {
        match self {
            CatalogError::PartialFailure { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Operation names used in aggregate error summaries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    RemoveImages,
    RemoveCharts,
    UninstallRepositories,
    ActivateRepositories,
    Uninstall,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationKind::RemoveImages => "removing Docker images",
            OperationKind::RemoveCharts => "removing helm charts",
            OperationKind::UninstallRepositories => "uninstalling repositories",
            OperationKind::ActivateRepositories => "activating repositories",
            OperationKind::Uninstall => "uninstalling",
        };
        f.write_str(label)
    }
}

/// One failed item inside a best-effort loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

/// Accumulates per-item failures for one operation and folds them into a
/// single result once the loop is done.
pub(crate) struct FailureLog {
    operation: OperationKind,
    product: ProductKey,
    failures: Vec<ItemFailure>,
}

impl FailureLog {
    pub(crate) fn new(operation: OperationKind, product: &ProductKey) -> Self {
        Self {
            operation,
            product: product.clone(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, item: impl Into<String>, reason: impl fmt::Display) {
        let failure = ItemFailure {
            item: item.into(),
            reason: reason.to_string(),
        };
        tracing::warn!("Failed {} {}", self.operation, failure);
        self.failures.push(failure);
    }

    pub(crate) fn finish<T>(self, value: T) -> Result<T, CatalogError> {
        if self.failures.is_empty() {
            Ok(value)
        } else {
            Err(self.into_error())
        }
    }

    pub(crate) fn into_error(self) -> CatalogError {
        CatalogError::PartialFailure {
            operation: self.operation,
            product: self.product,
            failures: self.failures,
        }
    }
}
