//! One loaded catalog snapshot plus the collaborators needed to act on it.

use crate::catalog::{CatalogStore, ProductCatalog, RecordValidator};
use crate::error::{CatalogError, FailureLog, OperationKind};
use crate::remote::{ChartComponent, ChartRegistry, ImageRegistry, RepositoryApi};
use crate::repos::{self, ActivationReport, UninstallReport};
use crate::xref::{self, RemovalReport};
use std::cell::OnceCell;

pub const DEFAULT_CHARTS_REPOSITORY: &str = "charts";

/// External services the manager reconciles against.
pub struct Remotes<'a> {
    pub repositories: &'a dyn RepositoryApi,
    pub images: &'a dyn ImageRegistry,
    pub charts: &'a dyn ChartRegistry,
    /// Repository holding helm chart components.
    pub charts_repository: String,
}

/// What `uninstall` did, step by step.
#[derive(Clone, Debug)]
pub struct UninstallSummary {
    pub images: RemovalReport,
    pub charts: RemovalReport,
    pub repositories: UninstallReport,
}

pub struct ProductManager<'a> {
    catalog: ProductCatalog,
    store: CatalogStore<'a>,
    remotes: Remotes<'a>,
    chart_listing: OnceCell<Vec<ChartComponent>>,
}

impl<'a> ProductManager<'a> {
    /// Load the catalog once; every operation on this manager works from that
    /// snapshot.
    pub fn load(
        store: CatalogStore<'a>,
        validator: &dyn RecordValidator,
        remotes: Remotes<'a>,
    ) -> Result<Self, CatalogError> {
        let catalog = store.load(validator)?;
        Ok(Self::new(catalog, store, remotes))
    }

    pub fn new(catalog: ProductCatalog, store: CatalogStore<'a>, remotes: Remotes<'a>) -> Self {
        Self {
            catalog,
            store,
            remotes,
            chart_listing: OnceCell::new(),
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn remove_images(&self, name: &str, version: &str) -> Result<RemovalReport, CatalogError> {
        xref::remove_images(&self.catalog, name, version, self.remotes.images)
    }

    pub fn remove_charts(&self, name: &str, version: &str) -> Result<RemovalReport, CatalogError> {
        // Fail on an unknown product before touching the registry.
        self.catalog.get_product(name, version)?;
        let listing = self.chart_listing()?;
        xref::remove_charts(
            &self.catalog,
            name,
            version,
            self.remotes.charts,
            listing,
            &self.store,
        )
    }

    fn chart_listing(&self) -> Result<&[ChartComponent], CatalogError> {
        if let Some(listing) = self.chart_listing.get() {
            return Ok(listing.as_slice());
        }
        let repository = &self.remotes.charts_repository;
        let fetched = self
            .remotes
            .charts
            .list_components(repository)
            .map_err(|source| CatalogError::ExternalOperationFailed {
                action: format!("listing components in repository {repository}"),
                source,
            })?;
        Ok(self.chart_listing.get_or_init(|| fetched).as_slice())
    }

    pub fn uninstall_repositories(
        &self,
        name: &str,
        version: &str,
    ) -> Result<UninstallReport, CatalogError> {
        repos::uninstall_repositories(&self.catalog, name, version, self.remotes.repositories)
    }

    /// Activate declared group repositories, or with `dists`, the legacy
    /// per-distribution groups.
    pub fn activate_repositories(
        &self,
        name: &str,
        version: &str,
        dists: &[String],
    ) -> Result<ActivationReport, CatalogError> {
        if dists.is_empty() {
            repos::activate_repositories(&self.catalog, name, version, self.remotes.repositories)
        } else {
            repos::activate_distributions(
                &self.catalog,
                name,
                version,
                dists,
                self.remotes.repositories,
            )
        }
    }

    pub fn remove_entry(&self, name: &str, version: &str) -> Result<(), CatalogError> {
        let record = self.catalog.get_product(name, version)?;
        self.store.persist_removal(record.key())
    }

    pub fn activate_entry(&self, name: &str, version: &str) -> Result<(), CatalogError> {
        let record = self.catalog.get_product(name, version)?;
        self.store.persist_activate(record.key())
    }

    /// Remove images, charts and hosted repositories, then the catalog entry.
    ///
    /// All three cleanup steps run even when one fails. The entry is only
    /// removed once all of them succeeded, so a failed uninstall can be
    /// retried against the same entry.
    pub fn uninstall(&self, name: &str, version: &str) -> Result<UninstallSummary, CatalogError> {
        let key = self.catalog.get_product(name, version)?.key().clone();
        let mut failures = FailureLog::new(OperationKind::Uninstall, &key);

        let images = self
            .remove_images(name, version)
            .map_err(|err| failures.record("Docker images", err))
            .ok();
        let charts = self
            .remove_charts(name, version)
            .map_err(|err| failures.record("helm charts", err))
            .ok();
        let repositories = self
            .uninstall_repositories(name, version)
            .map_err(|err| failures.record("repositories", err))
            .ok();

        let (Some(images), Some(charts), Some(repositories)) = (images, charts, repositories)
        else {
            tracing::warn!("Not removing {key} from the product catalog until cleanup succeeds.");
            return Err(failures.into_error());
        };

        self.store.persist_removal(&key)?;
        Ok(UninstallSummary {
            images,
            charts,
            repositories,
        })
    }

    /// Activate repositories, then flag the version active in the catalog.
    pub fn activate(
        &self,
        name: &str,
        version: &str,
        dists: &[String],
    ) -> Result<ActivationReport, CatalogError> {
        let report = self.activate_repositories(name, version, dists)?;
        self.store.persist_activate(&report.target)?;
        Ok(report)
    }
}
