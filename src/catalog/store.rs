//! Catalog store adapter: reads go straight to the ConfigMap, writes go
//! through the mutation gateway.

use crate::catalog::identity::{Artifact, ProductKey};
use crate::catalog::index::{self, CatalogLocation, ProductCatalog};
use crate::catalog::model::{COMPONENT_VERSIONS_KEY, HELM_KEY};
use crate::catalog::schema::RecordValidator;
use crate::cluster::ConfigMapReader;
use crate::error::CatalogError;
use crate::gateway::{CatalogMutation, CatalogMutator};
use serde_json::Value;

pub struct CatalogStore<'a> {
    location: CatalogLocation,
    reader: &'a dyn ConfigMapReader,
    mutator: &'a dyn CatalogMutator,
}

impl<'a> CatalogStore<'a> {
    pub fn new(
        location: CatalogLocation,
        reader: &'a dyn ConfigMapReader,
        mutator: &'a dyn CatalogMutator,
    ) -> Self {
        Self {
            location,
            reader,
            mutator,
        }
    }

    pub fn location(&self) -> &CatalogLocation {
        &self.location
    }

    pub fn reader(&self) -> &'a dyn ConfigMapReader {
        self.reader
    }

    /// Fresh snapshot of the catalog.
    pub fn load(&self, validator: &dyn RecordValidator) -> Result<ProductCatalog, CatalogError> {
        ProductCatalog::load(self.reader, &self.location, validator)
    }

    /// Replace one version's data wholesale.
    pub fn persist_overwrite(&self, product: &ProductKey, data: Value) -> Result<(), CatalogError> {
        self.mutator
            .apply(product, &CatalogMutation::Overwrite(data))
    }

    pub fn persist_removal(&self, product: &ProductKey) -> Result<(), CatalogError> {
        self.mutator.apply(product, &CatalogMutation::Remove)
    }

    pub fn persist_activate(&self, product: &ProductKey) -> Result<(), CatalogError> {
        self.mutator.apply(product, &CatalogMutation::Activate)
    }

    /// Drop deleted charts from the persisted chart list of `product`.
    ///
    /// The entry is re-read from the ConfigMap rather than taken from a
    /// snapshot, so concurrent edits to other fields survive the overwrite.
    /// A chart matches on name and version when possible and on name alone
    /// otherwise; the first match is removed.
    pub fn strip_charts(&self, product: &ProductKey, deleted: &[Artifact]) -> Result<(), CatalogError> {
        let data = index::read_catalog_data(self.reader, &self.location)?;
        let text = data
            .get(&product.name)
            .ok_or_else(|| CatalogError::CatalogDataMissing {
                product: product.clone(),
                detail: "its product entry".to_string(),
            })?;
        let mut versions = index::decode_product(&self.location, &product.name, text)?;
        let mut version_data =
            versions
                .remove(&product.version)
                .ok_or_else(|| CatalogError::CatalogDataMissing {
                    product: product.clone(),
                    detail: "its version entry".to_string(),
                })?;

        let charts = version_data
            .get_mut(COMPONENT_VERSIONS_KEY)
            .and_then(|components| components.get_mut(HELM_KEY))
            .and_then(Value::as_array_mut)
            .ok_or_else(|| CatalogError::CatalogDataMissing {
                product: product.clone(),
                detail: "a helm chart list".to_string(),
            })?;

        for chart in deleted {
            tracing::info!("Removing chart {chart} from product catalog entry for {product}");
            if let Some(position) = chart_position(charts, chart) {
                charts.remove(position);
            }
        }

        self.persist_overwrite(product, version_data)
    }
}

fn chart_position(charts: &[Value], chart: &Artifact) -> Option<usize> {
    let name_of = |entry: &Value| entry.get("name").and_then(Value::as_str).map(str::to_owned);
    let exact = charts.iter().position(|entry| {
        name_of(entry).as_deref() == Some(chart.name.as_str())
            && entry
                .get("version")
                .and_then(crate::catalog::model::scalar_string)
                == chart.version
    });
    exact.or_else(|| {
        charts
            .iter()
            .position(|entry| name_of(entry).as_deref() == Some(chart.name.as_str()))
    })
}
