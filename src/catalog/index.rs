//! Snapshot of every installed product version in the catalog.
//!
//! A load decodes each product's stored YAML into per-version records. One
//! undecodable product invalidates the whole load; records that merely fail
//! schema validation are set aside and reported together. The snapshot is
//! immutable: writes go through the mutation gateway and need a fresh load to
//! be observed.

use crate::catalog::identity::ProductKey;
use crate::catalog::model::ProductVersionRecord;
use crate::catalog::schema::RecordValidator;
use crate::cluster::{ConfigMapReader, ObjectData};
use crate::error::CatalogError;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_CATALOG_NAME: &str = "cray-product-catalog";
pub const DEFAULT_CATALOG_NAMESPACE: &str = "services";

/// Name and namespace of the catalog ConfigMap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogLocation {
    pub name: String,
    pub namespace: String,
}

impl CatalogLocation {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl Default for CatalogLocation {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_NAME, DEFAULT_CATALOG_NAMESPACE)
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug)]
pub struct ProductCatalog {
    location: CatalogLocation,
    records: Vec<ProductVersionRecord>,
    rejected: Vec<ProductKey>,
}

impl ProductCatalog {
    /// Read the ConfigMap and build a validated snapshot.
    pub fn load(
        reader: &dyn ConfigMapReader,
        location: &CatalogLocation,
        validator: &dyn RecordValidator,
    ) -> Result<Self, CatalogError> {
        let data = read_catalog_data(reader, location)?;
        Self::from_config_map(location.clone(), &data, validator)
    }

    /// Build a snapshot from an already-read ConfigMap `data` block.
    pub fn from_config_map(
        location: CatalogLocation,
        data: &ObjectData,
        validator: &dyn RecordValidator,
    ) -> Result<Self, CatalogError> {
        let decoded = decode_records(&location, data)?;

        let mut valid = Vec::with_capacity(decoded.len());
        let mut rejected = Vec::new();
        for record in decoded {
            match validator.validate(record.data()) {
                Ok(()) => valid.push(record),
                Err(errors) => {
                    tracing::debug!(product = %record.key(), ?errors, "schema validation failed");
                    rejected.push(record.key().clone());
                }
            }
        }
        if !rejected.is_empty() {
            let names: Vec<String> = rejected.iter().map(ToString::to_string).collect();
            tracing::warn!(
                "The following products have product catalog data that is not understood by the install utility: {}",
                names.join(", ")
            );
        }

        let mut catalog = Self::from_records(location, valid)?;
        catalog.rejected = rejected;
        Ok(catalog)
    }

    /// Assemble a snapshot from records, enforcing `(name, version)`
    /// uniqueness.
    pub fn from_records(
        location: CatalogLocation,
        records: Vec<ProductVersionRecord>,
    ) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(record.key()) {
                return Err(CatalogError::DuplicateRecord(record.key().clone()));
            }
        }
        Ok(Self {
            location,
            records,
            rejected: Vec::new(),
        })
    }

    pub fn location(&self) -> &CatalogLocation {
        &self.location
    }

    /// Valid records in catalog order (product name, then version key).
    pub fn records(&self) -> &[ProductVersionRecord] {
        &self.records
    }

    /// Versions dropped because their data failed schema validation.
    pub fn rejected(&self) -> &[ProductKey] {
        &self.rejected
    }

    /// Resolve exactly one record by name and version.
    pub fn get_product(
        &self,
        name: &str,
        version: &str,
    ) -> Result<&ProductVersionRecord, CatalogError> {
        let mut matching = self
            .records
            .iter()
            .filter(|record| record.key().matches(name, version));
        let Some(first) = matching.next() else {
            return Err(CatalogError::not_found(name, version));
        };
        if matching.next().is_some() {
            return Err(CatalogError::RecordAmbiguous {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        Ok(first)
    }

    /// Every record except `key`.
    pub fn others<'a>(
        &'a self,
        key: &'a ProductKey,
    ) -> impl Iterator<Item = &'a ProductVersionRecord> + 'a {
        self.records.iter().filter(move |record| record.key() != key)
    }
}

pub(crate) fn read_catalog_data(
    reader: &dyn ConfigMapReader,
    location: &CatalogLocation,
) -> Result<ObjectData, CatalogError> {
    let data = reader
        .read_config_map(&location.name, &location.namespace)
        .map_err(|err| CatalogError::CatalogUnavailable {
            location: location.to_string(),
            detail: format!("{err:#}"),
        })?;
    match data {
        Some(data) if !data.is_empty() => Ok(data),
        _ => Err(CatalogError::CatalogUnavailable {
            location: location.to_string(),
            detail: format!("No data found in {location} ConfigMap."),
        }),
    }
}

fn decode_records(
    location: &CatalogLocation,
    data: &ObjectData,
) -> Result<Vec<ProductVersionRecord>, CatalogError> {
    let mut records = Vec::new();
    for (product, text) in data {
        let versions = decode_product(location, product, text)?;
        records.extend(
            versions
                .into_iter()
                .map(|(version, version_data)| ProductVersionRecord::new(product, version, version_data)),
        );
    }
    Ok(records)
}

/// Decode one product's stored text into its `version -> data` mapping.
pub(crate) fn decode_product(
    location: &CatalogLocation,
    product: &str,
    text: &str,
) -> Result<Map<String, Value>, CatalogError> {
    let corrupt = |detail: String| CatalogError::CatalogCorrupt {
        location: location.to_string(),
        product: product.to_string(),
        detail,
    };
    let value: Value = serde_yaml_ng::from_str(text).map_err(|err| corrupt(err.to_string()))?;
    match value {
        Value::Object(versions) => Ok(versions),
        other => Err(corrupt(format!(
            "expected a mapping of versions, found {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::{AcceptAll, JsonSchemaValidator};
    use crate::cluster::MemoryConfigMaps;

    fn catalog_data() -> ObjectData {
        ObjectData::from([
            (
                "sat".to_string(),
                "2.0.0:\n  component_versions:\n    docker:\n    - name: cray/cray-sat\n      version: 1.0.0\n2.0.1:\n  component_versions:\n    docker:\n    - name: cray/cray-sat\n      version: 1.0.1\n".to_string(),
            ),
            (
                "cos".to_string(),
                "2.0.0:\n  component_versions:\n    docker: []\n".to_string(),
            ),
        ])
    }

    #[test]
    fn every_product_version_becomes_a_record() {
        let catalog =
            ProductCatalog::from_config_map(CatalogLocation::default(), &catalog_data(), &AcceptAll)
                .unwrap();
        let keys: Vec<String> = catalog.records().iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, vec!["cos-2.0.0", "sat-2.0.0", "sat-2.0.1"]);
        assert!(catalog.rejected().is_empty());
    }

    #[test]
    fn undecodable_product_fails_whole_load() {
        let mut data = catalog_data();
        data.insert("sat".to_string(), "\t".to_string());
        let err = ProductCatalog::from_config_map(CatalogLocation::default(), &data, &AcceptAll)
            .unwrap_err();
        assert!(matches!(err, CatalogError::CatalogCorrupt { ref product, .. } if product == "sat"));
    }

    #[test]
    fn non_mapping_product_text_is_corrupt() {
        let mut data = catalog_data();
        data.insert("cos".to_string(), "- just\n- a list\n".to_string());
        let err = ProductCatalog::from_config_map(CatalogLocation::default(), &data, &AcceptAll)
            .unwrap_err();
        assert!(err.to_string().contains("expected a mapping of versions, found a list"));
    }

    #[test]
    fn schema_invalid_records_are_filtered_not_fatal() {
        let mut data = catalog_data();
        data.insert(
            "broken".to_string(),
            "1.0.0:\n  component_versions:\n    docker:\n    - name: cray/broken\n".to_string(),
        );
        let validator = JsonSchemaValidator::embedded().unwrap();
        let catalog =
            ProductCatalog::from_config_map(CatalogLocation::default(), &data, &validator).unwrap();
        assert_eq!(catalog.rejected(), &[ProductKey::new("broken", "1.0.0")]);
        assert!(matches!(
            catalog.get_product("broken", "1.0.0"),
            Err(CatalogError::RecordNotFound { .. })
        ));
        assert_eq!(catalog.records().len(), 3);
    }

    #[test]
    fn missing_or_empty_config_map_is_unavailable() {
        let cluster = MemoryConfigMaps::new();
        let location = CatalogLocation::new("mock-name", "mock-namespace");

        let err = ProductCatalog::load(&cluster, &location, &AcceptAll).unwrap_err();
        assert!(matches!(err, CatalogError::CatalogUnavailable { .. }));

        cluster.insert_config_map("mock-name", "mock-namespace", None);
        let err = ProductCatalog::load(&cluster, &location, &AcceptAll).unwrap_err();
        assert!(
            err.to_string()
                .contains("No data found in mock-namespace/mock-name ConfigMap.")
        );
    }

    #[test]
    fn duplicate_records_are_rejected_at_construction() {
        let records = vec![
            ProductVersionRecord::new("sat", "2.0.0", Value::Null),
            ProductVersionRecord::new("sat", "2.0.0", Value::Null),
        ];
        let err = ProductCatalog::from_records(CatalogLocation::default(), records).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateRecord(key) if key.to_string() == "sat-2.0.0"));
    }

    #[test]
    fn lookup_and_others() {
        let catalog =
            ProductCatalog::from_config_map(CatalogLocation::default(), &catalog_data(), &AcceptAll)
                .unwrap();
        let target = catalog.get_product("sat", "2.0.0").unwrap();
        let others: Vec<String> = catalog
            .others(target.key())
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(others, vec!["cos-2.0.0", "sat-2.0.1"]);

        let err = catalog.get_product("sat", "9.9.9").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No installed products with name sat and version 9.9.9."
        );
    }
}
