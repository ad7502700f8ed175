//! JSON Schema validation for product version data.
//!
//! The catalog ships a draft-07 schema describing what a product version entry
//! may contain. Records that fail validation are filtered out of the loaded
//! catalog rather than failing the load. Schema files may be plain schemas or
//! descriptors wrapping one (`{"schema": {...}}` or `{"schema_path": "..."}`).

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::fs::File;
use std::path::Path;

const EMBEDDED_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schema/product_catalog.schema.json"
));

/// Decides whether a record's version data is understood by this crate.
pub trait RecordValidator {
    /// Returns every violation found, or `Ok` when the data conforms.
    fn validate(&self, data: &Value) -> std::result::Result<(), Vec<String>>;
}

/// Validator that accepts every record (`--no-validate-schema`).
pub struct AcceptAll;

impl RecordValidator for AcceptAll {
    fn validate(&self, _data: &Value) -> std::result::Result<(), Vec<String>> {
        Ok(())
    }
}

pub struct JsonSchemaValidator {
    label: String,
    compiled: JSONSchema,
}

impl JsonSchemaValidator {
    /// The schema bundled with the crate.
    pub fn embedded() -> Result<Self> {
        let value: Value =
            serde_json::from_str(EMBEDDED_SCHEMA).context("parsing embedded record schema")?;
        Self::compile(value, "embedded product catalog schema")
    }

    /// Load a schema (or descriptor) from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let descriptor_or_schema = read_json(path)?;
        let schema = unwrap_descriptor(path, descriptor_or_schema)?;
        Self::compile(schema, &path.display().to_string())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn compile(schema: Value, label: &str) -> Result<Self> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|err| anyhow!("compiling schema {label}: {err}"))?;
        Ok(Self {
            label: label.to_string(),
            compiled,
        })
    }
}

impl RecordValidator for JsonSchemaValidator {
    fn validate(&self, data: &Value) -> std::result::Result<(), Vec<String>> {
        self.compiled
            .validate(data)
            .map_err(|errors| errors.map(|err| err.to_string()).collect())
    }
}

fn read_json(path: &Path) -> Result<Value> {
    serde_json::from_reader(
        File::open(path).with_context(|| format!("opening schema {}", path.display()))?,
    )
    .with_context(|| format!("parsing schema {}", path.display()))
}

fn unwrap_descriptor(path: &Path, value: Value) -> Result<Value> {
    if let Some(schema_path) = value.get("schema_path").and_then(Value::as_str) {
        let resolved = match path.parent() {
            Some(base) if !Path::new(schema_path).is_absolute() => base.join(schema_path),
            _ => Path::new(schema_path).to_path_buf(),
        };
        return read_json(&resolved).with_context(|| {
            format!(
                "loading schema {} referenced by {}",
                resolved.display(),
                path.display()
            )
        });
    }
    if let Some(inline) = value.get("schema") {
        return Ok(inline.clone());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn embedded_schema_accepts_current_and_legacy_entries() {
        let validator = JsonSchemaValidator::embedded().unwrap();
        let current = json!({"component_versions": {
            "docker": [{"name": "cray/cray-sat", "version": "1.0.1"}],
            "helm": [{"name": "sat-chart", "version": "0.2.0"}],
            "repositories": [
                {"name": "sat-sle-15sp2", "type": "group", "members": ["sat-2.0.1-sle-15sp2"]},
                {"name": "sat-2.0.1-sle-15sp2", "type": "hosted"}
            ]
        }});
        assert!(validator.validate(&current).is_ok());

        let legacy = json!({"component_versions": {"sat": "1.0.0"}});
        assert!(validator.validate(&legacy).is_ok());
    }

    #[test]
    fn embedded_schema_rejects_malformed_entries() {
        let validator = JsonSchemaValidator::embedded().unwrap();
        let missing_version = json!({"component_versions": {"docker": [{"name": "cray/cray-sat"}]}});
        assert!(validator.validate(&missing_version).is_err());

        let group_without_members =
            json!({"component_versions": {"repositories": [{"name": "sat-sle-15sp2", "type": "group"}]}});
        assert!(validator.validate(&group_without_members).is_err());

        let errors = validator.validate(&json!("not a mapping")).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn descriptor_with_relative_schema_path_is_followed() {
        let dir = TempDir::new().unwrap();
        let mut schema = File::create(dir.path().join("inner.json")).unwrap();
        write!(schema, "{}", json!({"type": "object", "required": ["active"]})).unwrap();
        let descriptor = dir.path().join("descriptor.json");
        std::fs::write(&descriptor, json!({"schema_path": "inner.json"}).to_string()).unwrap();

        let validator = JsonSchemaValidator::from_path(&descriptor).unwrap();
        assert!(validator.validate(&json!({"active": true})).is_ok());
        assert!(validator.validate(&json!({})).is_err());
    }

    #[test]
    fn accept_all_never_rejects() {
        assert!(AcceptAll.validate(&json!(null)).is_ok());
    }
}
