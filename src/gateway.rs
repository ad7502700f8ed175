//! Durable catalog mutations through the external catalog scripts.
//!
//! The catalog ConfigMap is only ever written by `catalog_update` and
//! `catalog_delete`. Parameters travel as environment variables set on the
//! child command alone; structured payloads are staged in a temporary YAML file
//! that lives until the child exits. Success means exit status zero; callers
//! that need to observe the change must load the catalog again.

use crate::catalog::ProductKey;
use crate::error::CatalogError;
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

pub const DEFAULT_UPDATE_PROGRAM: &str = "catalog_update";
pub const DEFAULT_DELETE_PROGRAM: &str = "catalog_delete";

/// Variables only some mutations set; cleared on every invocation so values
/// from the caller's environment never leak into a different mutation.
const OPTIONAL_VARS: [&str; 3] = ["SET_ACTIVE_VERSION", "UPDATE_OVERWRITE", "YAML_CONTENT"];

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub config_map: String,
    pub namespace: String,
    pub update_program: PathBuf,
    pub delete_program: PathBuf,
    pub validate_schema: bool,
}

impl GatewayConfig {
    pub fn new(config_map: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            config_map: config_map.into(),
            namespace: namespace.into(),
            update_program: PathBuf::from(DEFAULT_UPDATE_PROGRAM),
            delete_program: PathBuf::from(DEFAULT_DELETE_PROGRAM),
            validate_schema: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CatalogMutation {
    /// Drop the version's entry from the catalog.
    Remove,
    /// Flag the version as the active one for its product.
    Activate,
    /// Replace the version's data wholesale.
    Overwrite(Value),
}

impl CatalogMutation {
    fn action(&self) -> &'static str {
        match self {
            CatalogMutation::Remove => "removing",
            CatalogMutation::Activate => "activating",
            CatalogMutation::Overwrite(_) => "updating",
        }
    }

    fn payload(&self) -> Option<Value> {
        match self {
            CatalogMutation::Remove => None,
            CatalogMutation::Activate => Some(json!({"active": true})),
            CatalogMutation::Overwrite(data) => Some(data.clone()),
        }
    }
}

pub trait CatalogMutator {
    fn apply(&self, product: &ProductKey, mutation: &CatalogMutation) -> Result<(), CatalogError>;
}

/// Runs the catalog scripts as child processes.
pub struct ProcessMutator {
    config: GatewayConfig,
}

impl ProcessMutator {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn command_for(
        &self,
        product: &ProductKey,
        mutation: &CatalogMutation,
        staged: Option<&Path>,
    ) -> Command {
        let program = match mutation {
            CatalogMutation::Remove => &self.config.delete_program,
            _ => &self.config.update_program,
        };
        let mut command = Command::new(program);
        for var in OPTIONAL_VARS {
            command.env_remove(var);
        }
        command
            .env("PRODUCT", &product.name)
            .env("PRODUCT_VERSION", &product.version)
            .env("CONFIG_MAP", &self.config.config_map)
            .env("CONFIG_MAP_NS", &self.config.namespace)
            .env("VALIDATE_SCHEMA", bool_flag(self.config.validate_schema));

        match mutation {
            CatalogMutation::Remove => {}
            CatalogMutation::Activate => {
                command.env("SET_ACTIVE_VERSION", "true");
            }
            CatalogMutation::Overwrite(_) => {
                command
                    .env("SET_ACTIVE_VERSION", "true")
                    .env("UPDATE_OVERWRITE", "true");
            }
        }
        if let Some(path) = staged {
            command.env("YAML_CONTENT", path);
        }
        command
    }

    fn stage(&self, product: &ProductKey, payload: &Value) -> Result<NamedTempFile, String> {
        let yaml = serde_yaml_ng::to_string(payload)
            .map_err(|err| format!("serializing payload for {product}: {err}"))?;
        let mut file = tempfile::Builder::new()
            .prefix("catalog-update-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|err| format!("creating temporary payload file: {err}"))?;
        file.write_all(yaml.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| format!("writing temporary payload file: {err}"))?;
        Ok(file)
    }
}

impl CatalogMutator for ProcessMutator {
    fn apply(&self, product: &ProductKey, mutation: &CatalogMutation) -> Result<(), CatalogError> {
        let failed = |detail: String| CatalogError::CatalogMutationFailed {
            action: mutation.action(),
            product: product.clone(),
            detail,
        };

        // Dropping the staged file removes it, on success and error alike.
        let staged = match mutation.payload() {
            Some(payload) => Some(self.stage(product, &payload).map_err(failed)?),
            None => None,
        };
        let mut command = self.command_for(product, mutation, staged.as_ref().map(|f| f.path()));
        tracing::debug!(?command, "running catalog mutation");

        let output = command
            .output()
            .map_err(|err| failed(format!("failed to execute {:?}: {err}", command.get_program())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let diagnostics = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(failed(format!(
                "{:?} exited with {}: {diagnostics}",
                command.get_program(),
                output.status
            )));
        }

        match mutation {
            CatalogMutation::Remove => tracing::info!("Deleted {product} from product catalog."),
            CatalogMutation::Activate => {
                tracing::info!("Set {product} as active in the product catalog.")
            }
            CatalogMutation::Overwrite(_) => tracing::info!(
                "Updated {product} in the product catalog with new product data."
            ),
        }
        Ok(())
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::ffi::OsStr;

    fn envs(command: &Command) -> BTreeMap<String, Option<String>> {
        command
            .get_envs()
            .map(|(key, value)| {
                (
                    key.to_string_lossy().into_owned(),
                    value.map(|v: &OsStr| v.to_string_lossy().into_owned()),
                )
            })
            .collect()
    }

    #[test]
    fn removal_sets_base_contract_only() {
        let mutator = ProcessMutator::new(GatewayConfig::new("mock-name", "mock-namespace"));
        let product = ProductKey::new("mock_name", "mock_version");
        let command = mutator.command_for(&product, &CatalogMutation::Remove, None);

        assert_eq!(command.get_program(), "catalog_delete");
        let envs = envs(&command);
        assert_eq!(envs["PRODUCT"].as_deref(), Some("mock_name"));
        assert_eq!(envs["PRODUCT_VERSION"].as_deref(), Some("mock_version"));
        assert_eq!(envs["CONFIG_MAP"].as_deref(), Some("mock-name"));
        assert_eq!(envs["CONFIG_MAP_NS"].as_deref(), Some("mock-namespace"));
        assert_eq!(envs["VALIDATE_SCHEMA"].as_deref(), Some("true"));
        for var in OPTIONAL_VARS {
            assert_eq!(envs[var], None, "{var} must be cleared");
        }
    }

    #[test]
    fn overwrite_sets_overwrite_and_active_flags() {
        let mut config = GatewayConfig::new("cray-product-catalog", "services");
        config.validate_schema = false;
        let mutator = ProcessMutator::new(config);
        let product = ProductKey::new("sat", "2.0.1");
        let staged = Path::new("/tmp/payload.yaml");
        let command = mutator.command_for(
            &product,
            &CatalogMutation::Overwrite(json!({"component_versions": {}})),
            Some(staged),
        );

        assert_eq!(command.get_program(), "catalog_update");
        let envs = envs(&command);
        assert_eq!(envs["SET_ACTIVE_VERSION"].as_deref(), Some("true"));
        assert_eq!(envs["UPDATE_OVERWRITE"].as_deref(), Some("true"));
        assert_eq!(envs["YAML_CONTENT"].as_deref(), Some("/tmp/payload.yaml"));
        assert_eq!(envs["VALIDATE_SCHEMA"].as_deref(), Some("false"));
    }

    #[test]
    fn activation_payload_marks_version_active() {
        assert_eq!(
            CatalogMutation::Activate.payload(),
            Some(json!({"active": true}))
        );
        assert_eq!(CatalogMutation::Remove.payload(), None);
    }

    #[test]
    fn missing_program_is_a_mutation_failure() {
        let mut config = GatewayConfig::new("cray-product-catalog", "services");
        config.delete_program = PathBuf::from("/nonexistent/catalog_delete");
        let mutator = ProcessMutator::new(config);
        let err = mutator
            .apply(&ProductKey::new("sat", "2.0.0"), &CatalogMutation::Remove)
            .unwrap_err();
        assert!(matches!(err, CatalogError::CatalogMutationFailed { action: "removing", .. }));
        assert!(err.to_string().starts_with("Error removing sat-2.0.0 in product catalog"));
    }
}
