//! Command-line and environment settings shared by the binaries.

use crate::catalog::{
    AcceptAll, CatalogLocation, DEFAULT_CATALOG_NAME, DEFAULT_CATALOG_NAMESPACE,
    JsonSchemaValidator, RecordValidator,
};
use crate::cluster::{ConfigMapReader, KubectlReader, ManifestFileReader};
use crate::gateway::{DEFAULT_DELETE_PROGRAM, DEFAULT_UPDATE_PROGRAM, GatewayConfig};
use crate::manager::DEFAULT_CHARTS_REPOSITORY;
use crate::remote::{DEFAULT_DOCKER_URL, DEFAULT_NEXUS_URL};
use crate::runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_CREDENTIALS_SECRET_NAME: &str = "nexus-admin-credential";
pub const DEFAULT_CREDENTIALS_SECRET_NAMESPACE: &str = "nexus";

/// Where the catalog lives and how its records are validated.
#[derive(Args, Clone, Debug)]
pub struct CatalogArgs {
    /// Name of the product catalog ConfigMap.
    #[arg(long, env = "PRODUCT_CATALOG_NAME", default_value = DEFAULT_CATALOG_NAME)]
    pub product_catalog_name: String,

    /// Namespace of the product catalog ConfigMap.
    #[arg(long, env = "PRODUCT_CATALOG_NAMESPACE", default_value = DEFAULT_CATALOG_NAMESPACE)]
    pub product_catalog_namespace: String,

    /// Read the catalog from an exported ConfigMap manifest instead of the cluster.
    #[arg(long, env = "PRODUCT_CATALOG_FILE")]
    pub catalog_file: Option<PathBuf>,

    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    pub kubectl: PathBuf,

    /// Record schema to validate against instead of the bundled one.
    #[arg(long, env = "PRODUCT_CATALOG_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Accept every record without schema validation.
    #[arg(long)]
    pub no_validate_schema: bool,
}

impl CatalogArgs {
    pub fn location(&self) -> CatalogLocation {
        CatalogLocation::new(&self.product_catalog_name, &self.product_catalog_namespace)
    }

    pub fn reader(&self) -> Box<dyn ConfigMapReader> {
        match &self.catalog_file {
            Some(path) => Box::new(ManifestFileReader::new(path)),
            None => Box::new(KubectlReader::new(&self.kubectl)),
        }
    }

    pub fn validator(&self) -> Result<Box<dyn RecordValidator>> {
        if self.no_validate_schema {
            return Ok(Box::new(AcceptAll));
        }
        let validator = match &self.schema {
            Some(path) => JsonSchemaValidator::from_path(path)?,
            None => JsonSchemaValidator::embedded()?,
        };
        tracing::debug!(schema = validator.label(), "validating catalog records");
        Ok(Box::new(validator))
    }
}

/// Endpoints and helper programs used when acting on a product.
#[derive(Args, Clone, Debug)]
pub struct RemoteArgs {
    #[arg(long, env = "NEXUS_URL", default_value = DEFAULT_NEXUS_URL)]
    pub nexus_url: String,

    #[arg(long, env = "DOCKER_URL", default_value = DEFAULT_DOCKER_URL)]
    pub docker_url: String,

    /// Nexus repository holding helm charts.
    #[arg(long, env = "CHARTS_REPOSITORY", default_value = DEFAULT_CHARTS_REPOSITORY)]
    pub charts_repository: String,

    #[arg(
        long,
        env = "NEXUS_CREDENTIALS_SECRET_NAME",
        default_value = DEFAULT_CREDENTIALS_SECRET_NAME
    )]
    pub nexus_credentials_secret_name: String,

    #[arg(
        long,
        env = "NEXUS_CREDENTIALS_SECRET_NAMESPACE",
        default_value = DEFAULT_CREDENTIALS_SECRET_NAMESPACE
    )]
    pub nexus_credentials_secret_namespace: String,

    #[arg(long, env = "CATALOG_UPDATE_BIN", default_value = DEFAULT_UPDATE_PROGRAM)]
    pub catalog_update_bin: PathBuf,

    #[arg(long, env = "CATALOG_DELETE_BIN", default_value = DEFAULT_DELETE_PROGRAM)]
    pub catalog_delete_bin: PathBuf,
}

impl RemoteArgs {
    /// Gateway settings for `catalog`, with the mutation programs located.
    pub fn gateway_config(&self, catalog: &CatalogArgs) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::new(
            &catalog.product_catalog_name,
            &catalog.product_catalog_namespace,
        );
        config.validate_schema = !catalog.no_validate_schema;
        config.update_program = runtime::resolve_program(&self.catalog_update_bin)
            .context("locating the catalog update program")?;
        config.delete_program = runtime::resolve_program(&self.catalog_delete_bin)
            .context("locating the catalog delete program")?;
        Ok(config)
    }
}

/// Log verbosity flags.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct LogArgs {
    /// More output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl LogArgs {
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            i8::try_from(self.verbose).unwrap_or(i8::MAX)
        }
    }
}
