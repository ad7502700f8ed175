//! Print every installed product version in the catalog as NDJSON.
//!
//! Each line describes one record: its declared images, charts and
//! repositories, whether it is active, and which other versions share each of
//! its images. Records rejected by schema validation are reported on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use productcatalog::catalog::{ArtifactClass, ProductCatalog, ProductVersionRecord};
use productcatalog::config::{CatalogArgs, LogArgs};
use productcatalog::telemetry;
use productcatalog::xref::plan_removal;
use serde_json::{Value, json};
use std::io::{self, Write};

#[derive(Parser, Debug)]
#[command(name = "catalog-report", version, about = "Describe the installed product catalog")]
struct Cli {
    #[command(flatten)]
    catalog: CatalogArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Only report versions of this product.
    #[arg(long)]
    product: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.log.verbosity());
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let reader = cli.catalog.reader();
    let validator = cli.catalog.validator()?;
    let catalog = ProductCatalog::load(reader.as_ref(), &cli.catalog.location(), validator.as_ref())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in catalog.records() {
        if cli
            .product
            .as_deref()
            .is_some_and(|product| product != record.name())
        {
            continue;
        }
        let line = describe(&catalog, record)?;
        writeln!(out, "{}", serde_json::to_string(&line)?).context("writing report")?;
    }
    Ok(())
}

fn describe(catalog: &ProductCatalog, record: &ProductVersionRecord) -> Result<Value> {
    let plan = plan_removal(catalog, record.name(), record.version(), ArtifactClass::Image)?;
    let shared: Vec<Value> = plan
        .shared()
        .map(|planned| {
            json!({
                "image": planned.artifact.to_string(),
                "owners": planned.owners.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(json!({
        "name": record.name(),
        "version": record.version(),
        "active": record.is_active(),
        "legacy_images": record.image_source().is_legacy(),
        "images": record.docker_images().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "charts": record.helm_charts().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "repositories": record.repositories(),
        "hosted_repositories": record.hosted_repository_names(),
        "shared_images": shared,
        "clone_url": record.clone_url(),
    }))
}
