//! Uninstall or activate one installed product version.
//!
//! Loads the product catalog once, then runs the requested step (or the full
//! uninstall/activate sequence) against Nexus, the Docker registry and the
//! catalog mutation programs. Exits non-zero when any step failed.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use productcatalog::catalog::CatalogStore;
use productcatalog::cluster::Credentials;
use productcatalog::config::{CatalogArgs, LogArgs, RemoteArgs};
use productcatalog::gateway::{GatewayConfig, ProcessMutator};
use productcatalog::remote::{DockerRegistryClient, NexusClient};
use productcatalog::{ProductManager, Remotes, telemetry};

#[derive(Parser, Debug)]
#[command(name = "product-util", version, about = "Manage installed product versions")]
struct Cli {
    #[command(flatten)]
    catalog: CatalogArgs,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Remove images, charts and repositories, then the catalog entry.
    Uninstall(Target),
    /// Activate repositories and mark the version active.
    Activate(ActivateTarget),
    RemoveImages(Target),
    RemoveCharts(Target),
    RemoveRepos(Target),
    RemoveEntry(Target),
    ActivateRepos(ActivateTarget),
    ActivateEntry(Target),
}

impl Action {
    fn target(&self) -> &Target {
        match self {
            Action::Uninstall(target)
            | Action::RemoveImages(target)
            | Action::RemoveCharts(target)
            | Action::RemoveRepos(target)
            | Action::RemoveEntry(target)
            | Action::ActivateEntry(target) => target,
            Action::Activate(activate) | Action::ActivateRepos(activate) => &activate.target,
        }
    }

    /// Whether the action may run the catalog mutation programs.
    fn writes_catalog(&self) -> bool {
        !matches!(
            self,
            Action::RemoveImages(_) | Action::RemoveRepos(_) | Action::ActivateRepos(_)
        )
    }
}

#[derive(Args, Debug)]
struct Target {
    /// Product name, e.g. `sat`.
    product: String,
    /// Product version, e.g. `2.0.1`.
    version: String,
}

#[derive(Args, Debug)]
struct ActivateTarget {
    #[command(flatten)]
    target: Target,

    /// Activate `<product>-<dist>` with `<product>-<version>-<dist>` instead of
    /// the group repositories the catalog declares. Repeatable.
    #[arg(long = "dist")]
    dists: Vec<String>,
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
    let gateway = if cli.action.writes_catalog() {
        cli.remote.gateway_config(&cli.catalog)?
    } else {
        let mut config = GatewayConfig::new(
            &cli.catalog.product_catalog_name,
            &cli.catalog.product_catalog_namespace,
        );
        config.validate_schema = !cli.catalog.no_validate_schema;
        config
    };
    let mutator = ProcessMutator::new(gateway);

    let credentials = Credentials::from_secret(
        reader.as_ref(),
        &cli.remote.nexus_credentials_secret_name,
        &cli.remote.nexus_credentials_secret_namespace,
    );
    let nexus = NexusClient::new(&cli.remote.nexus_url, credentials.clone());
    let docker = DockerRegistryClient::new(&cli.remote.docker_url, credentials);

    let store = CatalogStore::new(cli.catalog.location(), reader.as_ref(), &mutator);
    let manager = ProductManager::load(
        store,
        validator.as_ref(),
        Remotes {
            repositories: &nexus,
            images: &docker,
            charts: &nexus,
            charts_repository: cli.remote.charts_repository.clone(),
        },
    )?;

    let Target { product, version } = cli.action.target();
    match &cli.action {
        Action::Uninstall(_) => {
            manager.uninstall(product, version)?;
        }
        Action::Activate(activate) => {
            manager.activate(product, version, &activate.dists)?;
        }
        Action::RemoveImages(_) => {
            manager.remove_images(product, version)?;
        }
        Action::RemoveCharts(_) => {
            manager.remove_charts(product, version)?;
        }
        Action::RemoveRepos(_) => {
            manager.uninstall_repositories(product, version)?;
        }
        Action::RemoveEntry(_) => manager.remove_entry(product, version)?,
        Action::ActivateRepos(activate) => {
            manager.activate_repositories(product, version, &activate.dists)?;
        }
        Action::ActivateEntry(_) => manager.activate_entry(product, version)?,
    }
    Ok(())
}
