//! Cross-reference engine: removes a product version's Docker images and helm
//! charts unless another installed version still declares them.
//!
//! Sharing is decided on exact `(name, version)` equality against every other
//! record in the loaded catalog. Shared artifacts are left alone with a notice
//! naming the versions that still need them; everything else is deleted
//! best-effort and failures are aggregated once the loop finishes.

use crate::catalog::{
    Artifact, ArtifactClass, CatalogStore, ProductCatalog, ProductKey, ProductVersionRecord,
};
use crate::error::{CatalogError, FailureLog, OperationKind};
use crate::remote::{ChartComponent, ChartRegistry, ImageRegistry};
use std::fmt;

/// One declared artifact of the target, with the other versions that still
/// declare it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedArtifact {
    pub class: ArtifactClass,
    pub artifact: Artifact,
    pub owners: Vec<ProductKey>,
}

impl PlannedArtifact {
    pub fn is_shared(&self) -> bool {
        !self.owners.is_empty()
    }
}

/// Notice text for an artifact kept because others still use it.
impl fmt::Display for PlannedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owners: Vec<String> = self.owners.iter().map(ToString::to_string).collect();
        write!(
            f,
            "Not removing {} {} used by the following other product versions: {}",
            self.class.label(),
            self.artifact,
            owners.join(", ")
        )
    }
}

#[derive(Clone, Debug)]
pub struct RemovalPlan {
    pub target: ProductKey,
    pub class: ArtifactClass,
    /// Declaration order of the target record.
    pub artifacts: Vec<PlannedArtifact>,
}

impl RemovalPlan {
    pub fn exclusive(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|planned| !planned.is_shared())
            .map(|planned| &planned.artifact)
    }

    pub fn shared(&self) -> impl Iterator<Item = &PlannedArtifact> {
        self.artifacts.iter().filter(|planned| planned.is_shared())
    }
}

/// Outcome of one removal run.
#[derive(Clone, Debug)]
pub struct RemovalReport {
    pub target: ProductKey,
    pub class: ArtifactClass,
    pub removed: Vec<Artifact>,
    pub already_absent: Vec<Artifact>,
    pub shared: Vec<PlannedArtifact>,
    pub unresolved: Vec<Artifact>,
    pub catalog_updated: bool,
}

impl RemovalReport {
    fn new(target: &ProductKey, class: ArtifactClass) -> Self {
        Self {
            target: target.clone(),
            class,
            removed: Vec::new(),
            already_absent: Vec::new(),
            shared: Vec::new(),
            unresolved: Vec::new(),
            catalog_updated: false,
        }
    }
}

fn declared(record: &ProductVersionRecord, class: ArtifactClass) -> &[Artifact] {
    match class {
        ArtifactClass::Image => record.docker_images(),
        ArtifactClass::Chart => record.helm_charts(),
    }
}

/// Split the target's artifacts of `class` into exclusive and shared ones.
pub fn plan_removal(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    class: ArtifactClass,
) -> Result<RemovalPlan, CatalogError> {
    let target = catalog.get_product(name, version)?;
    let artifacts = declared(target, class)
        .iter()
        .map(|artifact| PlannedArtifact {
            class,
            artifact: artifact.clone(),
            owners: catalog
                .others(target.key())
                .filter(|other| declared(other, class).contains(artifact))
                .map(|other| other.key().clone())
                .collect(),
        })
        .collect();
    Ok(RemovalPlan {
        target: target.key().clone(),
        class,
        artifacts,
    })
}

/// Delete the target's exclusive Docker images.
pub fn remove_images(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    registry: &dyn ImageRegistry,
) -> Result<RemovalReport, CatalogError> {
    let plan = plan_removal(catalog, name, version, ArtifactClass::Image)?;
    let mut report = RemovalReport::new(&plan.target, plan.class);
    let mut failures = FailureLog::new(OperationKind::RemoveImages, &plan.target);

    for planned in plan.artifacts {
        if planned.is_shared() {
            tracing::info!("{planned}");
            report.shared.push(planned);
            continue;
        }
        let image = planned.artifact;
        match registry.delete_image(&image.name, image.version_str()) {
            Ok(()) => {
                tracing::info!("Removed Docker image {image}");
                report.removed.push(image);
            }
            Err(err) if err.is_not_found() => {
                tracing::info!("{image} has already been removed.");
                report.already_absent.push(image);
            }
            Err(err) => failures.record(image.to_string(), err),
        }
    }
    failures.finish(report)
}

/// Identifier of the registry component matching `chart` exactly.
pub fn resolve_component<'c>(components: &'c [ChartComponent], chart: &Artifact) -> Option<&'c str> {
    components
        .iter()
        .find(|component| {
            component.name == chart.name && Some(component.version.as_str()) == chart.version.as_deref()
        })
        .map(|component| component.id.as_str())
}

/// Delete the target's exclusive helm charts and drop the deleted ones from
/// its catalog entry.
///
/// `components` is the chart repository listing used to resolve component
/// identifiers. When nothing resolves, no registry call and no catalog write
/// happen.
pub fn remove_charts(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    registry: &dyn ChartRegistry,
    components: &[ChartComponent],
    store: &CatalogStore<'_>,
) -> Result<RemovalReport, CatalogError> {
    let plan = plan_removal(catalog, name, version, ArtifactClass::Chart)?;
    let mut report = RemovalReport::new(&plan.target, plan.class);

    let mut resolved = Vec::new();
    for planned in plan.artifacts {
        if planned.is_shared() {
            tracing::info!("{planned}");
            report.shared.push(planned);
            continue;
        }
        match resolve_component(components, &planned.artifact) {
            Some(id) => resolved.push((planned.artifact, id.to_string())),
            None => report.unresolved.push(planned.artifact),
        }
    }

    if resolved.is_empty() {
        tracing::info!("No charts to remove for {}.", plan.target);
        return Ok(report);
    }
    for chart in &report.unresolved {
        tracing::info!("No registry component found for helm chart {chart}; skipping.");
    }

    let mut failures = FailureLog::new(OperationKind::RemoveCharts, &plan.target);
    let mut deleted = Vec::new();
    for (chart, id) in resolved {
        match registry.delete_component(&id) {
            Ok(()) => {
                tracing::info!("Removed helm chart {chart} (component {id})");
                report.removed.push(chart.clone());
                deleted.push(chart);
            }
            Err(err) if err.is_not_found() => {
                tracing::info!("Helm chart {chart} has already been removed.");
                report.already_absent.push(chart.clone());
                deleted.push(chart);
            }
            Err(err) => failures.record(format!("{chart} (component {id})"), err),
        }
    }

    if !deleted.is_empty() {
        match store.strip_charts(&plan.target, &deleted) {
            Ok(()) => report.catalog_updated = true,
            Err(err) => failures.record(format!("product catalog entry for {}", plan.target), err),
        }
    }
    failures.finish(report)
}
