//! Repository reconciler: drives group repositories to the member list a
//! version declares, and removes a version's hosted repositories.
//!
//! Hosted repositories are created by the installer; this module only moves
//! them from inactive to active (sole or declared group member) and from
//! present to absent.

use crate::catalog::{ProductCatalog, ProductKey, ProductVersionRecord};
use crate::error::{CatalogError, FailureLog, OperationKind};
use crate::remote::{GroupUpdate, RepositoryApi, RepositoryEntry};

/// A group repository whose members were replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupActivation {
    pub group: String,
    pub members: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ActivationReport {
    pub target: ProductKey,
    pub updated: Vec<GroupActivation>,
}

#[derive(Clone, Debug)]
pub struct UninstallReport {
    pub target: ProductKey,
    pub removed: Vec<String>,
    pub already_absent: Vec<String>,
}

/// Find exactly one repository named `name`.
pub fn resolve_repository(
    api: &dyn RepositoryApi,
    name: &str,
) -> Result<RepositoryEntry, CatalogError> {
    let pattern = format!("^{}$", regex::escape(name));
    let mut matches = api
        .list_repositories(&pattern)
        .map_err(|source| CatalogError::ExternalOperationFailed {
            action: format!("looking up repository {name}"),
            source,
        })?;
    matches.retain(|entry| entry.name == name);
    match matches.len() {
        0 => Err(CatalogError::RepositoryNotFound {
            name: name.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(CatalogError::RepositoryAmbiguous {
            name: name.to_string(),
        }),
    }
}

/// Replace each declared group repository's members with the list this
/// version records for it.
pub fn activate_repositories(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    api: &dyn RepositoryApi,
) -> Result<ActivationReport, CatalogError> {
    let record = catalog.get_product(name, version)?;
    let mut report = ActivationReport {
        target: record.key().clone(),
        updated: Vec::new(),
    };
    let mut failures = FailureLog::new(OperationKind::ActivateRepositories, record.key());

    for group in record.group_repositories() {
        let entry = match resolve_repository(api, &group.name) {
            Ok(entry) => entry,
            Err(err) => {
                failures.record(format!("group repository {}", group.name), err);
                continue;
            }
        };
        if let Some(activation) = replace_members(api, &entry, group.members.clone(), &mut failures) {
            report.updated.push(activation);
        }
    }
    failures.finish(report)
}

/// Legacy activation by distribution name: make `<product>-<version>-<dist>`
/// the sole member of `<product>-<dist>` for each `dist`.
pub fn activate_distributions(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    dists: &[String],
    api: &dyn RepositoryApi,
) -> Result<ActivationReport, CatalogError> {
    let record = catalog.get_product(name, version)?;
    let mut report = ActivationReport {
        target: record.key().clone(),
        updated: Vec::new(),
    };
    let mut failures = FailureLog::new(OperationKind::ActivateRepositories, record.key());

    for dist in dists {
        let Some(group) = distribution_group(record, dist, api, &mut failures) else {
            continue;
        };
        let hosted = record.hosted_repo_name(dist);
        if let Some(activation) = replace_members(api, &group, vec![hosted], &mut failures) {
            report.updated.push(activation);
        }
    }
    failures.finish(report)
}

fn distribution_group(
    record: &ProductVersionRecord,
    dist: &str,
    api: &dyn RepositoryApi,
    failures: &mut FailureLog,
) -> Option<RepositoryEntry> {
    let hosted = record.hosted_repo_name(dist);
    if let Err(err) = resolve_repository(api, &hosted) {
        failures.record(
            format!("hosted repository {hosted}"),
            format!("Unable to identify hosted repository for {}: {err}", record.key()),
        );
        return None;
    }
    let group = record.group_repo_name(dist);
    match resolve_repository(api, &group) {
        Ok(entry) => Some(entry),
        Err(err) => {
            failures.record(
                format!("group repository {group}"),
                format!("Unable to identify group repository for {}: {err}", record.key()),
            );
            None
        }
    }
}

fn replace_members(
    api: &dyn RepositoryApi,
    entry: &RepositoryEntry,
    members: Vec<String>,
    failures: &mut FailureLog,
) -> Option<GroupActivation> {
    let update = GroupUpdate::replacing_members(entry, members);
    let listed = update.member_names.join(", ");
    match api.update_group_members(&update) {
        Ok(()) => {
            tracing::info!(
                "Updated group repository {} with member repositories: [{listed}]",
                update.name
            );
            Some(GroupActivation {
                group: update.name,
                members: update.member_names,
            })
        }
        Err(err) => {
            failures.record(
                format!("group repository {} with member repositories: [{listed}]", update.name),
                err,
            );
            None
        }
    }
}

/// Delete every hosted repository belonging to the version.
pub fn uninstall_repositories(
    catalog: &ProductCatalog,
    name: &str,
    version: &str,
    api: &dyn RepositoryApi,
) -> Result<UninstallReport, CatalogError> {
    let record = catalog.get_product(name, version)?;
    let mut report = UninstallReport {
        target: record.key().clone(),
        removed: Vec::new(),
        already_absent: Vec::new(),
    };
    let mut failures = FailureLog::new(OperationKind::UninstallRepositories, record.key());

    for hosted in record.hosted_repository_names() {
        match api.delete_repository(&hosted) {
            Ok(()) => {
                tracing::info!("Repository {hosted} has been removed.");
                report.removed.push(hosted);
            }
            Err(err) if err.is_not_found() => {
                tracing::info!("{hosted} has already been removed.");
                report.already_absent.push(hosted);
            }
            Err(err) => failures.record(format!("repository {hosted}"), err),
        }
    }
    failures.finish(report)
}
