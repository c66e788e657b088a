//! Command handlers -- one module per subcommand
//!
//! Shared helpers open a [`Project`] against the local Docker daemon and
//! order the selected services so that relationship targets come first.

pub mod config;
pub mod lifecycle;
pub mod logs;
pub mod ps;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use stevedore_compose::resolver::detect_cycle;
use stevedore_compose::{BollardRuntimeClient, ComposeConfig, CredentialStore, Project, RuntimeClient};
use stevedore_core::config::{ServiceConfig, StevedoreConfig};

use crate::error::CliError;

/// Load the configuration and connect a project to the Docker daemon.
///
/// `adjust` may tweak the derived [`ComposeConfig`] before the project is built
/// (e.g. `logs --tail`).
pub(crate) async fn open_project(
    config_path: &Path,
    adjust: impl FnOnce(&mut ComposeConfig),
) -> Result<Project<BollardRuntimeClient>, CliError> {
    let config = StevedoreConfig::load(config_path).await?;

    let mut compose = ComposeConfig::from_core(&config);
    adjust(&mut compose);

    let client = BollardRuntimeClient::from_config(&compose)?;
    client.ping().await?;
    debug!(socket = %compose.docker_socket, "docker daemon reachable");

    let credentials = load_credentials(&config.project.credentials_file).await?;

    let project = Project::builder(Arc::new(client))
        .config(compose)
        .credentials(credentials)
        .services(config.services)
        .build()?;

    info!(project = project.name(), "project loaded");
    Ok(project)
}

/// An empty path falls back to `~/.docker/config.json`; a missing default file is not an error.
async fn load_credentials(path: &str) -> Result<CredentialStore, CliError> {
    let path = if path.is_empty() {
        match CredentialStore::default_path() {
            Some(p) => p,
            None => return Ok(CredentialStore::default()),
        }
    } else {
        PathBuf::from(path)
    };
    Ok(CredentialStore::load(&path).await?)
}

/// Order the requested services (all declared services when empty) so that
/// every service comes after the relationship targets that are also selected.
///
/// # Errors
///
/// * `CliError::Command` for an undeclared service name
/// * `CliError::Dependency` when the relationship graph has a cycle
pub(crate) fn start_order(
    services: &BTreeMap<String, ServiceConfig>,
    requested: &[String],
) -> Result<Vec<String>, CliError> {
    if let Some(unknown) = requested.iter().find(|name| !services.contains_key(*name)) {
        return Err(CliError::Command(format!("unknown service: {unknown}")));
    }

    let selected: BTreeSet<&str> = if requested.is_empty() {
        services.keys().map(String::as_str).collect()
    } else {
        requested.iter().map(String::as_str).collect()
    };

    for name in &selected {
        detect_cycle(services, name)?;
    }

    let mut order = Vec::with_capacity(selected.len());
    let mut visited = BTreeSet::new();
    for name in &selected {
        push_after_targets(services, name, &selected, &mut visited, &mut order);
    }
    Ok(order)
}

fn push_after_targets(
    services: &BTreeMap<String, ServiceConfig>,
    name: &str,
    selected: &BTreeSet<&str>,
    visited: &mut BTreeSet<String>,
    order: &mut Vec<String>,
) {
    if !visited.insert(name.to_owned()) {
        return;
    }
    if let Some(config) = services.get(name) {
        for rel in config.relationships() {
            push_after_targets(services, &rel.target, selected, visited, order);
        }
    }
    if selected.contains(name) {
        order.push(name.to_owned());
    }
}

/// Names of the selected services without dependency ordering.
pub(crate) fn selection<C: RuntimeClient>(
    project: &Project<C>,
    requested: &[String],
) -> Result<Vec<String>, CliError> {
    if let Some(unknown) = requested.iter().find(|name| !project.is_declared(name)) {
        return Err(CliError::Command(format!("unknown service: {unknown}")));
    }
    if requested.is_empty() {
        Ok(project.service_names().map(str::to_owned).collect())
    } else {
        Ok(requested.to_vec())
    }
}
