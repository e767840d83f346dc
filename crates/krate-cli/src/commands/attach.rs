//! `krate --attach`: run a command inside an identity's zone.

use anyhow::Context;
use krate_common::config::KrateConfig;
use krate_common::error::KrateError;
use krate_common::types::{NamespaceKind, NamespaceSet};
use krate_core::identity::{IdentityResolver, SystemIdentities};
use krate_core::kernel::SystemKernel;
use krate_core::manifest;
use krate_core::namespace::attach_to;
use krate_core::process::run_as_identity;
use krate_session::Registry;

/// Namespaces joined by the operator: the manifest set plus the pid
/// namespace, so the command sees the zone's process tree.
fn operator_namespaces(manifest: &manifest::Manifest) -> NamespaceSet {
    let mut set = manifest.namespaces.clone();
    let _ = set.insert(NamespaceKind::Pid);
    set
}

/// Executes the `--attach` action.
///
/// Looks up the zone leader of `identity`, joins its namespaces, and runs
/// `command` as the identity. The process exits with the command's exit
/// status.
///
/// # Errors
///
/// Returns an error if the identity has no open session, or if joining the
/// zone or launching the command fails.
pub fn execute(config: &KrateConfig, identity: &str, command: &[String]) -> anyhow::Result<()> {
    let identity = SystemIdentities
        .resolve(identity)
        .with_context(|| format!("resolving identity {identity}"))?;

    let registry = Registry::new(&config.registry_dir);
    let leader = registry
        .leader(&identity.name)?
        .ok_or_else(|| KrateError::NotFound {
            kind: "session",
            id: identity.name.clone(),
        })?;

    let manifest = manifest::load(&config.manifest_dir, &identity.name)?;
    let namespaces = operator_namespaces(&manifest);
    tracing::info!(identity = %identity, %leader, "attaching to zone");

    attach_to(&SystemKernel, leader, &namespaces)
        .with_context(|| format!("joining zone of {} (leader {leader})", identity.name))?;

    let status = run_as_identity(&identity, command, &config.default_shell)?;
    std::process::exit(status);
}
