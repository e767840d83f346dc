//! `krate --list`: show identities with open sessions.

use krate_common::config::KrateConfig;
use krate_session::Registry;

use crate::output::format_pids;

/// Executes the `--list` action.
///
/// # Errors
///
/// Returns an error if the registry directory cannot be read.
pub fn execute(config: &KrateConfig) -> anyhow::Result<()> {
    let entries = Registry::new(&config.registry_dir).list()?;

    if entries.is_empty() {
        println!("No open sessions.");
        return Ok(());
    }

    println!("{:<24} {:<10} {:<8} PIDS", "IDENTITY", "LEADER", "SESSIONS");
    for entry in &entries {
        let leader = entry
            .pids
            .first()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "{:<24} {:<10} {:<8} {}",
            entry.identity,
            leader,
            entry.pids.len(),
            format_pids(&entry.pids, 8)
        );
    }

    Ok(())
}
