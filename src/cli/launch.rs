use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::config::profile::LaunchProfile;
use crate::docker::client::DockerClient;
use crate::launch::host;
use crate::launch::spec::LaunchSpec;

/// Launch the client container in the foreground and return its exit status.
pub async fn run(profile_path: Option<&Path>, dry_run: bool) -> Result<i32> {
    let profile = LaunchProfile::load_or_default(profile_path)?;

    // Environment and host checks come first so they fail without touching Docker
    let spec = LaunchSpec::from_process(&profile)?;
    for warning in spec.validate_host(host::total_memory())? {
        tracing::warn!("{}", warning);
    }

    if dry_run {
        println!("{}", spec.docker_run_line());
        return Ok(0);
    }

    tracing::debug!("Equivalent command: {}", spec.docker_run_line());

    let client = DockerClient::new().await?;
    client.ensure_network(&spec.network).await?;
    client
        .ensure_image(&spec.image)
        .await
        .with_context(|| format!("Failed to prepare image for {}", spec.container_name))?;

    eprintln!(
        "{} Launching {} on network {} as {}",
        "=>".blue().bold(),
        spec.container_name.cyan(),
        spec.network,
        spec.network_alias.cyan()
    );
    if let Some(gpu) = &spec.gpu {
        eprintln!("  {} GPU: {}", "•".yellow(), gpu.cli_value());
    }
    for mount in &spec.mounts {
        let mode = if mount.readonly { " (read-only)" } else { "" };
        eprintln!(
            "  {} Mount: {} -> {}{}",
            "•".yellow(),
            mount.host.display(),
            mount.container,
            mode
        );
    }

    let exit_code = client.run_container_attached(&spec.container_config()).await?;

    if exit_code == 0 {
        eprintln!("{} Container exited successfully", "✓".green().bold());
    } else {
        eprintln!(
            "{} Container exited with code {}",
            "✗".red().bold(),
            exit_code
        );
    }

    Ok(status_to_exit_code(exit_code))
}

/// Map a container status onto a process exit code. Statuses outside 0-255
/// become 255 so a failure never reads as success.
fn status_to_exit_code(status: i64) -> i32 {
    match u8::try_from(status) {
        Ok(code) => i32::from(code),
        Err(_) => 255,
    }
}
