use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::docker::gpu::GpuSelector;

/// The fixed parameters of one client launch.
///
/// `LaunchProfile::default()` is the stock `client-1` launch. A YAML file
/// may override any field; omitted fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchProfile {
    /// Container name, unique among running containers
    pub container_name: String,

    /// Image reference
    pub image: String,

    /// GPU devices handed to the container (none if omitted)
    pub gpu: Option<GpuSelector>,

    /// Pre-existing network to join
    pub network: String,

    /// Alias other containers on the network use to reach this one
    pub network_alias: String,

    /// Shared memory size, docker syntax (e.g. 50G)
    pub shm_size: String,

    /// Bind mounts; relative host paths resolve against the working directory
    pub mounts: Vec<MountConfig>,

    /// Command run inside the container
    pub command: Vec<String>,

    /// Client config file, as seen inside the container. Only checked on the
    /// host side for a warning.
    pub config_file: Option<String>,

    /// Allocate a pseudo-terminal
    pub tty: bool,
}

/// Volume mount configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path (relative paths resolve against the working directory)
    pub host_path: String,

    /// Container path
    pub container_path: String,

    /// Mount as read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
}

impl MountConfig {
    fn rw(host_path: &str, container_path: &str) -> Self {
        MountConfig {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            readonly: None,
        }
    }
}

impl Default for LaunchProfile {
    fn default() -> Self {
        LaunchProfile {
            container_name: "hibiscus-client-1".to_string(),
            image: "hibiscus:app.v0.3.2".to_string(),
            gpu: Some(GpuSelector::device(1)),
            network: "federated".to_string(),
            network_alias: "client-1".to_string(),
            shm_size: "50G".to_string(),
            mounts: vec![
                MountConfig::rw("datasets", "/app/datasets"),
                MountConfig::rw("experiments", "/app/experiments"),
                MountConfig::rw("container/configs", "/app/configs"),
            ],
            command: vec![
                "client".to_string(),
                "launch-config".to_string(),
                "configs/client_1.yml".to_string(),
            ],
            config_file: Some("/app/configs/client_1.yml".to_string()),
            tty: true,
        }
    }
}

impl LaunchProfile {
    /// Load a profile from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;

        let profile: LaunchProfile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;

        Ok(profile)
    }

    /// The stock profile, or the one at `path` when given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
