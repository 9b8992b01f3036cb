use std::fmt;
use std::path::PathBuf;

use sysinfo::System;

use super::spec::LaunchSpec;
use crate::error::LaunchError;

/// Host conditions worth reporting that the runtime or the client will judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostWarning {
    ConfigFileMissing(PathBuf),
    ShmExceedsMemory { requested: i64, total: u64 },
}

impl fmt::Display for HostWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostWarning::ConfigFileMissing(path) => {
                write!(f, "Client config not found on host: {}", path.display())
            }
            HostWarning::ShmExceedsMemory { requested, total } => write!(
                f,
                "Requested shared memory ({}) exceeds host memory ({})",
                human_size(*requested as u64),
                human_size(*total)
            ),
        }
    }
}

/// Binary-unit size with at most one decimal, e.g. `512 MiB`, `1.5 GiB`.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let number = format!("{:.1}", value);
    let number = number.strip_suffix(".0").unwrap_or(&number);
    format!("{} {}", number, UNITS[unit])
}

impl LaunchSpec {
    /// Check the host side of the launch. Missing mount sources are fatal;
    /// everything else is returned as a warning.
    pub fn validate_host(&self, total_memory: Option<u64>) -> Result<Vec<HostWarning>, LaunchError> {
        for mount in &self.mounts {
            if !mount.host.is_dir() {
                return Err(LaunchError::MountSourceMissing(mount.host.clone()));
            }
        }

        let mut warnings = Vec::new();

        if let Some(host_config) = self
            .config_file
            .as_deref()
            .and_then(|path| self.host_path_for(path))
        {
            if !host_config.is_file() {
                warnings.push(HostWarning::ConfigFileMissing(host_config));
            }
        }

        if let Some(total) = total_memory {
            if total > 0 && self.shm_size_bytes as u64 > total {
                warnings.push(HostWarning::ShmExceedsMemory {
                    requested: self.shm_size_bytes,
                    total,
                });
            }
        }

        Ok(warnings)
    }
}

/// Total physical memory in bytes, if the platform reports it.
pub fn total_memory() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => None,
        total => Some(total),
    }
}
