use crate::docker::gpu::GpuSelector;
use crate::error::LaunchError;

/// Everything the daemon needs to create one attached container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub command: Option<Vec<String>>,
    pub mounts: Vec<(String, String, bool)>, // (host, container, readonly)
    pub gpu: Option<GpuSelector>,
    pub name: Option<String>,
    /// `uid:gid`
    pub user: Option<String>,
    pub network: Option<String>,
    pub network_aliases: Vec<String>,
    pub shm_size: Option<i64>,
    pub remove_on_exit: bool,
    pub tty: bool,
}

impl ContainerConfig {
    /// Bind strings in the `host:container[:ro]` form the Engine API takes.
    pub fn binds(&self) -> Vec<String> {
        self.mounts
            .iter()
            .map(|(host, container, ro)| {
                if *ro {
                    format!("{}:{}:ro", host, container)
                } else {
                    format!("{}:{}", host, container)
                }
            })
            .collect()
    }
}

/// Parse a docker-style size (`50G`, `512m`, `1.5g`, `1024`) into bytes.
/// Units are binary and case-insensitive; a trailing `b` is accepted.
pub fn parse_size(input: &str) -> Result<i64, LaunchError> {
    let invalid = || LaunchError::InvalidSize(input.to_string());

    let lower = input.trim().to_ascii_lowercase();
    let digits_end = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(digits_end);

    let multiplier: i64 = match unit.strip_suffix('b').unwrap_or(unit) {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        "t" => 1 << 40,
        _ => return Err(invalid()),
    };

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes <= 0.0 || bytes > i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as i64)
}
