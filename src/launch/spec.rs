use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::profile::LaunchProfile;
use crate::docker::config::{parse_size, ContainerConfig};
use crate::docker::gpu::GpuSelector;
use crate::error::LaunchError;

pub const UID_VAR: &str = "uid";
pub const GID_VAR: &str = "gid";

/// Numeric user and group the container process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSpec {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// A bind mount with its host side made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub host: PathBuf,
    pub container: String,
    pub readonly: bool,
}

/// A profile bound to one environment and working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub container_name: String,
    pub image: String,
    pub gpu: Option<GpuSelector>,
    pub network: String,
    pub network_alias: String,
    pub user: UserSpec,
    /// As written in the profile, for rendering
    pub shm_size: String,
    pub shm_size_bytes: i64,
    pub mounts: Vec<ResolvedMount>,
    pub command: Vec<String>,
    pub config_file: Option<String>,
    pub tty: bool,
}

impl LaunchSpec {
    /// Bind `profile` to the ids found through `lookup` and to `cwd`.
    /// Touches neither the filesystem nor the runtime.
    pub fn resolve<F>(profile: &LaunchProfile, lookup: F, cwd: &Path) -> Result<Self, LaunchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = UserSpec {
            uid: numeric_id(UID_VAR, lookup(UID_VAR))?,
            gid: numeric_id(GID_VAR, lookup(GID_VAR))?,
        };

        let mounts = profile
            .mounts
            .iter()
            .map(|m| ResolvedMount {
                host: cwd.join(&m.host_path),
                container: m.container_path.clone(),
                readonly: m.readonly.unwrap_or(false),
            })
            .collect();

        Ok(LaunchSpec {
            container_name: profile.container_name.clone(),
            image: profile.image.clone(),
            gpu: profile.gpu.clone(),
            network: profile.network.clone(),
            network_alias: profile.network_alias.clone(),
            user,
            shm_size: profile.shm_size.clone(),
            shm_size_bytes: parse_size(&profile.shm_size)?,
            mounts,
            command: profile.command.clone(),
            config_file: profile.config_file.clone(),
            tty: profile.tty,
        })
    }

    /// Resolve against the real process environment and working directory.
    pub fn from_process(profile: &LaunchProfile) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self::resolve(profile, |name| std::env::var(name).ok(), &cwd)?)
    }

    /// Host location of a path inside the container, through the mount
    /// with the longest matching container prefix.
    pub fn host_path_for(&self, container_path: &str) -> Option<PathBuf> {
        self.mounts
            .iter()
            .filter_map(|m| {
                let rest = container_path.strip_prefix(m.container.trim_end_matches('/'))?;
                if rest.is_empty() {
                    Some((m.container.len(), m.host.clone()))
                } else {
                    let rest = rest.strip_prefix('/')?;
                    Some((m.container.len(), m.host.join(rest)))
                }
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, host)| host)
    }

    /// The equivalent `docker run` argument vector (without the `docker` program).
    pub fn docker_run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if self.tty {
            args.push("-t".to_string());
        }
        args.push("--name".to_string());
        args.push(self.container_name.clone());
        if let Some(gpu) = &self.gpu {
            args.push("--gpus".to_string());
            args.push(gpu.cli_value());
        }
        for bind in self.container_config().binds() {
            args.push("-v".to_string());
            args.push(bind);
        }
        args.extend([
            "--network".to_string(),
            self.network.clone(),
            "--network-alias".to_string(),
            self.network_alias.clone(),
            "--user".to_string(),
            self.user.to_string(),
            "--shm-size".to_string(),
            self.shm_size.clone(),
            self.image.clone(),
        ]);
        args.extend(self.command.iter().cloned());
        args
    }

    /// Printable `docker run ...` line.
    pub fn docker_run_line(&self) -> String {
        let mut line = String::from("docker");
        for arg in self.docker_run_args() {
            line.push(' ');
            line.push_str(&quote_arg(&arg));
        }
        line
    }

    /// Request handed to the Docker client.
    pub fn container_config(&self) -> ContainerConfig {
        ContainerConfig {
            image: self.image.clone(),
            command: if self.command.is_empty() {
                None
            } else {
                Some(self.command.clone())
            },
            mounts: self
                .mounts
                .iter()
                .map(|m| (m.host.to_string_lossy().to_string(), m.container.clone(), m.readonly))
                .collect(),
            gpu: self.gpu.clone(),
            name: Some(self.container_name.clone()),
            user: Some(self.user.to_string()),
            network: Some(self.network.clone()),
            network_aliases: vec![self.network_alias.clone()],
            shm_size: Some(self.shm_size_bytes),
            remove_on_exit: true,
            tty: self.tty,
        }
    }
}

fn numeric_id(name: &'static str, value: Option<String>) -> Result<u32, LaunchError> {
    let value = value.unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LaunchError::MissingEnv(name));
    }
    trimmed.parse().map_err(|_| LaunchError::InvalidEnv {
        name,
        value: value.clone(),
    })
}

/// Single-quote an argument for display if the shell would split or expand it.
fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
