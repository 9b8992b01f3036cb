use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerWaitResponse, EndpointSettings, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::config::ContainerConfig;
use crate::error::LaunchError;

/// Exit status reported when the launch was interrupted before the container started.
pub const EXIT_INTERRUPTED: i64 = 130;

/// Docker client wrapper for launcher operations
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the local Docker daemon and make sure it answers.
    pub async fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| LaunchError::RuntimeUnavailable(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| LaunchError::RuntimeUnavailable(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Fail unless the named network already exists. Networks are never created here.
    pub async fn ensure_network(&self, name: &str) -> Result<()> {
        match self.docker.inspect_network::<String>(name, None).await {
            Ok(_) => Ok(()),
            Err(e) => Err(LaunchError::NetworkMissing {
                name: name.to_string(),
                message: daemon_message(&e),
            }
            .into()),
        }
    }

    /// Make sure the image is in the local store, pulling it if needed.
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {}
            Err(e) => {
                return Err(LaunchError::ImageUnavailable {
                    image: image.to_string(),
                    message: daemon_message(&e),
                }
                .into())
            }
        }

        tracing::info!("Image {} not found locally, pulling", image);
        self.pull_image(image).await.map_err(|e| {
            LaunchError::ImageUnavailable {
                image: image.to_string(),
                message: e,
            }
            .into()
        })
    }

    async fn pull_image(&self, image: &str) -> std::result::Result<(), String> {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Pulling {}...", image));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        pb.finish_and_clear();
                        return Err(error);
                    }
                    if let Some(status) = info.status {
                        tracing::debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(daemon_message(&e));
                }
            }
        }

        pb.finish_and_clear();
        Ok(())
    }

    /// Run a container in the foreground and return its exit status.
    ///
    /// Ctrl-C is forwarded to the container as SIGINT while it runs. With
    /// `remove_on_exit` the container is force-removed afterwards on every
    /// path, including failed starts and interrupts.
    pub async fn run_container_attached(&self, config: &ContainerConfig) -> Result<i64> {
        let mut interrupts = listen_for_interrupts();

        let container_id = self.create_container(config).await?;
        tracing::debug!("Created container {}", short_id(&container_id));

        let outcome = if interrupts.try_recv().is_ok() {
            tracing::warn!("Interrupted before the container started");
            Ok(EXIT_INTERRUPTED)
        } else {
            self.drive_attached(&container_id, &mut interrupts).await
        };

        if config.remove_on_exit {
            self.remove_container(&container_id, true)
                .await
                .unwrap_or_else(|e| tracing::warn!("Failed to remove container: {}", e));
        }

        outcome
    }

    async fn drive_attached(
        &self,
        container_id: &str,
        interrupts: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<i64> {
        // Signals sent before the container runs are rejected by the daemon,
        // so interrupts arriving during start stay queued until it succeeds.
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| LaunchError::RuntimeRejected(daemon_message(&e)))?;

        relay_interrupts(self.follow_until_exit(container_id), interrupts, || {
            self.kill_container(container_id, "SIGINT")
        })
        .await
    }

    async fn follow_until_exit(&self, container_id: &str) -> Result<i64> {
        // Stream logs
        let log_options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut log_stream = self.docker.logs(container_id, Some(log_options));
        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();

        while let Some(result) = log_stream.next().await {
            match result {
                Ok(LogOutput::StdErr { message }) => {
                    stderr.write_all(&message).await?;
                    stderr.flush().await?;
                }
                Ok(output) => {
                    stdout.write_all(&output.into_bytes()).await?;
                    stdout.flush().await?;
                }
                Err(e) => {
                    tracing::warn!("Log stream error: {}", e);
                    break;
                }
            }
        }

        // Wait for container to finish
        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        exit_status(wait_stream.next().await)
            .with_context(|| format!("Failed to wait for container {}", short_id(container_id)))
    }

    /// Create a container (helper method)
    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        let mut host_config = HostConfig {
            binds: Some(config.binds()),
            shm_size: config.shm_size,
            network_mode: config.network.clone(),
            ..Default::default()
        };

        if let Some(gpu) = &config.gpu {
            host_config.device_requests = Some(vec![gpu.device_request()]);
        }

        let networking_config = config.network.as_ref().map(|network| NetworkingConfig {
            endpoints_config: HashMap::from([(
                network.clone(),
                EndpointSettings {
                    aliases: Some(config.network_aliases.clone()),
                    ..Default::default()
                },
            )]),
        });

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.command.clone(),
            user: config.user.clone(),
            tty: Some(config.tty),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, container_config)
            .await
            .map_err(|e| LaunchError::RuntimeRejected(daemon_message(&e)))?;

        for warning in &response.warnings {
            tracing::warn!("Docker: {}", warning);
        }

        Ok(response.id)
    }

    /// Send a signal to a running container
    pub async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()> {
        self.docker
            .kill_container(container_id, Some(KillContainerOptions { signal }))
            .await?;
        Ok(())
    }

    /// Remove a container
    pub async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => {
                tracing::debug!("Removed container {}", short_id(container_id));
                Ok(())
            }
            // Already gone
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Drive `run` to completion, calling `forward` once per interrupt received
/// meanwhile. Interrupts already queued when this starts are forwarded too.
async fn relay_interrupts<F, K, KF>(
    run: F,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    mut forward: K,
) -> Result<i64>
where
    F: Future<Output = Result<i64>>,
    K: FnMut() -> KF,
    KF: Future<Output = Result<()>>,
{
    tokio::pin!(run);

    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            Some(()) = interrupts.recv() => {
                tracing::info!("Interrupt received, forwarding SIGINT to container");
                if let Err(e) = forward().await {
                    tracing::warn!("Failed to signal container: {}", e);
                }
            }
        }
    }
}

/// Exit status from the first item of a wait stream.
fn exit_status(
    item: Option<std::result::Result<ContainerWaitResponse, BollardError>>,
) -> Result<i64> {
    match item {
        Some(Ok(response)) => Ok(response.status_code),
        // Non-zero exits arrive as errors from the wait endpoint
        Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(e)) => Err(e.into()),
        None => anyhow::bail!("Wait stream ended without a status"),
    }
}

/// Forward every Ctrl-C to a channel so the launcher, not the default
/// handler, decides what happens to the container.
fn listen_for_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// The daemon's own message, without bollard's wrapping.
fn daemon_message(err: &BollardError) -> String {
    match err {
        BollardError::DockerResponseServerError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[test]
    fn daemon_message_strips_wrapping() {
        let err = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "network federated not found".to_string(),
        };
        assert_eq!(daemon_message(&err), "network federated not found");
    }

    #[test]
    fn wait_error_code_is_the_exit_status() {
        let failed = BollardError::DockerContainerWaitError {
            error: String::new(),
            code: 3,
        };
        assert_eq!(exit_status(Some(Err(failed))).unwrap(), 3);

        let clean = ContainerWaitResponse {
            status_code: 0,
            ..Default::default()
        };
        assert_eq!(exit_status(Some(Ok(clean))).unwrap(), 0);
    }

    #[test]
    fn wait_without_status_is_an_error() {
        assert!(exit_status(None).is_err());

        let gone = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        };
        assert!(exit_status(Some(Err(gone))).is_err());
    }

    #[tokio::test]
    async fn interrupt_queued_during_start_is_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(()).unwrap();

        let stopped = Arc::new(Notify::new());
        let forwarded = Arc::new(AtomicUsize::new(0));

        let run = {
            let stopped = stopped.clone();
            async move {
                stopped.notified().await;
                Ok(EXIT_INTERRUPTED)
            }
        };
        let status = relay_interrupts(run, &mut rx, || {
            let stopped = stopped.clone();
            let forwarded = forwarded.clone();
            async move {
                forwarded.fetch_add(1, Ordering::SeqCst);
                stopped.notify_one();
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(status, EXIT_INTERRUPTED);
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quiet_run_forwards_nothing() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<()>();
        let forwarded = AtomicUsize::new(0);

        let status = relay_interrupts(async { Ok(0) }, &mut rx, || {
            forwarded.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(status, 0);
        assert_eq!(forwarded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
