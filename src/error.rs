use std::path::PathBuf;

use thiserror::Error;

/// Exit code used when the launcher fails before the runtime runs anything.
pub const EXIT_LAUNCHER_FAILURE: i32 = 1;

/// Exit code used when the runtime rejects the request (same as `docker run`).
pub const EXIT_RUNTIME_REJECTED: i32 = 125;

/// Failures the launcher reports itself. In-container failures are not
/// errors here: they surface as the container's exit status.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Environment variable '{0}' must be set to a numeric id")]
    MissingEnv(&'static str),

    #[error("Environment variable '{name}' is not a numeric id: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Mount source does not exist or is not a directory: {}", .0.display())]
    MountSourceMissing(PathBuf),

    #[error("Invalid size '{0}'. Expected a number with an optional b, k, m or g suffix")]
    InvalidSize(String),

    #[error("Failed to connect to Docker daemon. Is Docker running? ({0})")]
    RuntimeUnavailable(String),

    #[error("Network '{name}' not found: {message}")]
    NetworkMissing { name: String, message: String },

    #[error("Image '{image}' is not available locally and could not be pulled: {message}")]
    ImageUnavailable { image: String, message: String },

    #[error("Docker rejected the container request: {0}")]
    RuntimeRejected(String),
}

impl LaunchError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::NetworkMissing { .. }
            | LaunchError::ImageUnavailable { .. }
            | LaunchError::RuntimeRejected(_) => EXIT_RUNTIME_REJECTED,
            _ => EXIT_LAUNCHER_FAILURE,
        }
    }
}

/// Pick the exit code for any error bubbling out of a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<LaunchError>())
        .map(LaunchError::exit_code)
        .unwrap_or(EXIT_LAUNCHER_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn runtime_rejections_use_docker_run_code() {
        let err = LaunchError::NetworkMissing {
            name: "federated".to_string(),
            message: "no such network".to_string(),
        };
        assert_eq!(err.exit_code(), 125);
        assert_eq!(LaunchError::RuntimeRejected("x".into()).exit_code(), 125);
    }

    #[test]
    fn launcher_side_failures_exit_one() {
        assert_eq!(LaunchError::MissingEnv("uid").exit_code(), 1);
        assert_eq!(LaunchError::RuntimeUnavailable("refused".into()).exit_code(), 1);
    }

    #[test]
    fn exit_code_survives_context() {
        let err = Err::<(), _>(LaunchError::ImageUnavailable {
            image: "hibiscus:app.v0.3.2".to_string(),
            message: "not found".to_string(),
        })
        .context("Failed to prepare image")
        .unwrap_err();
        assert_eq!(exit_code_for(&err), 125);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&plain), 1);
    }
}
