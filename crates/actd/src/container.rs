//! Container Manager (component C4): acquire/configure/release a sandbox
//! container bound to the repo working tree and the run directory.
//!
//! Shells out to the `docker` CLI via `tokio::process::Command`, matching
//! the teacher's convention elsewhere of driving external tools (`git`,
//! `wt`, `claude`) through subprocess calls rather than linking a client
//! library — the workspace dependency table carries no Docker client crate.

use act_core::response::InfraErrorType;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("docker daemon unavailable: {0}")]
    DaemonUnavailable(String),
    #[error("image not pullable: {0}")]
    ImagePull(String),
    #[error("container create/start failed: {0}")]
    CreationFailed(String),
    #[error("host rejected resource reservation: {0}")]
    ResourceExhaustion(String),
    #[error("unclassified container error: {0}")]
    Unknown(String),
}

impl ContainerError {
    pub fn infra_error_type(&self) -> InfraErrorType {
        match self {
            Self::DaemonUnavailable(_) => InfraErrorType::DockerUnavailable,
            Self::ImagePull(_) => InfraErrorType::ImagePull,
            Self::CreationFailed(_) => InfraErrorType::ContainerCreation,
            Self::ResourceExhaustion(_) => InfraErrorType::ResourceExhaustion,
            Self::Unknown(_) => InfraErrorType::Unknown,
        }
    }

    /// Classify raw `docker` stderr text into the failure taxonomy the
    /// Verifier Facade maps to `INFRA_ERROR`.
    fn classify(stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        if lowered.contains("cannot connect to the docker daemon")
            || lowered.contains("is the docker daemon running")
        {
            Self::DaemonUnavailable(stderr.trim().to_string())
        } else if lowered.contains("pull access denied")
            || lowered.contains("manifest unknown")
            || lowered.contains("repository does not exist")
        {
            Self::ImagePull(stderr.trim().to_string())
        } else if lowered.contains("no space left")
            || lowered.contains("cannot allocate memory")
            || lowered.contains("resource temporarily unavailable")
        {
            Self::ResourceExhaustion(stderr.trim().to_string())
        } else if lowered.contains("error response from daemon") {
            Self::CreationFailed(stderr.trim().to_string())
        } else {
            Self::Unknown(stderr.trim().to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;

/// Everything the manifest and the container bring-up need to know.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub repo_root: PathBuf,
    pub run_tmp_dir: PathBuf,
    pub run_db_dir: PathBuf,
    pub workdir: String,
    pub env: HashMap<String, String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>, repo_root: PathBuf, run_tmp_dir: PathBuf, run_db_dir: PathBuf) -> Self {
        Self {
            image: image.into(),
            cpu_limit: None,
            memory_limit: None,
            repo_root,
            run_tmp_dir,
            run_db_dir,
            workdir: "/workspace".to_string(),
            env: HashMap::new(),
        }
    }
}

/// A live sandbox container bound to one verification run.
///
/// `exec` never returns an `Err` for the command it runs — a crash mid-exec
/// still yields whatever output was captured before the crash, with a
/// best-effort exit code. Release happens in `Drop` as a synchronous
/// backstop so the container is torn down on every exit path, including a
/// panic unwinding through the caller.
pub struct DockerContainerHandle {
    container_id: String,
    released: bool,
}

impl DockerContainerHandle {
    /// Bring up a container bound to `config`, with `repo_root` mounted
    /// read-write and the run's `tmp`/`db` directories writable.
    pub async fn acquire(config: &ContainerConfig) -> Result<Self> {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.args(["run", "-d", "--rm"])
            .arg("-v")
            .arg(format!("{}:{}:rw", config.repo_root.display(), config.workdir))
            .arg("-v")
            .arg(format!("{}:/run/tmp:rw", config.run_tmp_dir.display()))
            .arg("-v")
            .arg(format!("{}:/run/db:rw", config.run_db_dir.display()))
            .arg("-w")
            .arg(&config.workdir);

        if let Some(cpu) = &config.cpu_limit {
            cmd.arg("--cpus").arg(cpu);
        }
        if let Some(mem) = &config.memory_limit {
            cmd.arg("--memory").arg(mem);
        }
        for (k, v) in &config.env {
            cmd.arg("-e").arg(format!("{k}={v}"));
        }
        cmd.arg(&config.image).args(["sleep", "infinity"]);

        let output = cmd
            .output()
            .await
            .map_err(|e| ContainerError::DaemonUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(image = %config.image, stderr = %stderr, "container bring-up failed");
            return Err(ContainerError::classify(&stderr));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(container_id = %container_id, image = %config.image, "container acquired");
        Ok(Self {
            container_id,
            released: false,
        })
    }

    /// Run a shell-evaluated command inside the container, returning merged
    /// stdout+stderr regardless of exit status.
    pub async fn exec(&self, command: &str, env: &HashMap<String, String>) -> (i32, String) {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.arg("exec");
        for (k, v) in env {
            cmd.arg("-e").arg(format!("{k}={v}"));
        }
        cmd.args([&self.container_id, "sh", "-c", command]);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        match cmd.output().await {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let exit_code = output.status.code().unwrap_or(-1);
                (exit_code, text)
            }
            Err(e) => (255, format!("failed to invoke docker exec: {e}")),
        }
    }

    /// Best-effort instruct the container to terminate residual processes
    /// after a step timeout. Failure is ignored by the caller.
    pub async fn kill_residual_processes(&self) {
        let _ = tokio::process::Command::new("docker")
            .args(["exec", &self.container_id, "sh", "-c", "pkill -9 -f . || true"])
            .output()
            .await;
    }

    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let _ = tokio::process::Command::new("docker")
            .args(["rm", "-f", &self.container_id])
            .output()
            .await;
        info!(container_id = %self.container_id, "container released");
    }
}

impl Drop for DockerContainerHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Synchronous backstop: Drop cannot run async code, but the handle
        // must release on every exit path, including a panic unwind.
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", &self.container_id])
            .output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_daemon_unavailable() {
        let err = ContainerError::classify("Cannot connect to the Docker daemon at unix:///var/run/docker.sock");
        assert!(matches!(err, ContainerError::DaemonUnavailable(_)));
        assert_eq!(err.infra_error_type(), InfraErrorType::DockerUnavailable);
    }

    #[test]
    fn classifies_image_pull_failure() {
        let err = ContainerError::classify("Error response from daemon: pull access denied for ghost/image");
        assert!(matches!(err, ContainerError::ImagePull(_)));
        assert_eq!(err.infra_error_type(), InfraErrorType::ImagePull);
    }

    #[test]
    fn classifies_resource_exhaustion() {
        let err = ContainerError::classify("docker: Error response from daemon: cannot allocate memory");
        assert!(matches!(err, ContainerError::ResourceExhaustion(_)));
    }

    #[test]
    fn falls_back_to_unknown() {
        let err = ContainerError::classify("some bizarre error nobody has seen before");
        assert!(matches!(err, ContainerError::Unknown(_)));
        assert_eq!(err.infra_error_type(), InfraErrorType::Unknown);
    }
}
