//! Docker-backed runtime.
//!
//! Each worker is one `ollama/ollama` container named
//! `{prefix}-{model}-{port}`, publishing the inference port on the
//! allocated host port. After a successful start the model pull is fired
//! in a detached task, so a worker may serve before warm-up completes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use fleet_core::WorkerConfig;

use crate::{ContainerRuntime, RuntimeError, RuntimeResult};

pub struct DockerRuntime {
    program: String,
    image: String,
    container_port: u16,
    name_prefix: String,
    pull_on_start: bool,
    timeout: Duration,
}

impl DockerRuntime {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            program: "docker".to_string(),
            image: config.image.clone(),
            container_port: config.container_port,
            name_prefix: config.name_prefix.clone(),
            pull_on_start: config.pull_on_start,
            timeout: config.command_timeout(),
        }
    }

    /// Invoke a different CLI (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Container name for a worker. Characters Docker does not accept in
    /// names (`:` and `/` are common in model tags) become `-`.
    pub fn container_name(&self, model: &str, port: u16) -> String {
        let model: String = model
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!("{}-{model}-{port}", self.name_prefix)
    }

    pub fn run_args(&self, model: &str, port: u16) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-d".to_string(),
            "-p".to_string(),
            format!("{port}:{}", self.container_port),
            "--name".to_string(),
            self.container_name(model, port),
            self.image.clone(),
        ]
    }

    pub fn pull_args(&self, model: &str, port: u16) -> Vec<String> {
        vec![
            "exec".to_string(),
            self.container_name(model, port),
            "ollama".to_string(),
            "pull".to_string(),
            model.to_string(),
        ]
    }

    pub fn stop_args(&self, model: &str, port: u16) -> Vec<String> {
        vec!["stop".to_string(), self.container_name(model, port)]
    }

    async fn run(&self, args: &[String]) -> RuntimeResult<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running container command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn spawn_pull(&self, model: &str, port: u16) {
        let program = self.program.clone();
        let args = self.pull_args(model, port);
        let model = model.to_string();

        tokio::spawn(async move {
            match Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .await
            {
                Ok(out) if out.status.success() => info!(%model, port, "model pulled"),
                Ok(out) => warn!(
                    %model,
                    port,
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "model pull failed"
                ),
                Err(e) => warn!(%model, port, error = %e, "model pull could not run"),
            }
        });
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn start(&self, model: &str, port: u16) -> RuntimeResult<()> {
        self.run(&self.run_args(model, port)).await?;
        info!(%model, port, container = %self.container_name(model, port), "container started");

        if self.pull_on_start {
            self.spawn_pull(model, port);
        }
        Ok(())
    }

    async fn stop(&self, model: &str, port: u16) -> RuntimeResult<()> {
        self.run(&self.stop_args(model, port)).await?;
        info!(%model, port, "container stopped");
        Ok(())
    }
}
