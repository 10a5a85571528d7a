//! Compose backend.
//!
//! [`ComposeBackend`] is the seam between environment lifecycle and the tool
//! that actually runs containers. [`DockerCompose`] shells out to the local
//! `docker compose` plugin; [`mock::MockCompose`] records calls for unit
//! tests.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Buffered log lines per follower before back-pressure applies.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Compose errors.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Compose descriptor not found: {}", .0.display())]
    MissingDescriptor(PathBuf),

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// A compose descriptor plus the project name its containers run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub file: PathBuf,
    pub name: String,
}

/// Operations the environment controller needs from a container runtime.
#[async_trait]
pub trait ComposeBackend: Send + Sync {
    /// Create and start every service in the project, detached.
    async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Stop and remove the project's containers, networks and volumes.
    async fn down(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Blocking variant of [`ComposeBackend::down`], for use from `Drop`.
    fn down_blocking(&self, project: &ComposeProject) -> Result<(), ComposeError>;

    /// Follow a service's output, one line per message.
    ///
    /// The channel closes when the service's output ends. Dropping the
    /// receiver stops following.
    async fn follow_logs(
        &self,
        project: &ComposeProject,
        service: &str,
    ) -> Result<mpsc::Receiver<String>, ComposeError>;
}

/// `docker compose` driven through the local CLI.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    binary: String,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCompose {
    /// Use `binary compose ...` (e.g. `docker` or `podman`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(project: &ComposeProject, command: &[&str]) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "--file".to_string(),
            project.file.display().to_string(),
            "--project-name".to_string(),
            project.name.clone(),
        ];
        args.extend(command.iter().map(|arg| arg.to_string()));
        args
    }

    fn render(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    async fn run(&self, project: &ComposeProject, command: &[&str]) -> Result<(), ComposeError> {
        let args = Self::args(project, command);
        let rendered = self.render(&args);

        tracing::debug!(target: "env_harness.compose", command = %rendered, "Running compose command");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ComposeError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ComposeError::Failed {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

const DOWN_ARGS: &[&str] = &["down", "--volumes", "--remove-orphans"];

#[async_trait]
impl ComposeBackend for DockerCompose {
    async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        if !project.file.is_file() {
            return Err(ComposeError::MissingDescriptor(project.file.clone()));
        }
        self.run(project, &["up", "--detach"]).await
    }

    async fn down(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        self.run(project, DOWN_ARGS).await
    }

    fn down_blocking(&self, project: &ComposeProject) -> Result<(), ComposeError> {
        let args = Self::args(project, DOWN_ARGS);
        let rendered = self.render(&args);

        let output = std::process::Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ComposeError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ComposeError::Failed {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn follow_logs(
        &self,
        project: &ComposeProject,
        service: &str,
    ) -> Result<mpsc::Receiver<String>, ComposeError> {
        let args = Self::args(
            project,
            &["logs", "--follow", "--no-color", "--no-log-prefix", service],
        );
        let rendered = self.render(&args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ComposeError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ComposeError::Failed {
            command: rendered,
            status: "no stdout".to_string(),
            stderr: String::new(),
        })?;

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let service = service.to_string();

        // The task owns the child; both go away once the receiver is dropped
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(
                            target: "env_harness.compose",
                            service = %service,
                            error = %e,
                            "Log follower read failed"
                        );
                        break;
                    }
                }
            }
            drop(child);
        });

        Ok(rx)
    }
}

/// Mock compose backend for unit testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Calls {
        up: AtomicUsize,
        down: AtomicUsize,
        down_blocking: AtomicUsize,
        follow_logs: AtomicUsize,
    }

    /// Records lifecycle calls; clones share the same counters.
    #[derive(Debug, Clone, Default)]
    pub struct MockCompose {
        calls: Arc<Calls>,
        log_lines: Vec<String>,
        keep_logs_open: bool,
        fail_up: bool,
        open_followers: Arc<Mutex<Vec<mpsc::Sender<String>>>>,
    }

    impl MockCompose {
        /// A backend whose services print nothing.
        pub fn new() -> Self {
            Self::default()
        }

        /// Every followed service prints `lines`, then its output ends.
        pub fn with_log_lines<I, S>(mut self, lines: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.log_lines = lines.into_iter().map(Into::into).collect();
            self
        }

        /// Keep log streams open after the scripted lines.
        pub fn keep_logs_open(mut self) -> Self {
            self.keep_logs_open = true;
            self
        }

        /// Make `up` fail.
        pub fn failing_up(mut self) -> Self {
            self.fail_up = true;
            self
        }

        pub fn up_calls(&self) -> usize {
            self.calls.up.load(Ordering::SeqCst)
        }

        /// Teardowns through either `down` or `down_blocking`.
        pub fn teardowns(&self) -> usize {
            self.calls.down.load(Ordering::SeqCst) + self.calls.down_blocking.load(Ordering::SeqCst)
        }

        pub fn blocking_teardowns(&self) -> usize {
            self.calls.down_blocking.load(Ordering::SeqCst)
        }

        pub fn follow_calls(&self) -> usize {
            self.calls.follow_logs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ComposeBackend for MockCompose {
        async fn up(&self, project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.up.fetch_add(1, Ordering::SeqCst);
            if self.fail_up {
                return Err(ComposeError::Failed {
                    command: format!("mock up {}", project.name),
                    status: "exit status: 1".to_string(),
                    stderr: "mock failure".to_string(),
                });
            }
            Ok(())
        }

        async fn down(&self, _project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn down_blocking(&self, _project: &ComposeProject) -> Result<(), ComposeError> {
            self.calls.down_blocking.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn follow_logs(
            &self,
            _project: &ComposeProject,
            _service: &str,
        ) -> Result<mpsc::Receiver<String>, ComposeError> {
            self.calls.follow_logs.fetch_add(1, Ordering::SeqCst);

            let (tx, rx) = mpsc::channel(self.log_lines.len().max(1));
            for line in &self.log_lines {
                // Capacity covers every scripted line
                let _ = tx.try_send(line.clone());
            }

            if self.keep_logs_open {
                if let Ok(mut followers) = self.open_followers.lock() {
                    followers.retain(|follower| !follower.is_closed());
                    followers.push(tx);
                }
            }

            Ok(rx)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn project() -> ComposeProject {
        ComposeProject {
            file: PathBuf::from("cases/info/compose.yaml"),
            name: "wrenidm-info".to_string(),
        }
    }

    #[test]
    fn test_compose_args_include_file_and_project() {
        let args = DockerCompose::args(&project(), &["up", "--detach"]);
        assert_eq!(
            args,
            vec![
                "compose",
                "--file",
                "cases/info/compose.yaml",
                "--project-name",
                "wrenidm-info",
                "up",
                "--detach"
            ]
        );
    }

    #[tokio::test]
    async fn test_up_rejects_missing_descriptor() {
        let result = DockerCompose::default()
            .up(&ComposeProject {
                file: PathBuf::from("/nonexistent/compose.yaml"),
                name: "missing".to_string(),
            })
            .await;

        assert!(matches!(result, Err(ComposeError::MissingDescriptor(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = DockerCompose::new("definitely-not-a-compose-binary")
            .down(&project())
            .await;

        assert!(matches!(result, Err(ComposeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_mock_scripted_logs_then_close() {
        let mock = mock::MockCompose::new().with_log_lines(["booting", "Wren:IDM ready"]);
        let mut rx = mock.follow_logs(&project(), "wrenidm").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("booting"));
        assert_eq!(rx.recv().await.as_deref(), Some("Wren:IDM ready"));
        assert_eq!(rx.recv().await, None);
        assert_eq!(mock.follow_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_clones_share_counters() {
        let mock = mock::MockCompose::new();
        let clone = mock.clone();

        clone.up(&project()).await.unwrap();
        clone.down(&project()).await.unwrap();
        clone.down_blocking(&project()).unwrap();

        assert_eq!(mock.up_calls(), 1);
        assert_eq!(mock.teardowns(), 2);
        assert_eq!(mock.blocking_teardowns(), 1);
    }
}
