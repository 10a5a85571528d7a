//! Environment lifecycle.
//!
//! An [`Environment`] is a running compose project whose monitored services
//! have all reported ready. It is created by [`Environment::start`] and torn
//! down exactly once: by [`Environment::stop`], or by `Drop` when the owning
//! test returns early or panics.

use crate::compose::{ComposeBackend, ComposeError, ComposeProject};
use crate::readiness::ReadinessStrategy;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::Instant;

/// Environment errors.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// A monitored service never became ready. The environment has already
    /// been torn down when this is returned.
    #[error("Environment startup timed out waiting for service '{service}': {last_observed}")]
    StartupTimeout {
        service: String,
        last_observed: String,
    },

    #[error("Compose failure: {0}")]
    Compose(#[from] ComposeError),
}

/// Declarative description of an environment: a compose descriptor and the
/// readiness strategy of each monitored service.
#[derive(Debug, Clone)]
pub struct Composition {
    file: PathBuf,
    project: String,
    services: Vec<(String, ReadinessStrategy)>,
}

impl Composition {
    pub fn new(file: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            project: project.into(),
            services: Vec::new(),
        }
    }

    /// Monitor `service` with `strategy`.
    ///
    /// A service has at most one strategy; registering it again replaces the
    /// previous one and keeps its position.
    pub fn waiting_for(
        mut self,
        service: impl Into<String>,
        strategy: impl Into<ReadinessStrategy>,
    ) -> Self {
        let service = service.into();
        let strategy = strategy.into();

        match self.services.iter_mut().find(|(name, _)| *name == service) {
            Some(existing) => existing.1 = strategy,
            None => self.services.push((service, strategy)),
        }
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Monitored services, in evaluation order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopped,
}

/// A started environment. Owned exclusively by one test.
pub struct Environment {
    project: ComposeProject,
    backend: Box<dyn ComposeBackend>,
    state: Lifecycle,
}

impl Environment {
    /// Start every service and block until each monitored one is ready.
    ///
    /// Services are checked in declaration order. If any of them fails its
    /// readiness strategy, the environment is torn down and
    /// [`EnvironmentError::StartupTimeout`] is returned with the last
    /// observation.
    pub async fn start<B>(composition: Composition, backend: B) -> Result<Self, EnvironmentError>
    where
        B: ComposeBackend + 'static,
    {
        let Composition {
            file,
            project,
            services,
        } = composition;

        let mut environment = Self {
            project: ComposeProject {
                file,
                name: project,
            },
            backend: Box::new(backend),
            state: Lifecycle::Running,
        };

        tracing::info!(
            target: "env_harness.environment",
            project = %environment.project.name,
            file = %environment.project.file.display(),
            "Starting environment"
        );

        let start = Instant::now();

        if let Err(e) = environment.backend.up(&environment.project).await {
            // Compose may have created part of the project before failing
            environment.stop().await;
            return Err(e.into());
        }

        for (service, strategy) in &services {
            tracing::info!(
                target: "env_harness.environment",
                project = %environment.project.name,
                service = %service,
                timeout_secs = strategy.timeout().as_secs(),
                "Waiting for service readiness"
            );

            match strategy
                .evaluate(environment.backend.as_ref(), &environment.project, service)
                .await
            {
                Ok(ready) => {
                    tracing::info!(
                        target: "env_harness.environment",
                        project = %environment.project.name,
                        service = %service,
                        attempts = ready.attempts,
                        elapsed_ms = ready.elapsed.as_millis() as u64,
                        "Service ready"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        target: "env_harness.environment",
                        project = %environment.project.name,
                        service = %service,
                        error = %e,
                        "Service did not become ready"
                    );
                    environment.stop().await;
                    return Err(EnvironmentError::StartupTimeout {
                        service: service.clone(),
                        last_observed: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            target: "env_harness.environment",
            project = %environment.project.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Environment ready"
        );

        Ok(environment)
    }

    /// Tear the environment down. Calling this more than once is a no-op.
    ///
    /// Teardown failures are logged rather than returned: there is nothing a
    /// test can do about them, and they must not mask the test's own result.
    pub async fn stop(&mut self) {
        if self.state == Lifecycle::Stopped {
            return;
        }
        self.state = Lifecycle::Stopped;

        tracing::info!(
            target: "env_harness.environment",
            project = %self.project.name,
            "Stopping environment"
        );

        if let Err(e) = self.backend.down(&self.project).await {
            tracing::error!(
                target: "env_harness.environment",
                project = %self.project.name,
                error = %e,
                "Environment teardown failed"
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == Lifecycle::Running
    }

    pub fn project(&self) -> &ComposeProject {
        &self.project
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.state == Lifecycle::Stopped {
            return;
        }
        self.state = Lifecycle::Stopped;

        tracing::warn!(
            target: "env_harness.environment",
            project = %self.project.name,
            "Environment dropped while running, tearing down"
        );

        if let Err(e) = self.backend.down_blocking(&self.project) {
            tracing::error!(
                target: "env_harness.environment",
                project = %self.project.name,
                error = %e,
                "Environment teardown failed"
            );
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("project", &self.project)
            .field("state", &self.state)
            .finish()
    }
}
