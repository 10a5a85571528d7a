//! Test case environments.
//!
//! Each scenario lives in `resources/cases/<name>/compose.yaml` and runs the
//! IDM under the `wrenidm` service name. [`TestCase::start`] brings the
//! environment up under a unique compose project and hands back the clients
//! the scenario needs.

use crate::config::{Config, ConfigError, ReadinessMode};
use crate::fixtures::{IdmClient, MailClient};
use env_harness::auth::Credentials;
use env_harness::compose::{ComposeBackend, DockerCompose};
use env_harness::environment::{Composition, Environment, EnvironmentError};
use env_harness::probe::ProbeError;
use env_harness::readiness::{HttpReadiness, LogReadiness, ReadinessStrategy};
use thiserror::Error;
use uuid::Uuid;

/// Compose service running the IDM in every case.
pub const WRENIDM_SERVICE: &str = "wrenidm";

/// Line logged once the IDM has finished starting.
pub const READY_BANNER_PATTERN: &str = ".*Wren:IDM ready.*";

/// Liveness endpoint, readable by the anonymous user.
pub const PING_PATH: &str = "/openidm/info/ping";

/// State reported by [`PING_PATH`] once every module is up.
pub const ACTIVE_READY: &str = "ACTIVE_READY";

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid readiness pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Client setup failed: {0}")]
    Client(#[from] ProbeError),
}

/// Readiness strategy for the IDM container.
pub fn idm_readiness(config: &Config) -> Result<ReadinessStrategy, regex::Error> {
    let strategy: ReadinessStrategy = match config.readiness {
        ReadinessMode::Http => HttpReadiness::get(format!("{}{}", config.wrenidm_base_url, PING_PATH))
            .authenticated(config.auth_scheme, &Credentials::anonymous())
            .for_status_code(200)
            .for_response_predicate(|body| body["state"] == ACTIVE_READY)
            .with_read_timeout(config.startup_timeout)
            .into(),
        ReadinessMode::Log => LogReadiness::new(READY_BANNER_PATTERN)?
            .with_times(1)
            .with_timeout(config.startup_timeout)
            .into(),
    };
    Ok(strategy)
}

/// Compose project name for one run of `case`.
///
/// Unique per run so leftovers from an aborted run never collide.
pub fn project_name(case: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("wrenidm-{}-{}", case, suffix)
}

/// Composition of `case` with the IDM as its only monitored service.
pub fn composition(config: &Config, case: &str) -> Result<Composition, regex::Error> {
    Ok(Composition::new(config.compose_file(case), project_name(case))
        .waiting_for(WRENIDM_SERVICE, idm_readiness(config)?))
}

/// A started scenario environment.
///
/// Dropping it tears the environment down; [`TestCase::finish`] does the
/// same without blocking the runtime.
#[derive(Debug)]
pub struct TestCase {
    pub config: Config,
    pub idm: IdmClient,
    pub mail: MailClient,
    environment: Environment,
}

impl TestCase {
    /// Start `case` with configuration from the process environment.
    pub async fn start(case: &str) -> Result<Self, CaseError> {
        crate::logging::init();
        let config = Config::from_env()?;
        let backend = DockerCompose::new(config.compose_binary.clone());
        Self::start_with(config, case, backend).await
    }

    /// Start `case` on an explicit backend.
    pub async fn start_with<B>(config: Config, case: &str, backend: B) -> Result<Self, CaseError>
    where
        B: ComposeBackend + 'static,
    {
        let idm = IdmClient::new(&config.wrenidm_base_url, config.auth_scheme, &config.admin)?;
        let mail = MailClient::new(&config.smtp_api_base_url)?;
        let composition = composition(&config, case)?;

        tracing::info!(
            target: "wrenidm_env_tests.cases",
            case = %case,
            project = %composition.project(),
            "Starting test case"
        );

        let environment = Environment::start(composition, backend).await?;

        Ok(Self {
            config,
            idm,
            mail,
            environment,
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Tear the environment down.
    pub async fn finish(mut self) {
        self.environment.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use env_harness::compose::mock::MockCompose;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config(readiness: &str) -> Config {
        let vars = HashMap::from([
            ("WRENIDM_READINESS".to_string(), readiness.to_string()),
            ("WRENIDM_CASES_DIR".to_string(), "/tmp/cases".to_string()),
            ("WRENIDM_STARTUP_TIMEOUT_SECS".to_string(), "2".to_string()),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    #[test]
    fn test_project_names_are_unique_per_run() {
        let first = project_name("sync");
        let second = project_name("sync");

        assert!(first.starts_with("wrenidm-sync-"));
        assert_eq!(first.len(), "wrenidm-sync-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn test_http_readiness_targets_ping() {
        let strategy = idm_readiness(&config("http")).unwrap();

        match strategy {
            ReadinessStrategy::Http(http) => {
                assert_eq!(http.url(), "http://wrenidm.wrensecurity.local:8080/openidm/info/ping");
            }
            other => panic!("expected HTTP readiness, got {:?}", other),
        }
        assert_eq!(
            idm_readiness(&config("http")).unwrap().timeout(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_log_readiness_selected_by_config() {
        let strategy = idm_readiness(&config("log")).unwrap();
        assert!(matches!(strategy, ReadinessStrategy::LogPattern(_)));
    }

    #[test]
    fn test_composition_monitors_idm_only() {
        let composition = composition(&config("log"), "workflow").unwrap();

        assert_eq!(
            composition.file(),
            std::path::Path::new("/tmp/cases/workflow/compose.yaml")
        );
        assert_eq!(composition.services().collect::<Vec<_>>(), vec![WRENIDM_SERVICE]);
    }

    #[tokio::test]
    async fn test_case_starts_and_finishes_on_banner() {
        let backend = MockCompose::new().with_log_lines([
            "INFO: Starting ServletContainer",
            "Wren:IDM ready",
        ]);

        let case = TestCase::start_with(config("log"), "info", backend.clone())
            .await
            .expect("case should start");

        assert!(case.environment().is_running());
        case.finish().await;
        assert_eq!(backend.teardowns(), 1);
        assert_eq!(backend.blocking_teardowns(), 0);
    }

    #[tokio::test]
    async fn test_case_start_fails_without_banner() {
        let backend = MockCompose::new().with_log_lines(["OpenIDM version \"7.0.0\""]);

        let err = TestCase::start_with(config("log"), "info", backend.clone())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CaseError::Environment(EnvironmentError::StartupTimeout { .. })
        ));
        assert_eq!(backend.teardowns(), 1);
    }
}
