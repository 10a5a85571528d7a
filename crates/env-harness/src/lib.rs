//! Environment harness for black-box service tests.
//!
//! This crate brings up a multi-container environment from a compose
//! descriptor, blocks until every monitored service reports ready, and gives
//! tests the two tools they need afterwards: a thin HTTP probe client and a
//! bounded polling loop for eventually-consistent side effects.
//!
//! # Modules
//!
//! - [`compose`]: the compose backend seam (`docker compose` and a mock)
//! - [`environment`]: environment lifecycle with guaranteed teardown
//! - [`readiness`]: HTTP-predicate and log-pattern readiness strategies
//! - [`probe`]: single HTTP exchanges against the system under test
//! - [`eventual`]: sequential poll-until-condition loop
//! - [`auth`]: credentials and authorization header schemes
//!
//! # Example
//!
//! ```no_run
//! use env_harness::compose::DockerCompose;
//! use env_harness::environment::{Composition, Environment};
//! use env_harness::readiness::{HttpReadiness, ReadinessStrategy};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let composition = Composition::new("cases/info/compose.yaml", "info").waiting_for(
//!     "wrenidm",
//!     ReadinessStrategy::Http(HttpReadiness::get("http://localhost:8080/openidm/info/ping")),
//! );
//! let mut environment = Environment::start(composition, DockerCompose::default()).await?;
//! // ... probes ...
//! environment.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod compose;
pub mod environment;
pub mod eventual;
pub mod probe;
pub mod readiness;
