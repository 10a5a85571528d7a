//! Wren:IDM Environment Test Suite
//!
//! Black-box tests for a Wren:IDM distribution. Every scenario starts its own
//! compose environment (IDM plus whatever collaborators the case needs:
//! LDAP, MailHog, CSV sources), waits for the IDM to report `ACTIVE_READY`,
//! runs its ordered steps over HTTP and tears the environment down.
//!
//! # Features
//!
//! - `smoke`: info endpoints (ping, version)
//! - `flows`: endpoint, email, provisioner, sync and workflow scenarios
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. Docker with the compose plugin (or set `COMPOSE_BINARY`)
//! 2. The IDM built into the image referenced by `resources/cases/*/compose.yaml`
//! 3. `wrenidm.wrensecurity.local` and `smtp.wrensecurity.local` resolvable
//!    from the host, or `WRENIDM_BASE_URL` / `SMTP_API_BASE_URL` overridden
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Smoke tests only
//! cargo test -p wrenidm-env-tests --features smoke
//!
//! # Full suite, verbose harness logs
//! RUST_LOG=env_harness=debug cargo test -p wrenidm-env-tests --features all
//! ```

pub mod cases;
pub mod config;
pub mod fixtures;
pub mod logging;
