//! P0 Smoke Tests: Info Endpoints
//!
//! Anonymous liveness and version endpoints of a bare IDM.

#![cfg(feature = "smoke")]

use regex::Regex;
use wrenidm_env_tests::cases::{TestCase, ACTIVE_READY};
use wrenidm_env_tests::fixtures::IdmClient;

/// Release versions, optionally qualified (`7.0.0`, `7.1.0-SNAPSHOT`, `7.1.0-RC-1`).
const VERSION_PATTERN: &str = r"^\d+\.\d+\.\d+(-[A-Z][A-Z0-9-]*)?$";

async fn check_ping(idm: &IdmClient) {
    let response = idm.ping().await.expect("Ping request should complete");
    assert_eq!(response.status(), 200);

    let body = response.json().expect("Ping body should be JSON");
    assert_eq!(body["state"], ACTIVE_READY);
}

async fn check_version(idm: &IdmClient) {
    let response = idm.version().await.expect("Version request should complete");
    assert_eq!(response.status(), 200);

    let body = response.json().expect("Version body should be JSON");
    let version = body["productVersion"]
        .as_str()
        .expect("productVersion should be a string");
    assert!(
        Regex::new(VERSION_PATTERN).unwrap().is_match(version),
        "Unexpected product version format: {}",
        version
    );
}

#[tokio::test]
async fn test_info_endpoints() {
    let case = TestCase::start("info")
        .await
        .expect("Info environment should start - is Docker running?");

    check_ping(&case.idm).await;
    check_version(&case.idm).await;

    case.finish().await;
}
