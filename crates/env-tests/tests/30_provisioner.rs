//! P1 Flow Tests: LDAP Provisioner
//!
//! The LDAP connector configured in the case is reachable.

#![cfg(feature = "flows")]

use env_harness::eventual::ConsistencyCategory;
use wrenidm_env_tests::cases::TestCase;

#[tokio::test]
async fn test_ldap_connection() {
    let case = TestCase::start("provisioner")
        .await
        .expect("Provisioner environment should start");

    case.idm
        .wait_for_provisioner("ldap", ConsistencyCategory::ConnectorAvailability.policy())
        .await
        .expect("LDAP provisioner should come online");

    let response = case
        .idm
        .test_system("ldap")
        .await
        .expect("Connector test request should complete");
    assert_eq!(response.status(), 200);
    assert_eq!(response.json().expect("Test body should be JSON")["ok"], true);

    case.finish().await;
}
