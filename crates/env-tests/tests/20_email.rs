//! P1 Flow Tests: Outgoing Email
//!
//! Mail sent through the external email service arrives at the SMTP test
//! server unchanged.

#![cfg(feature = "flows")]

use env_harness::eventual::ConsistencyCategory;
use serde_json::json;
use wrenidm_env_tests::cases::TestCase;

#[tokio::test]
async fn test_send_email_and_check_inbox() {
    let case = TestCase::start("email")
        .await
        .expect("Email environment should start");

    let email = json!({
        "type": "text/html",
        "from": "idm@wrensecurity.org",
        "to": "foobar@wrensecurity.org",
        "subject": "Test subject",
        "body": "Test body"
    });

    let response = case
        .idm
        .send_email(&email)
        .await
        .expect("Email send request should complete");
    assert_eq!(response.status(), 200, "body: {}", response.body());
    assert_eq!(response.json().expect("Send body should be JSON")["status"], "OK");

    let inbox = case
        .mail
        .wait_for_messages(1, ConsistencyCategory::MailDelivery.policy())
        .await
        .expect("Message should reach the SMTP server");
    assert_eq!(inbox.total, 1);

    let message = inbox.items.first().expect("Inbox should contain the message");
    assert!(message
        .header("Content-Type")
        .is_some_and(|value| value.contains("text/html")));
    assert_eq!(message.header("From"), Some("idm@wrensecurity.org"));
    assert_eq!(message.header("To"), Some("foobar@wrensecurity.org"));
    assert_eq!(message.header("Subject"), Some("Test subject"));
    assert_eq!(message.body(), "Test body");

    case.finish().await;
}
