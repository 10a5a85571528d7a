//! MailHog client fixture.
//!
//! Cases that send mail run a MailHog container as the IDM's SMTP server;
//! its HTTP API exposes everything it received.

use env_harness::eventual::{poll_until, PollError, PollPolicy};
use env_harness::probe::{ProbeClient, ProbeError, ProbeRequest, ProbeResponse};
use serde::Deserialize;
use std::collections::HashMap;

/// Messages received by MailHog (`GET /api/v2/messages`).
#[derive(Debug, Clone, Deserialize)]
pub struct Inbox {
    pub total: usize,
    #[serde(default)]
    pub items: Vec<MailMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailMessage {
    #[serde(rename = "Content")]
    pub content: MailContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailContent {
    #[serde(rename = "Headers", default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(rename = "Body", default)]
    pub body: String,
}

impl MailMessage {
    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.content
            .headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.content.body
    }
}

/// Client for the MailHog HTTP API. Unauthenticated.
#[derive(Debug, Clone)]
pub struct MailClient {
    client: ProbeClient,
}

impl MailClient {
    pub fn new(base_url: &str) -> Result<Self, ProbeError> {
        Ok(Self {
            client: ProbeClient::new(base_url)?,
        })
    }

    pub async fn messages(&self) -> Result<ProbeResponse, ProbeError> {
        self.client.send(ProbeRequest::get("/api/v2/messages")).await
    }

    /// Poll until at least `expected` messages have been received.
    pub async fn wait_for_messages(
        &self,
        expected: usize,
        policy: PollPolicy,
    ) -> Result<Inbox, PollError<ProbeError>> {
        let response = poll_until(
            policy,
            || self.messages(),
            |response| {
                response.status() == 200
                    && response
                        .json_as::<Inbox>()
                        .is_ok_and(|inbox| inbox.total >= expected)
            },
        )
        .await?;
        response.json_as().map_err(PollError::Probe)
    }
}
