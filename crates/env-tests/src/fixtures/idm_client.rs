//! Wren:IDM REST client fixture.
//!
//! Thin wrappers over the IDM's CREST endpoints. Every call returns the raw
//! [`ProbeResponse`] so tests assert on the exact status code; bodies decode
//! into [`QueryResult`] or `serde_json::Value` as needed.

use env_harness::auth::{AuthScheme, Credentials};
use env_harness::eventual::{poll_until, PollError, PollPolicy};
use env_harness::probe::{ProbeClient, ProbeError, ProbeRequest, ProbeResponse};
use serde::Deserialize;
use serde_json::{json, Value};

/// Query id returning every object's `_id` and `_rev` only.
pub const QUERY_ALL_IDS: &str = "query-all-ids";

/// Query id of the workflow endpoints, filtered by extra parameters.
pub const FILTERED_QUERY: &str = "filtered-query";

/// Body key of workflow task action responses.
pub const TASK_ACTION_KEY: &str = "Task action performed";

/// Result page of a CREST query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub result_count: usize,
    #[serde(default)]
    pub result: Vec<Value>,
}

impl QueryResult {
    /// `_id` of every returned object, in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.result
            .iter()
            .filter_map(|object| object["_id"].as_str())
            .collect()
    }
}

/// Client for the IDM under test.
///
/// Requests authenticate as the configured administrator unless they carry
/// their own credentials.
#[derive(Debug, Clone)]
pub struct IdmClient {
    client: ProbeClient,
    scheme: AuthScheme,
}

impl IdmClient {
    pub fn new(base_url: &str, scheme: AuthScheme, admin: &Credentials) -> Result<Self, ProbeError> {
        Ok(Self {
            client: ProbeClient::new(base_url)?.authenticated(scheme, admin),
            scheme,
        })
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Send an arbitrary request.
    pub async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        self.client.send(request).await
    }

    fn anonymous(&self, request: ProbeRequest) -> ProbeRequest {
        request.authenticated(self.scheme, &Credentials::anonymous())
    }

    // --- info ---

    /// `GET /openidm/info/ping` as the anonymous user.
    pub async fn ping(&self) -> Result<ProbeResponse, ProbeError> {
        self.send(self.anonymous(ProbeRequest::get("/openidm/info/ping")))
            .await
    }

    /// `GET /openidm/info/version` as the anonymous user.
    pub async fn version(&self) -> Result<ProbeResponse, ProbeError> {
        self.send(self.anonymous(ProbeRequest::get("/openidm/info/version")))
            .await
    }

    // --- managed objects ---

    /// Create or replace `managed/{object_type}/{id}`.
    pub async fn put_managed(
        &self,
        object_type: &str,
        id: &str,
        object: &Value,
    ) -> Result<ProbeResponse, ProbeError> {
        let request = ProbeRequest::put(format!("/openidm/managed/{}/{}", object_type, id)).json(object)?;
        self.send(request).await
    }

    pub async fn read_managed(&self, object_type: &str, id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!("/openidm/managed/{}/{}", object_type, id)))
            .await
    }

    /// Query `managed/{object_type}` with a CREST query filter.
    pub async fn query_managed(
        &self,
        object_type: &str,
        filter: &str,
    ) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::get(format!("/openidm/managed/{}", object_type)).query("_queryFilter", filter),
        )
        .await
    }

    /// Query a relationship collection such as `managed/user/{id}/roles`.
    pub async fn query_relationship(
        &self,
        object_type: &str,
        id: &str,
        relationship: &str,
        query: &[(&str, &str)],
    ) -> Result<ProbeResponse, ProbeError> {
        let request = query.iter().fold(
            ProbeRequest::get(format!("/openidm/managed/{}/{}/{}", object_type, id, relationship)),
            |request, (name, value)| request.query(*name, *value),
        );
        self.send(request).await
    }

    /// Named query against a custom script endpoint, e.g. `custom/users`.
    pub async fn query_endpoint(&self, endpoint: &str, query_id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!("/openidm/endpoint/{}", endpoint)).query("_queryId", query_id))
            .await
    }

    // --- synchronization ---

    /// Run a reconciliation of `mapping` and wait for it to finish.
    pub async fn reconcile(&self, mapping: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::post("/openidm/recon")
                .query("_action", "recon")
                .query("mapping", mapping)
                .query("waitForCompletion", "true"),
        )
        .await
    }

    pub async fn read_recon(&self, recon_id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!("/openidm/recon/{}", recon_id)))
            .await
    }

    pub async fn query_audit_sync(&self, filter: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get("/openidm/audit/sync").query("_queryFilter", filter))
            .await
    }

    /// Poll the sync audit log until `filter` matches exactly `expected` records.
    pub async fn wait_for_audit_sync(
        &self,
        filter: &str,
        expected: usize,
        policy: PollPolicy,
    ) -> Result<QueryResult, PollError<ProbeError>> {
        let response = poll_until(
            policy,
            || self.query_audit_sync(filter),
            |response| result_count(response) == Some(expected),
        )
        .await?;
        response.json_as().map_err(PollError::Probe)
    }

    // --- connectors ---

    /// `POST /openidm/system/{name}?_action=test`.
    pub async fn test_system(&self, name: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::post(format!("/openidm/system/{}", name))
                .query("_action", "test")
                .json_body("{}"),
        )
        .await
    }

    /// Named query against a connector object class, e.g. `ldap/account`.
    pub async fn query_system(
        &self,
        name: &str,
        object_type: &str,
        query_id: &str,
    ) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::get(format!("/openidm/system/{}/{}", name, object_type)).query("_queryId", query_id),
        )
        .await
    }

    /// Poll the connector test action until it reports `ok: true`.
    pub async fn wait_for_provisioner(
        &self,
        name: &str,
        policy: PollPolicy,
    ) -> Result<ProbeResponse, PollError<ProbeError>> {
        tracing::info!(target: "wrenidm_env_tests.idm", provisioner = %name, "Waiting for provisioner");

        poll_until(
            policy,
            || self.test_system(name),
            |response| {
                response.status() == 200
                    && response
                        .json()
                        .map(|body| body["ok"] == true)
                        .unwrap_or(false)
            },
        )
        .await
    }

    // --- external services ---

    /// `POST /openidm/external/email?_action=send`.
    pub async fn send_email(&self, message: &Value) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::post("/openidm/external/email")
                .query("_action", "send")
                .json(message)?,
        )
        .await
    }

    // --- workflow ---

    /// Deployed process definitions, optionally restricted to one key.
    pub async fn process_definitions(&self, key: Option<&str>) -> Result<ProbeResponse, ProbeError> {
        let mut request = ProbeRequest::get("/openidm/workflow/processdefinition").query("_queryId", FILTERED_QUERY);
        if let Some(key) = key {
            request = request.query("key", key);
        }
        self.send(request).await
    }

    /// Read a process definition, restricted to `fields` when not empty.
    pub async fn read_process_definition(
        &self,
        id: &str,
        fields: &[&str],
    ) -> Result<ProbeResponse, ProbeError> {
        let mut request = ProbeRequest::get(format!("/openidm/workflow/processdefinition/{}", id));
        if !fields.is_empty() {
            request = request.query("_fields", fields.join(","));
        }
        self.send(request).await
    }

    /// Poll until at least `expected` process definitions are deployed.
    pub async fn wait_for_process_definitions(
        &self,
        expected: usize,
        policy: PollPolicy,
    ) -> Result<QueryResult, PollError<ProbeError>> {
        let response = poll_until(
            policy,
            || self.process_definitions(None),
            |response| result_count(response).is_some_and(|count| count >= expected),
        )
        .await?;
        response.json_as().map_err(PollError::Probe)
    }

    pub async fn create_process_instance(&self, variables: &Value) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::post("/openidm/workflow/processinstance")
                .query("_action", "create")
                .json(variables)?,
        )
        .await
    }

    pub async fn query_process_instances(&self, process_instance_id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::get("/openidm/workflow/processinstance")
                .query("_queryId", FILTERED_QUERY)
                .query("processInstanceId", process_instance_id),
        )
        .await
    }

    pub async fn read_process_instance(&self, id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!("/openidm/workflow/processinstance/{}", id)))
            .await
    }

    pub async fn delete_process_instance(&self, id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::delete(format!("/openidm/workflow/processinstance/{}", id)))
            .await
    }

    pub async fn process_instance_history(&self, id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!(
            "/openidm/workflow/processinstance/history/{}",
            id
        )))
        .await
    }

    /// Open tasks of `process_instance_id` with definition `task_key`.
    pub async fn query_tasks(
        &self,
        process_instance_id: &str,
        task_key: &str,
    ) -> Result<ProbeResponse, ProbeError> {
        self.send(task_query("/openidm/workflow/taskinstance", process_instance_id, task_key))
            .await
    }

    /// Finished tasks of `process_instance_id` with definition `task_key`.
    pub async fn query_task_history(
        &self,
        process_instance_id: &str,
        task_key: &str,
    ) -> Result<ProbeResponse, ProbeError> {
        self.send(task_query(
            "/openidm/workflow/taskinstance/history",
            process_instance_id,
            task_key,
        ))
        .await
    }

    pub async fn read_task(&self, id: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(ProbeRequest::get(format!("/openidm/workflow/taskinstance/{}", id)))
            .await
    }

    /// Assign task `id` to `user_id`.
    pub async fn claim_task(&self, id: &str, user_id: &str) -> Result<ProbeResponse, ProbeError> {
        self.task_action(id, "claim", &json!({ "userId": user_id }))
            .await
    }

    /// Complete task `id` with the given form variables.
    pub async fn complete_task(&self, id: &str, variables: &Value) -> Result<ProbeResponse, ProbeError> {
        self.task_action(id, "complete", variables).await
    }

    async fn task_action(&self, id: &str, action: &str, body: &Value) -> Result<ProbeResponse, ProbeError> {
        self.send(
            ProbeRequest::post(format!("/openidm/workflow/taskinstance/{}", id))
                .query("_action", action)
                .json(body)?,
        )
        .await
    }
}

fn task_query(target: &str, process_instance_id: &str, task_key: &str) -> ProbeRequest {
    ProbeRequest::get(target)
        .query("_queryId", FILTERED_QUERY)
        .query("processInstanceId", process_instance_id)
        .query("taskDefinitionKey", task_key)
}

/// `resultCount` of a successful query response.
fn result_count(response: &ProbeResponse) -> Option<usize> {
    if response.status() != 200 {
        return None;
    }
    response
        .json()
        .ok()?
        .get("resultCount")?
        .as_u64()
        .map(|count| count as usize)
}
