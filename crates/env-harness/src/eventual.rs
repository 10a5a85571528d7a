//! Eventual consistency helpers for timing-dependent tests.
//!
//! The IDM performs a lot of work asynchronously: implicit synchronization
//! writes audit records after the triggering request has returned, mail is
//! delivered after the send call completes, connectors come online some time
//! after the server reports ready. [`poll_until`] repeats a probe on a fixed
//! interval until a predicate holds or the bound is exhausted.
//!
//! Attempts are strictly sequential and each one observes a fresh probe
//! result. Running out of time is reported as [`PollError::Timeout`], never
//! as a stale value.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout_at, Instant};

/// Maximum length of the last observation kept in a timeout error.
const MAX_OBSERVATION_LEN: usize = 512;

/// Categories of eventual consistency with documented bounds.
///
/// Each category polls once per second, like the server-side jobs it waits
/// on, and gives up after a bound derived from the expected latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyCategory {
    /// Implicit sync to a connector target (audit record written).
    SyncPropagation,

    /// Connector reachable after IDM startup.
    ConnectorAvailability,

    /// Workflow definitions deployed after IDM startup.
    WorkflowDeployment,

    /// Outgoing mail visible in the SMTP test server.
    MailDelivery,
}

impl ConsistencyCategory {
    /// Get the maximum wait for this consistency category.
    pub fn timeout(&self) -> Duration {
        match self {
            ConsistencyCategory::SyncPropagation => Duration::from_secs(60),
            ConsistencyCategory::ConnectorAvailability => Duration::from_secs(120),
            ConsistencyCategory::WorkflowDeployment => Duration::from_secs(60),
            ConsistencyCategory::MailDelivery => Duration::from_secs(30),
        }
    }

    /// Get the fixed delay between attempts.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Polling policy for this category.
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::deadline(self.interval(), self.timeout())
    }
}

/// When a poll gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBound {
    /// Give up once this much wall-clock time has elapsed.
    Deadline(Duration),

    /// Give up after this many attempts.
    Attempts(u32),
}

/// Fixed-interval polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub bound: PollBound,
}

impl PollPolicy {
    pub fn deadline(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            bound: PollBound::Deadline(deadline),
        }
    }

    pub fn attempts(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            bound: PollBound::Attempts(attempts),
        }
    }
}

/// Polling errors.
#[derive(Debug, Error)]
pub enum PollError<E: std::error::Error + 'static> {
    /// The condition was never observed within the bound.
    #[error("Condition not met after {attempts} attempts in {waited:?}; last observed: {last_observed}")]
    Timeout {
        attempts: u32,
        waited: Duration,
        last_observed: String,
    },

    /// A probe failed outright. Not retried.
    #[error("Probe failed during polling: {0}")]
    Probe(#[source] E),
}

/// Repeat `probe` until `predicate` accepts its result.
///
/// - A predicate that holds on the first result returns without sleeping.
/// - Probe errors abort the poll immediately with [`PollError::Probe`].
/// - Exhausting the bound yields [`PollError::Timeout`] carrying the last
///   observed value.
/// - A deadline also bounds time spent inside the probe: an attempt still
///   pending when it passes is dropped and the poll times out.
///
/// # Example
///
/// ```no_run
/// use env_harness::eventual::{poll_until, ConsistencyCategory};
/// use env_harness::probe::{ProbeClient, ProbeRequest};
///
/// # async fn run(client: ProbeClient) -> Result<(), Box<dyn std::error::Error>> {
/// let audit = poll_until(
///     ConsistencyCategory::SyncPropagation.policy(),
///     || client.send(ProbeRequest::get("/openidm/audit/sync").query("_queryFilter", "true")),
///     |response| {
///         response
///             .json()
///             .map(|body| body["resultCount"] == 2)
///             .unwrap_or(false)
///     },
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn poll_until<T, E, F, Fut, P>(
    policy: PollPolicy,
    mut probe: F,
    mut predicate: P,
) -> Result<T, PollError<E>>
where
    T: Debug,
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let start = Instant::now();
    let deadline_at = match policy.bound {
        PollBound::Deadline(deadline) => Some(start + deadline),
        PollBound::Attempts(_) => None,
    };
    let mut attempts: u32 = 0;
    let mut previous: Option<String> = None;

    loop {
        attempts = attempts.saturating_add(1);
        let outcome = match deadline_at {
            Some(at) => match timeout_at(at, probe()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let last_observed = match previous {
                        Some(previous) => format!("attempt {} pending at deadline; previous: {}", attempts, previous),
                        None => format!("attempt {} pending at deadline", attempts),
                    };
                    return Err(timed_out(attempts, start.elapsed(), last_observed));
                }
            },
            None => probe().await,
        };
        let observed = outcome.map_err(PollError::Probe)?;

        if predicate(&observed) {
            tracing::debug!(
                target: "env_harness.eventual",
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Condition met"
            );
            return Ok(observed);
        }

        let elapsed = start.elapsed();
        let exhausted = match policy.bound {
            PollBound::Attempts(max) => attempts >= max,
            PollBound::Deadline(deadline) => elapsed >= deadline,
        };

        let last_observed = describe(&observed);
        if exhausted {
            return Err(timed_out(attempts, elapsed, last_observed));
        }
        previous = Some(last_observed);

        tracing::trace!(
            target: "env_harness.eventual",
            attempt = attempts,
            "Condition not met yet, retrying"
        );

        // Never sleep past the deadline
        let delay = match policy.bound {
            PollBound::Deadline(deadline) => policy.interval.min(deadline.saturating_sub(elapsed)),
            PollBound::Attempts(_) => policy.interval,
        };
        sleep(delay).await;
    }
}

fn timed_out<E: std::error::Error + 'static>(
    attempts: u32,
    waited: Duration,
    last_observed: String,
) -> PollError<E> {
    tracing::warn!(
        target: "env_harness.eventual",
        attempts,
        elapsed_ms = waited.as_millis() as u64,
        last_observed = %last_observed,
        "Condition not met before bound"
    );
    PollError::Timeout {
        attempts,
        waited,
        last_observed,
    }
}

fn describe<T: Debug>(value: &T) -> String {
    let rendered = format!("{:?}", value);
    if rendered.chars().count() > MAX_OBSERVATION_LEN {
        let truncated: String = rendered.chars().take(MAX_OBSERVATION_LEN).collect();
        format!("{}...[truncated]", truncated)
    } else {
        rendered
    }
}
