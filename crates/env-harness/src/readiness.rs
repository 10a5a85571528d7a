//! Readiness strategies.
//!
//! A readiness strategy decides when a started service is usable. Two
//! variants exist:
//!
//! - [`HttpReadiness`]: GET an endpoint until it answers with an exact status
//!   code and, when configured, a decoded body satisfying a predicate.
//! - [`LogReadiness`]: follow the service's output until a regular expression
//!   has matched a required number of lines.
//!
//! Both are bounded by a timeout and are safe to evaluate repeatedly.

use crate::auth::{AuthScheme, Credentials};
use crate::compose::{ComposeBackend, ComposeError, ComposeProject};
use crate::eventual::{poll_until, PollError, PollPolicy};
use crate::probe::{sanitize_error_body, ProbeClient, ProbeError, ProbeRequest};
use regex::Regex;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// Default overall wait for a service to become ready.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default pause between HTTP readiness attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-attempt HTTP timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Readiness errors.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The service never satisfied its strategy within the timeout.
    #[error("{target} not ready after {waited:?} ({attempts} attempts); last observed: {last_observed}")]
    Timeout {
        target: String,
        waited: Duration,
        attempts: u32,
        last_observed: String,
    },

    #[error("Failed to follow logs of service '{service}': {source}")]
    LogStream {
        service: String,
        #[source]
        source: ComposeError,
    },

    #[error("Failed to build readiness probe: {0}")]
    Probe(#[from] ProbeError),
}

/// Successful readiness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Predicate over a decoded JSON response body.
pub type BodyPredicate = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// What one HTTP readiness attempt saw.
#[derive(Debug)]
enum HttpObservation {
    Unreachable(String),
    UnexpectedStatus(u16),
    UndecodableBody(String),
    PredicateFailed(String),
    Accepted,
}

impl fmt::Display for HttpObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpObservation::Unreachable(reason) => write!(f, "unreachable: {}", reason),
            HttpObservation::UnexpectedStatus(status) => write!(f, "unexpected status {}", status),
            HttpObservation::UndecodableBody(reason) => write!(f, "undecodable body: {}", reason),
            HttpObservation::PredicateFailed(body) => write!(f, "predicate rejected body: {}", body),
            HttpObservation::Accepted => f.write_str("accepted"),
        }
    }
}

/// HTTP-predicate readiness.
#[derive(Clone)]
pub struct HttpReadiness {
    url: String,
    headers: Vec<(String, String)>,
    expected_status: u16,
    predicate: Option<BodyPredicate>,
    read_timeout: Duration,
    interval: Duration,
    attempt_timeout: Duration,
}

impl HttpReadiness {
    /// GET `url`, expecting 200 and no body predicate.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            expected_status: 200,
            predicate: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            interval: DEFAULT_RETRY_INTERVAL,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn authenticated(mut self, scheme: AuthScheme, credentials: &Credentials) -> Self {
        self.headers.extend(scheme.headers(credentials));
        self
    }

    /// Accept only this exact status code.
    pub fn for_status_code(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Require the decoded body to satisfy `predicate`.
    ///
    /// The predicate only runs on responses with the expected status.
    pub fn for_response_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Overall time allowed before giving up.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Pause between failed attempts.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn judge(&self, outcome: Result<crate::probe::ProbeResponse, ProbeError>) -> HttpObservation {
        let response = match outcome {
            Ok(response) => response,
            Err(e) => return HttpObservation::Unreachable(e.to_string()),
        };

        if response.status() != self.expected_status {
            return HttpObservation::UnexpectedStatus(response.status());
        }

        let Some(predicate) = &self.predicate else {
            return HttpObservation::Accepted;
        };

        match response.json() {
            Ok(body) if predicate(&body) => HttpObservation::Accepted,
            Ok(_) => HttpObservation::PredicateFailed(sanitize_error_body(response.body())),
            Err(e) => HttpObservation::UndecodableBody(e.to_string()),
        }
    }

    /// Poll until ready or the read timeout elapses.
    ///
    /// An attempt still in flight when the read timeout passes is abandoned.
    pub async fn evaluate(&self) -> Result<Ready, ReadinessError> {
        let client = ProbeClient::with_timeout(self.url.as_str(), self.attempt_timeout)?;
        let request = self
            .headers
            .iter()
            .fold(ProbeRequest::get(self.url.as_str()), |request, (name, value)| {
                request.header(name.as_str(), value.as_str())
            });

        let start = Instant::now();
        let mut attempts: u32 = 0;

        let result = poll_until(
            PollPolicy::deadline(self.interval, self.read_timeout),
            || {
                attempts = attempts.saturating_add(1);
                let client = &client;
                let request = request.clone();
                async move {
                    let outcome = client.send(request).await;
                    Ok::<_, Infallible>(self.judge(outcome))
                }
            },
            |observation| {
                tracing::debug!(
                    target: "env_harness.readiness",
                    url = %self.url,
                    observation = %observation,
                    "HTTP readiness attempt"
                );
                matches!(observation, HttpObservation::Accepted)
            },
        )
        .await;

        match result {
            Ok(_) => Ok(Ready {
                attempts,
                elapsed: start.elapsed(),
            }),
            Err(PollError::Timeout {
                attempts,
                waited,
                last_observed,
            }) => Err(ReadinessError::Timeout {
                target: format!("GET {}", self.url),
                waited,
                attempts,
                last_observed,
            }),
            Err(PollError::Probe(never)) => match never {},
        }
    }
}

impl fmt::Debug for HttpReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("HttpReadiness")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("expected_status", &self.expected_status)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("read_timeout", &self.read_timeout)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Log-pattern readiness.
#[derive(Debug, Clone)]
pub struct LogReadiness {
    pattern: Regex,
    times: usize,
    timeout: Duration,
}

impl LogReadiness {
    /// Wait for one line matching `pattern`.
    ///
    /// The expression must match the whole line.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            pattern,
            times: 1,
            timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Require `times` matching lines.
    pub fn with_times(mut self, times: usize) -> Self {
        self.times = times.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Consume `lines` until enough of them matched.
    ///
    /// A closed stream or an elapsed timeout before the required count is a
    /// [`ReadinessError::Timeout`].
    pub async fn evaluate_lines(
        &self,
        target: &str,
        lines: &mut mpsc::Receiver<String>,
    ) -> Result<Ready, ReadinessError> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut seen: u32 = 0;
        let mut matched: usize = 0;

        let last_observed = loop {
            match timeout_at(deadline, lines.recv()).await {
                Ok(Some(line)) => {
                    seen = seen.saturating_add(1);
                    if self.pattern.is_match(line.trim_end_matches(['\r', '\n'])) {
                        matched += 1;
                        tracing::debug!(
                            target: "env_harness.readiness",
                            target_service = %target,
                            matched,
                            required = self.times,
                            "Log readiness pattern matched"
                        );
                        if matched >= self.times {
                            return Ok(Ready {
                                attempts: seen,
                                elapsed: start.elapsed(),
                            });
                        }
                    }
                }
                Ok(None) => {
                    break format!(
                        "log stream closed after {}/{} matches",
                        matched, self.times
                    )
                }
                Err(_) => break format!("{}/{} matches", matched, self.times),
            }
        };

        Err(ReadinessError::Timeout {
            target: format!("{} logs /{}/", target, self.pattern.as_str()),
            waited: start.elapsed(),
            attempts: seen,
            last_observed,
        })
    }
}

/// One readiness strategy per monitored service.
#[derive(Debug, Clone)]
pub enum ReadinessStrategy {
    Http(HttpReadiness),
    LogPattern(LogReadiness),
}

impl ReadinessStrategy {
    /// Evaluate the strategy for `service` of `project`.
    pub async fn evaluate(
        &self,
        backend: &dyn ComposeBackend,
        project: &ComposeProject,
        service: &str,
    ) -> Result<Ready, ReadinessError> {
        match self {
            ReadinessStrategy::Http(http) => http.evaluate().await,
            ReadinessStrategy::LogPattern(log) => {
                let mut lines = backend
                    .follow_logs(project, service)
                    .await
                    .map_err(|source| ReadinessError::LogStream {
                        service: service.to_string(),
                        source,
                    })?;
                log.evaluate_lines(service, &mut lines).await
            }
        }
    }

    /// Total time this strategy may block.
    pub fn timeout(&self) -> Duration {
        match self {
            ReadinessStrategy::Http(http) => http.read_timeout,
            ReadinessStrategy::LogPattern(log) => log.timeout,
        }
    }
}

impl From<HttpReadiness> for ReadinessStrategy {
    fn from(http: HttpReadiness) -> Self {
        ReadinessStrategy::Http(http)
    }
}

impl From<LogReadiness> for ReadinessStrategy {
    fn from(log: LogReadiness) -> Self {
        ReadinessStrategy::LogPattern(log)
    }
}
