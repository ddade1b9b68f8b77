//! HTTP adapters for the canary ports.
//!
//! Request signing is left to a fronting proxy; these adapters speak plain
//! JSON over HTTP.

use crate::canary::{CandidateInvoker, DeploymentOrchestrator, SyntheticEvent, VerdictReport};
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response};
use std::time::Duration;
use tracing::debug;

/// Header selecting asynchronous (fire-and-forget) invocation.
pub const INVOCATION_TYPE_HEADER: &str = "X-Amz-Invocation-Type";

/// Header naming the orchestrator operation.
pub const TARGET_HEADER: &str = "X-Amz-Target";

/// Operation that records a lifecycle hook verdict.
pub const REPORT_TARGET: &str = "CodeDeploy_20141006.PutLifecycleEventHookExecutionStatus";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn client(timeout: Duration) -> anyhow::Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

fn checked_base_url(base_url: String) -> anyhow::Result<String> {
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        bail!("URL must start with http:// or https://, got: {base_url}");
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

async fn ensure_success(response: Response, what: &str) -> anyhow::Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{what} returned {status}: {body}")
}

/// Dispatches synthetic events to a function invocation endpoint.
#[derive(Debug, Clone)]
pub struct HttpCandidateInvoker {
    base_url: String,
    http: HttpClient,
}

impl HttpCandidateInvoker {
    /// Creates an invoker for the endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the client cannot be built.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: checked_base_url(base_url.into())?,
            http: client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Replaces the request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.http = client(timeout)?;
        Ok(self)
    }

    /// Returns the invocation URL for `function`.
    #[must_use]
    pub fn invoke_url(&self, function: &str) -> String {
        format!("{}/2015-03-31/functions/{function}/invocations", self.base_url)
    }
}

#[async_trait]
impl CandidateInvoker for HttpCandidateInvoker {
    async fn invoke(&self, function: &str, event: &SyntheticEvent) -> anyhow::Result<()> {
        let url = self.invoke_url(function);
        debug!(url = %url, "Dispatching synthetic event");
        let response = self
            .http
            .post(&url)
            .header(INVOCATION_TYPE_HEADER, "Event")
            .json(event)
            .send()
            .await
            .with_context(|| format!("failed to invoke '{function}'"))?;
        ensure_success(response, "invocation").await
    }
}

/// Reports verdicts to a deployment orchestrator endpoint.
#[derive(Debug, Clone)]
pub struct HttpDeploymentOrchestrator {
    endpoint: String,
    http: HttpClient,
}

impl HttpDeploymentOrchestrator {
    /// Creates a reporter posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: checked_base_url(endpoint.into())?,
            http: client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DeploymentOrchestrator for HttpDeploymentOrchestrator {
    async fn report(&self, report: &VerdictReport) -> anyhow::Result<()> {
        debug!(endpoint = %self.endpoint, status = %report.status, "Reporting verdict");
        let response = self
            .http
            .post(&self.endpoint)
            .header(TARGET_HEADER, REPORT_TARGET)
            .json(report)
            .send()
            .await
            .context("failed to reach deployment orchestrator")?;
        ensure_success(response, "verdict report").await
    }
}
