use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::{
    Error, Result,
    config::{API_KEY_VAR, Config},
    error::TransportError,
    polling::{self, BoxFuture, Cadence, TaskBackend, TaskFamily},
    request::TaskRequest,
    task::{TaskEnvelope, TaskHandle, TaskOutput, TaskResult},
};

/// Ceiling for a single API call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ASYNC_HEADER: &str = "X-DashScope-Async";
const OSS_RESOLVE_HEADER: &str = "X-DashScope-OssResourceResolve";

/// Credential, base URL and a pooled HTTP client. Shared by every endpoint.
#[derive(Clone)]
pub struct Connection {
    http: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Reads the key from `DASHSCOPE_API_KEY`. A missing key is an error here,
    /// not on the first request.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        Self::from_key(std::env::var(API_KEY_VAR).ok(), base_url)
    }

    /// Fails with [`Error::MissingCredential`] if `api_key` is absent or blank.
    pub fn from_key(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingCredential(API_KEY_VAR))?;
        Ok(Self::new(api_key, base_url))
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(self.url(path))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }

    /// Sends the request and decodes a 2xx JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::from_response(status, &body).into());
        }
        debug!("Response body: {body}");
        serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("{e} in body:\n{body}")))
    }
}

/// Client for DashScope's asynchronous generation tasks: submit, poll, wait.
///
/// Stateless apart from the connection and the polling cadences, so clones are
/// cheap and independent. Tasks are handled strictly one at a time per call;
/// run several clients to generate in parallel.
#[derive(Debug, Clone)]
pub struct AsyncTaskClient {
    conn: Connection,
    short: Cadence,
    long: Cadence,
}

impl AsyncTaskClient {
    pub fn new(conn: Connection, config: &Config) -> Self {
        Self {
            conn,
            short: config.cadence(TaskFamily::Short),
            long: config.cadence(TaskFamily::Long),
        }
    }

    pub fn from_env(config: &Config) -> Result<Self> {
        Ok(Self::new(Connection::from_env(&config.base_url)?, config))
    }

    pub fn with_cadence(mut self, family: TaskFamily, cadence: Cadence) -> Self {
        match family {
            TaskFamily::Short => self.short = cadence,
            TaskFamily::Long => self.long = cadence,
        }
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn cadence(&self, family: TaskFamily) -> Cadence {
        match family {
            TaskFamily::Short => self.short,
            TaskFamily::Long => self.long,
        }
    }

    /// Validates and submits `request`. Invalid requests never reach the network.
    pub async fn submit(&self, request: &TaskRequest) -> Result<TaskHandle> {
        request.validate()?;

        let mut builder = self
            .conn
            .post(request.endpoint())
            .header(ASYNC_HEADER, "enable")
            .json(&request.payload());
        if request.uses_oss_resources() {
            builder = builder.header(OSS_RESOLVE_HEADER, "enable");
        }
        debug!(
            "Submitting to {}: {}",
            request.endpoint(),
            serde_json::to_string(&request.payload()).unwrap_or_default()
        );

        let handle = self
            .conn
            .send_json::<TaskEnvelope>(builder)
            .await?
            .into_handle()?;
        info!("Created task {handle}");
        Ok(handle)
    }

    pub async fn poll(&self, handle: &TaskHandle) -> Result<TaskResult> {
        self.conn
            .send_json::<TaskEnvelope>(self.conn.get(&format!("tasks/{handle}")))
            .await?
            .into_result(handle)
    }

    pub async fn await_completion(
        &self,
        handle: &TaskHandle,
        max_wait: Duration,
        interval: Duration,
    ) -> Result<TaskOutput> {
        polling::await_completion(self, handle, max_wait, interval).await
    }

    /// Submits and waits, polling at the interval configured for the request's family.
    pub async fn generate(&self, request: &TaskRequest, max_wait: Duration) -> Result<TaskOutput> {
        let cadence = Cadence {
            max_wait,
            ..self.cadence(request.family())
        };
        polling::generate(self, request, cadence).await
    }
}

impl TaskBackend for AsyncTaskClient {
    fn submit<'a>(&'a self, request: &'a TaskRequest) -> BoxFuture<'a, Result<TaskHandle>> {
        Box::pin(AsyncTaskClient::submit(self, request))
    }

    fn poll<'a>(&'a self, handle: &'a TaskHandle) -> BoxFuture<'a, Result<TaskResult>> {
        Box::pin(AsyncTaskClient::poll(self, handle))
    }
}
