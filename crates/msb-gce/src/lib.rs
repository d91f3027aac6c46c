//! Compute Engine adapter.
//!
//! Talks to the Compute REST API (v1) with `reqwest`. Long-running start/stop
//! operations are polled through the zone operations `wait` endpoint.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use msb_core::{
    domain::InstanceRef,
    errors::Error,
    ports::{
        ComputePort, InstanceView, LongRunningOperation, OperationError, OperationReport,
        OperationWarning,
    },
    Result,
};

pub const DEFAULT_API_BASE: &str = "https://compute.googleapis.com/compute/v1";
/// Per-request bound. Longer than the operation wait, shorter than the
/// webhook's own request timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(100);
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Compute Engine client bound to one set of credentials.
#[derive(Clone, Debug)]
pub struct GceClient {
    http: reqwest::Client,
    api_base: String,
    metadata_token_url: String,
    token: Arc<OnceCell<String>>,
}

impl GceClient {
    /// `access_token` short-circuits the metadata server lookup.
    pub fn new(api_base: Option<String>, access_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("compute client build error: {e}")))?;

        let token = match access_token {
            Some(t) => OnceCell::new_with(Some(t)),
            None => OnceCell::new(),
        };

        Ok(Self {
            http,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
            token: Arc::new(token),
        })
    }

    /// Fetch tokens from a metadata endpoint other than the GCE default.
    pub fn with_metadata_token_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_token_url = url.into();
        self
    }

    fn instance_url(&self, i: &InstanceRef) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.api_base, i.project, i.zone, i.instance
        )
    }

    fn operation_wait_url(&self, i: &InstanceRef, operation: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/operations/{}/wait",
            self.api_base, i.project, i.zone, operation
        )
    }

    async fn access_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| fetch_metadata_token(&self.http, &self.metadata_token_url))
            .await?;
        Ok(token.as_str())
    }

    async fn post(&self, url: &str) -> Result<serde_json::Value> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| Error::External(format!("compute request error: {e}")))?;
        read_json(resp).await
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::External(format!("compute request error: {e}")))?;
        read_json(resp).await
    }

    async fn begin(
        &self,
        instance: &InstanceRef,
        verb: &str,
    ) -> Result<Box<dyn LongRunningOperation>> {
        let url = format!("{}/{verb}", self.instance_url(instance));
        let raw = self.post(&url).await?;
        let op = OperationResource::from_value(raw)?;
        tracing::debug!("Compute operation {} ({verb}) is {}.", op.name, op.status);

        Ok(Box::new(GceOperation {
            client: self.clone(),
            instance: instance.clone(),
            current: op,
        }))
    }
}

#[async_trait]
impl ComputePort for GceClient {
    async fn start(&self, instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>> {
        self.begin(instance, "start").await
    }

    async fn stop(&self, instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>> {
        self.begin(instance, "stop").await
    }

    async fn get(&self, instance: &InstanceRef) -> Result<InstanceView> {
        #[derive(Deserialize)]
        struct Instance {
            #[serde(default)]
            status: String,
        }

        let raw = self.get_json(&self.instance_url(instance)).await?;
        let inst: Instance = serde_json::from_value(raw)?;
        Ok(InstanceView {
            status: inst.status,
        })
    }
}

/// A zonal operation that is polled until `DONE`.
pub struct GceOperation {
    client: GceClient,
    instance: InstanceRef,
    current: OperationResource,
}

#[async_trait]
impl LongRunningOperation for GceOperation {
    fn id(&self) -> &str {
        &self.current.name
    }

    async fn wait_done(&mut self) -> Result<OperationReport> {
        while !self.current.is_done() {
            let url = self
                .client
                .operation_wait_url(&self.instance, &self.current.name);
            let raw = self.client.post(&url).await?;
            self.current = OperationResource::from_value(raw)?;
        }
        Ok(self.current.report())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ErrorList {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    http_error_status_code: Option<i64>,
    #[serde(default)]
    http_error_message: Option<String>,
    #[serde(default)]
    error: Option<ErrorList>,
    #[serde(default)]
    warnings: Vec<ErrorEntry>,
    #[serde(skip)]
    raw: serde_json::Value,
}

impl OperationResource {
    fn from_value(raw: serde_json::Value) -> Result<Self> {
        let mut op: Self = serde_json::from_value(raw.clone())?;
        op.raw = raw;
        Ok(op)
    }

    fn is_done(&self) -> bool {
        self.status == "DONE"
    }

    fn report(&self) -> OperationReport {
        let errors = self
            .error
            .as_ref()
            .map(|e| e.errors.as_slice())
            .unwrap_or_default();

        let error = if self.http_error_status_code.is_some() || !errors.is_empty() {
            let code = self
                .http_error_status_code
                .map(|c| c.to_string())
                .or_else(|| errors.first().map(|e| e.code.clone()))
                .unwrap_or_default();
            let message = self.http_error_message.clone().unwrap_or_else(|| {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            });
            Some(OperationError { code, message })
        } else {
            None
        };

        OperationReport {
            error,
            warnings: self
                .warnings
                .iter()
                .map(|w| OperationWarning {
                    code: w.code.clone(),
                    message: w.message.clone(),
                })
                .collect(),
            result: self.raw.clone(),
        }
    }
}

async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::External(format!(
            "compute api failed: {status} {}",
            body.chars().take(200).collect::<String>()
        )));
    }
    resp.json()
        .await
        .map_err(|e| Error::External(format!("compute json error: {e}")))
}

async fn fetch_metadata_token(http: &reqwest::Client, url: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct Token {
        access_token: String,
    }

    let resp = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| Error::External(format!("metadata token request error: {e}")))?;
    let raw = read_json(resp).await?;
    let token: Token = serde_json::from_value(raw)?;
    Ok(token.access_token)
}
