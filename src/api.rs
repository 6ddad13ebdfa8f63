/// Thin client for the remote minting/ancestry API. No capture logic here,
/// just request building and JSON passthrough.
use crate::session::SignatureSession;
use crate::waiter::{AcquireError, SignatureWaiter};
use serde_json::Value;
use std::time::Duration;

/// Errors from remote API operations.
#[derive(Debug)]
pub enum ApiError {
    /// An operation needed a captured signature and none was held.
    NoSignature,
    /// Transport or HTTP-status failure from the remote API.
    Http(reqwest::Error),
    /// The capture step of a composite flow failed.
    Acquire(AcquireError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NoSignature => write!(
                f,
                "no signature has been captured; run the signing flow first"
            ),
            ApiError::Http(e) => write!(f, "remote API request failed: {}", e),
            ApiError::Acquire(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::NoSignature => None,
            ApiError::Http(e) => Some(e),
            ApiError::Acquire(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e)
    }
}

/// Parameters for minting an IP asset job record.
#[derive(Debug, Clone)]
pub struct IpJobRequest {
    pub receiver: String,
    pub job_id: String,
    pub biosample_serial: i64,
    pub opencravat_version: String,
    pub num_unique_var: String,
    pub owner: String,
    pub submission_time: String,
    pub assembly: String,
    pub ip_asset: String,
}

/// Remote API client.
pub struct MintClient {
    http: reqwest::Client,
    base_url: String,
}

impl MintClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Mint an IP asset job record. No signature involved.
    pub async fn mint_ip_job(&self, job: &IpJobRequest) -> Result<Value, ApiError> {
        tracing::info!(job_id = %job.job_id, "minting IP job");
        let response = self
            .http
            .post(format!("{}/mint_ipa_job", self.base_url))
            .query(&[
                ("receiver", job.receiver.as_str()),
                ("job_id", job.job_id.as_str()),
                ("biosample_serial", &job.biosample_serial.to_string()),
                ("opencravat_version", job.opencravat_version.as_str()),
                ("num_unique_var", job.num_unique_var.as_str()),
                ("owner", job.owner.as_str()),
                ("submission_time", job.submission_time.as_str()),
                ("assembly", job.assembly.as_str()),
                ("ip_asset", job.ip_asset.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Mint a license token with the captured signature.
    ///
    /// The signature is taken, not peeked: the slot is cleared before the
    /// request goes out, so the same signature can never feed two mint
    /// attempts, whether or not the remote call succeeds.
    pub async fn mint_license_token(
        &self,
        session: &SignatureSession,
        ip_asset: &str,
        receiver: &str,
    ) -> Result<Value, ApiError> {
        let signature = session.take().ok_or(ApiError::NoSignature)?;
        tracing::info!(ip_asset, receiver, "minting license token");
        let response = self
            .http
            .post(format!("{}/mint_license_token", self.base_url))
            .query(&[
                ("ip_asset", ip_asset),
                ("receiver", receiver),
                ("user_signature", signature.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch ancestry results for the signature holder. Peeks rather than
    /// takes: a status query does not consume the capture.
    pub async fn ancestry_results(&self, session: &SignatureSession) -> Result<Value, ApiError> {
        let signature = session.peek().ok_or(ApiError::NoSignature)?;
        let response = self
            .http
            .get(format!("{}/api_somos_dao/get_results", self.base_url))
            .query(&[("user_signature", signature.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Mint the signature holder's ancestry results as an IP asset. Peeks
    /// like the ancestry fetch: the capture stays available for follow-up
    /// queries.
    pub async fn mint_ancestry_ip_asset(
        &self,
        session: &SignatureSession,
    ) -> Result<Value, ApiError> {
        let signature = session.peek().ok_or(ApiError::NoSignature)?;
        tracing::info!("minting ancestry IP asset");
        let response = self
            .http
            .post(format!(
                "{}/api_somos_dao/min_ancestry_ip_asset",
                self.base_url
            ))
            // Parameter spelling matches the remote endpoint
            .query(&[("user_singature", signature.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Acquire-then-consume composite: capture a signature, then spend it on a
/// license-token mint. On timeout the server is already stopped and no mint
/// is attempted.
pub async fn mint_license_token_flow(
    client: &MintClient,
    waiter: &SignatureWaiter,
    poll_interval: Duration,
    max_attempts: u32,
    ip_asset: &str,
    receiver: &str,
) -> Result<Value, ApiError> {
    waiter
        .acquire(poll_interval, max_attempts)
        .await
        .map_err(ApiError::Acquire)?;
    client
        .mint_license_token(waiter.session(), ip_asset, receiver)
        .await
}
