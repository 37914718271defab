use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

pub const API_BASE: &str = "https://api.stobix.com";
pub const SITE_BASE: &str = "https://stobix.com";

/// Network context sent with every verification request (Base mainnet).
pub const CHAIN_ID: u64 = 8453;

/// Marker the mining-start endpoint puts in a 400-class body when the
/// account already has an active mining timer.
const ALREADY_MINING_MARKER: &str = "already mining";

/// Thin client over the Stobix HTTP API. One instance per identity so the
/// proxy choice baked into `http` stays per-identity.
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    site_base: String,
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    points: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MineResponse {
    amount: Option<f64>,
    #[serde(default, rename = "claimAt")]
    claim_at: serde_json::Value,
}

/// Outcome of a single claim attempt. `claimed: false` covers the
/// already-claimed rejection, which is an alternate success, not an error.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub claimed: bool,
}

#[derive(Debug)]
pub enum MiningStart {
    Started {
        amount: f64,
        claim_at: DateTime<Utc>,
    },
    AlreadyMining,
}

impl ApiClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_bases(http, API_BASE, SITE_BASE)
    }

    pub fn with_bases(http: reqwest::Client, api_base: &str, site_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            site_base: site_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_nonce(&self, address: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/auth/nonce", self.api_base))
            .json(&json!({ "address": address }))
            .send()
            .await
            .context("nonce request failed")?
            .error_for_status()
            .context("nonce request rejected")?;
        let body: NonceResponse = response.json().await.context("invalid nonce response")?;
        Ok(body.nonce)
    }

    pub async fn verify_signature(&self, nonce: &str, signature: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/auth/web3/verify", self.api_base))
            .json(&json!({ "nonce": nonce, "signature": signature, "chain": CHAIN_ID }))
            .send()
            .await
            .context("verify request failed")?
            .error_for_status()
            .context("signature verification rejected")?;
        let body: VerifyResponse = response.json().await.context("invalid verify response")?;
        Ok(body.token)
    }

    /// Best-effort claim. A 400-class status means the task was already
    /// claimed and is reported as `claimed: false`; only transport-level
    /// failures surface as errors.
    pub async fn claim_task(&self, token: &str, task_id: &str) -> Result<TaskResult> {
        let response = self
            .http
            .post(format!("{}/v1/loyalty/tasks/claim", self.api_base))
            .bearer_auth(token)
            .json(&json!({ "taskId": task_id }))
            .send()
            .await
            .with_context(|| format!("claim request for {task_id} failed"))?;
        if response.status().is_client_error() {
            info!("Task {}: already claimed", task_id);
            return Ok(TaskResult {
                task_id: task_id.to_string(),
                claimed: false,
            });
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("claim request for {task_id} rejected"))?;
        let body: ClaimResponse = response.json().await.context("invalid claim response")?;
        info!(
            "Claimed task {}: {} points",
            task_id,
            body.points.unwrap_or(0.0)
        );
        Ok(TaskResult {
            task_id: task_id.to_string(),
            claimed: true,
        })
    }

    pub async fn start_mining(&self, token: &str) -> Result<MiningStart> {
        let response = self
            .http
            .post(format!("{}/v1/loyalty/points/mine", self.api_base))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .context("mining start request failed")?;
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            if body.to_lowercase().contains(ALREADY_MINING_MARKER) {
                return Ok(MiningStart::AlreadyMining);
            }
            return Err(anyhow!("mining start rejected ({status}): {body}"));
        }
        let response = response
            .error_for_status()
            .context("mining start rejected")?;
        let body: MineResponse = response.json().await.context("invalid mining response")?;
        let claim_at = parse_claim_at(&body.claim_at)
            .ok_or_else(|| anyhow!("mining response missing claimAt"))?;
        Ok(MiningStart::Started {
            amount: body.amount.unwrap_or(0.0),
            claim_at,
        })
    }

    /// Queries current account state for the active mining timer. Returns
    /// `None` when the server does not report a claim timestamp.
    pub async fn mining_status(&self, token: &str) -> Result<Option<DateTime<Utc>>> {
        let response = self
            .http
            .get(format!("{}/v1/loyalty/points/mine", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .context("mining status request failed")?
            .error_for_status()
            .context("mining status request rejected")?;
        let body: serde_json::Value = response
            .json()
            .await
            .context("invalid mining status response")?;
        let claim_at = body
            .get("claimAt")
            .or_else(|| body.get("user").and_then(|user| user.get("claimAt")));
        Ok(claim_at.and_then(parse_claim_at))
    }

    /// Fire-and-forget referral attribution visit; the response only
    /// matters for logging.
    pub async fn visit_referral(&self, code: &str) {
        let url = format!("{}/invite/{}", self.site_base, code);
        match self.http.get(&url).send().await {
            Ok(_) => info!("Visited referral link: {}", code),
            Err(e) => warn!("Failed to visit referral link {}: {}", code, e),
        }
    }
}

// The service has reported claim times both as epoch milliseconds and as
// RFC 3339 text; accept either.
fn parse_claim_at(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}
