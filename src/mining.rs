use crate::api::{ApiClient, MiningStart};
use crate::retry::{RetryPolicy, retry};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{info, warn};

/// Applied when the server says "already mining" but will not reveal the
/// real timer; matches the service's mining interval.
const FALLBACK_MINING_HOURS: i64 = 8;

/// When the next mining claim becomes eligible. `Estimated` marks the
/// local fallback so output never passes it off as server-confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimTime {
    Confirmed(DateTime<Utc>),
    Estimated(DateTime<Utc>),
}

impl ClaimTime {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Confirmed(t) | Self::Estimated(t) => *t,
        }
    }
}

impl fmt::Display for ClaimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
            Self::Estimated(t) => write!(f, "{} (estimated)", t.format("%Y-%m-%d %H:%M:%S UTC")),
        }
    }
}

/// Starts mining for an authenticated identity and reports when the next
/// claim is due. "Already mining" is recovered through the status query;
/// only if that also yields nothing does the local estimate apply, so the
/// batch can proceed. Safe to call again for the same identity.
pub async fn ensure_mining(
    api: &ApiClient,
    token: &str,
    address: &str,
    policy: RetryPolicy,
) -> Result<ClaimTime> {
    match retry(policy, "start mining", || api.start_mining(token)).await? {
        MiningStart::Started { amount, claim_at } => {
            info!("Mining started for {}: {} points", address, amount);
            Ok(ClaimTime::Confirmed(claim_at))
        }
        MiningStart::AlreadyMining => {
            info!("{} is already mining, querying status for the timer", address);
            match api.mining_status(token).await {
                Ok(Some(claim_at)) => Ok(ClaimTime::Confirmed(claim_at)),
                Ok(None) => {
                    warn!(
                        "No claim timestamp reported for {}, estimating locally",
                        address
                    );
                    Ok(ClaimTime::Estimated(fallback_claim_time()))
                }
                Err(e) => {
                    warn!("Mining status query failed for {}: {}", address, e);
                    Ok(ClaimTime::Estimated(fallback_claim_time()))
                }
            }
        }
    }
}

fn fallback_claim_time() -> DateTime<Utc> {
    Utc::now() + Duration::hours(FALLBACK_MINING_HOURS)
}
