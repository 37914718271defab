use crate::api::ApiClient;
use crate::retry::{RetryPolicy, retry};
use crate::wallet::Wallet;
use anyhow::Result;
use tracing::info;

/// Per-identity credentials from a completed handshake. Never reused
/// across identities; the server-side expiry is not tracked locally.
pub struct Session {
    pub token: String,
}

/// Nonce fetch, local challenge signing, signature verification. The two
/// network steps run under the retry policy; signing is local and a
/// signing failure is fatal for this identity. Exhausted retries fail
/// this identity only — the orchestrator catches and moves on.
pub async fn authenticate(api: &ApiClient, wallet: &Wallet, policy: RetryPolicy) -> Result<Session> {
    let address = wallet.address();
    let nonce = retry(policy, "fetch nonce", || api.get_nonce(&address)).await?;
    let signature = wallet.sign_auth_message(&nonce)?;
    let token = retry(policy, "verify signature", || {
        api.verify_signature(&nonce, &signature)
    })
    .await?;
    info!("Token retrieved for {}", wallet.short_address());
    Ok(Session { token })
}
