use crate::api::ApiClient;
use crate::auth;
use crate::mining::{self, ClaimTime};
use crate::proxy;
use crate::retry::RetryPolicy;
use crate::store::{self, AccountRecord};
use crate::wallet::Wallet;
use anyhow::Result;
use rand::Rng;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Loyalty tasks claimed for every freshly referred account.
pub const DEFAULT_TASKS: &[&str] = &[
    "follow_x",
    "join_discord",
    "join_telegram_channel",
    "join_telegram_chat",
    "start_telegram_bot",
    "leave_trustpilot_review",
];

/// Request pacing. The inter-identity delay is drawn fresh from the range
/// for every identity so the request pattern stays irregular.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub task_delay: Duration,
    pub account_delay_ms: Range<u64>,
}

impl Pacing {
    pub fn referral() -> Self {
        Self {
            task_delay: Duration::from_millis(2000),
            account_delay_ms: 5000..10000,
        }
    }

    pub fn mining() -> Self {
        Self {
            task_delay: Duration::from_millis(2000),
            account_delay_ms: 2000..5000,
        }
    }

    pub fn zero() -> Self {
        Self {
            task_delay: Duration::ZERO,
            account_delay_ms: 0..1,
        }
    }

    fn account_delay(&self) -> Duration {
        if self.account_delay_ms.is_empty() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.account_delay_ms.clone());
        Duration::from_millis(ms)
    }
}

/// Drives identities through referral visit, handshake, task claims and
/// mining, one at a time. A failed identity is logged and skipped; the
/// batch always continues.
pub struct Campaign {
    pub api_base: String,
    pub site_base: String,
    pub proxies: Vec<String>,
    pub accounts_file: PathBuf,
    pub wallets_file: PathBuf,
    pub tasks: Vec<String>,
    pub pacing: Pacing,
    pub retry: RetryPolicy,
}

pub struct CreatedAccount {
    pub address: String,
    pub claim_at: ClaimTime,
}

impl Campaign {
    /// Fresh client per identity: the proxy pick is independent across
    /// identities and never reused.
    fn api_for_identity(&self) -> ApiClient {
        let http = proxy::client_for(proxy::pick(&self.proxies));
        ApiClient::with_bases(http, &self.api_base, &self.site_base)
    }

    /// Creates `count` wallets under the referral code. Each success is
    /// persisted immediately so partial progress survives a crash.
    pub async fn run_referral(&self, code: &str, count: usize) -> Result<Vec<CreatedAccount>> {
        let mut created = Vec::new();
        for i in 1..=count {
            info!("[{}/{}] Creating new wallet...", i, count);
            let wallet = Wallet::generate();
            info!("Wallet created: {}", wallet.short_address());

            match self.process_new_wallet(&wallet, code).await {
                Ok(claim_at) => {
                    self.persist(&wallet, code);
                    created.push(CreatedAccount {
                        address: wallet.address(),
                        claim_at,
                    });
                }
                Err(e) => error!(
                    "Failed to process wallet {}: {:#}",
                    wallet.short_address(),
                    e
                ),
            }

            if i < count {
                let delay = self.pacing.account_delay();
                info!(
                    "Waiting {:.1} seconds before next account...",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }
        info!(
            "All accounts processed! {} of {} wallets created.",
            created.len(),
            count
        );
        Ok(created)
    }

    async fn process_new_wallet(&self, wallet: &Wallet, code: &str) -> Result<ClaimTime> {
        let api = self.api_for_identity();
        api.visit_referral(code).await;

        let session = auth::authenticate(&api, wallet, self.retry).await?;

        let mut completed = 0;
        for task in &self.tasks {
            match api.claim_task(&session.token, task).await {
                Ok(result) if result.claimed => completed += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to claim task {}: {:#}", task, e),
            }
            tokio::time::sleep(self.pacing.task_delay).await;
        }
        if !self.tasks.is_empty() {
            info!(
                "Completed {}/{} tasks for {}",
                completed,
                self.tasks.len(),
                wallet.short_address()
            );
        }

        let claim_at =
            mining::ensure_mining(&api, &session.token, &wallet.address(), self.retry).await?;
        info!(
            "Next claim time for {}: {}",
            wallet.short_address(),
            claim_at
        );
        Ok(claim_at)
    }

    fn persist(&self, wallet: &Wallet, code: &str) {
        let record = AccountRecord {
            address: wallet.address(),
            private_key: wallet.private_key_hex(),
            referral_code: code.to_string(),
        };
        match store::append_account(&self.accounts_file, &record) {
            Ok(()) => info!(
                "Saved account {} to {}",
                wallet.short_address(),
                self.accounts_file.display()
            ),
            Err(e) => error!(
                "Failed to persist account {}: {:#}",
                wallet.short_address(),
                e
            ),
        }
        if let Err(e) = store::append_wallet_key(&self.wallets_file, &record.private_key) {
            error!(
                "Failed to mirror key into {}: {:#}",
                self.wallets_file.display(),
                e
            );
        }
    }

    /// Authenticates every stored key and starts its mining timer.
    /// Returns how many identities succeeded.
    pub async fn run_mining(&self, keys: &[String]) -> usize {
        let mut success = 0;
        for (i, key) in keys.iter().enumerate() {
            let wallet = match Wallet::from_private_key(key) {
                Ok(wallet) => wallet,
                Err(e) => {
                    warn!("Skipping wallet {}: {:#}", i + 1, e);
                    continue;
                }
            };
            info!(
                "[{}/{}] Processing wallet: {}",
                i + 1,
                keys.len(),
                wallet.short_address()
            );

            let api = self.api_for_identity();
            let outcome = async {
                let session = auth::authenticate(&api, &wallet, self.retry).await?;
                mining::ensure_mining(&api, &session.token, &wallet.address(), self.retry).await
            }
            .await;
            match outcome {
                Ok(claim_at) => {
                    success += 1;
                    info!(
                        "Mining started for {}. Next claim time: {}",
                        wallet.short_address(),
                        claim_at
                    );
                }
                Err(e) => error!("Failed to process wallet {}: {:#}", i + 1, e),
            }

            if i + 1 < keys.len() {
                let delay = self.pacing.account_delay();
                info!(
                    "Waiting {:.1} seconds before next wallet...",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }
        info!(
            "Mining started for {} out of {} wallets",
            success,
            keys.len()
        );
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as AxumPath, State};
    use axum::routing::{get, post};
    use axum::{Json, Router, http::StatusCode};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockState {
        nonce_calls: Arc<AtomicUsize>,
        verify_calls: Arc<AtomicUsize>,
        verify_failures: Arc<AtomicUsize>,
        claims: Arc<Mutex<Vec<String>>>,
        already_claimed: Arc<Mutex<HashSet<String>>>,
        referral_visits: Arc<Mutex<Vec<String>>>,
        mine_calls: Arc<AtomicUsize>,
    }

    async fn spawn(state: MockState) -> String {
        let app = Router::new()
            .route(
                "/v1/auth/nonce",
                post(|State(s): State<MockState>, Json(body): Json<serde_json::Value>| async move {
                    let n = s.nonce_calls.fetch_add(1, Ordering::SeqCst);
                    assert!(body["address"].as_str().unwrap().starts_with("0x"));
                    Json(serde_json::json!({ "nonce": format!("nonce-{n}") }))
                }),
            )
            .route(
                "/v1/auth/web3/verify",
                post(|State(s): State<MockState>, Json(body): Json<serde_json::Value>| async move {
                    s.verify_calls.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(body["chain"], 8453);
                    if s.verify_failures.load(Ordering::SeqCst) > 0 {
                        s.verify_failures.fetch_sub(1, Ordering::SeqCst);
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(serde_json::json!({ "error": "unavailable" })),
                        );
                    }
                    (StatusCode::OK, Json(serde_json::json!({ "token": "tok" })))
                }),
            )
            .route(
                "/v1/loyalty/tasks/claim",
                post(|State(s): State<MockState>, Json(body): Json<serde_json::Value>| async move {
                    let task = body["taskId"].as_str().unwrap().to_string();
                    s.claims.lock().unwrap().push(task.clone());
                    if !s.already_claimed.lock().unwrap().insert(task) {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({ "error": "already claimed" })),
                        );
                    }
                    (StatusCode::OK, Json(serde_json::json!({ "points": 10 })))
                }),
            )
            .route(
                "/v1/loyalty/points/mine",
                post(|State(s): State<MockState>| async move {
                    s.mine_calls.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({ "amount": 5, "claimAt": 1_900_000_000_000i64 }))
                }),
            )
            .route(
                "/invite/:code",
                get(|State(s): State<MockState>, AxumPath(code): AxumPath<String>| async move {
                    s.referral_visits.lock().unwrap().push(code);
                    "ok"
                }),
            )
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn temp_path(name: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("stobix-campaign-{}-{}", name, std::process::id()));
        std::fs::remove_file(&path).ok();
        path
    }

    fn campaign(base: &str, name: &str, tasks: &[&str]) -> Campaign {
        Campaign {
            api_base: base.to_string(),
            site_base: base.to_string(),
            proxies: Vec::new(),
            accounts_file: temp_path(&format!("{name}-accounts")),
            wallets_file: temp_path(&format!("{name}-wallets")),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            pacing: Pacing::zero(),
            retry: RetryPolicy::no_delay(),
        }
    }

    fn cleanup(c: &Campaign) {
        std::fs::remove_file(&c.accounts_file).ok();
        std::fs::remove_file(&c.wallets_file).ok();
    }

    fn persisted_records(c: &Campaign) -> Vec<String> {
        std::fs::read_to_string(&c.accounts_file)
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
            .map(|l| l.to_string())
            .collect()
    }

    #[tokio::test]
    async fn referral_run_persists_every_successful_account() {
        let state = MockState::default();
        let base = spawn(state.clone()).await;
        let c = campaign(&base, "ok", &["follow_x", "join_discord"]);

        let created = c.run_referral("ABC123", 2).await.unwrap();
        assert_eq!(created.len(), 2);
        let addresses: HashSet<_> = created.iter().map(|a| a.address.clone()).collect();
        assert_eq!(addresses.len(), 2);
        for account in &created {
            assert!(matches!(account.claim_at, ClaimTime::Confirmed(_)));
        }

        let records = persisted_records(&c);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert!(record.ends_with(",ABC123"));
        }
        // Full task list attempted per identity, referral visited per identity.
        assert_eq!(state.claims.lock().unwrap().len(), 4);
        assert_eq!(
            state.referral_visits.lock().unwrap().as_slice(),
            ["ABC123", "ABC123"]
        );
        assert_eq!(state.mine_calls.load(Ordering::SeqCst), 2);
        cleanup(&c);
    }

    #[tokio::test]
    async fn failed_handshake_skips_that_identity_only() {
        let state = MockState::default();
        // First identity exhausts all 3 verify attempts, second succeeds.
        state.verify_failures.store(3, Ordering::SeqCst);
        let base = spawn(state.clone()).await;
        let c = campaign(&base, "skip", &["follow_x"]);

        let created = c.run_referral("ABC123", 2).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(persisted_records(&c).len(), 1);
        assert_eq!(state.verify_calls.load(Ordering::SeqCst), 4);
        cleanup(&c);
    }

    #[tokio::test]
    async fn already_claimed_tasks_do_not_fail_the_identity() {
        let state = MockState::default();
        state
            .already_claimed
            .lock()
            .unwrap()
            .insert("follow_x".to_string());
        let base = spawn(state.clone()).await;
        let c = campaign(&base, "claimed", &["follow_x", "join_discord"]);

        let created = c.run_referral("ABC123", 1).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(persisted_records(&c).len(), 1);
        cleanup(&c);
    }

    #[tokio::test]
    async fn mining_run_counts_successes_and_skips_bad_keys() {
        let state = MockState::default();
        let base = spawn(state.clone()).await;
        let c = campaign(&base, "mine", &[]);

        let keys = vec![
            Wallet::generate().private_key_hex(),
            "garbage".to_string(),
            Wallet::generate().private_key_hex(),
        ];
        let success = c.run_mining(&keys).await;
        assert_eq!(success, 2);
        assert_eq!(state.mine_calls.load(Ordering::SeqCst), 2);
        cleanup(&c);
    }

    #[tokio::test]
    async fn empty_task_list_is_the_mining_only_path() {
        let state = MockState::default();
        let base = spawn(state.clone()).await;
        let c = campaign(&base, "notasks", &[]);

        let created = c.run_referral("ABC123", 1).await.unwrap();
        assert_eq!(created.len(), 1);
        assert!(state.claims.lock().unwrap().is_empty());
        assert_eq!(state.mine_calls.load(Ordering::SeqCst), 1);
        cleanup(&c);
    }
}
