use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

const ACCOUNTS_HEADER: &str = "# Stobix accounts\n# Format: address,private_key,referral_code\n\n";

/// One persisted identity. Records are append-only, written one full line
/// at a time so the file stays parseable after a crash.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub address: String,
    pub private_key: String,
    pub referral_code: String,
}

pub fn append_account(path: &Path, record: &AccountRecord) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        file.write_all(ACCOUNTS_HEADER.as_bytes())?;
    }
    let line = format!(
        "{},{},{}\n",
        record.address, record.private_key, record.referral_code
    );
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Mirrors a secret into the `PRIVATE_KEY_<n>=<hex>` key list, numbering
/// after the existing entries.
pub fn append_wallet_key(path: &Path, key: &str) -> Result<()> {
    let existing = std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .filter(|line| line.contains("PRIVATE_KEY_"))
                .count()
        })
        .unwrap_or(0);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let line = format!("PRIVATE_KEY_{}={}\n", existing + 1, key);
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Loads secrets from every configured source, deduplicated by value in
/// first-seen order: the key list, the account CSV, then the environment.
/// Malformed or empty entries are skipped with a warning, never fatal.
pub fn load_private_keys(
    wallets_file: &Path,
    accounts_file: &Path,
    env: impl Iterator<Item = (String, String)>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    if let Ok(content) = std::fs::read_to_string(wallets_file) {
        let mut found = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || !line.contains("PRIVATE_KEY_") {
                continue;
            }
            match line.split_once('=') {
                Some((_, value)) if !value.trim().is_empty() => {
                    found += 1;
                    push_unique(&mut seen, &mut keys, value.trim());
                }
                _ => warn!(
                    "Skipping malformed line in {}: {}",
                    wallets_file.display(),
                    line
                ),
            }
        }
        info!("Found {} wallets in {}", found, wallets_file.display());
    } else {
        warn!("Note: {} not found or empty", wallets_file.display());
    }

    if let Ok(content) = std::fs::read_to_string(accounts_file) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split(',');
            match (parts.next(), parts.next()) {
                (Some(_), Some(key)) if !key.trim().is_empty() => {
                    push_unique(&mut seen, &mut keys, key.trim());
                }
                _ => warn!(
                    "Skipping malformed account line in {}: {}",
                    accounts_file.display(),
                    line
                ),
            }
        }
    }

    let mut env_found = 0;
    for (name, value) in env {
        if name.starts_with("PRIVATE_KEY_") && !value.trim().is_empty() {
            env_found += 1;
            push_unique(&mut seen, &mut keys, value.trim());
        }
    }
    if env_found > 0 {
        info!("Found {} wallets in the environment", env_found);
    }

    keys
}

fn push_unique(seen: &mut HashSet<String>, keys: &mut Vec<String>, key: &str) {
    if seen.insert(key.to_string()) {
        keys.push(key.to_string());
    }
}
