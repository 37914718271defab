use rand::Rng;
use std::path::Path;
use tracing::{info, warn};

/// Reads a newline-separated proxy list. A missing or empty file is not an
/// error; the run simply proceeds without proxies.
pub fn load_proxies(path: &Path) -> Vec<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            warn!(
                "No proxies found in {}. Proceeding without proxy.",
                path.display()
            );
            return Vec::new();
        }
    };
    let proxies: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize)
        .collect();
    if proxies.is_empty() {
        warn!(
            "No proxies found in {}. Proceeding without proxy.",
            path.display()
        );
    } else {
        info!("Loaded {} proxies", proxies.len());
    }
    proxies
}

// Entries without an explicit scheme default to plain HTTP.
fn normalize(entry: &str) -> String {
    if entry.starts_with("http") {
        entry.to_string()
    } else {
        format!("http://{entry}")
    }
}

/// Uniform-random pick; a new pick happens at every call site, no endpoint
/// is remembered or retried.
pub fn pick(proxies: &[String]) -> Option<&str> {
    if proxies.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..proxies.len());
    Some(&proxies[idx])
}

/// Builds the HTTP client for one identity. An endpoint that fails to
/// parse or construct is logged and dropped for this request context only.
pub fn client_for(proxy: Option<&str>) -> reqwest::Client {
    if let Some(url) = proxy {
        match reqwest::Proxy::all(url) {
            Ok(p) => match reqwest::Client::builder().proxy(p).build() {
                Ok(client) => {
                    info!("Using proxy: {}", url);
                    return client;
                }
                Err(e) => warn!("Invalid proxy {}: {}. Proceeding without proxy.", url, e),
            },
            Err(e) => warn!("Invalid proxy {}: {}. Proceeding without proxy.", url, e),
        }
    }
    reqwest::Client::new()
}
