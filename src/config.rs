use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub admin_url: Url,
    pub owner_url: Url,
    pub buyer_url: Url,
    pub cva_url: Url,
    /// Bearer token used for every backend. Set via PORTAL_TOKEN.
    pub token: Option<String>,
    pub request_timeout: Duration,
    /// Transport-level retries for transient failures. 0 = disabled.
    pub max_retries: u32,
    /// Quiet period before a typed search keyword triggers a fetch.
    pub search_debounce: Duration,
    /// Directory for persisted idempotency intents when Redis is not configured.
    pub intent_dir: PathBuf,
    /// When set, intents are stored in Redis instead of the intent directory.
    pub redis_url: Option<String>,
    pub intent_ttl_secs: u64,
}

impl Config {
    /// Config pointing every service at one base URL. Used by tests.
    pub fn single_host(base: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base).context("invalid base URL")?;
        Ok(Self {
            admin_url: url.clone(),
            owner_url: url.clone(),
            buyer_url: url.clone(),
            cva_url: url,
            token: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 0,
            search_debounce: Duration::from_millis(400),
            intent_dir: std::env::temp_dir().join("carbon-portal"),
            redis_url: None,
            intent_ttl_secs: 86_400,
        })
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let intent_dir = match std::env::var("PORTAL_INTENT_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("carbon-portal")
            .join("intents"),
    };

    Ok(Config {
        admin_url: service_url("PORTAL_ADMIN_URL", "http://localhost:8081")?,
        owner_url: service_url("PORTAL_OWNER_URL", "http://localhost:8082")?,
        buyer_url: service_url("PORTAL_BUYER_URL", "http://localhost:8083")?,
        cva_url: service_url("PORTAL_CVA_URL", "http://localhost:8084")?,
        token: std::env::var("PORTAL_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty()),
        request_timeout: Duration::from_secs(env_or("PORTAL_REQUEST_TIMEOUT_SECS", 30)),
        max_retries: env_or("PORTAL_MAX_RETRIES", 3),
        search_debounce: Duration::from_millis(env_or("PORTAL_SEARCH_DEBOUNCE_MS", 400)),
        intent_dir,
        redis_url: std::env::var("PORTAL_REDIS_URL")
            .ok()
            .filter(|u| !u.trim().is_empty()),
        intent_ttl_secs: env_or("PORTAL_INTENT_TTL_SECS", 86_400),
    })
}

fn service_url(var: &str, default: &str) -> anyhow::Result<Url> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.into());
    let url = Url::parse(&raw).with_context(|| format!("{} is not a valid URL: {}", var, raw))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("{} must be an http(s) base URL, got {}", var, raw);
    }
    Ok(url)
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_host_points_all_services() {
        let cfg = Config::single_host("http://127.0.0.1:9000").unwrap();
        assert_eq!(cfg.cva_url, cfg.admin_url);
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.search_debounce, Duration::from_millis(400));
    }

    #[test]
    fn test_service_url_rejects_non_base() {
        std::env::set_var("PORTAL_TEST_BAD_URL", "mailto:ops@example.com");
        assert!(service_url("PORTAL_TEST_BAD_URL", "http://x").is_err());
        std::env::set_var("PORTAL_TEST_GARBAGE_URL", "not a url");
        assert!(service_url("PORTAL_TEST_GARBAGE_URL", "http://x").is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("PORTAL_TEST_RETRIES", "many");
        assert_eq!(env_or::<u32>("PORTAL_TEST_RETRIES", 3), 3);
        std::env::set_var("PORTAL_TEST_RETRIES_OK", "5");
        assert_eq!(env_or::<u32>("PORTAL_TEST_RETRIES_OK", 3), 5);
    }
}
