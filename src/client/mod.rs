//! Typed clients for the four marketplace backends.
//!
//! Every client shares one [`ServiceClient`] transport shape: bearer token from
//! the shared [`AuthSession`], a per-call `X-Request-Id`, transient-failure
//! retries, and uniform status interception (401 clears the session).

pub mod admin;
pub mod buyer;
pub mod cva;
pub mod owner;

use std::time::Duration;

use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::config::Config;
use crate::errors::{extract_message, PortalError, Result};
use crate::intent::Intent;

pub use admin::AdminClient;
pub use buyer::BuyerClient;
pub use cva::CvaClient;
pub use owner::OwnerClient;

/// Build the shared HTTP client: timeouts plus exponential-backoff retries
/// on transient failures (connect errors, 5xx, 408, 429).
pub fn build_http(timeout: Duration, max_retries: u32) -> anyhow::Result<ClientWithMiddleware> {
    let reqwest_client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("carbon-portal/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(reqwest_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Ids attached as headers to a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallIds {
    pub idempotency_key: Option<Uuid>,
    pub correlation_id: Uuid,
}

impl From<&Intent> for CallIds {
    fn from(intent: &Intent) -> Self {
        Self {
            idempotency_key: Some(intent.idempotency_key),
            correlation_id: intent.correlation_id,
        }
    }
}

/// Transport for one backend service.
#[derive(Clone)]
pub struct ServiceClient {
    service: &'static str,
    base_url: Url,
    http: ClientWithMiddleware,
    session: AuthSession,
}

impl ServiceClient {
    pub fn new(
        service: &'static str,
        base_url: Url,
        http: ClientWithMiddleware,
        session: AuthSession,
    ) -> Self {
        Self {
            service,
            base_url,
            http,
            session,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Append percent-encoded path segments to the service base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortalError::Validation(format!("{} base URL cannot take a path", self.service)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let builder = self.http.get(url);
        self.send(builder, None).await
    }

    pub async fn get_with_query<T, Q>(&self, segments: &[&str], query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let builder = self.http.get(url).query(query);
        self.send(builder, None).await
    }

    /// POST a JSON body. With call ids, the idempotency key and correlation id
    /// are also sent as headers so every retry carries the same pair.
    pub async fn post<T, B>(&self, segments: &[&str], body: &B, ids: Option<CallIds>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| PortalError::Validation(format!("cannot encode request: {}", e)))?;
        let builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        self.send(builder, ids).await
    }

    /// POST for endpoints that answer without a body worth decoding.
    pub async fn post_empty<B>(&self, segments: &[&str], body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| PortalError::Validation(format!("cannot encode request: {}", e)))?;
        let builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        self.execute(builder, None).await.map(|_| ())
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, ids: Option<CallIds>) -> Result<T> {
        let body = self.execute(builder, ids).await?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(service = self.service, error = %e, "response body did not match the expected shape");
            PortalError::Decode(format!("{} response: {}", self.service, e))
        })
    }

    async fn execute(&self, mut builder: RequestBuilder, ids: Option<CallIds>) -> Result<Vec<u8>> {
        let request_id = Uuid::new_v4().to_string();
        builder = builder.header("x-request-id", &request_id);

        if let Some(token) = self.session.token().await {
            builder = builder.bearer_auth(token);
        }
        if let Some(ids) = ids {
            if let Some(key) = ids.idempotency_key {
                builder = builder.header("idempotency-key", key.to_string());
            }
            builder = builder.header("x-correlation-id", ids.correlation_id.to_string());
        }

        let resp = builder.send().await.map_err(|e| {
            tracing::warn!(service = self.service, request_id = %request_id, error = %e, "request failed after retries");
            PortalError::Transport(e)
        })?;

        let status = resp.status();
        let url = resp.url().path().to_string();
        let body = resp.bytes().await.map_err(|e| {
            PortalError::Transport(reqwest_middleware::Error::Reqwest(e))
        })?;

        if status.is_success() {
            tracing::debug!(service = self.service, request_id = %request_id, path = %url, status = %status, "backend call ok");
            return Ok(body.to_vec());
        }

        let message = extract_message(status, &body);
        tracing::warn!(
            service = self.service,
            request_id = %request_id,
            path = %url,
            status = %status,
            message = %message,
            "backend call failed"
        );

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session.clear().await;
        }
        Err(PortalError::from_status(self.service, status, message))
    }
}

/// All four clients over one HTTP client and one session.
#[derive(Clone)]
pub struct Portal {
    pub admin: AdminClient,
    pub owner: OwnerClient,
    pub buyer: BuyerClient,
    pub cva: CvaClient,
    session: AuthSession,
}

impl Portal {
    pub fn new(cfg: &Config, session: AuthSession) -> anyhow::Result<Self> {
        let http = build_http(cfg.request_timeout, cfg.max_retries)?;
        let client = |name: &'static str, url: &Url| {
            ServiceClient::new(name, url.clone(), http.clone(), session.clone())
        };
        Ok(Self {
            admin: AdminClient::new(client("admin", &cfg.admin_url)),
            owner: OwnerClient::new(client("owner", &cfg.owner_url)),
            buyer: BuyerClient::new(client("buyer", &cfg.buyer_url)),
            cva: CvaClient::new(client("cva", &cfg.cva_url)),
            session,
        })
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }
}
