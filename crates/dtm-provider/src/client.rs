//! The provider-facing trait and its two implementations: an HTTP client
//! backed by `reqwest`, and an in-memory stub for tests (§10.4).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dtm_ratelimit::{OperationTag, RateGate};
use rand::Rng;
use tokio::sync::Mutex;

use crate::backoff::{AdaptiveBackoff, ResponseClass};
use crate::error::{ProviderError, ProviderResult};
use crate::model::{Account, AddMagnetResult, ProviderTorrent, StatusFilter};

/// Maximum number of in-call retries for a transport-layer failure (§7 item
/// 4), mirroring the original client's `urllib3.Retry(total=3, ...)`.
const MAX_TRANSPORT_RETRIES: u32 = 3;
/// Base of the exponential backoff applied between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
/// Upper bound of the random jitter added to each retry delay.
const RETRY_JITTER_MS: u64 = 100;

fn is_retryable(class: ResponseClass) -> bool {
    matches!(
        class,
        ResponseClass::TransportTimeout | ResponseClass::TransportError | ResponseClass::ServerError
    )
}

fn retry_delay(attempt: u32) -> Duration {
    let backoff = RETRY_BASE_DELAY.saturating_mul(1u32 << (attempt - 1));
    let jitter = rand::rng().random_range(0..=RETRY_JITTER_MS);
    backoff + Duration::from_millis(jitter)
}

/// The operations the reinjection/cleanup/tester loops need from a debrid
/// provider (§4.2, §4.7, §4.8). Every method acquires a [`RateGate`] slot
/// before calling out and records the outcome afterward.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// List torrents, optionally filtered to the failed set, `limit`/`offset`
    /// paginated.
    async fn get_torrents(
        &self,
        filter: StatusFilter,
        limit: u32,
        offset: u32,
    ) -> ProviderResult<Vec<ProviderTorrent>>;

    /// Fetch a single torrent by provider id.
    async fn get_torrent(&self, id: &str) -> ProviderResult<ProviderTorrent>;

    /// Submit a magnet link for download.
    async fn add_magnet(&self, magnet: &str) -> ProviderResult<AddMagnetResult>;

    /// Remove a torrent from the provider's catalog.
    async fn delete_torrent(&self, id: &str) -> ProviderResult<()>;

    /// Fetch account details, used as a lightweight connectivity/auth probe.
    async fn get_user(&self) -> ProviderResult<Account>;

    /// The tracker driving this client's current delay and candidate budget.
    fn backoff(&self) -> Arc<Mutex<AdaptiveBackoff>>;
}

/// `reqwest`-backed [`ProviderClient`].
pub struct HttpProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    rate_gate: Arc<RateGate>,
    backoff: Arc<Mutex<AdaptiveBackoff>>,
}

impl HttpProviderClient {
    /// Build a client against `base_url`, authenticating with `api_token`
    /// and admitting calls through `rate_gate`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>, rate_gate: Arc<RateGate>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            rate_gate,
            backoff: Arc::new(Mutex::new(AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(120)))),
        }
    }

    /// Drive `run` through the rate gate to completion, retrying transport
    /// failures and 5xx responses up to `MAX_TRANSPORT_RETRIES` times with
    /// exponential backoff and jitter (§7 item 4). Each attempt (including
    /// retries) acquires its own rate-gate slot and feeds the adaptive
    /// backoff tracker, since a retry is a genuine outbound call.
    async fn execute<F, Fut>(&self, operation: &'static str, tag: OperationTag, run: F) -> ProviderResult<reqwest::Response>
    where
        F: Fn(reqwest::Client, String, String) -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            self.rate_gate.acquire_default(tag).await?;

            let started = Instant::now();
            let result = run(self.http.clone(), self.base_url.clone(), self.api_token.clone()).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            let class = match &result {
                Ok(response) => ResponseClass::from_status(response.status().as_u16()),
                Err(source) if source.is_timeout() => ResponseClass::TransportTimeout,
                Err(_) => ResponseClass::TransportError,
            };
            self.rate_gate
                .record_completion(tag, elapsed_ms, matches!(class, ResponseClass::Success))
                .await;
            self.backoff.lock().await.observe(class);

            if is_retryable(class) && attempt < MAX_TRANSPORT_RETRIES {
                attempt += 1;
                let delay = retry_delay(attempt);
                tracing::warn!(operation, attempt, %class, delay_ms = delay.as_millis() as u64, "retrying provider call");
                tokio::time::sleep(delay).await;
                continue;
            }

            let response = result.map_err(|source| ProviderError::Transport { operation, source })?;
            if class != ResponseClass::Success {
                let message = response.text().await.ok();
                return Err(ProviderError::Provider {
                    operation,
                    classified: class,
                    message,
                });
            }
            return Ok(response);
        }
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, tag: OperationTag, run: F) -> ProviderResult<T>
    where
        F: Fn(reqwest::Client, String, String) -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let response = self.execute(operation, tag, run).await?;
        let body: T = serde_json::from_value(
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|source| ProviderError::Transport { operation, source })?,
        )
        .map_err(|_| ProviderError::Provider {
            operation,
            classified: ResponseClass::Success,
            message: Some("response body did not match the expected shape".to_owned()),
        })?;
        Ok(body)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn get_torrents(&self, filter: StatusFilter, limit: u32, offset: u32) -> ProviderResult<Vec<ProviderTorrent>> {
        let query = match filter {
            StatusFilter::Failed => format!("limit={limit}&offset={offset}&filter=failed"),
            StatusFilter::All => format!("limit={limit}&offset={offset}"),
        };
        self.call("get_torrents", OperationTag::CleanupRd, move |http, base, token| {
            let query = query.clone();
            async move {
                http.get(format!("{base}/torrents?{query}"))
                    .bearer_auth(token)
                    .send()
                    .await
            }
        })
        .await
    }

    async fn get_torrent(&self, id: &str) -> ProviderResult<ProviderTorrent> {
        let id = id.to_owned();
        self.call("get_torrent", OperationTag::CleanupRd, move |http, base, token| {
            let id = id.clone();
            async move { http.get(format!("{base}/torrents/{id}")).bearer_auth(token).send().await }
        })
        .await
    }

    async fn add_magnet(&self, magnet: &str) -> ProviderResult<AddMagnetResult> {
        let magnet = magnet.to_owned();
        self.call("add_magnet", OperationTag::TestInjection, move |http, base, token| {
            let magnet = magnet.clone();
            async move {
                http.post(format!("{base}/torrents/addMagnet"))
                    .bearer_auth(token)
                    .form(&[("magnet", magnet)])
                    .send()
                    .await
            }
        })
        .await
    }

    async fn delete_torrent(&self, id: &str) -> ProviderResult<()> {
        let id = id.to_owned();
        self.execute("delete_torrent", OperationTag::CleanupRd, move |http, base, token| {
            let id = id.clone();
            async move { http.delete(format!("{base}/torrents/{id}")).bearer_auth(token).send().await }
        })
        .await?;
        Ok(())
    }

    async fn get_user(&self) -> ProviderResult<Account> {
        self.call("get_user", OperationTag::CleanupRd, move |http, base, token| async move {
            http.get(format!("{base}/user")).bearer_auth(token).send().await
        })
        .await
    }

    fn backoff(&self) -> Arc<Mutex<AdaptiveBackoff>> {
        Arc::clone(&self.backoff)
    }
}

/// Scripted, in-memory [`ProviderClient`] stub for tests: callers seed its
/// catalog and optionally an error to return on the next call.
pub struct StubProviderClient {
    torrents: Mutex<Vec<ProviderTorrent>>,
    next_add_result: Mutex<Option<ProviderResult<AddMagnetResult>>>,
    rate_gate: Arc<RateGate>,
    backoff: Arc<Mutex<AdaptiveBackoff>>,
}

impl StubProviderClient {
    /// Build an empty stub backed by its own rate gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            torrents: Mutex::new(Vec::new()),
            next_add_result: Mutex::new(None),
            rate_gate: Arc::new(RateGate::new(dtm_ratelimit::DEFAULT_MAX_CALLS_PER_MINUTE)),
            backoff: Arc::new(Mutex::new(AdaptiveBackoff::new(Duration::from_millis(1), Duration::from_millis(50)))),
        }
    }

    /// Seed the catalog returned by [`ProviderClient::get_torrents`] and
    /// [`ProviderClient::get_torrent`].
    pub async fn seed(&self, torrents: Vec<ProviderTorrent>) {
        *self.torrents.lock().await = torrents;
    }

    /// Script the result of the next [`ProviderClient::add_magnet`] call.
    pub async fn script_add_magnet(&self, result: ProviderResult<AddMagnetResult>) {
        *self.next_add_result.lock().await = Some(result);
    }
}

impl Default for StubProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for StubProviderClient {
    async fn get_torrents(&self, filter: StatusFilter, limit: u32, offset: u32) -> ProviderResult<Vec<ProviderTorrent>> {
        self.rate_gate.acquire_default(OperationTag::CleanupRd).await?;
        let torrents = self.torrents.lock().await;
        let filtered: Vec<ProviderTorrent> = match filter {
            StatusFilter::All => torrents.clone(),
            StatusFilter::Failed => torrents
                .iter()
                .filter(|torrent| torrent.status == "error" || torrent.status == "dead")
                .cloned()
                .collect(),
        };
        Ok(filtered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_torrent(&self, id: &str) -> ProviderResult<ProviderTorrent> {
        self.rate_gate.acquire_default(OperationTag::CleanupRd).await?;
        self.torrents
            .lock()
            .await
            .iter()
            .find(|torrent| torrent.id == id)
            .cloned()
            .ok_or(ProviderError::Provider {
                operation: "get_torrent",
                classified: ResponseClass::ServerError,
                message: Some("not found".to_owned()),
            })
    }

    async fn add_magnet(&self, _magnet: &str) -> ProviderResult<AddMagnetResult> {
        self.rate_gate.acquire_default(OperationTag::TestInjection).await?;
        if let Some(scripted) = self.next_add_result.lock().await.take() {
            return scripted;
        }
        Ok(AddMagnetResult {
            id: "stub-id".to_owned(),
            uri: "stub://added".to_owned(),
        })
    }

    async fn delete_torrent(&self, id: &str) -> ProviderResult<()> {
        self.rate_gate.acquire_default(OperationTag::CleanupRd).await?;
        self.torrents.lock().await.retain(|torrent| torrent.id != id);
        Ok(())
    }

    async fn get_user(&self) -> ProviderResult<Account> {
        self.rate_gate.acquire_default(OperationTag::CleanupRd).await?;
        Ok(Account {
            username: "stub-user".to_owned(),
            premium_until: 0,
        })
    }

    fn backoff(&self) -> Arc<Mutex<AdaptiveBackoff>> {
        Arc::clone(&self.backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_filters_to_failed_set() {
        let stub = StubProviderClient::new();
        stub.seed(vec![
            ProviderTorrent {
                id: "1".into(),
                hash: "a".repeat(40),
                filename: "ok.mkv".into(),
                status: "downloaded".into(),
                size: 10,
                added: "2026-01-01T00:00:00Z".into(),
            },
            ProviderTorrent {
                id: "2".into(),
                hash: "b".repeat(40),
                filename: "bad.mkv".into(),
                status: "error".into(),
                size: 10,
                added: "2026-01-01T00:00:00Z".into(),
            },
        ])
        .await;

        let failed = stub.get_torrents(StatusFilter::Failed, 10, 0).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "2");
    }

    #[tokio::test]
    async fn stub_delete_removes_from_catalog() {
        let stub = StubProviderClient::new();
        stub.seed(vec![ProviderTorrent {
            id: "1".into(),
            hash: "a".repeat(40),
            filename: "x.mkv".into(),
            status: "downloaded".into(),
            size: 1,
            added: "2026-01-01T00:00:00Z".into(),
        }])
        .await;
        stub.delete_torrent("1").await.unwrap();
        assert!(stub.get_torrent("1").await.is_err());
    }

    #[tokio::test]
    async fn scripted_add_magnet_result_is_returned_once() {
        let stub = StubProviderClient::new();
        stub.script_add_magnet(Err(ProviderError::Provider {
            operation: "add_magnet",
            classified: ResponseClass::RateLimited,
            message: None,
        }))
        .await;
        assert!(stub.add_magnet("magnet:?xt=urn:btih:1234").await.is_err());
        let fallback = stub.add_magnet("magnet:?xt=urn:btih:1234").await.unwrap();
        assert_eq!(fallback.id, "stub-id");
    }

    #[test]
    fn transport_and_server_errors_are_retryable_but_auth_and_rate_limit_are_not() {
        assert!(is_retryable(ResponseClass::TransportTimeout));
        assert!(is_retryable(ResponseClass::TransportError));
        assert!(is_retryable(ResponseClass::ServerError));
        assert!(!is_retryable(ResponseClass::Success));
        assert!(!is_retryable(ResponseClass::AuthFailure));
        assert!(!is_retryable(ResponseClass::RateLimited));
    }

    #[test]
    fn retry_delay_grows_exponentially_and_stays_jittered() {
        let first = retry_delay(1);
        let second = retry_delay(2);
        let third = retry_delay(3);
        assert!(first >= RETRY_BASE_DELAY && first < RETRY_BASE_DELAY + Duration::from_millis(RETRY_JITTER_MS + 1));
        assert!(second >= RETRY_BASE_DELAY * 2);
        assert!(third >= RETRY_BASE_DELAY * 4);
    }
}
