use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Timeout for advisory requests (opt-out ping, destination forwarding).
const FIRE_AND_FORGET_TIMEOUT_SECS: u64 = 10;

/// Outcome of one network attempt. `status` is `None` when the request
/// never produced an HTTP response; `recoverable_error` marks transport
/// failures worth retrying (timeout, connection lost).
#[derive(Debug, Clone, Default)]
pub struct TransportReply {
    pub status: Option<u16>,
    pub body: Vec<u8>,
    pub recoverable_error: bool,
}

/// HTTP collaborator: one GET per call, per-request timeout.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, timeout: Duration) -> TransportReply;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> TransportReply {
        match self.client.get(url.clone()).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                TransportReply {
                    status: Some(status),
                    body,
                    recoverable_error: false,
                }
            }
            Err(e) => {
                let recoverable = e.is_timeout() || e.is_connect();
                tracing::debug!("request to {url} failed (recoverable={recoverable}): {e}");
                TransportReply {
                    status: None,
                    body: Vec::new(),
                    recoverable_error: recoverable,
                }
            }
        }
    }
}

/// Issues a best-effort GET on a detached task: no retry, no completion
/// tracking, result only surfaces in the debug log.
pub fn fire_and_forget(transport: Arc<dyn HttpTransport>, url: Url) {
    tokio::spawn(async move {
        let reply = transport
            .get(&url, Duration::from_secs(FIRE_AND_FORGET_TIMEOUT_SECS))
            .await;
        tracing::debug!("fire-and-forget to {url} returned status {:?}", reply.status);
    });
}
