//! REST dispatcher
//!
//! All REST traffic funnels through one dispatcher. Each request waits its
//! turn in its route's bucket queue, honors bucket and global rate limits,
//! and counts against a shared in-flight ceiling. A 429 re-queues the same
//! request at the head of its bucket's line until the retry budget runs out.

use crate::bucket::{Bucket, GlobalLimiter};
use crate::error::RestError;
use crate::headers::RateLimitInfo;
use crate::route::{BucketKey, Route};
use dashmap::DashMap;
use relay_cache::{Entity, SharedEntityCache};
use relay_common::ClientConfig;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};

/// Fallback wait when a 429 carries no retry-after header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
/// Pause between transient network retries
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// How to wind the dispatcher down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let in-flight requests finish, reject new ones
    Drain,
    /// Cancel queued and in-flight work immediately
    Abort,
}

/// Serializes REST traffic through rate-limit buckets.
pub struct RestDispatcher {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry_budget: u32,
    max_inflight: u32,
    buckets: DashMap<BucketKey, Arc<Bucket>>,
    /// Concurrency ceiling across all buckets; closed on shutdown
    inflight: Arc<Semaphore>,
    /// Flipped by an abort shutdown; cancels submissions at their next await
    shutdown: watch::Sender<bool>,
    global: GlobalLimiter,
    cache: SharedEntityCache,
}

impl RestDispatcher {
    /// Build a dispatcher from client configuration.
    #[must_use]
    pub fn new(config: &ClientConfig, cache: SharedEntityCache) -> Self {
        let max_inflight = u32::try_from(config.rest.max_inflight).unwrap_or(u32::MAX);
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            retry_budget: config.rest.retry_budget,
            max_inflight,
            buckets: DashMap::new(),
            inflight: Arc::new(Semaphore::new(max_inflight as usize)),
            shutdown: watch::Sender::new(false),
            global: GlobalLimiter::new(),
            cache,
        }
    }

    /// Submit a request with a JSON-serializable body.
    pub async fn submit_payload<T: Serialize>(
        &self,
        route: Route,
        body: &T,
    ) -> Result<Value, RestError> {
        let body = serde_json::to_value(body).map_err(|e| RestError::InvalidBody {
            route: route.to_string(),
            source: e,
        })?;
        self.submit(route, Some(body)).await
    }

    /// Submit a request and wait for its outcome.
    ///
    /// Requests in the same bucket complete in submission order. The call
    /// returns once the server gives a terminal answer: success, a
    /// non-retryable error status, or an exhausted retry budget. An abort
    /// shutdown cancels the submission wherever it is waiting.
    pub async fn submit(&self, route: Route, body: Option<Value>) -> Result<Value, RestError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            return Err(RestError::Closed);
        }
        tokio::select! {
            result = self.run(route, body) => result,
            _ = shutdown_rx.changed() => Err(RestError::Closed),
        }
    }

    async fn run(&self, route: Route, body: Option<Value>) -> Result<Value, RestError> {
        let bucket = self.bucket_for(&route);
        // hold our place in line across retries
        let _queue = bucket.acquire_queue().await;

        let mut attempts: u32 = 0;
        loop {
            self.global.wait_ready().await;
            bucket.reserve().await;

            let permit = self
                .inflight
                .acquire()
                .await
                .map_err(|_| RestError::Closed)?;
            let result = self.perform(&route, body.as_ref()).await;
            drop(permit);

            let response = match result {
                Ok(response) => response,
                Err(e) if is_transient(&e) && attempts < self.retry_budget => {
                    attempts += 1;
                    tracing::warn!(route = %route, attempt = attempts, error = %e, "Transient failure, retrying");
                    tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
                    continue;
                }
                Err(e) => {
                    return Err(RestError::Transport {
                        route: route.to_string(),
                        source: e,
                    })
                }
            };

            let info = RateLimitInfo::from_headers(response.headers());
            bucket.apply(&info);

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                attempts += 1;
                if attempts > self.retry_budget {
                    return Err(RestError::RetryBudgetExhausted {
                        route: route.to_string(),
                    });
                }
                let retry_after = info.retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                let deadline = Instant::now() + retry_after;
                if info.global {
                    self.global.pause_until(deadline);
                }
                bucket.exhaust_until(deadline);
                tracing::warn!(
                    route = %route,
                    retry_after_ms = retry_after.as_millis() as u64,
                    global = info.global,
                    "Rate limited, re-queueing"
                );
                continue;
            }

            return self.complete(&route, response).await;
        }
    }

    /// Stop accepting new submissions.
    ///
    /// [`ShutdownMode::Drain`] waits for every in-flight request to finish;
    /// [`ShutdownMode::Abort`] cancels them where they stand. Either way,
    /// later submissions fail with [`RestError::Closed`].
    pub async fn shutdown(&self, mode: ShutdownMode) {
        match mode {
            ShutdownMode::Drain => {
                // taking every permit waits out the in-flight requests
                let _ = self.inflight.acquire_many(self.max_inflight).await;
            }
            ShutdownMode::Abort => {
                let _ = self.shutdown.send(true);
            }
        }
        self.inflight.close();
    }

    fn bucket_for(&self, route: &Route) -> Arc<Bucket> {
        self.buckets
            .entry(route.bucket_key())
            .or_insert_with(|| Arc::new(Bucket::new()))
            .clone()
    }

    async fn perform(
        &self,
        route: &Route,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, route.path());
        let mut request = self
            .http
            .request(route.method().clone(), url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    async fn complete(&self, route: &Route, response: reqwest::Response) -> Result<Value, RestError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RestError::AuthenticationFailed {
                route: route.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RestError::Api {
                route: route.to_string(),
                status,
                message,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let value: Value = response.json().await.map_err(|e| RestError::Transport {
            route: route.to_string(),
            source: e,
        })?;
        self.update_cache(route, &value);
        Ok(value)
    }

    fn update_cache(&self, route: &Route, value: &Value) {
        let Some(kind) = route.cache_as() else {
            return;
        };
        match Entity::parse(kind, value.clone()) {
            Ok(entity) => {
                let scope = entity.owning_scope();
                self.cache.upsert(scope, entity);
            }
            Err(e) => tracing::debug!(route = %route, error = %e, "Response not cacheable"),
        }
    }
}

impl std::fmt::Debug for RestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestDispatcher")
            .field("base_url", &self.base_url)
            .field("buckets", &self.buckets.len())
            .field("available_permits", &self.inflight.available_permits())
            .finish()
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}
