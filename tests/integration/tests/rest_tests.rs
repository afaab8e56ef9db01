//! REST dispatcher scenarios against a wiremock server

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_cache::{EntityCache, EntityKind, SharedEntityCache};
use relay_common::ClientConfig;
use relay_rest::{RestDispatcher, RestError, Route, ShutdownMode};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn dispatcher_for(server: &MockServer) -> (Arc<RestDispatcher>, SharedEntityCache) {
    let mut config = ClientConfig::new("test-token");
    config.api_base_url = server.uri();
    let cache = EntityCache::new_shared();
    (Arc::new(RestDispatcher::new(&config, cache.clone())), cache)
}

#[tokio::test]
async fn test_get_current_user_feeds_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-9",
            "username": "relay",
        })))
        .mount(&server)
        .await;

    let (dispatcher, cache) = dispatcher_for(&server);
    let user = dispatcher.submit(Route::get_current_user(), None).await.unwrap();

    assert_eq!(user["id"], "u-9");
    assert_eq!(cache.get(EntityKind::User, "u-9").unwrap().data()["username"], "relay");
}

#[tokio::test]
async fn test_rate_limited_request_retries_after_wait() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0.2")
                .set_body_json(json!({"message": "rate limited"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-1"})))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let start = Instant::now();
    let message = dispatcher
        .submit(Route::create_message("1"), Some(json!({"content": "hi"})))
        .await
        .unwrap();

    assert_eq!(message["id"], "m-1");
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_retry_budget_exhausted_surfaces_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0.05")
                .set_body_json(json!({"message": "rate limited"})),
        )
        .mount(&server)
        .await;

    let mut config = ClientConfig::new("test-token");
    config.api_base_url = server.uri();
    config.rest.retry_budget = 1;
    let dispatcher = RestDispatcher::new(&config, EntityCache::new_shared());

    let err = dispatcher
        .submit(Route::create_message("1"), Some(json!({"content": "hi"})))
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::RetryBudgetExhausted { .. }));
}

#[tokio::test]
async fn test_exhausted_bucket_delays_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guilds/g1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "1")
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset-after", "0.25")
                .set_body_json(json!({"id": "g1"})),
        )
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    dispatcher.submit(Route::get_guild("g1"), None).await.unwrap();

    // the bucket is spent; the second request waits out the window
    let start = Instant::now();
    dispatcher.submit(Route::get_guild("g1"), None).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(230));
}

#[tokio::test]
async fn test_global_rate_limit_pauses_other_buckets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0.3")
                .insert_header("x-ratelimit-global", "true")
                .set_body_json(json!({"message": "global limit"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g1"})))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let first = dispatcher.clone();
    let trip = tokio::spawn(async move {
        first
            .submit(Route::create_message("1"), Some(json!({"content": "hi"})))
            .await
    });

    // give the first request time to trip the global limit, then hit a
    // different bucket; it must wait out the shared pause
    tokio::time::sleep(Duration::from_millis(100)).await;
    let start = Instant::now();
    dispatcher.submit(Route::get_guild("g1"), None).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(150));

    trip.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_terminal_error_status_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown channel"))
        .expect(1)
        .mount(&server)
        .await;

    let (dispatcher, cache) = dispatcher_for(&server);
    let err = dispatcher.submit(Route::get_channel("404"), None).await.unwrap_err();

    match err {
        RestError::Api { status, message, .. } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "unknown channel");
        }
        other => panic!("expected Api error, got {other}"),
    }
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let err = dispatcher.submit(Route::get_current_user(), None).await.unwrap_err();
    assert!(matches!(err, RestError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_no_content_response_yields_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/channels/1/messages/m-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let result = dispatcher
        .submit(Route::delete_message("1", "m-1"), None)
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
}

/// Records when each request reaches the server, then answers slowly.
struct SlowResponder {
    delay: Duration,
    arrivals: Arc<std::sync::Mutex<Vec<Instant>>>,
}

impl Respond for SlowResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .set_delay(self.delay)
            .set_body_json(json!({"id": "g"}))
    }
}

#[tokio::test]
async fn test_concurrency_ceiling_never_exceeded() {
    let delay = Duration::from_millis(150);
    let arrivals = Arc::new(std::sync::Mutex::new(Vec::new()));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/guilds/"))
        .respond_with(SlowResponder {
            delay,
            arrivals: arrivals.clone(),
        })
        .mount(&server)
        .await;

    let mut config = ClientConfig::new("test-token");
    config.api_base_url = server.uri();
    config.rest.max_inflight = 2;
    let dispatcher = Arc::new(RestDispatcher::new(&config, EntityCache::new_shared()));

    // six distinct buckets all racing for two permits
    let mut tasks = Vec::new();
    for i in 0..6 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher
                .submit(Route::get_guild(&format!("g{i}")), None)
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // with a ceiling of 2, request i+2 cannot reach the server until one of
    // the two before it has finished its full response delay
    let arrivals = arrivals.lock().unwrap();
    assert_eq!(arrivals.len(), 6);
    for window in arrivals.windows(3) {
        assert!(
            window[2].duration_since(window[0]) >= delay - Duration::from_millis(20),
            "more requests in flight than the ceiling allows"
        );
    }
}

#[tokio::test]
async fn test_abort_cancels_inflight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"id": "u-1"})),
        )
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let inflight = dispatcher.clone();
    let task = tokio::spawn(async move { inflight.submit(Route::get_current_user(), None).await });

    // let the request reach the server, then pull the plug
    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    dispatcher.shutdown(ShutdownMode::Abort).await;

    let result = task.await.unwrap();
    assert!(matches!(result, Err(RestError::Closed)));
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_requests_in_one_bucket_complete_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m"})))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_for(&server);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for i in 0..4u32 {
        let dispatcher = dispatcher.clone();
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            // submissions race, but the bucket queue serializes them
            dispatcher
                .submit(Route::create_message("1"), Some(json!({"content": i})))
                .await
                .unwrap();
            order.lock().unwrap().push(i);
        }));
        // stagger starts so queue order is deterministic
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}
