//! End-to-end gateway scenarios against a scripted mock server

use std::time::Duration;

use integration_tests::{fixtures, helpers};
use integration_tests::helpers::{MockGateway, RecordingHandler};
use relay_client::{Client, ClientError, ConnectionState, EntityKind, GatewayError, ShutdownMode};
use relay_protocol::{Envelope, OpCode};
use serde_json::json;

#[tokio::test]
async fn test_identify_handshake_reaches_connected() {
    let gateway = MockGateway::bind().await.unwrap();
    let (handler, mut events) = RecordingHandler::channel();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .handler(handler)
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    let identify = conn.handshake(100).await.unwrap();
    assert_eq!(identify.op, OpCode::Identify);
    let d = identify.d.unwrap();
    assert_eq!(d["token"], "test-token");
    assert!(d["intents"].is_u64());

    conn.send(&fixtures::ready("sess-1", 1)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    // READY seeded the cache and reached the handler
    assert!(client.cache().get(EntityKind::User, "u-1").is_some());
    assert!(client.cache().get(EntityKind::Guild, "g-1").is_some());
    let (event, data) = events.recv().await.unwrap();
    assert_eq!(event, "READY");
    assert_eq!(data["session_id"], "sess-1");

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_carries_last_sequence() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-1", 7)).await.unwrap();

    // the first pulse may race the READY; a later one must carry seq 7
    let mut saw_sequence = false;
    for _ in 0..5 {
        let heartbeat = conn.expect_op(OpCode::Heartbeat).await.unwrap();
        conn.send(&Envelope::heartbeat_ack()).await.unwrap();
        if heartbeat.d == Some(json!(7)) {
            saw_sequence = true;
            break;
        }
    }
    assert!(saw_sequence, "heartbeat never carried the observed sequence");

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_missed_ack_resumes_with_session() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-2", 5)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    // never ack; the liveness check tears the connection down and the
    // client comes back asking to resume
    let mut conn2 = gateway.accept().await.unwrap();
    let resume = conn2.handshake(100).await.unwrap();
    assert_eq!(resume.op, OpCode::Resume);
    let d = resume.d.unwrap();
    assert_eq!(d["session_id"], "sess-2");
    assert_eq!(d["seq"], 5);

    conn2.send(&fixtures::resumed(6)).await.unwrap();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_discards_and_identifies_fresh() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-3", 2)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    conn.send(&Envelope::invalid_session(false)).await.unwrap();

    let mut conn2 = gateway.accept().await.unwrap();
    let answer = conn2.handshake(100).await.unwrap();
    assert_eq!(answer.op, OpCode::Identify, "non-resumable session must identify fresh");

    conn2.send(&fixtures::ready("sess-4", 1)).await.unwrap();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_with_resumable_hint_still_identifies_fresh() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-8", 4)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    // invalid session always clears local state, whatever the hint says
    conn.send(&Envelope::invalid_session(true)).await.unwrap();

    let mut conn2 = gateway.accept().await.unwrap();
    let answer = conn2.handshake(100).await.unwrap();
    assert_eq!(answer.op, OpCode::Identify);
    assert!(answer.d.unwrap().get("session_id").is_none());

    conn2.send(&fixtures::ready("sess-9", 1)).await.unwrap();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_server_reconnect_request_resumes_immediately() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-5", 9)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    conn.send(&Envelope::reconnect()).await.unwrap();

    let mut conn2 = gateway.accept().await.unwrap();
    let resume = conn2.handshake(100).await.unwrap();
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d.unwrap()["session_id"], "sess-5");

    conn2.send(&fixtures::resumed(10)).await.unwrap();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_dispatch_events_update_cache_in_order() {
    let gateway = MockGateway::bind().await.unwrap();
    let (handler, mut events) = RecordingHandler::channel();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .handler(handler)
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-6", 1)).await.unwrap();
    conn.send(&fixtures::message_create(2, "m-1", Some("g-1"))).await.unwrap();
    conn.send(&fixtures::message_create(3, "m-2", None)).await.unwrap();

    // events arrive at the handler in wire order
    let (first, _) = events.recv().await.unwrap();
    assert_eq!(first, "READY");
    let (second, data) = events.recv().await.unwrap();
    assert_eq!(second, "MESSAGE_CREATE");
    assert_eq!(data["id"], "m-1");
    let (third, _) = events.recv().await.unwrap();
    assert_eq!(third, "MESSAGE_CREATE");

    assert!(client.cache().get(EntityKind::Message, "m-1").is_some());
    assert!(client.cache().get(EntityKind::Message, "m-2").is_some());

    client.shutdown(ShutdownMode::Abort).await.unwrap();
}

#[tokio::test]
async fn test_clean_shutdown_suppresses_reconnect() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.send(&fixtures::ready("sess-7", 1)).await.unwrap();
    let mut state = client.state_changes();
    helpers::wait_for_state(&mut state, ConnectionState::Connected)
        .await
        .unwrap();

    client.shutdown(ShutdownMode::Drain).await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(client.cache().is_empty());

    conn.expect_closed().await.unwrap();
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_auth_rejection_is_fatal() {
    let gateway = MockGateway::bind().await.unwrap();
    let client = Client::builder(fixtures::test_config(&gateway.url()))
        .start()
        .unwrap();

    let mut conn = gateway.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    conn.close_with(4004, "authentication failed").await.unwrap();

    let err = client.wait().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Gateway(GatewayError::AuthenticationFailed(_))
    ));

    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await
        .unwrap();
}
