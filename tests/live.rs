//! Tests against a real hub
//!
//! These tests require a running hub that exposes `SendCaller`, `SendMessage` and
//! pushes `ReceiveMessage`. They are ignored by default and can be run with:
//!
//! ```sh
//! HUBLINK_TEST_URL=https://localhost:4433/hub HUBLINK_TEST_TOKEN=your-token cargo test --test live -- --ignored
//! ```

use hublink::{ConnectionState, HubClient, HubConfig, HubError};
use std::env;
use std::time::Duration;
use tokio::sync::mpsc;

fn get_test_client() -> Option<HubClient> {
    let url = env::var("HUBLINK_TEST_URL").ok()?;
    let token = env::var("HUBLINK_TEST_TOKEN").ok()?;

    let config = HubConfig::new(url)
        .dangerous_skip_cert_verify()
        .ping_interval(Duration::from_secs(5))
        .server_timeout(Duration::from_secs(15))
        .invocation_timeout(Duration::from_secs(5));

    let client = HubClient::new(config).ok()?;
    client.set_token(token);
    Some(client)
}

#[tokio::test]
#[ignore = "requires running hub"]
async fn test_connect_disconnect() {
    let client = get_test_client().expect("HUBLINK_TEST_URL and HUBLINK_TEST_TOKEN must be set");

    client.connect().await.expect("Failed to connect");
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    client.disconnect().await.expect("Failed to disconnect");
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
#[ignore = "requires running hub"]
async fn test_ping() {
    let client = get_test_client().expect("HUBLINK_TEST_URL and HUBLINK_TEST_TOKEN must be set");

    client.connect().await.expect("Failed to connect");

    let rtt = client.ping().await.expect("Ping failed");
    println!("Ping RTT: {:?}", rtt);
    assert!(rtt < Duration::from_secs(5), "RTT should be less than 5 seconds");
    assert!(client.latency() < Duration::from_secs(5));

    client.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
#[ignore = "requires running hub"]
async fn test_send_caller_echo() {
    let client = get_test_client().expect("HUBLINK_TEST_URL and HUBLINK_TEST_TOKEN must be set");

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_message_received(move |text| {
        let _ = tx.send(text.to_string());
    });

    client.connect().await.expect("Failed to connect");
    client.send_caller("echo from hublink");

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("No echo within 5 seconds")
        .expect("Listener dropped");
    println!("Received: {}", received);
    assert!(received.contains("echo from hublink"));

    client.disconnect().await.expect("Failed to disconnect");
}

#[tokio::test]
#[ignore = "requires running hub"]
async fn test_unknown_method_reports_invocation_error() {
    let client = get_test_client().expect("HUBLINK_TEST_URL and HUBLINK_TEST_TOKEN must be set");

    client.connect().await.expect("Failed to connect");

    let result = client
        .invoke_async::<serde_json::Value>("NoSuchMethodOnThisHub", ())
        .await;
    assert!(matches!(result, Err(HubError::Invocation(_))));
    assert!(client.is_connected());

    client.disconnect().await.expect("Failed to disconnect");
}
