//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use transit_stream::protocol::ReplyStatus;
use transit_stream::transport::memory::{self, MemoryPeer, MemoryServer};
use transit_stream::{Backoff, CachePaths, ClientOptions, Envelope, StreamClient};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(2);

/// Installs a log subscriber once. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a client over an in-memory transport with fast reconnects.
pub fn client(cache_root: &Path) -> (StreamClient, MemoryServer) {
    init_tracing();

    let (connector, server) = memory::pair();
    let client = StreamClient::builder()
        .endpoint("ws://memory/socket")
        .options(
            ClientOptions::new()
                .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5))),
        )
        .cache_paths(CachePaths::under(cache_root))
        .connector(connector)
        .build()
        .expect("client builds");

    (client, server)
}

/// Waits for the client to open its next link.
pub async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    timeout(WAIT, server.accept())
        .await
        .expect("accept timed out")
        .expect("server closed")
}

/// Waits for the next non-heartbeat envelope written by the client.
pub async fn next_envelope(peer: &mut MemoryPeer) -> Envelope {
    timeout(WAIT, peer.next_envelope())
        .await
        .expect("envelope timed out")
        .expect("link closed")
}

/// Receives the next recorded item.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("event timed out")
        .expect("recorder closed")
}

/// Replies `ok` to a join envelope.
pub fn reply_ok(peer: &MemoryPeer, join: &Envelope, response: Value) {
    peer.send(&Envelope::reply(
        join.join_ref.clone(),
        join.message_ref.clone(),
        join.topic.clone(),
        ReplyStatus::Ok,
        response,
    ))
    .expect("reply sent");
}

/// Pushes `stream_data` on a joined topic.
pub fn push_stream_data(peer: &MemoryPeer, join: &Envelope, payload: Value) {
    peer.send(&Envelope::new(
        join.join_ref.clone(),
        "",
        join.topic.clone(),
        "stream_data",
        payload,
    ))
    .expect("push sent");
}

/// One prediction for `stop_id` on trip `trip_id`.
pub fn prediction(id: &str, stop_id: &str, trip_id: &str) -> Value {
    json!({
        "id": id,
        "arrival_time": "2026-10-16T12:00:00-04:00",
        "departure_time": "2026-10-16T12:01:00-04:00",
        "direction_id": 0,
        "revenue": true,
        "schedule_relationship": "scheduled",
        "status": null,
        "stop_sequence": 3,
        "route_id": "Red",
        "stop_id": stop_id,
        "trip_id": trip_id,
        "vehicle_id": null
    })
}

/// A flat predictions payload with the given predictions.
pub fn predictions_payload(predictions: &[(&str, &str, &str)]) -> Value {
    let predictions: serde_json::Map<String, Value> = predictions
        .iter()
        .map(|(id, stop, trip)| ((*id).to_string(), prediction(id, stop, trip)))
        .collect();
    json!({ "predictions": predictions, "trips": {}, "vehicles": {} })
}
