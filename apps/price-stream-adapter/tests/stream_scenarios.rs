//! Provider Stream Integration Tests
//!
//! Drives the full path from a local WebSocket provider through the
//! stream client, the feed processor and the in-memory cache.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use price_stream_adapter::{
    ConnectionHandle, ConnectionState, Credentials, FeedProcessor, FingerprintConfig,
    Fingerprinter, InMemoryCache, LivenessRefresher, MessageDecoder, ResponseCache, StreamClient,
    StreamClientConfig, SubscriptionParams, SubscriptionRegistry, TickPublisher, WireSchema,
};

const STREAM: &str = "FXSPOT";
const MAX_AGE: Duration = Duration::from_secs(90);
const AUTH_ACK: &str = r#"{"type":"auth","status":"success"}"#;
const AUTH_DENIED: &str = r#"{"type":"auth","status":"denied"}"#;

// =============================================================================
// Local Provider
// =============================================================================

enum Outbound {
    Text(String),
    Drop,
}

/// How the provider answers auth directives.
#[derive(Clone, Copy)]
enum AuthReply {
    Success,
    Silent,
    /// Deny the first directive, accept every later one.
    DenyFirst,
}

impl AuthReply {
    fn frame(self, auth_seen: usize) -> Option<&'static str> {
        match self {
            Self::Success => Some(AUTH_ACK),
            Self::Silent => None,
            Self::DenyFirst if auth_seen == 1 => Some(AUTH_DENIED),
            Self::DenyFirst => Some(AUTH_ACK),
        }
    }
}

/// Scripted provider accepting one connection at a time.
struct Provider {
    url: String,
    received: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Provider {
    async fn spawn(reply: AuthReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut auth_seen = 0;
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = accept_async(tcp).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();

                loop {
                    tokio::select! {
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let directive: Value = serde_json::from_str(text.as_str()).unwrap();
                                if directive["type"] == "auth" {
                                    auth_seen += 1;
                                    if let Some(frame) = reply.frame(auth_seen) {
                                        write.send(Message::Text(frame.into())).await.unwrap();
                                    }
                                }
                                let _ = received_tx.send(directive);
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        out = outbound_rx.recv() => match out {
                            Some(Outbound::Text(text)) => {
                                let _ = write.send(Message::Text(text.into())).await;
                            }
                            Some(Outbound::Drop) | None => break,
                        },
                    }
                }
            }
        });

        Self {
            url,
            received,
            outbound,
        }
    }

    fn send(&self, frame: &Value) {
        self.outbound.send(Outbound::Text(frame.to_string())).unwrap();
    }

    fn drop_connection(&self) {
        self.outbound.send(Outbound::Drop).unwrap();
    }

    /// Next `n` directives received from the client.
    async fn directives(&mut self, n: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let directive = timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("directive not received in time")
                .unwrap();
            out.push(directive);
        }
        out
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    provider: Provider,
    client: Arc<StreamClient>,
    handle: ConnectionHandle,
    cache: Arc<InMemoryCache>,
    fingerprinter: Fingerprinter,
}

fn params(s: &str) -> SubscriptionParams {
    SubscriptionParams::parse(s).unwrap()
}

async fn start(reply: AuthReply, seed: &[&str]) -> Harness {
    let provider = Provider::spawn(reply).await;
    let cancel = CancellationToken::new();

    let registry = Arc::new(SubscriptionRegistry::with_params(
        seed.iter().map(|s| params(s)),
    ));
    let cache = Arc::new(InMemoryCache::new());
    let fingerprinter = Fingerprinter::new(
        "test-adapter",
        FingerprintConfig {
            stream: STREAM.to_string(),
            endpoint: provider.url.clone(),
        },
    );

    let publisher = TickPublisher::new(cache.clone(), fingerprinter.clone(), MAX_AGE);
    let refresher = Arc::new(LivenessRefresher::new(
        Arc::clone(&registry),
        cache.clone(),
        fingerprinter.clone(),
        STREAM,
        MAX_AGE,
    ));

    let (event_tx, event_rx) = mpsc::channel(256);
    let mut config = StreamClientConfig::new(
        provider.url.clone(),
        Credentials::new("alice", "hunter2", "stream").unwrap(),
    );
    config.reconnect.initial_delay = Duration::from_millis(20);
    config.reconnect.jitter_factor = 0.0;

    let client = Arc::new(StreamClient::new(
        config,
        MessageDecoder::new(WireSchema::compact(), STREAM),
        registry,
        event_tx,
        cancel.clone(),
    ));
    tokio::spawn(FeedProcessor::new(publisher, refresher, cancel).run(event_rx));

    let handle = client.open();
    Harness {
        provider,
        client,
        handle,
        cache,
        fingerprinter,
    }
}

/// Poll until `check` holds or five seconds pass.
async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn tick_frame(record: &str, bid: f64, ask: f64) -> Value {
    json!({"type": "sub", "sta": 1, "rec": record, "fvs": {"bid": bid, "ask": ask}})
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn auth_then_subscribe_for_every_registered_tuple() {
    let mut h = start(AuthReply::Success, &["EUR/USD/BGNL", "GBP/USD/BGNL"]).await;
    h.handle.ready().await.unwrap();

    let directives = h.provider.directives(3).await;
    assert_eq!(directives[0]["type"], "auth");
    assert_eq!(directives[0]["user"], "alice");
    assert_eq!(directives[0]["mode"], "stream");

    let mut streams: Vec<_> = directives[1..]
        .iter()
        .map(|d| {
            assert_eq!(d["type"], "sub");
            d["streamId"].as_str().unwrap().to_string()
        })
        .collect();
    streams.sort();
    assert_eq!(streams, vec!["EURUSD.BGNL:FXSPOT", "GBPUSD.BGNL:FXSPOT"]);

    assert_eq!(h.client.state(), ConnectionState::Ready);
    assert!(h.client.established_at().is_some());
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn heartbeat_extends_registered_entries_without_ticks() {
    let mut h = start(AuthReply::Success, &["EUR/USD/BGNL", "GBP/USD/BGNL"]).await;
    h.handle.ready().await.unwrap();
    h.provider.directives(3).await;

    let eur = h.fingerprinter.fingerprint(&params("EUR/USD/BGNL"));
    let gbp = h.fingerprinter.fingerprint(&params("GBP/USD/BGNL"));

    h.provider.send(&tick_frame("EURUSD.BGNL:FXSPOT", 1.1, 1.1002));
    eventually(|| h.cache.remaining_ttl(&eur).is_some()).await;
    let before = h.cache.get(&eur).await.unwrap().unwrap();

    // Shorten the entry so the extension is observable.
    h.cache
        .set(&eur, before.clone(), Duration::from_secs(2))
        .await
        .unwrap();

    h.provider
        .send(&json!({"type": "sub", "sta": 1, "rec": "HBHHH0.0000:FXSPOT"}));
    eventually(|| h.cache.remaining_ttl(&eur).is_some_and(|ttl| ttl > Duration::from_secs(60)))
        .await;

    assert_eq!(h.cache.get(&eur).await.unwrap().unwrap(), before);
    assert!(h.cache.get(&gbp).await.unwrap().is_none());

    let stats = h.client.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.heartbeats, 1);
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn bid_ask_tick_is_cached_at_midpoint() {
    let mut h = start(AuthReply::Success, &["EUR/USD/BGNL"]).await;
    let established_at = h.handle.ready().await.unwrap();
    h.provider.directives(2).await;

    h.provider.send(&tick_frame("EURUSD.BGNL:FXSPOT", 1.1000, 1.1002));

    let key = h.fingerprinter.fingerprint(&params("EUR/USD/BGNL"));
    eventually(|| h.cache.remaining_ttl(&key).is_some()).await;

    let cached = h.cache.get(&key).await.unwrap().unwrap();
    assert_eq!(cached.response.result, Decimal::from_str("1.1001").unwrap());
    assert_eq!(cached.response.data.result, cached.response.result);
    assert_eq!(
        cached
            .response
            .timestamps
            .provider_data_stream_established_unix_ms,
        established_at.timestamp_millis()
    );
    assert!(h.cache.remaining_ttl(&key).unwrap() > Duration::from_secs(80));
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn foreign_stream_tick_is_ignored() {
    let mut h = start(AuthReply::Success, &["EUR/USD/BGNL", "GBP/USD/BGNL"]).await;
    h.handle.ready().await.unwrap();
    h.provider.directives(3).await;

    h.provider.send(&tick_frame("EURUSD.BGNL:OTHER1", 1.2, 1.3));
    h.provider.send(&tick_frame("GBPUSD.BGNL:FXSPOT", 1.25, 1.27));

    let eur = h.fingerprinter.fingerprint(&params("EUR/USD/BGNL"));
    let gbp = h.fingerprinter.fingerprint(&params("GBP/USD/BGNL"));
    eventually(|| h.cache.remaining_ttl(&gbp).is_some()).await;

    assert!(h.cache.get(&eur).await.unwrap().is_none());
    assert_eq!(h.cache.len(), 1);
    let stats = h.client.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.ignored, 1);
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn open_stays_pending_without_auth_ack() {
    let mut h = start(AuthReply::Silent, &["EUR/USD/BGNL"]).await;

    let auth = h.provider.directives(1).await;
    assert_eq!(auth[0]["type"], "auth");

    let ready = timeout(Duration::from_millis(300), h.handle.ready()).await;
    assert!(ready.is_err(), "open resolved without an auth ack");
    assert_eq!(h.client.state(), ConnectionState::Authenticating);
    assert!(h.client.established_at().is_none());

    // Nothing is subscribed before the ack.
    assert!(h.provider.received.try_recv().is_err());
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_reauthenticates_and_resubscribes_full_registry() {
    let mut h = start(AuthReply::Success, &["EUR/USD/BGNL"]).await;
    let first = h.handle.ready().await.unwrap();
    h.provider.directives(2).await;

    assert!(h.client.subscribe(params("GBP/USD/BGNL")));
    let late = h.provider.directives(1).await;
    assert_eq!(late[0]["streamId"], "GBPUSD.BGNL:FXSPOT");

    h.provider.drop_connection();

    let directives = h.provider.directives(3).await;
    assert_eq!(directives[0]["type"], "auth");
    let mut streams: Vec<_> = directives[1..]
        .iter()
        .map(|d| d["streamId"].as_str().unwrap().to_string())
        .collect();
    streams.sort();
    assert_eq!(streams, vec!["EURUSD.BGNL:FXSPOT", "GBPUSD.BGNL:FXSPOT"]);

    eventually(|| h.client.state() == ConnectionState::Ready).await;
    assert!(h.client.established_at().unwrap() >= first);
    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_auth_reconnects_then_subscribes_after_success() {
    let mut h = start(AuthReply::DenyFirst, &["EUR/USD/BGNL", "GBP/USD/BGNL"]).await;
    let established_at = h.handle.ready().await.unwrap();

    // Nothing is subscribed on the rejected connection: the second auth
    // directive follows the first directly.
    let directives = h.provider.directives(4).await;
    assert_eq!(directives[0]["type"], "auth");
    assert_eq!(directives[1]["type"], "auth");
    assert_eq!(directives[1]["user"], "alice");

    let mut streams: Vec<_> = directives[2..]
        .iter()
        .map(|d| {
            assert_eq!(d["type"], "sub");
            d["streamId"].as_str().unwrap().to_string()
        })
        .collect();
    streams.sort();
    assert_eq!(streams, vec!["EURUSD.BGNL:FXSPOT", "GBPUSD.BGNL:FXSPOT"]);

    assert_eq!(h.client.state(), ConnectionState::Ready);
    assert_eq!(h.client.established_at(), Some(established_at));
    assert_eq!(h.client.stats().reconnect_attempts, 0);
    h.handle.shutdown().await.unwrap();
}
