// ============================================================================
// Tests d'intégration : flux de prix en direct
// ============================================================================
// Le flux est piloté par un connecteur scripté (aucun vrai socket) et le
// temps tokio est mis en pause : les délais de backoff s'écoulent
// instantanément dès que le runtime est inactif.
// ============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;

use ayn::feed::{
    BackoffPolicy, CloseReason, ConnectionState, Connector, FeedConfig, FeedSocket, LivePriceFeed,
    LivePrices, SocketEvent,
};

// ============================================================================
// Connecteur scripté
// ============================================================================

#[derive(Default)]
struct Script {
    /// Résultat des prochaines connexions (true = acceptée) ; vide = refus
    outcomes: VecDeque<bool>,
    /// Nombre d'appels à connect()
    connects: usize,
    /// Messages envoyés par le flux, tous sockets confondus
    sent: Vec<String>,
    /// Nombre de close() reçus
    closes: usize,
    /// Côté "serveur" du dernier socket accepté
    server: Option<mpsc::UnboundedSender<SocketEvent>>,
}

#[derive(Clone, Default)]
struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    fn accepting(count: usize) -> Self {
        let connector = Self::default();
        connector.script.lock().unwrap().outcomes = std::iter::repeat(true).take(count).collect();
        connector
    }

    fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    /// Pousse un événement sur le socket courant
    fn push(&self, event: SocketEvent) {
        let script = self.script.lock().unwrap();
        if let Some(server) = &script.server {
            let _ = server.send(event);
        }
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Box<dyn FeedSocket>>> {
        let script = self.script.clone();
        async move {
            let mut guard = script.lock().unwrap();
            guard.connects += 1;

            if !guard.outcomes.pop_front().unwrap_or(false) {
                bail!("connection refused");
            }

            let (tx, rx) = mpsc::unbounded_channel();
            guard.server = Some(tx);
            drop(guard);

            Ok(Box::new(ScriptedSocket { events: rx, script }) as Box<dyn FeedSocket>)
        }
        .boxed()
    }
}

struct ScriptedSocket {
    events: mpsc::UnboundedReceiver<SocketEvent>,
    script: Arc<Mutex<Script>>,
}

impl FeedSocket for ScriptedSocket {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        self.script.lock().unwrap().sent.push(text);
        async { Ok(()) }.boxed()
    }

    fn next_event(&mut self) -> BoxFuture<'_, SocketEvent> {
        async move { self.events.recv().await.unwrap_or(SocketEvent::Closed) }.boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.script.lock().unwrap().closes += 1;
        async { Ok(()) }.boxed()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn config(tickers: &[&str]) -> FeedConfig {
    FeedConfig {
        url: "ws://test/market".to_string(),
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        backoff: BackoffPolicy::default(),
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

fn trade(symbol: &str, price: f64, timestamp: i64) -> SocketEvent {
    SocketEvent::Text(format!(
        r#"{{"topic":"TRADE","symbol":"{}","data":[{{"price":{},"timestamp":{}}}]}}"#,
        symbol, price, timestamp
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn subscribes_on_open_and_tracks_latest_price() {
    let connector = ScriptedConnector::accepting(1);
    let feed = LivePriceFeed::spawn(config(&["AAPL", "TSLA"]), Arc::new(connector.clone()));

    wait_until(|| feed.is_connected()).await;
    let sent = connector.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains(r#""op":"SUBSCRIBE""#) && sent[0].contains("AAPL"));
    assert!(sent[1].contains("TSLA"));

    connector.push(trade("AAPL", 270.0, 1_700_000_000_000));
    connector.push(SocketEvent::Text("pas du json".to_string()));
    connector.push(trade("AAPL", 271.5, 1_700_000_001_000));

    wait_until(|| feed.price("AAPL").map(|p| p.price) == Some(271.5)).await;
    assert!(feed.is_connected());
    assert_eq!(feed.status().state, ConnectionState::Open);
    assert!(feed.price("TSLA").is_none());
}

#[tokio::test(start_paused = true)]
async fn reconnects_with_backoff_and_resubscribes() {
    let connector = ScriptedConnector::accepting(2);
    let feed = LivePriceFeed::spawn(config(&["AAPL"]), Arc::new(connector.clone()));
    wait_until(|| feed.is_connected()).await;

    connector.push(SocketEvent::Closed);
    wait_until(|| matches!(feed.status().state, ConnectionState::Reconnecting { .. })).await;
    assert_eq!(feed.status().attempts, 1);
    assert!(!feed.is_connected());

    wait_until(|| feed.is_connected()).await;
    assert_eq!(connector.connects(), 2);
    assert_eq!(feed.status().attempts, 0);
    assert_eq!(connector.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn socket_error_triggers_reconnect() {
    let connector = ScriptedConnector::accepting(2);
    let feed = LivePriceFeed::spawn(config(&["AAPL"]), Arc::new(connector.clone()));
    wait_until(|| feed.is_connected()).await;

    connector.push(SocketEvent::Error("reset by peer".to_string()));
    wait_until(|| connector.connects() == 2 && feed.is_connected()).await;
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_five_failed_reconnects() {
    let connector = ScriptedConnector::default();
    let started = tokio::time::Instant::now();
    let feed = LivePriceFeed::spawn(config(&["AAPL"]), Arc::new(connector.clone()));

    wait_until(|| feed.is_finished()).await;

    // 1 connexion initiale + 5 reconnexions
    assert_eq!(connector.connects(), 6);
    assert_eq!(feed.status().state, ConnectionState::Closed(CloseReason::GaveUp));
    assert_eq!(feed.status().attempts, 5);

    // 1 + 2 + 4 + 8 + 16 secondes de backoff
    assert!(started.elapsed() >= Duration::from_secs(31));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connects(), 6);
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_reconnect() {
    let connector = ScriptedConnector::accepting(5);
    let feed = LivePriceFeed::spawn(config(&["AAPL"]), Arc::new(connector.clone()));
    wait_until(|| feed.is_connected()).await;

    connector.push(SocketEvent::Closed);
    wait_until(|| matches!(feed.status().state, ConnectionState::Reconnecting { .. })).await;

    feed.shutdown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_when_open_unsubscribes_then_closes() {
    let connector = ScriptedConnector::accepting(1);
    let feed = LivePriceFeed::spawn(config(&["AAPL", "TSLA"]), Arc::new(connector.clone()));
    wait_until(|| feed.is_connected()).await;

    feed.shutdown().await;

    let sent = connector.sent();
    assert_eq!(sent.len(), 4);
    assert!(sent[2].contains(r#""op":"UNSUBSCRIBE""#));
    assert!(sent[3].contains(r#""op":"UNSUBSCRIBE""#));
    assert_eq!(connector.closes(), 1);

    // Fermeture tardive côté serveur : rien ne se passe
    connector.push(SocketEvent::Closed);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_tears_down() {
    let connector = ScriptedConnector::accepting(5);
    let feed = LivePriceFeed::spawn(config(&["AAPL"]), Arc::new(connector.clone()));
    wait_until(|| feed.is_connected()).await;

    drop(feed);
    wait_until(|| connector.closes() == 1).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn live_prices_remounts_on_ticker_change_only() {
    let connector = ScriptedConnector::accepting(5);
    let mut prices = LivePrices::new("ws://test/market", BackoffPolicy::default(), Arc::new(connector.clone()));

    assert!(prices.set_tickers(["TSLA", "AAPL"]).await);
    wait_until(|| prices.is_connected()).await;
    assert_eq!(prices.tickers(), ["AAPL", "TSLA"]);

    // Même ensemble, ordre et doublons différents : pas de remontage
    assert!(!prices.set_tickers(["AAPL", "TSLA", "AAPL"]).await);
    assert_eq!(connector.connects(), 1);

    assert!(prices.set_tickers(["NVDA"]).await);
    wait_until(|| prices.is_connected()).await;
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.closes(), 1);

    // Ensemble vide : aucune connexion
    assert!(prices.set_tickers(Vec::<String>::new()).await);
    assert!(prices.status().is_none());
    assert!(prices.prices().is_empty());

    prices.shutdown().await;
}
