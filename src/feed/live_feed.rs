// ============================================================================
// Structure : LivePriceFeed
// ============================================================================
// Flux de prix en direct : une tâche tokio par cycle de vie de connexion
//
// - La tâche (FeedDriver) exécute les actions de la ReconnectMachine :
//   connexion, abonnements, timer de reconnexion, teardown
// - LivePriceFeed est le handle côté application : lecture des prix,
//   état de la connexion, teardown
// - Dropper le handle déclenche le teardown (RAII)
//
// CONCEPTS RUST :
// 1. tokio::spawn : la tâche tourne en arrière-plan sur le runtime
// 2. tokio::sync::watch : canal de teardown lisible plusieurs fois
// 3. tokio::select! : attend le premier de plusieurs événements
//    (teardown, timer, socket)
// 4. Arc<RwLock<...>> : prix partagés entre la tâche et le handle
// ============================================================================

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, warn};

use crate::models::{LivePrice, PriceMap};

use super::protocol::{parse_trade, Op, OutboundMessage};
use super::socket::{Connector, FeedSocket, SocketEvent};
use super::state::{BackoffPolicy, ConnectionState, FeedAction, FeedEvent, ReconnectMachine};

/// Paramètres d'un flux
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// URL WebSocket du serveur de prix
    pub url: String,

    /// Tickers à suivre
    pub tickers: Vec<String>,

    /// Politique de reconnexion
    pub backoff: BackoffPolicy,
}

/// Instantané de l'état de la connexion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStatus {
    pub state: ConnectionState,
    pub connected: bool,
    /// Reconnexions programmées depuis la dernière ouverture
    pub attempts: u32,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            connected: false,
            attempts: 0,
        }
    }
}

/// État partagé entre la tâche et le handle
#[derive(Debug, Default)]
struct Shared {
    prices: RwLock<PriceMap>,
    status: RwLock<FeedStatus>,
}

/// Handle d'un flux de prix en cours
pub struct LivePriceFeed {
    shared: Arc<Shared>,
    tickers: Vec<String>,
    teardown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LivePriceFeed {
    /// Démarre le flux (doit être appelé dans un runtime tokio)
    pub fn spawn(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new(Shared::default());
        let (teardown, teardown_rx) = watch::channel(false);
        let tickers = config.tickers.clone();

        let driver = FeedDriver {
            machine: ReconnectMachine::new(config.backoff),
            config,
            connector,
            shared: shared.clone(),
            socket: None,
            reconnect_at: None,
            teardown_rx,
        };

        info!(tickers = ?tickers, "Spawning live price feed");
        let task = tokio::spawn(driver.run());

        Self {
            shared,
            tickers,
            teardown,
            task: Some(task),
        }
    }

    /// Tickers suivis par ce flux
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Copie de la map des derniers prix
    pub fn prices(&self) -> PriceMap {
        read(&self.shared.prices).clone()
    }

    /// Dernier prix d'un ticker
    pub fn price(&self, symbol: &str) -> Option<LivePrice> {
        read(&self.shared.prices).get(symbol).copied()
    }

    pub fn status(&self) -> FeedStatus {
        *read(&self.shared.status)
    }

    pub fn is_connected(&self) -> bool {
        self.status().connected
    }

    /// Demande le teardown sans attendre la fin de la tâche
    pub fn teardown(&self) {
        // Err = la tâche est déjà terminée (receiver droppé)
        let _ = self.teardown.send(true);
    }

    /// Teardown + attente de la fin de la tâche
    pub async fn shutdown(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Price feed task ended abnormally");
            }
        }
    }

    /// Vérifie si la tâche est terminée (teardown ou abandon)
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for LivePriceFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// FeedDriver : la tâche de fond
// ============================================================================

struct FeedDriver {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    machine: ReconnectMachine,
    socket: Option<Box<dyn FeedSocket>>,
    reconnect_at: Option<Instant>,
    teardown_rx: watch::Receiver<bool>,
}

impl FeedDriver {
    #[instrument(name = "price_feed", skip(self), fields(url = %self.config.url))]
    async fn run(mut self) {
        let mut events = VecDeque::from([FeedEvent::Start]);

        loop {
            while let Some(event) = events.pop_front() {
                let actions = self.machine.handle(event);
                self.publish_status();

                for action in actions {
                    if let Some(next) = self.apply(action).await {
                        events.push_back(next);
                    }
                }
            }

            if self.machine.state().is_terminal() {
                break;
            }

            events.extend(self.wait().await);
        }

        info!(state = self.machine.state().label(), "Price feed stopped");
    }

    /// Exécute une action ; peut produire un événement de suite
    async fn apply(&mut self, action: FeedAction) -> Option<FeedEvent> {
        match action {
            FeedAction::Connect => self.connect().await,

            FeedAction::Subscribe => {
                self.send_all(Op::Subscribe).await;
                None
            }

            FeedAction::ScheduleReconnect(delay) => {
                self.socket = None;
                self.reconnect_at = Some(Instant::now() + delay);
                info!(
                    attempt = self.machine.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                None
            }

            FeedAction::CancelReconnect => {
                self.reconnect_at = None;
                debug!("Pending reconnect cancelled");
                None
            }

            FeedAction::Unsubscribe => {
                self.send_all(Op::Unsubscribe).await;
                None
            }

            FeedAction::CloseSocket => {
                if let Some(mut socket) = self.socket.take() {
                    if let Err(e) = socket.close().await {
                        debug!(error = ?e, "Error while closing socket");
                    }
                }
                None
            }
        }
    }

    async fn connect(&mut self) -> Option<FeedEvent> {
        debug!("Connecting to price feed");
        let connecting = self.connector.connect(&self.config.url);

        // Un teardown pendant la connexion l'emporte
        tokio::select! {
            biased;
            _ = self.teardown_rx.changed() => Some(FeedEvent::Teardown),
            result = connecting => match result {
                Ok(socket) => {
                    info!("Price feed connected");
                    self.socket = Some(socket);
                    Some(FeedEvent::Opened)
                }
                Err(e) => {
                    warn!(error = ?e, "Price feed connection failed");
                    Some(FeedEvent::Closed)
                }
            },
        }
    }

    /// Attend le prochain événement externe
    async fn wait(&mut self) -> Vec<FeedEvent> {
        let reconnect_at = self.reconnect_at;

        tokio::select! {
            biased;
            // Err = le handle a été droppé : même effet qu'un teardown
            _ = self.teardown_rx.changed() => vec![FeedEvent::Teardown],
            _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                self.reconnect_at = None;
                vec![FeedEvent::ReconnectTimerFired]
            }
            event = next_socket_event(&mut self.socket) => self.on_socket_event(event),
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) -> Vec<FeedEvent> {
        match event {
            SocketEvent::Text(text) => {
                match parse_trade(&text) {
                    Ok(Some((symbol, price))) => {
                        // Last-write-wins : le tick remplace la valeur précédente
                        write(&self.shared.prices).insert(symbol, price);
                    }
                    Ok(None) => debug!(message = %text, "Ignoring non-trade message"),
                    Err(e) => warn!(error = ?e, "Malformed price message"),
                }
                Vec::new()
            }
            SocketEvent::Error(e) => {
                warn!(error = %e, "Price feed socket error");
                self.socket = None;
                vec![FeedEvent::Errored, FeedEvent::Closed]
            }
            SocketEvent::Closed => {
                info!("Price feed socket closed");
                self.socket = None;
                vec![FeedEvent::Closed]
            }
        }
    }

    async fn send_all(&mut self, op: Op) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        for symbol in &self.config.tickers {
            let payload = match OutboundMessage::new(op, symbol).to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = ?e, "Failed to encode subscription");
                    continue;
                }
            };

            if let Err(e) = socket.send_text(payload).await {
                warn!(symbol = %symbol, ?op, error = ?e, "Failed to send subscription");
            }
        }
        debug!(?op, count = self.config.tickers.len(), "Subscriptions sent");
    }

    fn publish_status(&self) {
        *write(&self.shared.status) = FeedStatus {
            state: self.machine.state(),
            connected: self.machine.is_connected(),
            attempts: self.machine.attempts(),
        };
    }
}

/// Prochain événement du socket, ou jamais s'il n'y a pas de socket
async fn next_socket_event(socket: &mut Option<Box<dyn FeedSocket>>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
