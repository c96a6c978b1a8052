// ============================================================================
// Machine à états : cycle de vie de la connexion au flux de prix
// ============================================================================
//
//   Idle ──Start──▶ Connecting ──Opened──▶ Open
//                      ▲                     │
//                TimerFired               Closed
//                      │                     ▼
//                 Reconnecting ◀──(attempts < max)
//
//   Closed(GaveUp)   : tentatives épuisées
//   Closed(TornDown) : teardown explicite (prioritaire sur tout le reste)
//
// CONCEPTS RUST :
// 1. Enums pour state machines : le compilateur force à gérer tous les cas
// 2. Fonction de transition pure : handle(event) -> Vec<FeedAction>
//    - Aucune I/O ici, le driver async exécute les actions
//    - Testable sans socket ni timer
// ============================================================================

use std::time::Duration;

/// Politique de reconnexion : délai = base * 2^tentative, plafonné
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Délai de la première reconnexion (ms)
    pub base_delay_ms: u64,

    /// Délai maximum entre deux tentatives (ms)
    pub max_delay_ms: u64,

    /// Nombre de reconnexions avant abandon
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Délai avant la reconnexion numéro `attempt` (0 = première)
    ///
    /// CONCEPT RUST : checked_shl + saturating_mul
    /// - Pas d'overflow possible même pour un attempt absurde
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Pourquoi la connexion est définitivement fermée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Teardown demandé par le propriétaire du flux
    TornDown,

    /// Nombre maximum de reconnexions atteint
    GaveUp,
}

/// État de la connexion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::Closed(CloseReason::TornDown) => "closed",
            ConnectionState::Closed(CloseReason::GaveUp) => "gave-up",
        }
    }
}

/// Événements reçus par la machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// Démarrage du flux
    Start,
    /// Le socket est ouvert
    Opened,
    /// Erreur signalée par le socket (la fermeture suit)
    Errored,
    /// Le socket est fermé (ou la connexion a échoué)
    Closed,
    /// Le timer de reconnexion a expiré
    ReconnectTimerFired,
    /// Le propriétaire détruit le flux
    Teardown,
}

/// Actions à exécuter par le driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    /// Ouvrir un nouveau socket
    Connect,
    /// Envoyer un SUBSCRIBE par ticker
    Subscribe,
    /// Armer le timer de reconnexion
    ScheduleReconnect(Duration),
    /// Annuler le timer de reconnexion en attente
    CancelReconnect,
    /// Envoyer un UNSUBSCRIBE par ticker (socket ouvert uniquement)
    Unsubscribe,
    /// Fermer le socket courant
    CloseSocket,
}

/// Machine à états de reconnexion
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ConnectionState,
    policy: BackoffPolicy,
    /// Reconnexions programmées depuis la dernière ouverture réussie
    attempts: u32,
    /// Teardown reçu : plus aucune reconnexion
    destroyed: bool,
    /// Vue "connecté" exposée à l'UI
    connected: bool,
}

impl ReconnectMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy,
            attempts: 0,
            destroyed: false,
            connected: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Applique un événement et retourne les actions à exécuter
    pub fn handle(&mut self, event: FeedEvent) -> Vec<FeedAction> {
        use ConnectionState::*;

        // Teardown : prioritaire, valable depuis n'importe quel état non terminal
        if event == FeedEvent::Teardown {
            return self.teardown();
        }

        match (self.state, event) {
            // État terminal : tout événement tardif est ignoré
            (Closed(_), _) => Vec::new(),

            (Idle, FeedEvent::Start) => {
                self.state = Connecting;
                vec![FeedAction::Connect]
            }

            (Connecting, FeedEvent::Opened) => {
                self.state = Open;
                self.attempts = 0;
                self.connected = true;
                vec![FeedAction::Subscribe]
            }

            (Connecting | Open, FeedEvent::Errored) => {
                self.connected = false;
                Vec::new()
            }

            (Connecting | Open, FeedEvent::Closed) => {
                self.connected = false;
                self.on_closed()
            }

            (Reconnecting { .. }, FeedEvent::ReconnectTimerFired) => {
                self.state = Connecting;
                vec![FeedAction::Connect]
            }

            // Le reste n'a pas de sens dans l'état courant
            _ => Vec::new(),
        }
    }

    fn on_closed(&mut self) -> Vec<FeedAction> {
        if self.destroyed {
            self.state = ConnectionState::Closed(CloseReason::TornDown);
            return Vec::new();
        }

        if self.attempts >= self.policy.max_attempts {
            self.state = ConnectionState::Closed(CloseReason::GaveUp);
            return Vec::new();
        }

        let attempt = self.attempts;
        let delay = self.policy.delay_for(attempt);
        self.attempts += 1;
        self.state = ConnectionState::Reconnecting { attempt, delay };
        vec![FeedAction::ScheduleReconnect(delay)]
    }

    fn teardown(&mut self) -> Vec<FeedAction> {
        let previous = self.state;
        self.destroyed = true;
        self.connected = false;

        if previous.is_terminal() {
            return Vec::new();
        }
        self.state = ConnectionState::Closed(CloseReason::TornDown);

        match previous {
            ConnectionState::Open => vec![FeedAction::Unsubscribe, FeedAction::CloseSocket],
            ConnectionState::Connecting => vec![FeedAction::CloseSocket],
            ConnectionState::Reconnecting { .. } => vec![FeedAction::CancelReconnect],
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> ReconnectMachine {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        assert_eq!(machine.handle(FeedEvent::Start), vec![FeedAction::Connect]);
        machine
    }

    #[test]
    fn test_backoff_delays() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..7).map(|a| policy.delay_for(a).as_millis() as u64).collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
        assert_eq!(policy.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_open_subscribes_and_resets_attempts() {
        let mut machine = started();

        machine.handle(FeedEvent::Closed);
        machine.handle(FeedEvent::ReconnectTimerFired);
        assert_eq!(machine.attempts(), 1);

        assert_eq!(machine.handle(FeedEvent::Opened), vec![FeedAction::Subscribe]);
        assert_eq!(machine.state(), ConnectionState::Open);
        assert_eq!(machine.attempts(), 0);
        assert!(machine.is_connected());
    }

    #[test]
    fn test_error_only_marks_disconnected() {
        let mut machine = started();
        machine.handle(FeedEvent::Opened);

        assert!(machine.handle(FeedEvent::Errored).is_empty());
        assert!(!machine.is_connected());
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_gives_up_after_five_closes_without_open() {
        let mut machine = started();
        let mut scheduled = Vec::new();

        for _ in 0..5 {
            for action in machine.handle(FeedEvent::Closed) {
                if let FeedAction::ScheduleReconnect(delay) = action {
                    scheduled.push(delay.as_millis() as u64);
                }
            }
            machine.handle(FeedEvent::ReconnectTimerFired);
        }
        assert_eq!(scheduled, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(machine.attempts(), 5);

        // Sixième fermeture : plus rien n'est programmé
        assert!(machine.handle(FeedEvent::Closed).is_empty());
        assert_eq!(machine.state(), ConnectionState::Closed(CloseReason::GaveUp));
        assert_eq!(machine.attempts(), 5);

        assert!(machine.handle(FeedEvent::ReconnectTimerFired).is_empty());
        assert!(machine.handle(FeedEvent::Closed).is_empty());
    }

    #[test]
    fn test_teardown_cancels_pending_reconnect() {
        let mut machine = started();
        machine.handle(FeedEvent::Opened);
        machine.handle(FeedEvent::Closed);

        assert_eq!(machine.handle(FeedEvent::Teardown), vec![FeedAction::CancelReconnect]);
        assert!(machine.is_destroyed());

        // Fermeture tardive après teardown : aucune reconnexion
        assert!(machine.handle(FeedEvent::Closed).is_empty());
        assert!(machine.handle(FeedEvent::ReconnectTimerFired).is_empty());
        assert_eq!(machine.state(), ConnectionState::Closed(CloseReason::TornDown));
    }

    #[test]
    fn test_teardown_when_open_unsubscribes_then_closes() {
        let mut machine = started();
        machine.handle(FeedEvent::Opened);

        assert_eq!(
            machine.handle(FeedEvent::Teardown),
            vec![FeedAction::Unsubscribe, FeedAction::CloseSocket]
        );
        assert!(machine.handle(FeedEvent::Teardown).is_empty());
    }

    #[test]
    fn test_teardown_from_idle() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        assert!(machine.handle(FeedEvent::Teardown).is_empty());
        assert!(machine.handle(FeedEvent::Start).is_empty());
        assert_eq!(machine.state(), ConnectionState::Closed(CloseReason::TornDown));
    }
}
