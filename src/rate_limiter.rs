// ============================================================================
// Structure : RateLimiter
// ============================================================================
// Limiteur de débit côté client à fenêtre glissante
//
// Conserve les timestamps des requêtes acceptées dans la fenêtre courante.
// Les timestamps trop anciens sont purgés à chaque vérification (lazy).
// C'est un garde-fou consultatif pour l'UI, pas un contrôle de sécurité :
// le serveur reste seul responsable de l'application réelle des quotas.
//
// CONCEPTS RUST :
// 1. VecDeque : file à double entrée, push_back / pop_front en O(1)
// 2. Instant : horloge monotone (insensible aux changements d'heure système)
// 3. Variantes *_at(now) : le temps est injecté, les tests n'ont pas besoin
//    de dormir
// ============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::Config;

/// Limiteur à fenêtre glissante
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Nombre maximum de requêtes dans la fenêtre
    max_requests: usize,

    /// Durée de la fenêtre
    window: Duration,

    /// Timestamps des requêtes acceptées, du plus ancien au plus récent
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    /// Crée un limiteur autorisant `max_requests` requêtes par `window`
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: VecDeque::with_capacity(max_requests),
        }
    }

    /// Limiteur des messages de chat, paramétré par la configuration
    pub fn for_chat(config: &Config) -> Self {
        Self::new(
            config.chat_max_requests,
            Duration::from_millis(config.chat_window_ms),
        )
    }

    /// Vérifie si une requête peut partir maintenant et l'enregistre si oui
    pub fn can_proceed(&mut self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    /// Variante de `can_proceed` avec un instant explicite
    ///
    /// Refusée : rien n'est enregistré.
    pub fn can_proceed_at(&mut self, now: Instant) -> bool {
        self.prune(now);

        if self.timestamps.len() >= self.max_requests {
            debug!(
                in_window = self.timestamps.len(),
                max = self.max_requests,
                "Rate limit reached"
            );
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Temps restant avant qu'une nouvelle requête soit acceptée
    ///
    /// Zéro si on est sous le plafond.
    pub fn time_until_next(&mut self) -> Duration {
        self.time_until_next_at(Instant::now())
    }

    /// Variante de `time_until_next` avec un instant explicite
    pub fn time_until_next_at(&mut self, now: Instant) -> Duration {
        self.prune(now);

        if self.timestamps.len() < self.max_requests {
            return Duration::ZERO;
        }

        // CONCEPT RUST : saturating_duration_since
        // - Retourne 0 au lieu de paniquer si l'instant est dans le passé
        match self.timestamps.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Oublie toutes les requêtes enregistrées
    pub fn reset(&mut self) {
        self.timestamps.clear();
    }

    /// Nombre de requêtes actuellement comptées dans la fenêtre
    pub fn in_window(&self) -> usize {
        self.timestamps.len()
    }

    /// Retire les timestamps sortis de la fenêtre
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
