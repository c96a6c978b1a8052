// ============================================================================
// Structure : OfflineMessageQueue
// ============================================================================
// File d'attente des messages de chat qui n'ont pas pu partir
//
// - add() : ajoute un message (0 tentative) et persiste la file
// - process_queue() : rejoue les messages dans l'ordre d'insertion via le
//   handler fourni par l'application ; succès = retiré, échec = tentative++
// - Au plafond de tentatives (3), le message est abandonné et remonté dans
//   le ProcessReport
//
// CONCEPTS RUST :
// 1. std::sync::Mutex pour les entrées : jamais tenu à travers un .await
// 2. tokio::sync::Mutex::try_lock comme garde de ré-entrance : un second
//    appel concurrent à process_queue() ne bloque pas, il ne fait rien
// 3. Arc<dyn Fn(...) -> BoxFuture> : handler async stocké dynamiquement
// ============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, instrument, warn};

use crate::models::{FileAttachment, QueuedMessage};
use crate::storage::SessionStorage;

/// Clé de persistance de la file dans le stockage de session
pub const QUEUE_STORAGE_KEY: &str = "ayn-offline-queue";

/// Plafond de tentatives avant abandon d'un message
pub const MAX_RETRIES: u32 = 3;

/// Handler de renvoi : Ok(true) = livré, Ok(false) ou Err = échec
pub type RetryHandler = Arc<dyn Fn(QueuedMessage) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Bilan d'un passage de process_queue()
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReport {
    /// true si l'appel n'a rien fait (déjà en cours, ou pas de handler)
    pub skipped: bool,

    /// Nombre d'appels au handler
    pub attempted: usize,

    /// Identifiants des messages livrés
    pub delivered: Vec<String>,

    /// Messages abandonnés après le plafond de tentatives
    pub dropped: Vec<QueuedMessage>,
}

impl ProcessReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// File d'attente hors-ligne persistée
pub struct OfflineMessageQueue {
    /// Messages en attente, dans l'ordre d'insertion
    entries: Mutex<Vec<QueuedMessage>>,

    /// Backend de persistance
    storage: Arc<dyn SessionStorage>,

    /// Handler installé par l'application
    handler: Mutex<Option<RetryHandler>>,

    /// Garde de ré-entrance de process_queue()
    processing: tokio::sync::Mutex<()>,

    /// Vrai tant que la garde est tenue (lecture sans prendre le verrou)
    in_flight: AtomicBool,

    max_retries: u32,
}

impl OfflineMessageQueue {
    /// Charge la file depuis le stockage
    ///
    /// Une donnée absente, illisible ou d'un autre format donne une file vide.
    pub fn load(storage: Arc<dyn SessionStorage>) -> Self {
        let entries = read_persisted(storage.as_ref());
        if !entries.is_empty() {
            info!(count = entries.len(), "Offline queue restored");
        }

        Self {
            entries: Mutex::new(entries),
            storage,
            handler: Mutex::new(None),
            processing: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            max_retries: MAX_RETRIES,
        }
    }

    /// Change le plafond de tentatives (défaut : MAX_RETRIES)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Installe le handler de renvoi
    ///
    /// CONCEPT RUST : Generics + boxing
    /// - L'appelant passe une closure async ordinaire
    /// - On la transforme en Arc<dyn Fn> qui retourne une BoxFuture
    pub fn set_retry_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(QueuedMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let handler: RetryHandler = Arc::new(move |msg| handler(msg).boxed());
        *lock(&self.handler) = Some(handler);
    }

    /// Ajoute un message à la file et retourne son identifiant
    pub fn add(&self, content: impl Into<String>, attachment: Option<FileAttachment>) -> String {
        let message = QueuedMessage::new(content, attachment);
        let id = message.id.clone();

        let mut entries = lock(&self.entries);
        entries.push(message);
        self.persist(&entries);

        debug!(id = %id, queued = entries.len(), "Message queued");
        id
    }

    /// Retire un message ; retourne false s'il n'était pas dans la file
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|m| m.id != id);

        let removed = entries.len() != before;
        if removed {
            self.persist(&entries);
        }
        removed
    }

    /// Copie de la file, dans l'ordre d'insertion
    pub fn get_all(&self) -> Vec<QueuedMessage> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Vide la file et supprime la clé du stockage
    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.clear();

        if let Err(e) = self.storage.remove_item(QUEUE_STORAGE_KEY) {
            warn!(error = ?e, "Failed to remove offline queue from storage");
        }
    }

    /// Vérifie si un passage de process_queue() est en cours
    ///
    /// Ne touche pas à la garde : un appel concurrent à process_queue()
    /// n'est jamais refusé à cause de cette lecture.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Rejoue les messages en attente, séquentiellement
    ///
    /// Travaille sur une copie prise au début de l'appel : les messages
    /// ajoutés pendant le passage attendent le suivant. Un appel concurrent
    /// retourne immédiatement un rapport `skipped`.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> ProcessReport {
        // CONCEPT RUST : let-else
        // - Sort immédiatement si le verrou est déjà pris
        let Ok(_guard) = self.processing.try_lock() else {
            debug!("Queue processing already in flight");
            return ProcessReport::skipped();
        };
        let _in_flight = InFlight::enter(&self.in_flight);

        let handler = lock(&self.handler).clone();
        let Some(handler) = handler else {
            debug!("No retry handler installed");
            return ProcessReport::skipped();
        };

        let snapshot = self.get_all();
        let mut report = ProcessReport::default();

        for message in snapshot {
            if message.is_exhausted(self.max_retries) {
                if let Some(dropped) = self.take(&message.id) {
                    warn!(id = %dropped.id, retries = dropped.retries, "Dropping exhausted message");
                    report.dropped.push(dropped);
                }
                continue;
            }

            report.attempted += 1;
            let id = message.id.clone();

            let delivered = match handler(message).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    warn!(id = %id, error = ?e, "Retry handler failed");
                    false
                }
            };

            if delivered {
                self.remove(&id);
                report.delivered.push(id);
            } else if let Some(dropped) = self.record_failure(&id) {
                warn!(id = %dropped.id, retries = dropped.retries, "Message dropped after max retries");
                report.dropped.push(dropped);
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered.len(),
            dropped = report.dropped.len(),
            remaining = self.len(),
            "Queue processed"
        );
        report
    }

    /// Incrémente le compteur d'un message ; le retire s'il atteint le plafond
    fn record_failure(&self, id: &str) -> Option<QueuedMessage> {
        let mut entries = lock(&self.entries);

        // Le message a pu être retiré pendant l'appel au handler
        let index = entries.iter().position(|m| m.id == id)?;
        entries[index].retries += 1;

        let dropped = if entries[index].is_exhausted(self.max_retries) {
            Some(entries.remove(index))
        } else {
            None
        };

        self.persist(&entries);
        dropped
    }

    fn take(&self, id: &str) -> Option<QueuedMessage> {
        let mut entries = lock(&self.entries);
        let index = entries.iter().position(|m| m.id == id)?;
        let message = entries.remove(index);
        self.persist(&entries);
        Some(message)
    }

    /// Écrit la file dans le stockage ; les échecs sont ignorés
    /// (la copie mémoire reste la référence jusqu'à l'arrêt)
    fn persist(&self, entries: &[QueuedMessage]) {
        let result = serde_json::to_string(entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set_item(QUEUE_STORAGE_KEY, &json));

        if let Err(e) = result {
            warn!(error = ?e, "Failed to persist offline queue");
        }
    }
}

fn read_persisted(storage: &dyn SessionStorage) -> Vec<QueuedMessage> {
    let raw = match storage.get_item(QUEUE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = ?e, "Failed to read offline queue");
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed offline queue payload");
            Vec::new()
        }
    }
}

/// Marque un passage en cours ; remis à faux au drop (même sur panic)
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Tests unitaires
// ============================================================================
