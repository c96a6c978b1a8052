// ============================================================================
// Structure : AppContext
// ============================================================================
// Contexte de l'application : possède la file hors-ligne, le limiteur de
// débit du chat, le client du webhook et le flux de prix
//
// PATTERN : pas de singleton global
// - Une seule instance créée au démarrage, passée à qui en a besoin
// - La file est dans un Arc : le handler de renvoi et les tâches de fond
//   peuvent la partager
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::api::ChatClient;
use crate::config::Config;
use crate::feed::{Connector, LivePrices, TungsteniteConnector};
use crate::models::{FileAttachment, QueuedMessage};
use crate::queue::{OfflineMessageQueue, ProcessReport};
use crate::rate_limiter::RateLimiter;
use crate::storage::{FileStorage, SessionStorage};

/// Résultat d'un envoi de message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Livré immédiatement
    Sent,

    /// Échec de l'envoi : le message attend dans la file hors-ligne
    Queued { id: String },

    /// Refusé par le limiteur : rien n'a été envoyé ni mis en file
    RateLimited { retry_in: Duration },
}

/// Contexte applicatif
pub struct AppContext {
    config: Config,
    queue: Arc<OfflineMessageQueue>,
    limiter: RateLimiter,
    chat: ChatClient,
    prices: LivePrices,
}

impl AppContext {
    /// Construit le contexte avec un stockage et un connecteur explicites
    pub fn new(
        config: Config,
        storage: Arc<dyn SessionStorage>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let chat = ChatClient::from_config(&config)?;
        let queue = Arc::new(OfflineMessageQueue::load(storage));

        // Le handler de renvoi de la file = le client du webhook
        let client = chat.clone();
        queue.set_retry_handler(move |message: QueuedMessage| {
            let client = client.clone();
            async move { client.send(&message).await }
        });

        Ok(Self {
            limiter: RateLimiter::for_chat(&config),
            prices: LivePrices::from_config(&config, connector),
            config,
            queue,
            chat,
        })
    }

    /// Contexte de production : stockage fichier + WebSocket réel
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(config.storage_dir.clone()));
        Self::new(config, storage, Arc::new(TungsteniteConnector))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &Arc<OfflineMessageQueue> {
        &self.queue
    }

    pub fn prices(&self) -> &LivePrices {
        &self.prices
    }

    pub fn prices_mut(&mut self) -> &mut LivePrices {
        &mut self.prices
    }

    /// Démarre le flux de prix sur les tickers configurés
    pub async fn start(&mut self) {
        let tickers = self.config.tickers.clone();
        self.prices.set_tickers(tickers).await;
    }

    /// Envoie un message de chat
    ///
    /// - Limiteur d'abord : un message refusé n'est pas mis en file
    /// - Échec d'envoi (statut ou réseau) : mis en file pour plus tard
    #[instrument(skip(self, content, attachment))]
    pub async fn send_message(
        &mut self,
        content: &str,
        attachment: Option<FileAttachment>,
    ) -> SendOutcome {
        if !self.limiter.can_proceed() {
            let retry_in = self.limiter.time_until_next();
            warn!(retry_in_ms = retry_in.as_millis() as u64, "Chat message rate limited");
            return SendOutcome::RateLimited { retry_in };
        }

        let message = QueuedMessage::new(content, attachment.clone());
        match self.chat.send(&message).await {
            Ok(true) => SendOutcome::Sent,
            Ok(false) => {
                let id = self.queue.add(content, attachment);
                info!(id = %id, "Message queued after rejection");
                SendOutcome::Queued { id }
            }
            Err(e) => {
                warn!(error = ?e, "Send failed, queuing message");
                let id = self.queue.add(content, attachment);
                SendOutcome::Queued { id }
            }
        }
    }

    /// Rejoue la file hors-ligne
    pub async fn flush_queue(&self) -> ProcessReport {
        self.queue.process_queue().await
    }

    /// Passage de la file détaché du contexte, à lancer dans une tâche
    ///
    /// L'appelant garde la main pendant les envois (jusqu'au timeout HTTP
    /// par message) ; un passage déjà en cours donne un rapport `skipped`.
    pub fn flush_task(&self) -> impl Future<Output = ProcessReport> + Send + 'static {
        let queue = self.queue.clone();
        async move { queue.process_queue().await }
    }

    /// Arrête le flux de prix
    pub async fn shutdown(&mut self) {
        self.prices.shutdown().await;
        info!(pending = self.queue.len(), "Application context shut down");
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures_util::future::{BoxFuture, FutureExt};

    use tokio::sync::Notify;

    use crate::api::testing::status_server;
    use crate::feed::FeedSocket;
    use crate::storage::MemoryStorage;

    /// Connecteur qui refuse tout (aucun flux dans ces tests)
    struct Offline;

    impl Connector for Offline {
        fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Box<dyn FeedSocket>>> {
            async { Err(anyhow!("offline")) }.boxed()
        }
    }

    fn context(chat_url: String, max_requests: usize) -> AppContext {
        let config = Config {
            chat_url,
            chat_max_requests: max_requests,
            ..Config::default()
        };
        AppContext::new(config, Arc::new(MemoryStorage::new()), Arc::new(Offline)).unwrap()
    }

    fn offline_context(max_requests: usize) -> AppContext {
        // Port fermé : chaque envoi échoue
        context("http://127.0.0.1:9/ayn-chat".to_string(), max_requests)
    }

    #[tokio::test]
    async fn test_rejected_send_is_queued_then_accepted_send_is_not() {
        let (url, _requests) = status_server(vec![500, 200]).await;
        let mut app = context(url, 5);

        let id = match app.send_message("bonjour", None).await {
            SendOutcome::Queued { id } => id,
            other => panic!("expected queued, got {:?}", other),
        };
        let all = app.queue().get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].content, "bonjour");
        assert_eq!(all[0].retries, 0);

        assert_eq!(app.send_message("encore", None).await, SendOutcome::Sent);
        assert_eq!(app.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_delivers_through_chat_client() {
        let (url, mut requests) = status_server(vec![200]).await;
        let app = context(url, 5);
        let id = app.queue().add("en attente", None);

        let report = app.flush_queue().await;
        assert_eq!(report.delivered, vec![id]);
        assert!(app.queue().is_empty());
        assert!(requests.recv().await.unwrap().contains("en attente"));
    }

    #[tokio::test]
    async fn test_spawned_flush_leaves_caller_free() {
        let mut app = offline_context(5);
        app.queue().add("lent", None);

        let release = Arc::new(Notify::new());
        let gate = release.clone();
        app.queue().set_retry_handler(move |_msg| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(true)
            }
        });

        let flush = tokio::spawn(app.flush_task());
        while !app.queue().is_processing() {
            tokio::task::yield_now().await;
        }

        // Le contexte reste utilisable pendant le passage
        assert!(app.flush_queue().await.skipped);
        assert!(!flush.is_finished());
        app.shutdown().await;

        release.notify_one();
        let report = flush.await.unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert!(app.queue().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_message_is_not_queued() {
        let mut app = offline_context(1);

        app.send_message("premier", None).await;
        let queued = app.queue().len();

        match app.send_message("second", None).await {
            SendOutcome::RateLimited { retry_in } => assert!(retry_in > Duration::ZERO),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(app.queue().len(), queued);
    }

    #[tokio::test]
    async fn test_flush_keeps_failed_messages() {
        let app = offline_context(5);
        app.queue().add("en attente", None);

        let report = app.flush_queue().await;
        assert!(!report.skipped);
        assert_eq!(report.attempted, 1);

        if report.delivered.is_empty() {
            assert_eq!(app.queue().get_all()[0].retries, 1);
        }
    }

    #[tokio::test]
    async fn test_start_without_tickers_opens_nothing() {
        let mut config = Config::default();
        config.tickers.clear();
        let mut app = AppContext::new(config, Arc::new(MemoryStorage::new()), Arc::new(Offline)).unwrap();

        app.start().await;
        assert!(app.prices().status().is_none());
        app.shutdown().await;
    }
}
