// ============================================================================
// Sockets du flux de prix
// ============================================================================
// Le driver ne parle jamais directement à tokio-tungstenite : il passe par
// les traits Connector (fabrique de sockets) et FeedSocket. Les tests
// injectent un connecteur scripté, la production utilise
// TungsteniteConnector.
//
// CONCEPTS RUST :
// 1. BoxFuture : méthodes async dans un trait object (dyn Connector)
// 2. Box<dyn FeedSocket> : le type concret du socket est caché au driver
// ============================================================================

use anyhow::{Context, Result};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Ce que le socket remonte au driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Message texte reçu
    Text(String),
    /// Erreur de transport (la connexion est considérée perdue)
    Error(String),
    /// Fermeture propre ou fin du flux
    Closed,
}

/// Socket ouvert vers le serveur de prix
pub trait FeedSocket: Send {
    /// Envoie un message texte
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Attend le prochain événement
    fn next_event(&mut self) -> BoxFuture<'_, SocketEvent>;

    /// Ferme le socket (best-effort)
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Fabrique de sockets
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Box<dyn FeedSocket>>>;
}

// ============================================================================
// Implémentation tokio-tungstenite
// ============================================================================

/// Connecteur WebSocket réel (ws:// et wss://)
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Box<dyn FeedSocket>>> {
        let url = url.to_string();
        async move { open(url).await }.boxed()
    }
}

#[instrument]
async fn open(url: String) -> Result<Box<dyn FeedSocket>> {
    let (stream, response) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Échec de la connexion WebSocket vers {}", url))?;

    debug!(status = %response.status(), "WebSocket handshake completed");
    Ok(Box::new(TungsteniteSocket { stream }))
}

struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FeedSocket for TungsteniteSocket {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        async move {
            self.stream
                .send(Message::Text(text))
                .await
                .context("Échec de l'envoi sur le WebSocket")
        }
        .boxed()
    }

    fn next_event(&mut self) -> BoxFuture<'_, SocketEvent> {
        async move {
            loop {
                match self.stream.next().await {
                    None => return SocketEvent::Closed,
                    Some(Err(e)) => return SocketEvent::Error(e.to_string()),
                    Some(Ok(Message::Text(text))) => return SocketEvent::Text(text),
                    Some(Ok(Message::Binary(bytes))) => {
                        return SocketEvent::Text(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Server closed the WebSocket");
                        return SocketEvent::Closed;
                    }
                    // Ping/Pong gérés par tungstenite
                    Some(Ok(_)) => continue,
                }
            }
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.stream
                .close(None)
                .await
                .context("Échec de la fermeture du WebSocket")
        }
        .boxed()
    }
}
