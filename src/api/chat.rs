// ============================================================================
// API Client : webhook de chat AYN
// ============================================================================
// Livre un message de chat à la fonction serverless du backend
//
// - 2xx : livré -> Ok(true)
// - autre statut HTTP : pas livré -> Ok(false) (la file réessaiera)
// - erreur réseau : Err (comptée comme un échec par la file)
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::models::{FileAttachment, QueuedMessage};

/// Timeout d'un envoi
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Corps de la requête envoyée au webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_attachment: Option<&'a FileAttachment>,
    /// Création du message, millisecondes Unix
    timestamp: i64,
}

impl<'a> From<&'a QueuedMessage> for ChatRequest<'a> {
    fn from(message: &'a QueuedMessage) -> Self {
        Self {
            message: &message.content,
            file_attachment: message.file_attachment.as_ref(),
            timestamp: message.created_at.timestamp_millis(),
        }
    }
}

/// Client HTTP du webhook
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl ChatClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ayn/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Échec de la création du client HTTP")?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.chat_url.clone(), config.chat_token.clone())
    }

    /// Envoie un message ; Ok(false) si le serveur le refuse
    #[instrument(skip(self, message), fields(id = %message.id))]
    pub async fn send(&self, message: &QueuedMessage) -> Result<bool> {
        let mut request = self.client.post(&self.url).json(&ChatRequest::from(message));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Échec de la requête HTTP vers le webhook de chat")?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "Message delivered");
            Ok(true)
        } else {
            warn!(status = %status, "Chat webhook rejected message");
            Ok(false)
        }
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
