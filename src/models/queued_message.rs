// ============================================================================
// Structure : QueuedMessage
// ============================================================================
// Représente un message de chat qui n'a pas pu être envoyé et qui attend
// une nouvelle tentative dans la file hors-ligne
//
// CONCEPTS RUST :
// 1. #[serde(rename_all = "camelCase")] : le format persisté suit les noms
//    JSON du client web (fileAttachment, ...)
// 2. #[serde(with = "...")] : module de sérialisation personnalisé
//    (ici chrono::serde::ts_milliseconds pour un timestamp Unix en ms)
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pièce jointe référencée par un message (le fichier est déjà uploadé)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Nom du fichier affiché (ex: "plan.pdf")
    pub name: String,

    /// URL publique du fichier dans le stockage
    pub url: String,

    /// Type MIME (ex: "application/pdf")
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl FileAttachment {
    pub fn new(name: impl Into<String>, url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Message en attente dans la file hors-ligne
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    /// Identifiant unique (UUID v4)
    pub id: String,

    /// Contenu texte du message
    pub content: String,

    /// Pièce jointe optionnelle
    /// CONCEPT RUST : skip_serializing_if
    /// - Le champ est omis du JSON quand il vaut None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_attachment: Option<FileAttachment>,

    /// Date de création (sérialisée en millisecondes Unix)
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Nombre de tentatives échouées
    #[serde(default)]
    pub retries: u32,
}

impl QueuedMessage {
    /// Crée un nouveau message avec un identifiant frais et 0 tentative
    pub fn new(content: impl Into<String>, file_attachment: Option<FileAttachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            file_attachment,
            created_at: Utc::now(),
            retries: 0,
        }
    }

    /// Vérifie si le message a atteint le plafond de tentatives
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
