// ============================================================================
// Structure : Config
// ============================================================================
// Configuration d'exécution, chargée depuis les variables d'environnement
// AYN_* par-dessus des valeurs par défaut
//
// CONCEPTS RUST :
// 1. Default : valeurs par défaut centralisées
// 2. Closure en paramètre : from_vars() reçoit la source des variables,
//    ce qui permet de tester sans toucher à l'environnement du process
// 3. FromStr + context() : parsing avec message d'erreur explicite
// ============================================================================

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::debug;

use crate::feed::BackoffPolicy;

/// Endpoint par défaut du flux de prix (serveur de développement local)
pub const DEFAULT_PRICE_FEED_URL: &str = "ws://127.0.0.1:9443/market";

/// Endpoint par défaut du webhook de chat (fonction Supabase locale)
pub const DEFAULT_CHAT_URL: &str = "http://127.0.0.1:54321/functions/v1/ayn-chat";

/// Configuration de l'application
#[derive(Debug, Clone)]
pub struct Config {
    /// URL WebSocket du flux de prix
    pub price_feed_url: String,

    /// Tickers à suivre (ex: ["AAPL", "TSLA"])
    pub tickers: Vec<String>,

    /// URL du webhook de chat
    pub chat_url: String,

    /// Jeton bearer optionnel pour le webhook
    pub chat_token: Option<String>,

    /// Répertoire du stockage de session (file hors-ligne)
    pub storage_dir: PathBuf,

    /// Limiteur du chat : nombre de messages par fenêtre
    pub chat_max_requests: usize,

    /// Limiteur du chat : durée de la fenêtre en ms
    pub chat_window_ms: u64,

    /// Période de vidage de la file hors-ligne (secondes)
    pub queue_flush_secs: u64,

    /// Période d'affichage des prix (secondes)
    pub price_report_secs: u64,

    /// Politique de reconnexion du flux de prix
    pub backoff: BackoffPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            price_feed_url: DEFAULT_PRICE_FEED_URL.to_string(),
            tickers: vec!["AAPL".to_string(), "TSLA".to_string(), "BTC-USD".to_string()],
            chat_url: DEFAULT_CHAT_URL.to_string(),
            chat_token: None,
            storage_dir: default_storage_dir(),
            chat_max_requests: 10,
            chat_window_ms: 60_000,
            queue_flush_secs: 15,
            price_report_secs: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl Config {
    /// Charge la configuration depuis l'environnement du process
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Charge la configuration depuis une source de variables quelconque
    pub fn from_vars<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = get("AYN_PRICE_FEED_URL") {
            config.price_feed_url = url;
        }
        if let Some(list) = get("AYN_TICKERS") {
            config.tickers = parse_tickers(&list);
        }
        if let Some(url) = get("AYN_CHAT_URL") {
            config.chat_url = url;
        }
        if let Some(token) = get("AYN_CHAT_TOKEN").filter(|t| !t.is_empty()) {
            config.chat_token = Some(token);
        }
        if let Some(dir) = get("AYN_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("AYN_CHAT_MAX_REQUESTS") {
            config.chat_max_requests = parse_var("AYN_CHAT_MAX_REQUESTS", &raw)?;
        }
        if let Some(raw) = get("AYN_CHAT_WINDOW_MS") {
            config.chat_window_ms = parse_var("AYN_CHAT_WINDOW_MS", &raw)?;
        }
        if let Some(raw) = get("AYN_QUEUE_FLUSH_SECS") {
            config.queue_flush_secs = parse_var("AYN_QUEUE_FLUSH_SECS", &raw)?;
        }
        if let Some(raw) = get("AYN_PRICE_REPORT_SECS") {
            config.price_report_secs = parse_var("AYN_PRICE_REPORT_SECS", &raw)?;
        }
        if let Some(raw) = get("AYN_RECONNECT_MAX_ATTEMPTS") {
            config.backoff.max_attempts = parse_var("AYN_RECONNECT_MAX_ATTEMPTS", &raw)?;
        }

        debug!(?config, "Configuration loaded");
        Ok(config)
    }
}

/// Découpe une liste "AAPL, tsla,,BTC-USD" en tickers normalisés
pub fn parse_tickers(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Valeur invalide pour {} : {:?}", key, raw))
}

/// ~/.local/share/ayn/session sur Linux, ./session en dernier recours
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("ayn").join("session"))
        .unwrap_or_else(|| PathBuf::from("./session"))
}

// ============================================================================
// Tests unitaires
// ============================================================================
