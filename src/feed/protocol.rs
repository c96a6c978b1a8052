// ============================================================================
// Protocole du flux de prix
// ============================================================================
// Sortant : {"op": "SUBSCRIBE" | "UNSUBSCRIBE", "topic": "TRADE", "symbol": "AAPL"}
// Entrant : {"topic": "TRADE", "symbol": "AAPL", "data": [{"price": 271.49, "timestamp": 1700000000000}, ...]}
//
// Les prix peuvent arriver en nombre JSON ou en chaîne ("271.49")
// ============================================================================

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::LivePrice;

/// Seul topic consommé par le flux
pub const TRADE_TOPIC: &str = "TRADE";

/// Opération d'abonnement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    Subscribe,
    Unsubscribe,
}

/// Message envoyé au serveur
#[derive(Debug, Serialize)]
pub struct OutboundMessage<'a> {
    pub op: Op,
    pub topic: &'static str,
    pub symbol: &'a str,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(op: Op, symbol: &'a str) -> Self {
        Self {
            op,
            topic: TRADE_TOPIC,
            symbol,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Échec de la sérialisation du message sortant")
    }
}

/// Message reçu du serveur (seuls les champs utiles)
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    data: Vec<TradeData>,
}

#[derive(Debug, Deserialize)]
struct TradeData {
    #[serde(deserialize_with = "deserialize_price")]
    price: f64,
    /// Millisecondes Unix
    timestamp: i64,
}

/// Parse un message texte du flux
///
/// - Ok(Some((symbol, prix))) : événement de trade valide (dernier élément de `data`)
/// - Ok(None) : JSON valide mais pas un trade (ack, heartbeat, data vide...)
/// - Err : JSON invalide
pub fn parse_trade(text: &str) -> Result<Option<(String, LivePrice)>> {
    let message: InboundMessage =
        serde_json::from_str(text).context("Message du flux illisible")?;

    if message.topic.as_deref() != Some(TRADE_TOPIC) {
        return Ok(None);
    }

    // CONCEPT RUST : let-else avec tuple
    let (Some(symbol), Some(latest)) = (message.symbol, message.data.last()) else {
        return Ok(None);
    };

    let timestamp = DateTime::from_timestamp_millis(latest.timestamp)
        .with_context(|| format!("Timestamp invalide : {}", latest.timestamp))?;

    Ok(Some((symbol, LivePrice::new(latest.price, timestamp))))
}

/// Accepte 271.49 comme "271.49"
fn deserialize_price<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
