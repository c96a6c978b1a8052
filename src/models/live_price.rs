// ============================================================================
// Structure : LivePrice
// ============================================================================
// Dernier prix reçu pour un ticker via le flux WebSocket
//
// Pas d'historique : chaque tick remplace intégralement la valeur
// précédente (last-write-wins)
// ============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Map ticker -> dernier prix
pub type PriceMap = HashMap<String, LivePrice>;

/// Prix en direct d'un ticker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivePrice {
    /// Prix de la dernière transaction
    pub price: f64,

    /// Horodatage de la transaction (fourni par le flux)
    pub timestamp: DateTime<Utc>,
}

impl LivePrice {
    pub fn new(price: f64, timestamp: DateTime<Utc>) -> Self {
        Self { price, timestamp }
    }

    /// Formatte le prix pour l'affichage (ex: "AAPL     $271.49  14:02:11")
    pub fn display(&self, symbol: &str) -> String {
        format!(
            "{:<8} {:>12}  {}",
            symbol,
            format!("${:.2}", self.price),
            self.timestamp.format("%H:%M:%S")
        )
    }
}
