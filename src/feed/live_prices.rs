// ============================================================================
// Structure : LivePrices
// ============================================================================
// Propriétaire du flux de prix de l'application
//
// Un seul flux à la fois. Quand l'ensemble des tickers change, l'ancien
// flux est détruit (teardown complet) et un nouveau est démarré. Un ensemble
// vide ne démarre aucune connexion.
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::models::{LivePrice, PriceMap};

use super::live_feed::{FeedConfig, FeedStatus, LivePriceFeed};
use super::socket::Connector;
use super::state::BackoffPolicy;

pub struct LivePrices {
    url: String,
    backoff: BackoffPolicy,
    connector: Arc<dyn Connector>,
    tickers: Vec<String>,
    feed: Option<LivePriceFeed>,
}

impl LivePrices {
    pub fn new(url: impl Into<String>, backoff: BackoffPolicy, connector: Arc<dyn Connector>) -> Self {
        Self {
            url: url.into(),
            backoff,
            connector,
            tickers: Vec::new(),
            feed: None,
        }
    }

    pub fn from_config(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::new(config.price_feed_url.clone(), config.backoff, connector)
    }

    /// Change l'ensemble des tickers suivis
    ///
    /// Retourne true si l'ensemble a changé (et donc le flux a été remonté).
    /// L'ordre et les doublons sont ignorés.
    pub async fn set_tickers<I, S>(&mut self, tickers: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // CONCEPT RUST : BTreeSet
        // - Déduplique et trie : ["TSLA", "AAPL", "TSLA"] == ["AAPL", "TSLA"]
        let wanted: Vec<String> = tickers
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if wanted == self.tickers {
            return false;
        }

        if let Some(feed) = self.feed.take() {
            feed.shutdown().await;
        }

        info!(from = ?self.tickers, to = ?wanted, "Ticker set changed");
        self.tickers = wanted;

        if !self.tickers.is_empty() {
            let config = FeedConfig {
                url: self.url.clone(),
                tickers: self.tickers.clone(),
                backoff: self.backoff,
            };
            self.feed = Some(LivePriceFeed::spawn(config, self.connector.clone()));
        }
        true
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Derniers prix du flux courant (vide sans flux)
    pub fn prices(&self) -> PriceMap {
        self.feed.as_ref().map(|f| f.prices()).unwrap_or_default()
    }

    pub fn price(&self, symbol: &str) -> Option<LivePrice> {
        self.feed.as_ref().and_then(|f| f.price(symbol))
    }

    pub fn status(&self) -> Option<FeedStatus> {
        self.feed.as_ref().map(|f| f.status())
    }

    pub fn is_connected(&self) -> bool {
        self.feed.as_ref().map(|f| f.is_connected()).unwrap_or(false)
    }

    /// Détruit le flux courant et attend sa fin
    pub async fn shutdown(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.shutdown().await;
        }
    }
}
