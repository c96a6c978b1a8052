// ============================================================================
// Module : feed
// ============================================================================
// Flux de prix en direct via WebSocket, avec reconnexion exponentielle
// ============================================================================

pub mod live_feed;   // Tâche de fond + handle LivePriceFeed
pub mod live_prices; // Propriétaire du flux courant (remonté au changement de tickers)
pub mod protocol;    // Messages SUBSCRIBE / UNSUBSCRIBE / TRADE
pub mod socket;      // Traits Connector / FeedSocket + implémentation tungstenite
pub mod state;       // Machine à états de reconnexion (pure)

pub use live_feed::{FeedConfig, FeedStatus, LivePriceFeed};
pub use live_prices::LivePrices;
pub use socket::{Connector, FeedSocket, SocketEvent, TungsteniteConnector};
pub use state::{BackoffPolicy, CloseReason, ConnectionState, FeedAction, FeedEvent, ReconnectMachine};
