// ============================================================================
// AYN - Library
// ============================================================================
// Couche de résilience du client AYN : limiteur de débit, file d'attente
// hors-ligne des messages de chat, flux de prix en direct avec reconnexion
// ============================================================================

pub mod api;          // Webhook de chat
pub mod app;          // Contexte applicatif (propriétaire des composants)
pub mod config;       // Configuration (variables AYN_*)
pub mod feed;         // Flux de prix WebSocket
pub mod models;       // Structures de données
pub mod queue;        // File d'attente hors-ligne
pub mod rate_limiter; // Limiteur à fenêtre glissante
pub mod storage;      // Stockage de session

pub use app::AppContext;
pub use config::Config;
pub use rate_limiter::RateLimiter;
