// ============================================================================
// Module : models
// ============================================================================
// Ce module contient les structures de données partagées par la file
// d'attente hors-ligne et le flux de prix en direct
// ============================================================================

pub mod queued_message; // Message de chat en attente d'envoi
pub mod live_price;     // Dernier prix connu d'un ticker

// Re-export des structures principales pour simplifier les imports
// Au lieu de : use ayn::models::queued_message::QueuedMessage;
// On peut faire : use ayn::models::QueuedMessage;
pub use live_price::{LivePrice, PriceMap};
pub use queued_message::{FileAttachment, QueuedMessage};
