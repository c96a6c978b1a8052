// ============================================================================
// Module : queue
// ============================================================================
// File d'attente hors-ligne des messages de chat
// ============================================================================

pub mod offline_queue;

pub use offline_queue::{
    OfflineMessageQueue, ProcessReport, RetryHandler, MAX_RETRIES, QUEUE_STORAGE_KEY,
};
