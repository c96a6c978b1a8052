// ============================================================================
// Module : api
// ============================================================================
// Clients des services distants appelés par l'application
// ============================================================================

pub mod chat; // Webhook de chat AYN

#[cfg(test)]
pub(crate) mod testing; // Serveur HTTP à statuts fixés

// Re-export du client principal
pub use chat::ChatClient;
