// ============================================================================
// Module : storage
// ============================================================================
// Stockage clé/valeur de session (équivalent du sessionStorage du navigateur)
//
// CONCEPTS RUST :
// 1. Trait : interface commune aux différents backends
// 2. Send + Sync : le stockage peut être partagé entre tâches tokio
// 3. Arc<dyn SessionStorage> : dispatch dynamique, le backend est choisi
//    au démarrage (fichier en production, mémoire dans les tests)
// ============================================================================

use anyhow::Result;

pub mod file;   // Backend fichier (un fichier JSON par clé)
pub mod memory; // Backend mémoire (tests, mode éphémère)

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Stockage clé/valeur de chaînes
pub trait SessionStorage: Send + Sync {
    /// Lit la valeur d'une clé (None si absente)
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Écrit la valeur d'une clé (remplace l'ancienne)
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Supprime une clé (sans erreur si absente)
    fn remove_item(&self, key: &str) -> Result<()>;
}
