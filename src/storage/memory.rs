// ============================================================================
// Structure : MemoryStorage
// ============================================================================
// Stockage de session en mémoire, perdu à l'arrêt du process
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use super::SessionStorage;

/// Backend mémoire protégé par un Mutex
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// CONCEPT RUST : PoisonError::into_inner
    /// - Un Mutex "empoisonné" (panic pendant le verrou) reste utilisable
    /// - La map est toujours dans un état cohérent ici (opérations atomiques)
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
