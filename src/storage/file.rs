// ============================================================================
// Structure : FileStorage
// ============================================================================
// Stockage de session sur disque : un fichier `<clé>.json` par clé
//
// L'écriture passe par un fichier temporaire puis un rename, pour ne jamais
// laisser un fichier à moitié écrit si le process est interrompu.
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::SessionStorage;

/// Backend fichier
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Crée un stockage dans `dir` (le répertoire est créé à la première écriture)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Les clés sont des identifiants internes ("ayn-offline-queue"),
        // on neutralise quand même les séparateurs de chemin
        let safe: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl SessionStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);

        // CONCEPT RUST : match sur ErrorKind
        // - Fichier absent = clé absente, pas une erreur
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Échec de la lecture de {}", path.display())),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Échec de la création de {}", self.dir.display()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, value)
            .with_context(|| format!("Échec de l'écriture de {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Échec du renommage vers {}", path.display()))?;

        debug!(key, bytes = value.len(), "Session item written");
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Échec de la suppression de {}", path.display())),
        }
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
