//! Types d'erreurs pour le crate pgbackup

use std::path::PathBuf;

use thiserror::Error;

/// Erreurs pouvant survenir lors de la sélection d'une sauvegarde
#[derive(Debug, Error)]
pub enum BackupError {
    /// Erreur d'I/O lors du parcours du dossier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Le chemin fourni n'est pas un dossier
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Aucun fichier .sql trouvé
    #[error("No .sql backup found under {}", .0.display())]
    NoBackups(PathBuf),

    /// Nom de fichier sans `_` : pas de jeton de version
    #[error("Missing version suffix in '{file}' (expected <name>_v<N>.sql)")]
    MissingVersion { file: String },

    /// Jeton de version présent mais invalide
    #[error("Invalid version token '{token}' in '{file}' (expected v<integer>)")]
    InvalidVersion { file: String, token: String },

    /// Le dump le plus récent porte déjà la version maximale représentable
    #[error("Cannot number a new backup: {} already has the highest possible version", .0.display())]
    VersionOverflow(PathBuf),
}

impl BackupError {
    /// Crée une erreur de version invalide avec contexte
    pub fn invalid_version(file: impl Into<String>, token: impl Into<String>) -> Self {
        Self::InvalidVersion {
            file: file.into(),
            token: token.into(),
        }
    }

    /// Vrai si l'erreur concerne le nom d'un fichier (et non l'I/O)
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            Self::MissingVersion { .. } | Self::InvalidVersion { .. }
        )
    }
}
