//! Types de données pour le crate pgbackup

use std::fmt;
use std::path::{Path, PathBuf};

use crate::BackupError;

/// Extension des dumps SQL reconnus par le scan
pub const SQL_EXTENSION: &str = "sql";

/// Un dump SQL versionné trouvé sur disque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Chemin complet du fichier
    pub path: PathBuf,

    /// Version extraite du suffixe `_v<N>`
    pub version: u64,
}

impl BackupFile {
    /// Construit un `BackupFile` en lisant la version dans le nom du fichier
    pub fn from_path(path: &Path) -> Result<Self, BackupError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let version = crate::version::parse_version(&name)?;

        Ok(Self {
            path: path.to_path_buf(),
            version,
        })
    }

    /// Nom du fichier (sans le dossier)
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Nom d'un dump à produire: `<stem>_v<version>.sql`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    pub stem: String,
    pub version: u64,
}

impl BackupName {
    pub fn new(stem: impl Into<String>, version: u64) -> Self {
        Self {
            stem: stem.into(),
            version,
        }
    }

    /// Nom de fichier final
    pub fn file_name(&self) -> String {
        format!("{}_v{}.{}", self.stem, self.version, SQL_EXTENSION)
    }

    /// Nom de fichier temporaire, ignoré par le scan tant que le dump n'est pas terminé
    pub fn partial_file_name(&self) -> String {
        format!("{}.partial", self.file_name())
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Résultat d'un scan récursif
#[derive(Debug, Default)]
pub struct BackupSet {
    /// Dumps dont le nom a été reconnu, triés par chemin
    pub backups: Vec<BackupFile>,

    /// Fichiers `.sql` dont le suffixe de version est invalide, triés par chemin
    pub rejected: Vec<(PathBuf, BackupError)>,
}

impl BackupSet {
    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    /// Dump de version maximale
    ///
    /// Les dumps étant triés par chemin, le premier rencontré l'emporte en cas
    /// d'égalité: le plus petit chemin dans l'ordre lexicographique.
    pub fn latest(&self) -> Option<&BackupFile> {
        let mut latest: Option<&BackupFile> = None;
        for backup in &self.backups {
            match latest {
                Some(current) if backup.version <= current.version => {}
                _ => latest = Some(backup),
            }
        }
        latest
    }

    /// Version du prochain dump: max + 1, ou `1` sans dump reconnu
    ///
    /// Les fichiers rejetés ne comptent pas.
    pub fn next_version(&self) -> Result<u64, BackupError> {
        match self.latest() {
            None => Ok(1),
            Some(latest) => latest
                .version
                .checked_add(1)
                .ok_or_else(|| BackupError::VersionOverflow(latest.path.clone())),
        }
    }
}
