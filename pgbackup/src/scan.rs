//! Parcours récursif des dossiers de sauvegarde

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::{BackupFile, BackupSet, SQL_EXTENSION};
use crate::BackupError;

/// Collecte récursivement les fichiers `*.sql`, triés par chemin
pub fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    if !dir.is_dir() {
        return Err(BackupError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_into(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), BackupError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let entry_path = entry.path();

        if entry_path.is_dir() {
            collect_into(&entry_path, files)?;
        } else if entry_path
            .extension()
            .map_or(false, |ext| ext == SQL_EXTENSION)
        {
            files.push(entry_path);
        }
    }

    Ok(())
}

/// Scanne un dossier et classe chaque `*.sql` en dump reconnu ou rejeté
pub fn scan(dir: &Path) -> Result<BackupSet, BackupError> {
    let mut set = BackupSet::default();

    for path in collect_sql_files(dir)? {
        match BackupFile::from_path(&path) {
            Ok(backup) => {
                debug!(path = %path.display(), version = backup.version, "Found backup");
                set.backups.push(backup);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Rejected backup name");
                set.rejected.push((path, e));
            }
        }
    }

    Ok(set)
}
