//! # pgbackup
//!
//! Dumps SQL versionnés nommés `<nom>_v<N>.sql`.
//!
//! ## Features
//!
//! - Parsing strict du suffixe de version (`v` suivi d'un entier)
//! - Scan récursif d'un dossier de sauvegardes
//! - Sélection du dump de version maximale (égalité: plus petit chemin)
//! - Calcul du prochain numéro de version pour un nouvel export
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pgbackup::select_latest;
//! use std::path::Path;
//!
//! let latest = select_latest(Path::new("data/db_backups"))?;
//! println!("v{} -> {}", latest.version, latest.path.display());
//! ```

pub mod error;
pub mod scan;
pub mod types;
pub mod version;

pub use error::BackupError;
pub use scan::{collect_sql_files, scan};
pub use types::{BackupFile, BackupName, BackupSet};
pub use version::parse_version;

use std::path::Path;

/// Sélectionne le dump de version maximale sous `dir`
///
/// Échoue si un fichier `.sql` porte un suffixe de version invalide, ou si
/// aucun dump n'est présent.
pub fn select_latest(dir: &Path) -> Result<BackupFile, BackupError> {
    let mut set = scan(dir)?;

    if !set.rejected.is_empty() {
        let (_, err) = set.rejected.swap_remove(0);
        return Err(err);
    }

    if set.is_empty() {
        return Err(BackupError::NoBackups(dir.to_path_buf()));
    }

    set.latest()
        .cloned()
        .ok_or_else(|| BackupError::NoBackups(dir.to_path_buf()))
}

/// Prochaine version à utiliser pour un export dans `dir`
///
/// `1` si le dossier n'existe pas encore ou ne contient aucun dump reconnu.
pub fn next_version(dir: &Path) -> Result<u64, BackupError> {
    if !dir.exists() {
        return Ok(1);
    }

    scan(dir)?.next_version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn backup(path: &str, version: u64) -> BackupFile {
        BackupFile {
            path: PathBuf::from(path),
            version,
        }
    }

    #[test]
    fn test_latest_picks_max_version() {
        let set = BackupSet {
            backups: vec![
                backup("a_v1.sql", 1),
                backup("b_v10.sql", 10),
                backup("c_v2.sql", 2),
            ],
            rejected: vec![],
        };
        let latest = set.latest().unwrap();
        assert_eq!(latest.version, 10);
        assert_eq!(latest.path, PathBuf::from("b_v10.sql"));
    }

    #[test]
    fn test_latest_tie_keeps_first() {
        let set = BackupSet {
            backups: vec![backup("a/db_v3.sql", 3), backup("b/db_v3.sql", 3)],
            rejected: vec![],
        };
        assert_eq!(set.latest().unwrap().path, PathBuf::from("a/db_v3.sql"));
    }

    #[test]
    fn test_latest_empty() {
        let set = BackupSet::default();
        assert!(set.is_empty());
        assert!(set.latest().is_none());
        assert_eq!(set.next_version().unwrap(), 1);
    }

    #[test]
    fn test_next_version_after_max() {
        let set = BackupSet {
            backups: vec![backup("db_v2.sql", 2), backup("db_v7.sql", 7)],
            rejected: vec![],
        };
        assert_eq!(set.next_version().unwrap(), 8);
    }

    #[test]
    fn test_next_version_overflow() {
        let set = BackupSet {
            backups: vec![backup("db_v18446744073709551615.sql", u64::MAX)],
            rejected: vec![],
        };
        let err = set.next_version().unwrap_err();
        assert!(matches!(
            err,
            BackupError::VersionOverflow(ref p) if p == Path::new("db_v18446744073709551615.sql")
        ));
        assert!(!err.is_name_error());
    }

    #[test]
    fn test_backup_name() {
        let name = BackupName::new("sidewalk_gaps", 4);
        assert_eq!(name.file_name(), "sidewalk_gaps_v4.sql");
        assert_eq!(name.partial_file_name(), "sidewalk_gaps_v4.sql.partial");
        assert_eq!(name.to_string(), "sidewalk_gaps_v4.sql");
        assert_eq!(parse_version(&name.file_name()).unwrap(), 4);
    }

    #[test]
    fn test_next_version_missing_dir() {
        let dir = Path::new("/nonexistent/pgbackup/test/dir");
        assert_eq!(next_version(dir).unwrap(), 1);
    }

    #[test]
    fn test_select_latest_missing_dir() {
        let err = select_latest(Path::new("/nonexistent/pgbackup/test/dir")).unwrap_err();
        assert!(matches!(err, BackupError::NotADirectory(_)));
    }
}
