//! Export et import de dumps SQL versionnés

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use pgbackup::{BackupFile, BackupName};
use tracing::{info, warn};

use crate::config::{Config, Credentials};
use crate::db::ident::validate_identifier;
use crate::db::{connect, lifecycle, tools};
use crate::report::{DumpReport, LoadReport};

/// Chemin final et temporaire du prochain dump de `database` dans `folder`
pub fn plan_dump(folder: &Path, database: &str) -> Result<(BackupName, PathBuf, PathBuf)> {
    let set = if folder.exists() {
        pgbackup::scan(folder)
            .with_context(|| format!("Cannot scan backup folder {}", folder.display()))?
    } else {
        Default::default()
    };

    for (path, e) in &set.rejected {
        warn!(path = %path.display(), error = %e, "Ignoring .sql file without version suffix");
    }

    let version = set
        .next_version()
        .with_context(|| format!("Cannot export {}", database))?;
    let name = BackupName::new(database, version);
    let final_path = folder.join(name.file_name());
    let partial_path = folder.join(name.partial_file_name());

    Ok((name, final_path, partial_path))
}

/// Checksum blake3 (hex) et taille d'un fichier
fn file_fingerprint(path: &Path) -> Result<(String, u64)> {
    let mut hasher = blake3::Hasher::new();
    crate::setup::hash_file(&mut hasher, path)?;
    let bytes = std::fs::metadata(path)?.len();
    Ok((hex::encode(hasher.finalize().as_bytes()), bytes))
}

/// Exporte la base dans un nouveau fichier `<database>_v<N>.sql`
///
/// Le dump est écrit dans un `.partial` puis renommé: un dump interrompu
/// n'est jamais sélectionnable par `db_load`.
pub async fn export_database(
    config: &Config,
    credentials: &Credentials,
    database: &str,
    folder: &Path,
) -> Result<DumpReport> {
    let started_at = Instant::now();
    validate_identifier(database)?;

    std::fs::create_dir_all(folder)
        .with_context(|| format!("Cannot create backup folder {}", folder.display()))?;

    let (name, final_path, partial_path) = plan_dump(folder, database)?;
    let db = credentials.database(database, config.pool_size);

    info!(database = database, version = name.version, path = %final_path.display(), "Exporting database");

    if let Err(e) = tools::pg_dump(&config.tools, &db, &partial_path).await {
        if partial_path.exists() {
            let _ = std::fs::remove_file(&partial_path);
        }
        return Err(anyhow::Error::new(e).context(format!("Failed to export {}", database)));
    }

    std::fs::rename(&partial_path, &final_path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            partial_path.display(),
            final_path.display()
        )
    })?;

    let (checksum, bytes) = file_fingerprint(&final_path)?;

    Ok(DumpReport {
        database: database.to_string(),
        path: final_path,
        version: name.version,
        bytes,
        checksum,
        duration_secs: started_at.elapsed().as_secs_f64(),
    })
}

/// Sélectionne le dump de version maximale sous `folder`
pub fn select_backup(folder: &Path) -> Result<BackupFile> {
    pgbackup::select_latest(folder)
        .with_context(|| format!("Cannot select a backup in {}", folder.display()))
}

/// Ligne affichée avant le rechargement d'un dump
pub fn loading_message(backup: &BackupFile) -> String {
    format!(
        "Loading db version {} from \n\t-> {}",
        backup.version,
        backup.path.display()
    )
}

/// Recrée la base puis rejoue le dump
pub async fn load_database(
    config: &Config,
    credentials: &Credentials,
    database: &str,
    backup: &BackupFile,
) -> Result<LoadReport> {
    let started_at = Instant::now();

    let maintenance = connect(&credentials.maintenance()).await?;
    lifecycle::drop_database(&maintenance, database).await?;
    lifecycle::create_database(&maintenance, database).await?;

    let db = credentials.database(database, config.pool_size);
    tools::psql_file(&config.tools, &db, &backup.path)
        .await
        .with_context(|| format!("Failed to load {} into {}", backup.path.display(), database))?;

    info!(database = database, version = backup.version, "Database restored");

    Ok(LoadReport {
        database: database.to_string(),
        path: backup.path.clone(),
        version: backup.version,
        duration_secs: started_at.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use tempfile::TempDir;

    fn folder_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_plan_dump_empty_folder() {
        let tmp = TempDir::new().unwrap();
        let (name, final_path, partial_path) = plan_dump(tmp.path(), "sidewalk_gaps").unwrap();

        assert_eq!(name.version, 1);
        assert_eq!(final_path, tmp.path().join("sidewalk_gaps_v1.sql"));
        assert_eq!(partial_path, tmp.path().join("sidewalk_gaps_v1.sql.partial"));
    }

    #[test]
    fn test_plan_dump_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("not_yet");
        let (name, _, _) = plan_dump(&folder, "gaps").unwrap();
        assert_eq!(name.version, 1);
    }

    #[test]
    fn test_plan_dump_increments_and_ignores_junk() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("gaps_v2.sql"), "").unwrap();
        std::fs::create_dir_all(tmp.path().join("old")).unwrap();
        std::fs::write(tmp.path().join("old/other_v9.sql"), "").unwrap();
        std::fs::write(tmp.path().join("manual.sql"), "").unwrap();
        std::fs::write(tmp.path().join("gaps_v20.sql.partial"), "").unwrap();

        let (name, final_path, _) = plan_dump(tmp.path(), "gaps").unwrap();
        assert_eq!(name.version, 10);
        assert!(final_path.ends_with("gaps_v10.sql"));
    }

    #[test]
    fn test_select_backup_context() {
        let tmp = TempDir::new().unwrap();
        let err = select_backup(tmp.path()).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Cannot select a backup"));
        assert!(chain.contains("No .sql backup found"));
    }

    #[test]
    fn test_file_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gaps_v1.sql");
        std::fs::write(&path, "SELECT 1;\n").unwrap();

        let (checksum, bytes) = file_fingerprint(&path).unwrap();
        assert_eq!(bytes, 10);
        assert_eq!(checksum, blake3::hash(b"SELECT 1;\n").to_hex().to_string());
    }

    #[test]
    fn test_plan_dump_version_overflow() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("gaps_v18446744073709551615.sql"), "").unwrap();

        let err = plan_dump(tmp.path(), "gaps").unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Cannot export gaps"));
        assert!(chain.contains("highest possible version"));
    }

    #[tokio::test]
    async fn test_failed_dump_leaves_no_backup() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.tools = ToolPaths {
            pg_dump: PathBuf::from("/bin/false"),
            ..Default::default()
        };
        let credentials = config.credentials.localhost.clone();

        let err = export_database(&config, &credentials, "gaps", tmp.path())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to export gaps"));

        let leftovers: Vec<String> = folder_entries(tmp.path())
            .into_iter()
            .filter(|name| name.ends_with(".sql") || name.ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
        assert!(select_backup(tmp.path()).is_err());
    }

    #[tokio::test]
    async fn test_export_rejects_invalid_database_name() {
        let tmp = TempDir::new().unwrap();
        let config = Config::default();
        let credentials = config.credentials.localhost.clone();

        let err = export_database(&config, &credentials, "--help", tmp.path())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid identifier"));
        assert!(folder_entries(tmp.path()).is_empty());
    }

    #[test]
    fn test_loading_message() {
        let backup = BackupFile {
            path: PathBuf::from("data/db_backups/sidewalk_gaps_v3.sql"),
            version: 3,
        };
        assert_eq!(
            loading_message(&backup),
            "Loading db version 3 from \n\t-> data/db_backups/sidewalk_gaps_v3.sql"
        );
    }
}
