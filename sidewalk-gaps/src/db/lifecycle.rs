//! Création et suppression de bases, extension PostGIS

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{info, warn};

use super::ident::{quote_ident, validate_identifier};

/// Vérifie si une base existe (requête sur la base de maintenance)
pub async fn database_exists(maintenance: &Pool, dbname: &str) -> Result<bool> {
    let client = maintenance.get().await?;

    let row = client
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&dbname])
        .await
        .context("Failed to query pg_database")?;

    Ok(row.is_some())
}

/// Crée la base si elle n'existe pas
///
/// Retourne `true` si la base a été créée, `false` si elle existait déjà.
pub async fn create_database(maintenance: &Pool, dbname: &str) -> Result<bool> {
    validate_identifier(dbname)?;

    if database_exists(maintenance, dbname).await? {
        info!(database = dbname, "Database already exists");
        return Ok(false);
    }

    let client = maintenance.get().await?;
    client
        .batch_execute(&format!("CREATE DATABASE {}", quote_ident(dbname)))
        .await
        .with_context(|| format!("Failed to create database {}", dbname))?;

    info!(database = dbname, "Database created");
    Ok(true)
}

/// Supprime la base après avoir coupé les autres sessions
pub async fn drop_database(maintenance: &Pool, dbname: &str) -> Result<()> {
    validate_identifier(dbname)?;

    let client = maintenance.get().await?;

    let terminated = client
        .execute(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
            &[&dbname],
        )
        .await
        .context("Failed to terminate sessions")?;
    if terminated > 0 {
        warn!(database = dbname, sessions = terminated, "Terminated open sessions");
    }

    client
        .batch_execute(&format!("DROP DATABASE IF EXISTS {}", quote_ident(dbname)))
        .await
        .with_context(|| format!("Failed to drop database {}", dbname))?;

    info!(database = dbname, "Database dropped");
    Ok(())
}

/// Active PostGIS (peut nécessiter des droits superuser)
///
/// Si l'extension existe déjà mais que l'utilisateur ne peut pas la (re)créer,
/// on dégrade gracieusement.
pub async fn ensure_postgis(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;

    match client
        .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow::anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
            Ok(())
        }
    }
}
