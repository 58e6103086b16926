//! Pool de connexions PostgreSQL

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::debug;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Pas de SSL (défaut)
    #[default]
    Disable,
    /// SSL préféré mais non requis
    Prefer,
    /// SSL requis
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!("Invalid SSL mode: {}. Use: disable, prefer, require", s)),
        }
    }
}

impl SslMode {
    /// Mode transmis au driver: `Require` refuse une connexion en clair
    fn as_driver(&self) -> deadpool_postgres::SslMode {
        match self {
            SslMode::Disable => deadpool_postgres::SslMode::Disable,
            SslMode::Prefer => deadpool_postgres::SslMode::Prefer,
            SslMode::Require => deadpool_postgres::SslMode::Require,
        }
    }

    /// Valeur de `PGSSLMODE` transmise aux outils clients (pg_dump, psql)
    pub fn as_libpq(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

/// Descripteur de connexion à une base précise
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "sidewalk_gaps".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 2,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl fmt::Display for DatabaseConfig {
    // Jamais le mot de passe
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

/// Crée la configuration TLS pour rustls
fn make_tls_connector() -> Result<MakeRustlsConnect> {
    let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}

/// Configuration deadpool correspondant au descripteur
fn pool_config(config: &DatabaseConfig) -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();
    cfg.ssl_mode = Some(config.ssl_mode.as_driver());

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size.max(1),
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    cfg
}

/// Crée un pool de connexions
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let cfg = pool_config(config);

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => {
            let tls = make_tls_connector()?;
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .context("Failed to create database pool with TLS")
        }
    }
}

/// Teste la connexion à la base
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;
    Ok(())
}

/// Crée le pool et vérifie qu'une connexion aboutit
pub async fn connect(config: &DatabaseConfig) -> Result<Pool> {
    let pool = create_pool(config)?;
    test_connection(&pool)
        .await
        .with_context(|| format!("Cannot connect to {}", config))?;
    debug!(database = %config, "Connected to PostgreSQL");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parse() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("OFF".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("prefer".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("Require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("verify-full".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_display_hides_password() {
        let config = DatabaseConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let shown = config.to_string();
        assert_eq!(shown, "postgres@localhost:5432/sidewalk_gaps");
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_pool_config_enforces_ssl_mode() {
        let require = pool_config(&DatabaseConfig {
            ssl_mode: SslMode::Require,
            ..Default::default()
        });
        assert!(matches!(
            require.ssl_mode,
            Some(deadpool_postgres::SslMode::Require)
        ));

        let prefer = pool_config(&DatabaseConfig {
            ssl_mode: SslMode::Prefer,
            ..Default::default()
        });
        assert!(matches!(
            prefer.ssl_mode,
            Some(deadpool_postgres::SslMode::Prefer)
        ));

        let disable = pool_config(&DatabaseConfig::default());
        assert!(matches!(
            disable.ssl_mode,
            Some(deadpool_postgres::SslMode::Disable)
        ));
    }

    #[test]
    fn test_pool_config_connection_fields() {
        let cfg = pool_config(&DatabaseConfig {
            host: "db.example.org".into(),
            port: 6543,
            pool_size: 0,
            ..Default::default()
        });
        assert_eq!(cfg.host.as_deref(), Some("db.example.org"));
        assert_eq!(cfg.port, Some(6543));
        assert_eq!(cfg.dbname.as_deref(), Some("sidewalk_gaps"));
        assert_eq!(cfg.pool.map(|p| p.max_size), Some(1));
    }
}
