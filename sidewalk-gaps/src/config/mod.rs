//! Configuration du projet
//!
//! Construite une seule fois au démarrage puis passée aux commandes:
//! valeurs par défaut, puis fichier JSON, puis variables d'environnement,
//! puis options de la ligne de commande.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::pool::{DatabaseConfig, SslMode};

/// Variable d'environnement désignant un fichier de configuration JSON
pub const CONFIG_ENV_VAR: &str = "SIDEWALK_GAPS_CONFIG";

/// Environnement de base de données ciblé
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Serveur PostgreSQL local
    #[default]
    Localhost,
    /// Serveur distant (optionnel dans la configuration)
    Remote,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Localhost => f.write_str("localhost"),
            Environment::Remote => f.write_str("remote"),
        }
    }
}

/// Identifiants d'un serveur PostgreSQL
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: SslMode,

    /// Base utilisée pour CREATE / DROP DATABASE
    pub maintenance_db: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: None,
            ssl_mode: SslMode::Disable,
            maintenance_db: "postgres".into(),
        }
    }
}

impl Credentials {
    /// Descripteur de connexion vers `dbname`
    pub fn database(&self, dbname: &str, pool_size: usize) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host.clone(),
            port: self.port,
            dbname: dbname.to_string(),
            user: self.user.clone(),
            password: self.password.clone(),
            pool_size,
            ssl_mode: self.ssl_mode,
        }
    }

    /// Descripteur de connexion vers la base de maintenance
    pub fn maintenance(&self) -> DatabaseConfig {
        self.database(&self.maintenance_db, 1)
    }

    /// Applique les overrides de la ligne de commande
    pub fn apply_overrides(&mut self, overrides: &ConnectionOverrides) -> Result<()> {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(user) = &overrides.user {
            self.user = user.clone();
        }
        if let Some(password) = &overrides.password {
            self.password = Some(password.clone());
        }
        if let Some(ssl) = &overrides.ssl {
            self.ssl_mode = ssl.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    fn apply_env_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("PGHOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PGPORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(user) = lookup("PGUSER") {
            self.user = user;
        }
        if let Some(password) = lookup("PGPASSWORD") {
            self.password = Some(password);
        }
        if let Some(ssl) = lookup("PGSSLMODE").and_then(|s| s.parse().ok()) {
            self.ssl_mode = ssl;
        }
    }
}

/// Overrides de connexion fournis en ligne de commande
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<String>,
}

/// Identifiants par environnement
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialSet {
    pub localhost: Credentials,
    pub remote: Option<Credentials>,
}

impl CredentialSet {
    pub fn get(&self, env: Environment) -> Result<&Credentials> {
        match env {
            Environment::Localhost => Ok(&self.localhost),
            Environment::Remote => self
                .remote
                .as_ref()
                .context("No credentials configured for environment 'remote'"),
        }
    }

    pub fn get_mut(&mut self, env: Environment) -> Result<&mut Credentials> {
        match env {
            Environment::Localhost => Ok(&mut self.localhost),
            Environment::Remote => self
                .remote
                .as_mut()
                .context("No credentials configured for environment 'remote'"),
        }
    }
}

/// Chemins des outils clients PostgreSQL / PostGIS
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolPaths {
    pub shp2pgsql: PathBuf,
    pub pg_dump: PathBuf,
    pub psql: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            shp2pgsql: "shp2pgsql".into(),
            pg_dump: "pg_dump".into(),
            psql: "psql".into(),
        }
    }
}

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Nom de la base du projet
    pub project_db_name: String,

    /// Dossier des shapefiles d'entrée
    pub folder_shp_input: PathBuf,

    /// Dossier des dumps SQL
    pub folder_db_backups: PathBuf,

    /// Table des tronçons de trottoir
    pub lines_table: String,

    /// SRID des couches importées
    pub srid: u32,

    /// Tolérance de raccordement des noeuds (unités du SRID)
    pub node_tolerance: f64,

    pub pool_size: usize,
    pub credentials: CredentialSet,
    pub tools: ToolPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_db_name: "sidewalk_gaps".into(),
            folder_shp_input: PathBuf::from("data/inputs/shapefiles"),
            folder_db_backups: PathBuf::from("data/db_backups"),
            lines_table: "pedestriannetwork_lines".into(),
            srid: 26918,
            node_tolerance: 0.01,
            pool_size: 2,
            credentials: CredentialSet::default(),
            tools: ToolPaths::default(),
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse config JSON")
    }

    /// Construit la configuration effective (défauts, fichier, environnement)
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let mut config = match file {
            Some(file) => Self::load(&file)?,
            None => Self::default(),
        };

        config.apply_env_with(&|key: &str| std::env::var(key).ok());
        Ok(config)
    }

    /// Applique les variables d'environnement via une fonction de lecture
    pub fn apply_env_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("SIDEWALK_DB_NAME") {
            self.project_db_name = name;
        }
        if let Some(folder) = lookup("SIDEWALK_SHP_FOLDER") {
            self.folder_shp_input = PathBuf::from(folder);
        }
        if let Some(folder) = lookup("SIDEWALK_BACKUP_FOLDER") {
            self.folder_db_backups = PathBuf::from(folder);
        }
        self.credentials.localhost.apply_env_with(lookup);
    }

    /// Descripteur de connexion vers `dbname` pour l'environnement donné
    pub fn connection(&self, env: Environment, dbname: &str) -> Result<DatabaseConfig> {
        Ok(self.credentials.get(env)?.database(dbname, self.pool_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.project_db_name, "sidewalk_gaps");
        assert_eq!(config.lines_table, "pedestriannetwork_lines");
        assert_eq!(config.srid, 26918);
        assert_eq!(config.credentials.localhost.host, "localhost");
        assert!(config.credentials.remote.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{
                "project_db_name": "gaps_test",
                "credentials": { "localhost": { "port": 5433, "password": "pw" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.project_db_name, "gaps_test");
        assert_eq!(config.folder_db_backups, PathBuf::from("data/db_backups"));
        assert_eq!(config.credentials.localhost.port, 5433);
        assert_eq!(config.credentials.localhost.user, "postgres");
        assert_eq!(config.credentials.localhost.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_remote_credentials() {
        let config = Config::from_json(
            r#"{ "credentials": { "remote": { "host": "gis.example.org", "ssl_mode": "require" } } }"#,
        )
        .unwrap();

        let remote = config.credentials.get(Environment::Remote).unwrap();
        assert_eq!(remote.host, "gis.example.org");
        assert_eq!(remote.ssl_mode, SslMode::Require);
    }

    #[test]
    fn test_missing_remote_is_error() {
        let config = Config::default();
        let err = config
            .connection(Environment::Remote, "sidewalk_gaps")
            .unwrap_err();
        assert!(err.to_string().contains("remote"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(Config::from_json("{ not json").is_err());
        assert!(Config::from_json(r#"{ "srid": "abc" }"#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_with(&lookup_from(&[
            ("SIDEWALK_DB_NAME", "from_env"),
            ("SIDEWALK_BACKUP_FOLDER", "/srv/backups"),
            ("PGHOST", "db.internal"),
            ("PGPORT", "not-a-port"),
            ("PGSSLMODE", "prefer"),
        ]));

        assert_eq!(config.project_db_name, "from_env");
        assert_eq!(config.folder_db_backups, PathBuf::from("/srv/backups"));
        assert_eq!(config.credentials.localhost.host, "db.internal");
        assert_eq!(config.credentials.localhost.port, 5432);
        assert_eq!(config.credentials.localhost.ssl_mode, SslMode::Prefer);
    }

    #[test]
    fn test_cli_overrides() {
        let mut creds = Credentials::default();
        creds
            .apply_overrides(&ConnectionOverrides {
                port: Some(6543),
                user: Some("gis".into()),
                ssl: Some("require".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(creds.port, 6543);
        assert_eq!(creds.user, "gis");
        assert_eq!(creds.ssl_mode, SslMode::Require);

        let err = creds.apply_overrides(&ConnectionOverrides {
            ssl: Some("bogus".into()),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_connection_descriptor() {
        let config = Config::default();
        let db = config
            .connection(Environment::Localhost, "other_db")
            .unwrap();
        assert_eq!(db.dbname, "other_db");
        assert_eq!(db.pool_size, 2);

        let maintenance = config.credentials.localhost.maintenance();
        assert_eq!(maintenance.dbname, "postgres");
    }
}
