//! Outils clients externes: shp2pgsql, pg_dump, psql
//!
//! Les paramètres de connexion passent par les variables `PG*` de libpq,
//! jamais par la ligne de commande (le mot de passe resterait visible dans `ps`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolPaths;
use crate::db::pool::DatabaseConfig;

/// Erreurs d'exécution d'un outil externe
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binaire introuvable
    #[error("{tool} not found at '{}' (is it installed and on PATH?)", .path.display())]
    NotFound { tool: &'static str, path: PathBuf },

    /// Échec du lancement du processus
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Code de sortie non nul
    #[error("{tool} failed ({status}): {stderr}")]
    Failed {
        tool: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    /// Sortie standard non UTF-8
    #[error("{tool} produced non UTF-8 output")]
    InvalidOutput { tool: &'static str },
}

/// Outils clients pilotés par la CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgTool {
    Shp2pgsql,
    PgDump,
    Psql,
}

impl PgTool {
    pub fn name(&self) -> &'static str {
        match self {
            PgTool::Shp2pgsql => "shp2pgsql",
            PgTool::PgDump => "pg_dump",
            PgTool::Psql => "psql",
        }
    }

    fn program<'a>(&self, paths: &'a ToolPaths) -> &'a Path {
        match self {
            PgTool::Shp2pgsql => paths.shp2pgsql.as_path(),
            PgTool::PgDump => paths.pg_dump.as_path(),
            PgTool::Psql => paths.psql.as_path(),
        }
    }
}

/// Arguments de shp2pgsql: recrée la table, index GiST, colonne `geom`
pub fn shp2pgsql_args(
    shapefile: &Path,
    qualified_table: &str,
    srid: u32,
    encoding: Option<&str>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-d".into(),
        "-I".into(),
        "-s".into(),
        srid.to_string().into(),
        "-g".into(),
        "geom".into(),
    ];
    if let Some(encoding) = encoding {
        args.push("-W".into());
        args.push(encoding.into());
    }
    args.push(shapefile.as_os_str().to_owned());
    args.push(qualified_table.into());
    args
}

/// Arguments de pg_dump: dump SQL plain sans propriétaires ni droits
pub fn pg_dump_args(db: &DatabaseConfig, output: &Path) -> Vec<OsString> {
    let mut file_arg = OsString::from("--file=");
    file_arg.push(output.as_os_str());

    vec![
        "--no-owner".into(),
        "--no-privileges".into(),
        "--format=plain".into(),
        file_arg,
        db.dbname.clone().into(),
    ]
}

/// Arguments de psql: rejoue un fichier, s'arrête à la première erreur
pub fn psql_args(db: &DatabaseConfig, file: &Path) -> Vec<OsString> {
    let mut file_arg = OsString::from("--file=");
    file_arg.push(file.as_os_str());

    vec![
        "-v".into(),
        "ON_ERROR_STOP=1".into(),
        "--quiet".into(),
        "--no-psqlrc".into(),
        file_arg,
        db.dbname.clone().into(),
    ]
}

/// Variables libpq pour une connexion donnée
pub fn pg_env(db: &DatabaseConfig) -> Vec<(&'static str, String)> {
    let mut env = vec![
        ("PGHOST", db.host.clone()),
        ("PGPORT", db.port.to_string()),
        ("PGUSER", db.user.clone()),
        ("PGDATABASE", db.dbname.clone()),
        ("PGSSLMODE", db.ssl_mode.as_libpq().to_string()),
    ];
    if let Some(password) = &db.password {
        env.push(("PGPASSWORD", password.clone()));
    }
    env
}

/// Lance un outil et attend sa fin, stdout capturée
async fn run(
    tool: PgTool,
    paths: &ToolPaths,
    args: &[OsString],
    db: Option<&DatabaseConfig>,
) -> Result<Output, ToolError> {
    let program = tool.program(paths);
    debug!(tool = tool.name(), program = %program.display(), ?args, "Running external tool");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(db) = db {
        command.envs(pg_env(db));
    }

    let output = command.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound {
                tool: tool.name(),
                path: program.to_path_buf(),
            }
        } else {
            ToolError::Spawn {
                tool: tool.name(),
                source: e,
            }
        }
    })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool.name(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// Convertit un shapefile en script SQL
pub async fn shp2pgsql(
    paths: &ToolPaths,
    shapefile: &Path,
    qualified_table: &str,
    srid: u32,
    encoding: Option<&str>,
) -> Result<String, ToolError> {
    let args = shp2pgsql_args(shapefile, qualified_table, srid, encoding);
    let output = run(PgTool::Shp2pgsql, paths, &args, None).await?;

    String::from_utf8(output.stdout).map_err(|_| ToolError::InvalidOutput {
        tool: PgTool::Shp2pgsql.name(),
    })
}

/// Exporte la base vers `output`
pub async fn pg_dump(paths: &ToolPaths, db: &DatabaseConfig, output: &Path) -> Result<(), ToolError> {
    let args = pg_dump_args(db, output);
    run(PgTool::PgDump, paths, &args, Some(db)).await?;
    Ok(())
}

/// Rejoue un fichier SQL dans la base
pub async fn psql_file(paths: &ToolPaths, db: &DatabaseConfig, file: &Path) -> Result<(), ToolError> {
    let args = psql_args(db, file);
    run(PgTool::Psql, paths, &args, Some(db)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::SslMode;

    fn db() -> DatabaseConfig {
        DatabaseConfig {
            dbname: "gaps".into(),
            password: Some("secret".into()),
            ssl_mode: SslMode::Require,
            ..Default::default()
        }
    }

    #[test]
    fn test_shp2pgsql_args() {
        let args = shp2pgsql_args(Path::new("/data/lines.shp"), "public.lines", 26918, None);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-d", "-I", "-s", "26918", "-g", "geom", "/data/lines.shp", "public.lines"]
        );
    }

    #[test]
    fn test_shp2pgsql_args_with_encoding() {
        let args = shp2pgsql_args(
            Path::new("a.shp"),
            "public.a",
            4326,
            Some("windows-1252"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let pos = args.iter().position(|a| a == "-W").unwrap();
        assert_eq!(args[pos + 1], "windows-1252");
        assert_eq!(args.last().unwrap(), "public.a");
    }

    #[test]
    fn test_pg_dump_args_never_contain_password() {
        let args = pg_dump_args(&db(), Path::new("/backups/gaps_v2.sql.partial"));
        let joined = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        assert!(joined.contains("--file=/backups/gaps_v2.sql.partial"));
        assert!(joined.ends_with("gaps"));
        assert!(!joined.contains("secret"));
    }

    #[test]
    fn test_psql_args_stop_on_error() {
        let args = psql_args(&db(), Path::new("dump.sql"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert!(args.contains(&"--file=dump.sql".to_string()));
    }

    #[test]
    fn test_pg_env() {
        let env = pg_env(&db());
        assert!(env.contains(&("PGPASSWORD", "secret".to_string())));
        assert!(env.contains(&("PGSSLMODE", "require".to_string())));
        assert!(env.contains(&("PGDATABASE", "gaps".to_string())));

        let no_pw = DatabaseConfig::default();
        assert!(pg_env(&no_pw).iter().all(|(k, _)| *k != "PGPASSWORD"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let paths = ToolPaths {
            psql: PathBuf::from("/nonexistent/bin/psql"),
            ..Default::default()
        };
        let err = psql_file(&paths, &db(), Path::new("dump.sql"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { tool: "psql", .. }));
    }
}
