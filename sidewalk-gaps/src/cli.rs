//! Définition et implémentation des commandes CLI
//!
//! - `db_setup`: shapefiles → nouvelle base PostGIS
//! - `db_freeze`: base → `<db>_v<N>.sql`
//! - `db_load`: dernier `<db>_v<N>.sql` → base recréée
//! - `generate_nodes`: tronçons → `<table>_nodes`

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use sidewalk_gaps::config::{Config, ConnectionOverrides, Environment};
use sidewalk_gaps::db::connect;
use sidewalk_gaps::dump;
use sidewalk_gaps::nodes::{self, NodeOptions};
use sidewalk_gaps::setup::{self, SetupOptions};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Roll a starter database from the input shapefiles
    #[command(name = "db_setup")]
    DbSetup {
        /// Name of the local database (défaut : project_db_name)
        #[arg(short, long)]
        database: Option<String>,

        /// Folder where input shapefiles are stored (défaut : folder_shp_input)
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// SRID of the input shapefiles (défaut : srid)
        #[arg(long)]
        srid: Option<u32>,

        /// Re-import layers even when their checksum is unchanged
        #[arg(long)]
        force: bool,

        /// Write the setup report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Export a .sql file of the database
    #[command(name = "db_freeze")]
    DbFreeze {
        /// Name of the local database (défaut : project_db_name)
        #[arg(short, long)]
        database: Option<String>,

        /// Folder where database backups are stored (défaut : folder_db_backups)
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Load up the highest-versioned .sql file found in the backup folder
    #[command(name = "db_load")]
    DbLoad {
        /// Name of the local database (défaut : project_db_name)
        #[arg(short, long)]
        database: Option<String>,

        /// Folder where database backups are stored (défaut : folder_db_backups)
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Generate topologically-sound nodes for the sidewalk lines
    #[command(name = "generate_nodes")]
    GenerateNodes {
        /// Name of the local database (défaut : project_db_name)
        #[arg(short, long)]
        database: Option<String>,

        /// Name of the table with sidewalk lines (défaut : pedestriannetwork_lines)
        #[arg(short, long)]
        tablename: Option<String>,

        /// Snapping tolerance for nodes, in SRID units (défaut : node_tolerance)
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

/// Options de connexion communes à toutes les commandes
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// PostgreSQL host (défaut : config / env PGHOST / localhost)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// PostgreSQL port (défaut : config / env PGPORT / 5432)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// PostgreSQL user (défaut : config / env PGUSER / postgres)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : config / env PGPASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// SSL mode: disable, prefer, require (défaut : config / env PGSSLMODE / disable)
    #[arg(long, global = true)]
    pub ssl: Option<String>,
}

impl From<ConnectionArgs> for ConnectionOverrides {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            ssl: args.ssl,
        }
    }
}

/// Exécute une commande avec la configuration résolue
pub async fn run(command: Commands, config: &Config, env: Environment) -> Result<()> {
    match command {
        Commands::DbSetup {
            database,
            folder,
            srid,
            force,
            report,
        } => {
            let options = SetupOptions {
                database: database.unwrap_or_else(|| config.project_db_name.clone()),
                folder: folder.unwrap_or_else(|| config.folder_shp_input.clone()),
                srid: srid.unwrap_or(config.srid),
                force,
            };
            cmd_db_setup(config, env, &options, report.as_deref()).await
        }
        Commands::DbFreeze { database, folder } => {
            let database = database.unwrap_or_else(|| config.project_db_name.clone());
            let folder = folder.unwrap_or_else(|| config.folder_db_backups.clone());
            cmd_db_freeze(config, env, &database, &folder).await
        }
        Commands::DbLoad { database, folder } => {
            let database = database.unwrap_or_else(|| config.project_db_name.clone());
            let folder = folder.unwrap_or_else(|| config.folder_db_backups.clone());
            cmd_db_load(config, env, &database, &folder).await
        }
        Commands::GenerateNodes {
            database,
            tablename,
            tolerance,
        } => {
            let database = database.unwrap_or_else(|| config.project_db_name.clone());
            let tablename = tablename.unwrap_or_else(|| config.lines_table.clone());
            let options = NodeOptions::new(&tablename, tolerance.unwrap_or(config.node_tolerance))?;
            cmd_generate_nodes(config, env, &database, &options).await
        }
    }
}

/// Exécute la commande db_setup
pub async fn cmd_db_setup(
    config: &Config,
    env: Environment,
    options: &SetupOptions,
    report_path: Option<&Path>,
) -> Result<()> {
    let credentials = config.credentials.get(env)?;

    info!(
        database = %options.database,
        folder = %options.folder.display(),
        srid = options.srid,
        force = options.force,
        "Starting database setup"
    );

    println!("=== Setup {} ===", options.database);
    println!("Folder: {}", options.folder.display());
    println!("Environment: {}", env);
    println!("Target SRID: {}", options.srid);
    println!("Force re-import: {}", options.force);

    let report = setup::create_project_database(config, credentials, options).await?;
    report.display();

    if let Some(path) = report_path {
        report.save_to_file(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

/// Exécute la commande db_freeze
pub async fn cmd_db_freeze(
    config: &Config,
    env: Environment,
    database: &str,
    folder: &Path,
) -> Result<()> {
    let credentials = config.credentials.get(env)?;

    let report = dump::export_database(config, credentials, database, folder).await?;
    println!("Exported {}", report.summary());

    Ok(())
}

/// Exécute la commande db_load
pub async fn cmd_db_load(
    config: &Config,
    env: Environment,
    database: &str,
    folder: &Path,
) -> Result<()> {
    let credentials = config.credentials.get(env)?;

    let backup = dump::select_backup(folder)?;
    println!("{}", dump::loading_message(&backup));

    let report = dump::load_database(config, credentials, database, &backup).await?;
    println!("Loaded {}", report.summary());

    Ok(())
}

/// Exécute la commande generate_nodes
pub async fn cmd_generate_nodes(
    config: &Config,
    env: Environment,
    database: &str,
    options: &NodeOptions,
) -> Result<()> {
    let db_config = config.connection(env, database)?;
    println!("Database: {} (SSL: {:?})", db_config, db_config.ssl_mode);

    let pool = connect(&db_config).await?;
    let report = nodes::generate_nodes(&pool, options).await?;

    println!("Generated {}", report.summary());
    if !report.is_fully_noded() {
        tracing::warn!(
            without_start = report.lines_without_start,
            without_end = report.lines_without_end,
            "Some lines have no node within tolerance"
        );
    }

    Ok(())
}
