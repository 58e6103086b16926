//! Point d'entrée CLI pour sidewalk-gaps

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

use sidewalk_gaps::config::{Config, ConnectionOverrides, Environment};

mod cli;

use cli::{Commands, ConnectionArgs};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Construire, figer, recharger et noder la base PostGIS du projet sidewalk gaps
#[derive(Parser, Debug)]
#[command(name = "sidewalk-gaps")]
#[command(author, version)]
#[command(about = "Build, freeze, reload and node the sidewalk gaps PostGIS database")]
#[command(long_about = "Command-line wrapper around the sidewalk gaps PostGIS database.\n\nDefaults come from the project configuration (JSON file given by --config or SIDEWALK_GAPS_CONFIG, then environment variables).")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credential set to use
    #[arg(long, value_enum, default_value_t = Environment::Localhost, global = true)]
    env: Environment,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    let mut config = Config::resolve(cli.config.as_deref())?;
    let overrides = ConnectionOverrides::from(cli.connection);
    config
        .credentials
        .get_mut(cli.env)?
        .apply_overrides(&overrides)?;

    debug!(command = ?cli.command, env = %cli.env, "Resolved configuration");

    cli::run(cli.command, &config, cli.env).await
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
