//! # sidewalk-gaps
//!
//! Base PostGIS du projet sidewalk gaps: création depuis les shapefiles,
//! dumps SQL versionnés, génération des noeuds du réseau piéton.
//!
//! ## Features
//!
//! - Création de la base et import des shapefiles (`shp2pgsql`), avec skip
//!   des couches inchangées (checksum blake3)
//! - Export `pg_dump` vers `<db>_v<N>.sql`, version incrémentée automatiquement
//! - Rechargement du dump de version maximale (`psql`)
//! - Noeuds topologiques via `ST_Node`, idempotent
//!
//! ## Usage CLI
//!
//! ```bash
//! sidewalk-gaps db_setup -f ./data/inputs/shapefiles
//! sidewalk-gaps db_freeze -f ./data/db_backups
//! sidewalk-gaps db_load -d sidewalk_gaps_copy
//! sidewalk-gaps generate_nodes -t pedestriannetwork_lines
//! ```

pub mod config;
pub mod db;
pub mod dump;
pub mod nodes;
pub mod report;
pub mod setup;

pub use config::{Config, Credentials, Environment};
pub use db::pool::{create_pool, DatabaseConfig};
pub use report::{DumpReport, LoadReport, NodeReport, SetupReport};
