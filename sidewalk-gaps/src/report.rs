//! Rapports des commandes
//!
//! Chaque commande renvoie un rapport affichable sur la console et
//! sérialisable en JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

/// Sort d'une couche lors de `db_setup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayerStatus {
    /// Table (re)créée depuis le shapefile
    Imported,
    /// Checksum identique au dernier import: rien à faire
    Unchanged,
}

/// Résultat pour une couche
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    /// Table cible (schéma public)
    pub table: String,
    /// Shapefile source
    pub source: PathBuf,
    /// Checksum blake3 du .shp et du .dbf
    pub checksum: String,
    pub status: LayerStatus,
}

/// Rapport de `db_setup`
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub database: String,
    /// Vrai si la base a été créée par cette commande
    pub database_created: bool,
    pub srid: u32,
    pub duration_secs: f64,
    pub layers: Vec<LayerReport>,
}

impl SetupReport {
    pub fn new(database: &str, srid: u32) -> Self {
        Self {
            database: database.to_string(),
            database_created: false,
            srid,
            duration_secs: 0.0,
            layers: Vec::new(),
        }
    }

    /// Enregistre le sort d'une couche
    pub fn record_layer(&mut self, table: &str, source: &Path, checksum: &str, status: LayerStatus) {
        self.layers.push(LayerReport {
            table: table.to_string(),
            source: source.to_path_buf(),
            checksum: checksum.to_string(),
            status,
        });
    }

    pub fn imported(&self) -> usize {
        self.count(LayerStatus::Imported)
    }

    pub fn unchanged(&self) -> usize {
        self.count(LayerStatus::Unchanged)
    }

    fn count(&self, status: LayerStatus) -> usize {
        self.layers.iter().filter(|l| l.status == status).count()
    }

    /// Définit la durée de la commande
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("DB SETUP REPORT - {}", self.database);
        println!("{}", "=".repeat(60));

        println!(
            "Database: {}",
            if self.database_created { "created" } else { "reused" }
        );
        println!("SRID: {}", self.srid);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- LAYERS ---");
        for layer in &self.layers {
            println!(
                "  {:<40} {:?} ({})",
                layer.table,
                layer.status,
                layer.source.display()
            );
        }

        println!("\n{}", self.summary());
        println!("{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} layers imported, {} unchanged",
            self.database,
            self.imported(),
            self.unchanged()
        )
    }
}

/// Rapport de `db_freeze`
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    pub database: String,
    pub path: PathBuf,
    pub version: u64,
    pub bytes: u64,
    /// Checksum blake3 du dump (hex)
    pub checksum: String,
    pub duration_secs: f64,
}

impl DumpReport {
    pub fn summary(&self) -> String {
        format!(
            "{} v{} -> {} ({} bytes, blake3 {}) in {:.2}s",
            self.database,
            self.version,
            self.path.display(),
            self.bytes,
            short_checksum(&self.checksum),
            self.duration_secs
        )
    }
}

/// Rapport de `db_load`
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub database: String,
    pub path: PathBuf,
    pub version: u64,
    pub duration_secs: f64,
}

impl LoadReport {
    pub fn summary(&self) -> String {
        format!(
            "{} restored from v{} ({}) in {:.2}s",
            self.database,
            self.version,
            self.path.display(),
            self.duration_secs
        )
    }
}

/// Rapport de `generate_nodes`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeReport {
    pub lines_table: String,
    pub nodes_table: String,
    pub nodes: i64,
    pub lines: i64,
    pub lines_without_start: i64,
    pub lines_without_end: i64,
    pub duration_secs: f64,
}

impl NodeReport {
    /// Vrai si chaque tronçon a un noeud à chaque extrémité
    pub fn is_fully_noded(&self) -> bool {
        self.lines_without_start == 0 && self.lines_without_end == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} nodes for {} lines in {} ({} without start node, {} without end node) in {:.2}s",
            self.nodes_table,
            self.nodes,
            self.lines,
            self.lines_table,
            self.lines_without_start,
            self.lines_without_end,
            self.duration_secs
        )
    }
}

fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
