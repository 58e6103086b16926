//! Création de la base du projet à partir des shapefiles
//!
//! Chaque shapefile devient une table du schéma `public`. Le checksum de
//! chaque couche est conservé dans `_shapefile_checksums` pour ne pas
//! réimporter une couche inchangée.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tracing::{debug, info, warn};

use crate::config::{Config, Credentials};
use crate::db::ident::{validate_identifier, DEFAULT_SCHEMA};
use crate::db::{connect, lifecycle, tools};
use crate::report::{LayerStatus, SetupReport};

/// Table de suivi des checksums de shapefiles
pub const CHECKSUM_TABLE: &str = "_shapefile_checksums";

/// Paramètres de `db_setup`
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub database: String,
    pub folder: PathBuf,
    pub srid: u32,
    /// Réimporte même les couches inchangées
    pub force: bool,
}

/// Un shapefile à importer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefileLayer {
    pub path: PathBuf,
    pub table: String,
    /// Encodage du .dbf lu dans le .cpg, normalisé
    pub encoding: Option<String>,
}

impl ShapefileLayer {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            table: table_name_for(path)?,
            encoding: detect_encoding(path)?,
        })
    }

    /// `public.<table>`, la forme attendue par shp2pgsql
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", DEFAULT_SCHEMA, self.table)
    }
}

/// Nom de table dérivé du nom de fichier
///
/// Minuscules, tout caractère hors `[a-z0-9_]` remplacé par `_`, préfixe `_`
/// si le nom commence par un chiffre.
pub fn table_name_for(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid shapefile name: {}", path.display()))?;

    let mut name: String = stem
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    validate_identifier(&name)
        .with_context(|| format!("Cannot derive a table name from {}", path.display()))?;
    Ok(name)
}

/// Normalise un libellé d'encodage ESRI (.cpg) vers un nom compris par iconv
///
/// `1252` et `ANSI 1252` deviennent `windows-1252`.
pub fn normalize_encoding(label: &str) -> Option<&'static str> {
    let label = label.trim();
    let token = label.rsplit(char::is_whitespace).next().unwrap_or(label);

    let candidate = if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        format!("cp{}", token)
    } else {
        token.to_string()
    };

    encoding_rs::Encoding::for_label(candidate.as_bytes()).map(|e| e.name())
}

/// Fichier compagnon du shapefile (`.dbf`, `.cpg`), extension sans tenir compte de la casse
///
/// `ramps.SHP` trouve `ramps.DBF` comme `ramps.dbf`.
pub fn sidecar_file(shapefile: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let exact = shapefile.with_extension(extension);
    if exact.is_file() {
        return Ok(Some(exact));
    }

    let (Some(stem), Some(parent)) = (shapefile.file_stem(), shapefile.parent()) else {
        return Ok(None);
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(parent)
        .with_context(|| format!("Cannot read folder {}", parent.display()))?
    {
        let path = entry?.path();
        let matches = path.file_stem() == Some(stem)
            && path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            candidates.push(path);
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Lit le .cpg voisin du shapefile s'il existe
pub fn detect_encoding(shapefile: &Path) -> Result<Option<String>> {
    let Some(cpg) = sidecar_file(shapefile, "cpg")? else {
        return Ok(None);
    };

    let label = std::fs::read_to_string(&cpg)
        .with_context(|| format!("Cannot read {}", cpg.display()))?;

    match normalize_encoding(&label) {
        Some(encoding) => Ok(Some(encoding.to_string())),
        None => {
            warn!(file = %cpg.display(), label = label.trim(), "Unknown code page, letting shp2pgsql decide");
            Ok(None)
        }
    }
}

/// Collecte récursivement les shapefiles, triés par chemin
pub fn collect_shapefiles(path: &Path) -> Result<Vec<PathBuf>> {
    let mut shapefiles = Vec::new();

    if path.is_file() {
        if is_shapefile(path) {
            shapefiles.push(path.to_path_buf());
        }
        return Ok(shapefiles);
    }

    for entry in std::fs::read_dir(path)
        .with_context(|| format!("Cannot read folder {}", path.display()))?
    {
        let entry = entry?;
        let entry_path = entry.path();

        if entry_path.is_dir() {
            shapefiles.extend(collect_shapefiles(&entry_path)?);
        } else if is_shapefile(&entry_path) {
            shapefiles.push(entry_path);
        }
    }

    shapefiles.sort();
    Ok(shapefiles)
}

fn is_shapefile(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("shp"))
}

/// Construit les couches et refuse deux shapefiles visant la même table
pub fn plan_layers(shapefiles: &[PathBuf]) -> Result<Vec<ShapefileLayer>> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut layers = Vec::with_capacity(shapefiles.len());

    for path in shapefiles {
        let layer = ShapefileLayer::from_path(path)?;
        if let Some(previous) = seen.insert(layer.table.clone(), path.clone()) {
            anyhow::bail!(
                "Shapefiles {} and {} both map to table '{}'",
                previous.display(),
                path.display(),
                layer.table
            );
        }
        layers.push(layer);
    }

    Ok(layers)
}

/// Checksum blake3 du .shp puis du .dbf
pub fn compute_layer_checksum(shapefile: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hash_file(&mut hasher, shapefile)?;

    if let Some(dbf) = sidecar_file(shapefile, "dbf")? {
        hash_file(&mut hasher, &dbf)?;
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}

pub(crate) fn hash_file(hasher: &mut blake3::Hasher, path: &Path) -> Result<()> {
    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}

/// Crée la table de suivi des checksums
async fn create_checksum_table(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.{} (
            table_name TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            checksum TEXT NOT NULL,
            imported_at TIMESTAMPTZ DEFAULT NOW()
        )
        "#,
        DEFAULT_SCHEMA, CHECKSUM_TABLE
    );

    client
        .batch_execute(&sql)
        .await
        .context("Failed to create _shapefile_checksums table")?;
    Ok(())
}

/// Vrai si la table existe et a été importée avec le même checksum
async fn is_layer_unchanged(pool: &Pool, table: &str, checksum: &str) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "SELECT 1 FROM {}.{} WHERE table_name = $1 AND checksum = $2 \
                 AND to_regclass(format('{}.%I', table_name)) IS NOT NULL",
                DEFAULT_SCHEMA, CHECKSUM_TABLE, DEFAULT_SCHEMA
            ),
            &[&table, &checksum],
        )
        .await
        .context("Failed to check layer checksum")?;

    Ok(row.is_some())
}

/// Enregistre le checksum d'une couche après import réussi
async fn record_layer_checksum(pool: &Pool, layer: &ShapefileLayer, checksum: &str) -> Result<()> {
    let client = pool.get().await?;
    let source = layer.path.display().to_string();

    client
        .execute(
            &format!(
                r#"
                INSERT INTO {}.{} (table_name, source_path, checksum)
                VALUES ($1, $2, $3)
                ON CONFLICT (table_name) DO UPDATE
                SET source_path = $2, checksum = $3, imported_at = NOW()
                "#,
                DEFAULT_SCHEMA, CHECKSUM_TABLE
            ),
            &[&layer.table, &source, &checksum],
        )
        .await
        .context("Failed to record layer checksum")?;

    Ok(())
}

/// Importe une couche: shp2pgsql puis exécution du script produit
async fn import_layer(
    pool: &Pool,
    config: &Config,
    layer: &ShapefileLayer,
    srid: u32,
) -> Result<()> {
    let sql = tools::shp2pgsql(
        &config.tools,
        &layer.path,
        &layer.qualified_table(),
        srid,
        layer.encoding.as_deref(),
    )
    .await
    .with_context(|| format!("shp2pgsql failed for {}", layer.path.display()))?;

    debug!(table = %layer.table, bytes = sql.len(), "Executing shp2pgsql script");

    // Le script gère lui-même BEGIN / COMMIT
    let client = pool.get().await?;
    client
        .batch_execute(&sql)
        .await
        .with_context(|| format!("Failed to load {} into {}", layer.path.display(), layer.table))?;

    Ok(())
}

/// Crée (ou complète) la base du projet depuis un dossier de shapefiles
pub async fn create_project_database(
    config: &Config,
    credentials: &Credentials,
    options: &SetupOptions,
) -> Result<SetupReport> {
    let started_at = Instant::now();
    let mut report = SetupReport::new(&options.database, options.srid);

    let shapefiles = collect_shapefiles(&options.folder)?;
    if shapefiles.is_empty() {
        anyhow::bail!("No shapefiles (.shp) found in {}", options.folder.display());
    }
    let layers = plan_layers(&shapefiles)?;
    info!(count = layers.len(), folder = %options.folder.display(), "Found shapefiles");

    let maintenance = connect(&credentials.maintenance()).await?;
    report.database_created = lifecycle::create_database(&maintenance, &options.database).await?;

    let pool = connect(&credentials.database(&options.database, config.pool_size)).await?;
    lifecycle::ensure_postgis(&pool).await?;
    create_checksum_table(&pool).await?;

    for layer in &layers {
        let checksum = compute_layer_checksum(&layer.path)?;

        if !options.force && is_layer_unchanged(&pool, &layer.table, &checksum).await? {
            info!(table = %layer.table, "Layer unchanged, skipping");
            report.record_layer(&layer.table, &layer.path, &checksum, LayerStatus::Unchanged);
            continue;
        }

        info!(
            table = %layer.table,
            source = %layer.path.display(),
            encoding = ?layer.encoding,
            "Importing layer"
        );
        import_layer(&pool, config, layer, options.srid).await?;
        record_layer_checksum(&pool, layer, &checksum).await?;
        report.record_layer(&layer.table, &layer.path, &checksum, LayerStatus::Imported);
    }

    report.set_duration(started_at.elapsed());
    Ok(report)
}
