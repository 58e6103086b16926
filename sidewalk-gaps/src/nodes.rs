//! Génération des noeuds topologiques du réseau piéton
//!
//! Tout le calcul géométrique est fait par PostGIS (`ST_Node`): les tronçons
//! sont découpés à chaque intersection, les extrémités dédoublonnées sur une
//! grille de `tolerance` puis numérotées par (x, y) pour que deux exécutions
//! sur les mêmes tronçons produisent les mêmes noeuds.

use std::time::Instant;

use anyhow::{Context, Result};
use deadpool_postgres::{Pool, Transaction};
use tracing::info;

use crate::db::ident::{quote_ident, validate_identifier};
use crate::db::{CommandTransaction, QualifiedTable};
use crate::report::NodeReport;

/// Suffixe de la table de noeuds
pub const NODES_SUFFIX: &str = "_nodes";

/// Colonne géométrique d'une table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryColumn {
    pub name: String,
    pub srid: i32,
}

/// Paramètres de `generate_nodes`
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub lines: QualifiedTable,
    pub tolerance: f64,
}

impl NodeOptions {
    pub fn new(table: &str, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            anyhow::bail!("Tolerance must be a finite, non-negative number, got {}", tolerance);
        }

        Ok(Self {
            lines: QualifiedTable::parse(table)?,
            tolerance,
        })
    }

    pub fn nodes_table(&self) -> Result<QualifiedTable> {
        self.lines.with_suffix(NODES_SUFFIX)
    }
}

/// Recrée la table de noeuds depuis les tronçons
pub fn build_nodes_sql(
    lines: &QualifiedTable,
    nodes: &QualifiedTable,
    geometry: &GeometryColumn,
    tolerance: f64,
) -> String {
    let geom = quote_ident(&geometry.name);
    let index = quote_ident(&format!("{}_geom_idx", nodes.table));

    format!(
        r#"
        DROP TABLE IF EXISTS {nodes};

        CREATE TABLE {nodes} AS
        WITH parts AS (
            SELECT (ST_Dump(ST_Force2D({geom}))).geom AS geom
            FROM {lines}
            WHERE {geom} IS NOT NULL AND NOT ST_IsEmpty({geom})
        ),
        noded AS (
            SELECT (ST_Dump(ST_Node(ST_Collect(geom)))).geom AS geom
            FROM parts
        ),
        endpoints AS (
            SELECT ST_SnapToGrid(ST_StartPoint(geom), {tolerance}) AS geom FROM noded
            UNION ALL
            SELECT ST_SnapToGrid(ST_EndPoint(geom), {tolerance}) AS geom FROM noded
        ),
        distinct_points AS (
            SELECT DISTINCT ON (ST_X(geom), ST_Y(geom)) geom
            FROM endpoints
            WHERE geom IS NOT NULL
        )
        SELECT
            (row_number() OVER (ORDER BY ST_X(geom), ST_Y(geom)))::integer AS node_id,
            ST_SetSRID(geom, {srid})::geometry(Point, {srid}) AS geom
        FROM distinct_points;

        ALTER TABLE {nodes} ADD PRIMARY KEY (node_id);
        CREATE INDEX {index} ON {nodes} USING GIST (geom);
        "#,
        nodes = nodes.sql(),
        lines = lines.sql(),
        geom = geom,
        index = index,
        tolerance = tolerance,
        srid = geometry.srid,
    )
}

/// Renseigne `start_node` / `end_node` sur chaque tronçon
pub fn tag_lines_sql(
    lines: &QualifiedTable,
    nodes: &QualifiedTable,
    geometry: &GeometryColumn,
    tolerance: f64,
) -> String {
    let geom = quote_ident(&geometry.name);
    let start = format!("ST_StartPoint(ST_GeometryN(ST_Force2D(l.{geom}), 1))");
    let end = format!(
        "ST_EndPoint(ST_GeometryN(ST_Force2D(l.{geom}), ST_NumGeometries(l.{geom})))"
    );

    format!(
        r#"
        ALTER TABLE {lines}
            ADD COLUMN IF NOT EXISTS start_node integer,
            ADD COLUMN IF NOT EXISTS end_node integer;

        UPDATE {lines} AS l SET
            start_node = (
                SELECT n.node_id FROM {nodes} AS n
                WHERE ST_DWithin(n.geom, {start}, {tolerance})
                ORDER BY n.geom <-> {start}, n.node_id
                LIMIT 1
            ),
            end_node = (
                SELECT n.node_id FROM {nodes} AS n
                WHERE ST_DWithin(n.geom, {end}, {tolerance})
                ORDER BY n.geom <-> {end}, n.node_id
                LIMIT 1
            );
        "#,
        lines = lines.sql(),
        nodes = nodes.sql(),
        start = start,
        end = end,
        tolerance = tolerance,
    )
}

/// Cherche la colonne géométrique dans `geometry_columns`
async fn lookup_geometry_column(
    tx: &Transaction<'_>,
    table: &QualifiedTable,
) -> Result<GeometryColumn> {
    let row = tx
        .query_opt(
            "SELECT f_geometry_column::text, srid FROM geometry_columns \
             WHERE f_table_schema::text = $1 AND f_table_name::text = $2 \
             ORDER BY f_geometry_column LIMIT 1",
            &[&table.schema, &table.table],
        )
        .await
        .context("Failed to query geometry_columns")?
        .with_context(|| format!("Table {} not found or has no geometry column", table))?;

    let name: String = row.get(0);
    let srid: i32 = row.get(1);
    validate_identifier(&name)?;

    Ok(GeometryColumn { name, srid })
}

async fn build_nodes(
    tx: &Transaction<'_>,
    options: &NodeOptions,
    nodes: &QualifiedTable,
) -> Result<NodeReport> {
    let lines = &options.lines;
    let geometry = lookup_geometry_column(tx, lines).await?;
    info!(table = %lines, column = %geometry.name, srid = geometry.srid, "Generating nodes");

    tx.batch_execute(&build_nodes_sql(lines, nodes, &geometry, options.tolerance))
        .await
        .with_context(|| format!("Failed to build {}", nodes))?;

    tx.batch_execute(&tag_lines_sql(lines, nodes, &geometry, options.tolerance))
        .await
        .with_context(|| format!("Failed to tag {} with node ids", lines))?;

    let geom = quote_ident(&geometry.name);
    let row = tx
        .query_one(
            &format!(
                "SELECT \
                    (SELECT count(*) FROM {nodes}), \
                    count(*), \
                    count(*) FILTER (WHERE start_node IS NULL AND {geom} IS NOT NULL), \
                    count(*) FILTER (WHERE end_node IS NULL AND {geom} IS NOT NULL) \
                 FROM {lines}",
                nodes = nodes.sql(),
                lines = lines.sql(),
                geom = geom,
            ),
            &[],
        )
        .await
        .context("Failed to count nodes")?;

    Ok(NodeReport {
        lines_table: lines.to_string(),
        nodes_table: nodes.to_string(),
        nodes: row.get(0),
        lines: row.get(1),
        lines_without_start: row.get(2),
        lines_without_end: row.get(3),
        duration_secs: 0.0,
    })
}

/// Génère `<table>_nodes` et relie chaque tronçon à ses noeuds
///
/// Tout se fait dans une transaction: en cas d'erreur, ni la table de
/// noeuds ni les colonnes du réseau ne sont modifiées.
pub async fn generate_nodes(pool: &Pool, options: &NodeOptions) -> Result<NodeReport> {
    let started_at = Instant::now();
    let nodes = options.nodes_table()?;

    let mut client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    let tx = CommandTransaction::begin(&mut client, "generate_nodes").await?;

    match build_nodes(tx.transaction(), options, &nodes).await {
        Ok(mut report) => {
            tx.commit().await?;
            report.duration_secs = started_at.elapsed().as_secs_f64();
            Ok(report)
        }
        Err(e) => {
            tx.rollback(&format!("{:#}", e)).await;
            Err(e)
        }
    }
}
