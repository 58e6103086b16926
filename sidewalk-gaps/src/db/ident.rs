//! Identifiants SQL (schéma, table)

use std::fmt;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

/// Schéma par défaut
pub const DEFAULT_SCHEMA: &str = "public";

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Vérifie qu'un identifiant est sûr à interpoler dans du SQL
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.len() > 63 {
        anyhow::bail!("Identifier too long (max 63 bytes): {}", name);
    }
    if !identifier_re().is_match(name) {
        anyhow::bail!(
            "Invalid identifier: '{}'. Use letters, digits and underscores only",
            name
        );
    }
    Ok(())
}

/// Entoure un identifiant de guillemets doubles
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table qualifiée par son schéma
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub schema: String,
    pub table: String,
}

impl QualifiedTable {
    /// Parse `table` ou `schema.table`
    pub fn parse(name: &str) -> Result<Self> {
        let (schema, table) = match name.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => (DEFAULT_SCHEMA, name),
        };
        validate_identifier(schema)?;
        validate_identifier(table)?;

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Table voisine dans le même schéma, nommée `<table><suffix>`
    pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
        let table = format!("{}{}", self.table, suffix);
        validate_identifier(&table)?;
        Ok(Self {
            schema: self.schema.clone(),
            table,
        })
    }

    /// Forme SQL: `"schema"."table"`
    pub fn sql(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
