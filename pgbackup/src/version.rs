//! Parsing du suffixe de version `_v<N>`

use std::sync::OnceLock;

use regex::Regex;

use crate::types::SQL_EXTENSION;
use crate::BackupError;

fn version_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v(\d+)$").expect("static regex"))
}

/// Extrait la version d'un nom de fichier `<stem>_v<N>.sql`
///
/// Le jeton de version est le texte qui suit le dernier `_` du nom privé de
/// son extension `.sql`. Il doit être exactement `v` suivi de chiffres.
pub fn parse_version(file_name: &str) -> Result<u64, BackupError> {
    let suffix = format!(".{}", SQL_EXTENSION);
    let base = file_name.strip_suffix(&suffix).unwrap_or(file_name);

    let (_, token) = base
        .rsplit_once('_')
        .ok_or_else(|| BackupError::MissingVersion {
            file: file_name.to_string(),
        })?;

    let digits = version_token()
        .captures(token)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| BackupError::invalid_version(file_name, token))?;

    digits
        .as_str()
        .parse::<u64>()
        .map_err(|_| BackupError::invalid_version(file_name, token))
}
