//! Transaction atomique autour d'une commande
//!
//! Garantit le rollback en cas d'erreur fatale.

use anyhow::{Context, Result};
use deadpool_postgres::{Object, Transaction};
use tracing::{debug, error};

/// Transaction PostgreSQL nommée, commit ou rollback explicite
pub struct CommandTransaction<'a> {
    transaction: Transaction<'a>,
    label: String,
}

impl<'a> CommandTransaction<'a> {
    /// Démarre une transaction
    ///
    /// # Arguments
    /// * `client` - Connexion PostgreSQL (doit rester vivante pendant la transaction)
    /// * `label` - Nom de l'opération, repris dans les logs
    pub async fn begin(client: &'a mut Object, label: &str) -> Result<Self> {
        let transaction = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        debug!(label = label, "Transaction started");

        Ok(Self {
            transaction,
            label: label.to_string(),
        })
    }

    /// Accède à la transaction sous-jacente pour exécuter des requêtes
    pub fn transaction(&self) -> &Transaction<'a> {
        &self.transaction
    }

    /// Valide et commit la transaction
    pub async fn commit(self) -> Result<()> {
        self.transaction
            .commit()
            .await
            .with_context(|| format!("Failed to commit transaction ({})", self.label))?;

        debug!(label = %self.label, "Transaction committed");
        Ok(())
    }

    /// Annule la transaction
    ///
    /// La transaction est également annulée si elle est droppée.
    pub async fn rollback(self, reason: &str) {
        error!(label = %self.label, reason = %reason, "Rolling back transaction");

        if let Err(e) = self.transaction.rollback().await {
            error!(error = %e, "Explicit rollback failed (will rollback on drop anyway)");
        }
    }
}
