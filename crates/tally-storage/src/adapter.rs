// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the RecordStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use tally_config::model::StorageConfig;
use tally_core::{
    AdapterType, ExpenseFilter, ExpenseRecord, ExpenseUpdate, HealthStatus, NewExpense,
    PluginAdapter, RecordId, RecordPage, RecordStore, TallyError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed record store.
///
/// The database is opened lazily by [`SqliteRecordStore::initialize`], or
/// supplied up front with [`SqliteRecordStore::with_database`].
pub struct SqliteRecordStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteRecordStore {
    /// Create a store for `config`. Nothing is opened yet.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create a store over an already opened database.
    pub fn with_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Open and migrate the configured database file.
    pub async fn initialize(&self) -> Result<(), TallyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TallyError::Storage {
            source: "record store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite record store initialized");
        Ok(())
    }

    /// The underlying database, for sharing with the memory store.
    pub fn database(&self) -> Result<&Database, TallyError> {
        self.db.get().ok_or_else(|| TallyError::Storage {
            source: "record store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteRecordStore {
    fn name(&self) -> &str {
        "sqlite-records"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Records
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let Ok(db) = self.database() else {
            return Ok(HealthStatus::Unhealthy("database not opened".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        if let Some(db) = self.db.get()
            && self.config.wal_mode
        {
            db.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord, TallyError> {
        queries::expenses::insert_expense(self.database()?, expense).await
    }

    async fn get(&self, owner_id: &str, id: RecordId) -> Result<ExpenseRecord, TallyError> {
        queries::expenses::get_expense(self.database()?, owner_id, id).await
    }

    async fn update(
        &self,
        owner_id: &str,
        id: RecordId,
        update: ExpenseUpdate,
    ) -> Result<ExpenseRecord, TallyError> {
        queries::expenses::update_expense(self.database()?, owner_id, id, update).await
    }

    async fn soft_delete(&self, owner_id: &str, id: RecordId) -> Result<(), TallyError> {
        queries::expenses::soft_delete_expense(self.database()?, owner_id, id).await
    }

    async fn list(&self, filter: ExpenseFilter) -> Result<RecordPage, TallyError> {
        queries::expenses::list_expenses(self.database()?, filter).await
    }
}
