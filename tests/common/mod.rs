// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ledgerline::application::LedgerService;
use ledgerline::config::StorageConfig;
use ledgerline::domain::{AccountId, Statement};
use ledgerline::storage::{
    InMemoryAccountDirectory, InMemoryStatementStore, SqliteRepository, StatementStore,
};
use tempfile::TempDir;

enum Accounts {
    Sqlite(SqliteRepository),
    Memory(Arc<InMemoryAccountDirectory>),
}

/// A ledger service plus direct access to what it writes.
pub struct Harness {
    pub name: &'static str,
    pub service: Arc<LedgerService>,
    pub store: Arc<dyn StatementStore>,
    accounts: Accounts,
    database: Option<PathBuf>,
    _temp: Option<TempDir>,
}

impl Harness {
    /// Service over a SQLite database in a temporary directory.
    pub async fn sqlite() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let database = temp_dir.path().join("test.db");
        let repo = SqliteRepository::init(&StorageConfig::new(&database)).await?;

        Ok(Self {
            name: "sqlite",
            service: Arc::new(LedgerService::from_repository(repo.clone())),
            store: Arc::new(repo.clone()),
            accounts: Accounts::Sqlite(repo),
            database: Some(database),
            _temp: Some(temp_dir),
        })
    }

    /// Service over the in-memory store.
    pub fn memory() -> Self {
        let store = Arc::new(InMemoryStatementStore::new());
        let accounts = Arc::new(InMemoryAccountDirectory::new());

        Self {
            name: "memory",
            service: Arc::new(LedgerService::new(store.clone(), accounts.clone())),
            store,
            accounts: Accounts::Memory(accounts),
            database: None,
            _temp: None,
        }
    }

    /// One harness per store implementation.
    pub async fn all() -> Result<Vec<Self>> {
        Ok(vec![Self::sqlite().await?, Self::memory()])
    }

    pub async fn account(&self, name: &str) -> Result<AccountId> {
        match &self.accounts {
            Accounts::Sqlite(repo) => Ok(repo.create_account(name).await?.id),
            Accounts::Memory(directory) => directory.register(),
        }
    }

    pub fn sqlite_repo(&self) -> Option<&SqliteRepository> {
        match &self.accounts {
            Accounts::Sqlite(repo) => Some(repo),
            Accounts::Memory(_) => None,
        }
    }

    /// Path of the SQLite database file, for opening further connections to it.
    pub fn database_path(&self) -> Option<&PathBuf> {
        self.database.as_ref()
    }

    pub async fn statements_of(&self, account: AccountId) -> Result<Vec<Statement>> {
        self.store.list_by_owner(account).await
    }

    pub async fn statement_count(&self) -> Result<usize> {
        Ok(self.store.list_all().await?.len())
    }

    pub async fn balance(&self, account: AccountId) -> Result<i64> {
        Ok(self.service.balances().balance_of(account).await?)
    }
}
