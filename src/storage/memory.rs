use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    AccountId, BalanceGuard, GuardRejection, Statement, StatementDraft, StatementId,
};

use super::{AccountDirectory, StatementStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("In-memory store lock poisoned"))
}

/// Volatile statement store. Holds the same ordering and ownership
/// guarantees as the SQLite store; meant for tests and embedding.
#[derive(Default)]
pub struct InMemoryStatementStore {
    statements: Mutex<Vec<Statement>>,
}

impl InMemoryStatementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.statements)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl StatementStore for InMemoryStatementStore {
    async fn append_guarded(
        &self,
        guards: Vec<BalanceGuard>,
        drafts: Vec<StatementDraft>,
    ) -> Result<Result<Vec<Statement>, GuardRejection>> {
        let mut statements = lock(&self.statements)?;

        for guard in &guards {
            let history: Vec<Statement> = statements
                .iter()
                .filter(|s| s.owner_id == guard.account_id)
                .cloned()
                .collect();
            if let Err(rejection) = guard.check(&history) {
                return Ok(Err(rejection));
            }
        }

        let created_at = Utc::now();
        let next_sequence = statements.last().map_or(1, |s| s.sequence + 1);

        let stored: Vec<Statement> = (next_sequence..)
            .zip(drafts)
            .map(|(sequence, draft)| draft.into_statement(Uuid::new_v4(), sequence, created_at))
            .collect();
        statements.extend(stored.iter().cloned());

        Ok(Ok(stored))
    }

    async fn find_by_id_and_owner(
        &self,
        id: StatementId,
        owner_id: AccountId,
    ) -> Result<Option<Statement>> {
        let statements = lock(&self.statements)?;
        Ok(statements
            .iter()
            .find(|s| s.id == id && s.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: AccountId) -> Result<Vec<Statement>> {
        let statements = lock(&self.statements)?;
        Ok(statements
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Statement>> {
        Ok(lock(&self.statements)?.clone())
    }
}

/// Set of account ids standing in for an account service.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: Mutex<HashSet<AccountId>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh account and return its id.
    pub fn register(&self) -> Result<AccountId> {
        let id = Uuid::new_v4();
        lock(&self.accounts)?.insert(id);
        Ok(id)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn account_exists(&self, id: AccountId) -> Result<bool> {
        Ok(lock(&self.accounts)?.contains(&id))
    }
}
