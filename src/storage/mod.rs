mod memory;
mod repository;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{
    AccountId, BalanceGuard, GuardRejection, Statement, StatementDraft, StatementId,
};

pub use memory::*;
pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Append-only access to the statement history.
///
/// Implementations must return statements of one owner in insertion order and
/// must never hand out a statement to a caller asking on behalf of another owner.
#[async_trait]
pub trait StatementStore: Send + Sync {
    /// Persist a single statement, assigning its id, sequence and timestamp.
    async fn append(&self, draft: StatementDraft) -> Result<Statement> {
        let mut stored = self.append_batch(vec![draft]).await?;
        stored
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Store returned no statement for a single append"))
    }

    /// Persist several statements as one unit: either all of them are stored,
    /// with consecutive sequence numbers and the same timestamp, or none is.
    async fn append_batch(&self, drafts: Vec<StatementDraft>) -> Result<Vec<Statement>> {
        self.append_guarded(Vec::new(), drafts)
            .await?
            .map_err(|rejection| anyhow::anyhow!("Unguarded batch was rejected: {}", rejection))
    }

    /// Like [`append_batch`](Self::append_batch), but each guard is checked
    /// against its account's history inside the same atomic step that writes
    /// the batch. If any guard fails nothing is written and the rejection is
    /// returned in the inner `Result`; the outer one carries storage failures.
    async fn append_guarded(
        &self,
        guards: Vec<BalanceGuard>,
        drafts: Vec<StatementDraft>,
    ) -> Result<Result<Vec<Statement>, GuardRejection>>;

    async fn find_by_id_and_owner(
        &self,
        id: StatementId,
        owner_id: AccountId,
    ) -> Result<Option<Statement>>;

    /// All statements of an account, oldest first.
    async fn list_by_owner(&self, owner_id: AccountId) -> Result<Vec<Statement>>;

    /// The whole history, oldest first. Used for audits.
    async fn list_all(&self) -> Result<Vec<Statement>>;
}

/// The single question the ledger asks account management.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account_exists(&self, id: AccountId) -> Result<bool>;
}
