use std::sync::Arc;

use crate::domain::{AccountId, Statement, StatementId};
use crate::storage::StatementStore;

use super::AppError;

/// Fetches single statements on behalf of their owner.
#[derive(Clone)]
pub struct StatementLookup {
    store: Arc<dyn StatementStore>,
}

impl StatementLookup {
    pub fn new(store: Arc<dyn StatementStore>) -> Self {
        Self { store }
    }

    /// A statement owned by someone else is reported exactly like a missing
    /// one, so ids cannot be guessed across accounts.
    pub async fn get(
        &self,
        owner_id: AccountId,
        statement_id: StatementId,
    ) -> Result<Statement, AppError> {
        self.store
            .find_by_id_and_owner(statement_id, owner_id)
            .await?
            .ok_or(AppError::StatementNotFound(statement_id))
    }
}
