use std::sync::Arc;

use serde::Serialize;

use crate::domain::{AccountId, Cents, Statement, compute_balance};
use crate::storage::StatementStore;

use super::AppError;

/// Balance of an account, optionally with the statements it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub balance: Cents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<Statement>>,
}

/// Derives balances by replaying an account's full statement history.
/// Nothing is cached, so a balance can never disagree with the history.
#[derive(Clone)]
pub struct BalanceCalculator {
    store: Arc<dyn StatementStore>,
}

impl BalanceCalculator {
    pub fn new(store: Arc<dyn StatementStore>) -> Self {
        Self { store }
    }

    /// Replay the history of `owner_id`. The statements are handed back only
    /// when asked for; they are fetched either way.
    pub async fn balance(
        &self,
        owner_id: AccountId,
        with_statements: bool,
    ) -> Result<BalanceReport, AppError> {
        let statements = self.store.list_by_owner(owner_id).await?;
        let balance =
            compute_balance(&statements).map_err(|_| AppError::BalanceOverflow(owner_id))?;

        Ok(BalanceReport {
            balance,
            statements: with_statements.then_some(statements),
        })
    }

    pub async fn balance_of(&self, owner_id: AccountId) -> Result<Cents, AppError> {
        Ok(self.balance(owner_id, false).await?.balance)
    }
}
