mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::Harness;
use ledgerline::application::{AppError, CreateStatement, LedgerService};
use ledgerline::config::StorageConfig;
use ledgerline::domain::{
    AccountId, BalanceGuard, GuardRejection, Statement, StatementDraft, StatementId,
};
use ledgerline::storage::{InMemoryAccountDirectory, InMemoryStatementStore, StatementStore};

#[tokio::test]
async fn test_failed_credit_rolls_back_debit() -> Result<()> {
    let h = Harness::sqlite().await?;
    let sender = h.account("Sender").await?;
    let receiver = h.account("Receiver").await?;
    h.service
        .execute(CreateStatement::deposit(sender, 1000, ""))
        .await?;

    // Make the second half of every transfer fail inside the transaction
    let repo = h.sqlite_repo().expect("sqlite harness");
    sqlx::query(
        r#"
        CREATE TRIGGER reject_credit
        BEFORE INSERT ON statements
        WHEN NEW.sender_id IS NOT NULL
        BEGIN
            SELECT RAISE(ABORT, 'credit rejected');
        END;
        "#,
    )
    .execute(repo.pool())
    .await?;

    let result = h
        .service
        .execute(CreateStatement::transfer(sender, receiver, 600, ""))
        .await;
    assert!(matches!(result, Err(AppError::StorageUnavailable(_))), "{:?}", result);

    assert_eq!(h.statement_count().await?, 1);
    assert_eq!(h.balance(sender).await?, 1000);
    assert_eq!(h.balance(receiver).await?, 0);

    // The sequence reservation was rolled back with the rest
    sqlx::query("DROP TRIGGER reject_credit")
        .execute(repo.pool())
        .await?;
    let debit = h
        .service
        .execute(CreateStatement::transfer(sender, receiver, 600, ""))
        .await?;
    assert_eq!(debit.sequence, 2);

    let report = h.service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);
    Ok(())
}

#[tokio::test]
async fn test_statements_cannot_be_modified_in_sqlite() -> Result<()> {
    let h = Harness::sqlite().await?;
    let account = h.account("Owner").await?;
    h.service
        .execute(CreateStatement::deposit(account, 1000, ""))
        .await?;
    let repo = h.sqlite_repo().expect("sqlite harness");

    let update = sqlx::query("UPDATE statements SET amount_cents = 999999")
        .execute(repo.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM statements")
        .execute(repo.pool())
        .await;
    assert!(delete.is_err());

    assert_eq!(h.balance(account).await?, 1000);
    Ok(())
}

#[tokio::test]
async fn test_storage_timeout_leaves_no_partial_effect() -> Result<()> {
    let h = Harness::sqlite().await?;
    let account = h.account("Owner").await?;
    h.service
        .execute(CreateStatement::deposit(account, 1000, ""))
        .await?;

    let path = h.database_path().expect("sqlite harness");
    let impatient = LedgerService::connect(
        &StorageConfig::new(path).with_timeout(Duration::from_millis(200)),
    )
    .await?;

    // Another connection holds the write lock for the whole call
    let repo = h.sqlite_repo().expect("sqlite harness");
    let mut writer = repo.pool().acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *writer).await?;

    let err = impatient
        .execute(CreateStatement::withdraw(account, 400, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StorageUnavailable(_)), "{:?}", err);
    assert!(err.is_retriable());

    sqlx::query("ROLLBACK").execute(&mut *writer).await?;
    drop(writer);

    assert_eq!(h.statement_count().await?, 1);
    assert_eq!(h.balance(account).await?, 1000);

    // Nothing was reserved by the failed call either
    let withdraw = impatient
        .execute(CreateStatement::withdraw(account, 400, ""))
        .await?;
    assert_eq!(withdraw.sequence, 2);
    assert_eq!(h.balance(account).await?, 600);
    Ok(())
}

/// Store whose batch appends always fail, the way a dropped connection would.
struct UnavailableBatches {
    inner: InMemoryStatementStore,
}

#[async_trait]
impl StatementStore for UnavailableBatches {
    async fn append_guarded(
        &self,
        guards: Vec<BalanceGuard>,
        drafts: Vec<StatementDraft>,
    ) -> Result<Result<Vec<Statement>, GuardRejection>> {
        if drafts.len() > 1 {
            anyhow::bail!("connection reset");
        }
        self.inner.append_guarded(guards, drafts).await
    }

    async fn find_by_id_and_owner(
        &self,
        id: StatementId,
        owner_id: AccountId,
    ) -> Result<Option<Statement>> {
        self.inner.find_by_id_and_owner(id, owner_id).await
    }

    async fn list_by_owner(&self, owner_id: AccountId) -> Result<Vec<Statement>> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_all(&self) -> Result<Vec<Statement>> {
        self.inner.list_all().await
    }
}

#[tokio::test]
async fn test_transfer_never_writes_halves_separately() -> Result<()> {
    let store = Arc::new(UnavailableBatches {
        inner: InMemoryStatementStore::new(),
    });
    let accounts = Arc::new(InMemoryAccountDirectory::new());
    let service = LedgerService::new(store.clone(), accounts.clone());

    let sender = accounts.register()?;
    let receiver = accounts.register()?;
    service
        .execute(CreateStatement::deposit(sender, 1000, ""))
        .await?;

    let result = service
        .execute(CreateStatement::transfer(sender, receiver, 400, ""))
        .await;

    let err = result.unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(store.inner.len()?, 1);
    assert!(store.list_by_owner(receiver).await?.is_empty());
    Ok(())
}
