use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::domain::{
    Account, AccountId, BalanceGuard, Counterparty, GuardRejection, Statement, StatementDraft,
    StatementId, StatementKind,
};

use super::{AccountDirectory, MIGRATION_001_INITIAL, StatementStore};

const STATEMENT_COLUMNS: &str =
    "id, sequence, owner_id, sender_id, receiver_id, description, amount_cents, kind, created_at";

/// Durable statement store and account registry backed by SQLite.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate), creating the file if needed.
    pub async fn init(config: &StorageConfig) -> Result<Self> {
        let config = config.clone().with_create_if_missing(true);
        let repo = Self::connect(&config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // Account operations
    // ========================

    /// Register a new account.
    pub async fn create_account(&self, name: &str) -> Result<Account> {
        let account = Account::new(name);
        sqlx::query("INSERT INTO accounts (id, name, created_at) VALUES (?, ?, ?)")
            .bind(account.id.to_string())
            .bind(&account.name)
            .bind(account.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to save account '{}'", name))?;
        Ok(account)
    }

    /// List all accounts, ordered by name.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM accounts ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                let created_at_str: String = row.get("created_at");
                Ok(Account {
                    id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
                    name: row.get("name"),
                    created_at: parse_timestamp(&created_at_str)?,
                })
            })
            .collect()
    }

    // ========================
    // Statement operations
    // ========================

    /// Reserve `count` sequence numbers and return the first one.
    /// Runs on the caller's transaction so the reservation rolls back with it.
    async fn reserve_sequence(conn: &mut SqliteConnection, count: usize) -> Result<i64> {
        let count = i64::try_from(count).context("Statement batch too large")?;
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + ?
            WHERE name = 'statement_sequence'
            RETURNING value
            "#,
        )
        .bind(count)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to reserve sequence numbers")?;

        let last: i64 = row.get("value");
        Ok(last - count + 1)
    }

    async fn insert_statement(conn: &mut SqliteConnection, statement: &Statement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO statements (id, sequence, owner_id, sender_id, receiver_id, description, amount_cents, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(statement.id.to_string())
        .bind(statement.sequence)
        .bind(statement.owner_id.to_string())
        .bind(statement.sender_id().map(|id| id.to_string()))
        .bind(statement.receiver_id().map(|id| id.to_string()))
        .bind(&statement.description)
        .bind(statement.amount_cents)
        .bind(statement.kind.as_str())
        .bind(statement.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to save statement")?;
        Ok(())
    }

    /// All statements of `owner_id`, oldest first, read on the given connection.
    async fn owner_history(
        conn: &mut SqliteConnection,
        owner_id: AccountId,
    ) -> Result<Vec<Statement>> {
        let query = format!(
            "SELECT {} FROM statements WHERE owner_id = ? ORDER BY sequence",
            STATEMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.to_string())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list statements for account")?;

        rows.iter().map(Self::row_to_statement).collect()
    }

    fn row_to_statement(row: &SqliteRow) -> Result<Statement> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");
        let sender_str: Option<String> = row.get("sender_id");
        let receiver_str: Option<String> = row.get("receiver_id");
        let kind_str: String = row.get("kind");
        let created_at_str: String = row.get("created_at");

        let counterparty = match (sender_str, receiver_str) {
            (None, None) => None,
            (Some(sender), None) => Some(Counterparty::Sender(
                Uuid::parse_str(&sender).context("Invalid sender ID")?,
            )),
            (None, Some(receiver)) => Some(Counterparty::Receiver(
                Uuid::parse_str(&receiver).context("Invalid receiver ID")?,
            )),
            (Some(_), Some(_)) => {
                anyhow::bail!("Statement {} has both sender and receiver", id_str)
            }
        };

        Ok(Statement {
            id: Uuid::parse_str(&id_str).context("Invalid statement ID")?,
            sequence: row.get("sequence"),
            owner_id: Uuid::parse_str(&owner_str).context("Invalid owner ID")?,
            counterparty,
            description: row.get("description"),
            amount_cents: row.get("amount_cents"),
            kind: StatementKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid statement kind: {}", kind_str))?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .context("Invalid created_at timestamp")?
        .with_timezone(&Utc))
}

#[async_trait]
impl StatementStore for SqliteRepository {
    async fn append_guarded(
        &self,
        guards: Vec<BalanceGuard>,
        drafts: Vec<StatementDraft>,
    ) -> Result<Result<Vec<Statement>, GuardRejection>> {
        if drafts.is_empty() {
            return Ok(Ok(Vec::new()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin statement transaction")?;

        // The counter bump is the first statement, so the write lock is taken
        // before any balance is read. Writers on other connections, including
        // other processes, wait until this transaction ends.
        let first_sequence = Self::reserve_sequence(&mut tx, drafts.len()).await?;

        for guard in &guards {
            let history = Self::owner_history(&mut tx, guard.account_id).await?;
            if let Err(rejection) = guard.check(&history) {
                tx.rollback()
                    .await
                    .context("Failed to roll back statement transaction")?;
                tracing::debug!(account_id = %guard.account_id, "batch rejected: {}", rejection);
                return Ok(Err(rejection));
            }
        }

        let created_at = Utc::now();
        let mut stored = Vec::with_capacity(drafts.len());
        for (sequence, draft) in (first_sequence..).zip(drafts) {
            let statement = draft.into_statement(Uuid::new_v4(), sequence, created_at);
            Self::insert_statement(&mut tx, &statement).await?;
            stored.push(statement);
        }

        tx.commit()
            .await
            .context("Failed to commit statement transaction")?;

        tracing::debug!(
            count = stored.len(),
            first_sequence,
            "appended statements"
        );
        Ok(Ok(stored))
    }

    async fn find_by_id_and_owner(
        &self,
        id: StatementId,
        owner_id: AccountId,
    ) -> Result<Option<Statement>> {
        let query = format!(
            "SELECT {} FROM statements WHERE id = ? AND owner_id = ?",
            STATEMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch statement")?;

        row.as_ref().map(Self::row_to_statement).transpose()
    }

    async fn list_by_owner(&self, owner_id: AccountId) -> Result<Vec<Statement>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::owner_history(&mut conn, owner_id).await
    }

    async fn list_all(&self) -> Result<Vec<Statement>> {
        let query = format!("SELECT {} FROM statements ORDER BY sequence", STATEMENT_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list statements")?;

        rows.iter().map(Self::row_to_statement).collect()
    }
}

#[async_trait]
impl AccountDirectory for SqliteRepository {
    async fn account_exists(&self, id: AccountId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS found FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up account")?;
        Ok(row.is_some())
    }
}
