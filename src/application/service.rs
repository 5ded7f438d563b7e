use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::domain::{
    AccountId, BalanceGuard, Cents, GuardRejection, IntegrityReport, MAX_AMOUNT_CENTS, Statement,
    StatementDraft, StatementId, StatementKind, build_integrity_report, format_cents,
};
use crate::storage::{AccountDirectory, SqliteRepository, StatementStore};

use super::{AccountLocks, AppError, BalanceCalculator, BalanceReport, StatementLookup};

/// A request to record one deposit, withdrawal or transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStatement {
    pub owner_id: AccountId,
    pub kind: StatementKind,
    pub amount_cents: Cents,
    pub description: String,
    /// Required for transfers, rejected for everything else
    pub receiver_id: Option<AccountId>,
}

impl CreateStatement {
    pub fn deposit(owner_id: AccountId, amount_cents: Cents, description: impl Into<String>) -> Self {
        Self {
            owner_id,
            kind: StatementKind::Deposit,
            amount_cents,
            description: description.into(),
            receiver_id: None,
        }
    }

    pub fn withdraw(owner_id: AccountId, amount_cents: Cents, description: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Withdraw,
            ..Self::deposit(owner_id, amount_cents, description)
        }
    }

    pub fn transfer(
        owner_id: AccountId,
        receiver_id: AccountId,
        amount_cents: Cents,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: StatementKind::Transfer,
            receiver_id: Some(receiver_id),
            ..Self::deposit(owner_id, amount_cents, description)
        }
    }
}

/// Application service providing the ledger operations.
/// It is the only writer of statements; every client (CLI, API, tests) goes through it.
pub struct LedgerService {
    statements: Arc<dyn StatementStore>,
    accounts: Arc<dyn AccountDirectory>,
    balances: BalanceCalculator,
    lookup: StatementLookup,
    locks: AccountLocks,
}

impl LedgerService {
    /// Create a new ledger service over the given statement store and account directory.
    pub fn new(statements: Arc<dyn StatementStore>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            balances: BalanceCalculator::new(Arc::clone(&statements)),
            lookup: StatementLookup::new(Arc::clone(&statements)),
            statements,
            accounts,
            locks: AccountLocks::new(),
        }
    }

    /// Use one SQLite repository for both statements and accounts.
    pub fn from_repository(repo: SqliteRepository) -> Self {
        Self::new(Arc::new(repo.clone()), Arc::new(repo))
    }

    /// Initialize a database (creating and migrating it as needed).
    pub async fn init(config: &StorageConfig) -> Result<Self, AppError> {
        let repo = SqliteRepository::init(config).await?;
        Ok(Self::from_repository(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StorageConfig) -> Result<Self, AppError> {
        let repo = SqliteRepository::connect(config).await?;
        Ok(Self::from_repository(repo))
    }

    // ========================
    // Statement creation
    // ========================

    /// Validate and record a statement. For transfers the sender's debit
    /// statement is returned; the receiver's credit is recorded with it.
    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %request.owner_id, kind = %request.kind, amount = request.amount_cents)
    )]
    pub async fn execute(&self, request: CreateStatement) -> Result<Statement, AppError> {
        let result = self.validate_and_commit(request).await;
        match &result {
            Ok(statement) => info!(
                statement_id = %statement.id,
                sequence = statement.sequence,
                "statement recorded"
            ),
            Err(err) => warn!(error = err.kind(), "statement rejected: {}", err),
        }
        result
    }

    /// Same as [`execute`](Self::execute) with the kind given by name, the
    /// way it arrives from a request path.
    pub async fn execute_named(
        &self,
        owner_id: AccountId,
        kind: &str,
        amount_cents: Cents,
        description: impl Into<String>,
        receiver_id: Option<AccountId>,
    ) -> Result<Statement, AppError> {
        let kind = StatementKind::from_str(kind)
            .ok_or_else(|| AppError::InvalidOperationKind(kind.to_string()))?;

        self.execute(CreateStatement {
            owner_id,
            kind,
            amount_cents,
            description: description.into(),
            receiver_id,
        })
        .await
    }

    async fn validate_and_commit(&self, request: CreateStatement) -> Result<Statement, AppError> {
        let CreateStatement {
            owner_id,
            kind,
            amount_cents,
            description,
            receiver_id,
        } = request;

        if !self.accounts.account_exists(owner_id).await? {
            return Err(AppError::AccountNotFound(owner_id));
        }

        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if amount_cents > MAX_AMOUNT_CENTS {
            return Err(AppError::InvalidAmount(format!(
                "Amount must not exceed {}",
                format_cents(MAX_AMOUNT_CENTS)
            )));
        }

        // Held until the commit below finishes: the balance read and the
        // append must not interleave with another operation on this account.
        // Transfers only lock the sender; a credit cannot invalidate any check.
        let _lock = self.locks.acquire(owner_id).await;

        if kind.is_debit() {
            let balance = self.balances.balance_of(owner_id).await?;
            if balance < amount_cents {
                return Err(AppError::InsufficientFunds {
                    account_id: owner_id,
                    balance,
                    required: amount_cents,
                });
            }
        }

        let (guards, drafts) = match (kind, receiver_id) {
            (StatementKind::Transfer, None) => return Err(AppError::MissingReceiver),
            (StatementKind::Transfer, Some(receiver_id)) => {
                if !self.accounts.account_exists(receiver_id).await? {
                    return Err(AppError::ReceiverNotFound(receiver_id));
                }
                let (debit, credit) =
                    StatementDraft::transfer_pair(owner_id, receiver_id, amount_cents, description);
                (
                    vec![
                        BalanceGuard::debit(owner_id, amount_cents),
                        BalanceGuard::credit(receiver_id, amount_cents),
                    ],
                    vec![debit, credit],
                )
            }
            (_, Some(_)) => {
                return Err(AppError::UnexpectedReceiver {
                    kind: kind.to_string(),
                });
            }
            (StatementKind::Deposit, None) => (
                vec![BalanceGuard::credit(owner_id, amount_cents)],
                vec![StatementDraft::deposit(owner_id, amount_cents, description)],
            ),
            (StatementKind::Withdraw, None) => (
                vec![BalanceGuard::debit(owner_id, amount_cents)],
                vec![StatementDraft::withdraw(owner_id, amount_cents, description)],
            ),
        };

        self.commit(guards, drafts, amount_cents).await
    }

    /// Append the drafts as one batch. The store checks the guards again
    /// inside its write transaction, which also orders this commit against
    /// writers in other processes sharing the database.
    async fn commit(
        &self,
        guards: Vec<BalanceGuard>,
        drafts: Vec<StatementDraft>,
        amount_cents: Cents,
    ) -> Result<Statement, AppError> {
        let stored = self
            .statements
            .append_guarded(guards, drafts)
            .await?
            .map_err(|rejection| match rejection {
                GuardRejection::InsufficientFunds {
                    account_id,
                    balance,
                } => AppError::InsufficientFunds {
                    account_id,
                    balance,
                    required: amount_cents,
                },
                GuardRejection::Overflow { account_id } => AppError::BalanceOverflow(account_id),
            })?;

        // For a transfer the debit half comes first
        stored
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Store returned no statements for the commit").into())
    }

    // ========================
    // Read operations
    // ========================

    /// Balance of an account, with its statements when `with_statements` is set.
    pub async fn get_balance(
        &self,
        owner_id: AccountId,
        with_statements: bool,
    ) -> Result<BalanceReport, AppError> {
        if !self.accounts.account_exists(owner_id).await? {
            return Err(AppError::AccountNotFound(owner_id));
        }
        self.balances.balance(owner_id, with_statements).await
    }

    /// A single statement, only if `owner_id` owns it.
    pub async fn get_statement(
        &self,
        owner_id: AccountId,
        statement_id: StatementId,
    ) -> Result<Statement, AppError> {
        self.lookup.get(owner_id, statement_id).await
    }

    pub fn balances(&self) -> &BalanceCalculator {
        &self.balances
    }

    // ========================
    // Integrity operations
    // ========================

    /// Replay the whole history and report anything that breaks the ledger rules.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let statements = self.statements.list_all().await?;
        Ok(build_integrity_report(&statements))
    }
}
