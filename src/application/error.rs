use thiserror::Error;

use crate::domain::{AccountId, Cents, StatementId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Receiver account not found: {0}")]
    ReceiverNotFound(AccountId),

    #[error("Receiver ID for transfer operation is missing")]
    MissingReceiver,

    #[error("Receiver ID given for a {kind} operation")]
    UnexpectedReceiver { kind: String },

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Invalid operation kind: {0}")]
    InvalidOperationKind(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Balance of account {0} exceeds the representable range")]
    BalanceOverflow(AccountId),

    #[error("Statement not found: {0}")]
    StatementNotFound(StatementId),

    #[error("Storage unavailable: {0:#}")]
    StorageUnavailable(#[from] anyhow::Error),
}

impl AppError {
    /// Only storage failures can succeed on a retry; every other error
    /// reproduces with the same input.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AppError::StorageUnavailable(_))
    }

    /// Stable short name for logs and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::ReceiverNotFound(_) => "receiver_not_found",
            AppError::MissingReceiver => "missing_receiver",
            AppError::UnexpectedReceiver { .. } => "unexpected_receiver",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::InvalidOperationKind(_) => "invalid_operation_kind",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::BalanceOverflow(_) => "balance_overflow",
            AppError::StatementNotFound(_) => "statement_not_found",
            AppError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}
