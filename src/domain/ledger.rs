use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use thiserror::Error;

use super::{AccountId, Cents, Counterparty, Statement, StatementId, StatementKind};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("balance exceeds the representable range")]
pub struct BalanceOverflow;

/// Compute an account's balance by replaying its statements.
/// Deposits and transfer credits add, withdrawals and transfer debits subtract.
pub fn compute_balance(statements: &[Statement]) -> Result<Cents, BalanceOverflow> {
    statements.iter().try_fold(0 as Cents, |balance, statement| {
        balance
            .checked_add(statement.signed_amount())
            .ok_or(BalanceOverflow)
    })
}

/// Compute balances for every account that appears in a list of statements.
/// An account whose replay overflows maps to `None`.
pub fn compute_all_balances(statements: &[Statement]) -> HashMap<AccountId, Option<Cents>> {
    let mut balances: HashMap<AccountId, Option<Cents>> = HashMap::new();

    for statement in statements {
        let balance = balances.entry(statement.owner_id).or_insert(Some(0));
        *balance = balance.and_then(|b| b.checked_add(statement.signed_amount()));
    }

    balances
}

/// A condition on one account's balance that must hold when a batch of
/// statements is committed. Stores evaluate it inside the same atomic step
/// that appends the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceGuard {
    pub account_id: AccountId,
    /// Balance change the batch applies to `account_id`
    pub delta: Cents,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRejection {
    #[error("account {account_id} holds {balance} cents, not enough for the batch")]
    InsufficientFunds { account_id: AccountId, balance: Cents },

    #[error("balance of account {account_id} would leave the representable range")]
    Overflow { account_id: AccountId },
}

impl BalanceGuard {
    /// Money leaves the account: the balance must cover it.
    pub fn debit(account_id: AccountId, amount_cents: Cents) -> Self {
        Self {
            account_id,
            delta: -amount_cents,
        }
    }

    /// Money enters the account: the balance must stay representable.
    pub fn credit(account_id: AccountId, amount_cents: Cents) -> Self {
        Self {
            account_id,
            delta: amount_cents,
        }
    }

    /// Check the guard against the full history of `account_id` and return
    /// the balance the account will have after the batch.
    pub fn check(&self, history: &[Statement]) -> Result<Cents, GuardRejection> {
        let overflow = GuardRejection::Overflow {
            account_id: self.account_id,
        };
        let balance = compute_balance(history).map_err(|_| overflow)?;
        let after = balance.checked_add(self.delta).ok_or(overflow)?;

        if self.delta < 0 && after < 0 {
            return Err(GuardRejection::InsufficientFunds {
                account_id: self.account_id,
                balance,
            });
        }
        Ok(after)
    }
}

/// Result of replaying the whole statement history.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub statement_count: usize,
    pub transfer_pairs: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    NonPositiveAmount { statement_id: StatementId },
    CounterpartyOnNonTransfer { statement_id: StatementId },
    TransferWithoutCounterparty { statement_id: StatementId },
    UnmatchedTransfer { statement_id: StatementId },
    NegativeBalance { account_id: AccountId, balance: Cents },
    BalanceOverflow { account_id: AccountId },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::NonPositiveAmount { statement_id } => {
                write!(f, "statement {} has a non-positive amount", statement_id)
            }
            IntegrityIssue::CounterpartyOnNonTransfer { statement_id } => {
                write!(f, "statement {} has a counterparty but is not a transfer", statement_id)
            }
            IntegrityIssue::TransferWithoutCounterparty { statement_id } => {
                write!(f, "transfer statement {} has no counterparty", statement_id)
            }
            IntegrityIssue::UnmatchedTransfer { statement_id } => {
                write!(f, "transfer statement {} has no matching other half", statement_id)
            }
            IntegrityIssue::NegativeBalance {
                account_id,
                balance,
            } => {
                write!(
                    f,
                    "account {} has negative balance {}",
                    account_id,
                    super::format_cents(*balance)
                )
            }
            IntegrityIssue::BalanceOverflow { account_id } => {
                write!(f, "balance of account {} overflows", account_id)
            }
        }
    }
}

/// Identifies the two halves of one transfer: they share sender, receiver,
/// amount and the batch timestamp.
type TransferKey = (AccountId, AccountId, Cents, DateTime<Utc>);

/// Replay every statement and report anything that breaks the ledger rules.
/// `statements` must be in insertion order.
pub fn build_integrity_report(statements: &[Statement]) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut open_debits: HashMap<TransferKey, Vec<StatementId>> = HashMap::new();
    let mut open_credits: HashMap<TransferKey, Vec<StatementId>> = HashMap::new();
    let mut transfer_pairs = 0;

    for statement in statements {
        if statement.amount_cents <= 0 {
            issues.push(IntegrityIssue::NonPositiveAmount {
                statement_id: statement.id,
            });
        }

        match (statement.kind, statement.counterparty) {
            (StatementKind::Transfer, None) => {
                issues.push(IntegrityIssue::TransferWithoutCounterparty {
                    statement_id: statement.id,
                });
            }
            (StatementKind::Transfer, Some(counterparty)) => {
                let (key, mine, theirs) = match counterparty {
                    Counterparty::Receiver(receiver) => (
                        (statement.owner_id, receiver, statement.amount_cents, statement.created_at),
                        &mut open_debits,
                        &mut open_credits,
                    ),
                    Counterparty::Sender(sender) => (
                        (sender, statement.owner_id, statement.amount_cents, statement.created_at),
                        &mut open_credits,
                        &mut open_debits,
                    ),
                };
                match theirs.get_mut(&key).and_then(|ids| ids.pop()) {
                    Some(_) => transfer_pairs += 1,
                    None => mine.entry(key).or_default().push(statement.id),
                }
            }
            (_, Some(_)) => {
                issues.push(IntegrityIssue::CounterpartyOnNonTransfer {
                    statement_id: statement.id,
                });
            }
            (_, None) => {}
        }
    }

    let mut unmatched: Vec<StatementId> = open_debits
        .into_values()
        .chain(open_credits.into_values())
        .flatten()
        .collect();
    unmatched.sort();
    issues.extend(
        unmatched
            .into_iter()
            .map(|statement_id| IntegrityIssue::UnmatchedTransfer { statement_id }),
    );

    let mut balances: Vec<(AccountId, Option<Cents>)> =
        compute_all_balances(statements).into_iter().collect();
    balances.sort();
    issues.extend(balances.into_iter().filter_map(|(account_id, balance)| match balance {
        None => Some(IntegrityIssue::BalanceOverflow { account_id }),
        Some(balance) if balance < 0 => {
            Some(IntegrityIssue::NegativeBalance { account_id, balance })
        }
        Some(_) => None,
    }));

    IntegrityReport {
        statement_count: statements.len(),
        transfer_pairs,
        issues,
    }
}
