use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type StatementId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Money entering the account from outside the ledger
    Deposit,
    /// Money leaving the account to outside the ledger
    Withdraw,
    /// One half of a movement between two accounts
    Transfer,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Deposit => "deposit",
            StatementKind::Withdraw => "withdraw",
            StatementKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(StatementKind::Deposit),
            "withdraw" => Some(StatementKind::Withdraw),
            "transfer" => Some(StatementKind::Transfer),
            _ => None,
        }
    }

    /// Kinds that take money out of the acting account and therefore need
    /// a solvency check before they are recorded.
    pub fn is_debit(&self) -> bool {
        matches!(self, StatementKind::Withdraw | StatementKind::Transfer)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The other side of a transfer statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counterparty {
    /// Credit: the account that sent the funds to the owner
    #[serde(rename = "sender_id")]
    Sender(AccountId),
    /// Debit: the account that received the funds from the owner
    #[serde(rename = "receiver_id")]
    Receiver(AccountId),
}

/// A statement that has not been persisted yet. The store assigns its id,
/// sequence number and creation timestamp.
///
/// Drafts can only be built through the constructors below, which keep the
/// counterparty consistent with the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDraft {
    owner_id: AccountId,
    counterparty: Option<Counterparty>,
    description: String,
    amount_cents: Cents,
    kind: StatementKind,
}

impl StatementDraft {
    pub fn deposit(owner_id: AccountId, amount_cents: Cents, description: impl Into<String>) -> Self {
        Self::single(owner_id, StatementKind::Deposit, amount_cents, description.into())
    }

    pub fn withdraw(owner_id: AccountId, amount_cents: Cents, description: impl Into<String>) -> Self {
        Self::single(owner_id, StatementKind::Withdraw, amount_cents, description.into())
    }

    /// Build both halves of a transfer: the debit on the sender and the
    /// credit on the receiver. They must be persisted together.
    pub fn transfer_pair(
        sender_id: AccountId,
        receiver_id: AccountId,
        amount_cents: Cents,
        description: impl Into<String>,
    ) -> (Self, Self) {
        assert!(amount_cents > 0, "Statement amount must be positive");
        let description = description.into();
        let debit = Self {
            owner_id: sender_id,
            counterparty: Some(Counterparty::Receiver(receiver_id)),
            description: description.clone(),
            amount_cents,
            kind: StatementKind::Transfer,
        };
        let credit = Self {
            owner_id: receiver_id,
            counterparty: Some(Counterparty::Sender(sender_id)),
            description,
            amount_cents,
            kind: StatementKind::Transfer,
        };
        (debit, credit)
    }

    fn single(owner_id: AccountId, kind: StatementKind, amount_cents: Cents, description: String) -> Self {
        assert!(amount_cents > 0, "Statement amount must be positive");
        Self {
            owner_id,
            counterparty: None,
            description,
            amount_cents,
            kind,
        }
    }

    pub fn owner_id(&self) -> AccountId {
        self.owner_id
    }

    pub fn amount_cents(&self) -> Cents {
        self.amount_cents
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Turn the draft into a stored statement.
    pub fn into_statement(self, id: StatementId, sequence: i64, created_at: DateTime<Utc>) -> Statement {
        Statement {
            id,
            sequence,
            owner_id: self.owner_id,
            counterparty: self.counterparty,
            description: self.description,
            amount_cents: self.amount_cents,
            kind: self.kind,
            created_at,
        }
    }
}

/// One immutable fact about money moving in or out of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    /// Monotonically increasing insertion order, assigned by the store
    pub sequence: i64,
    /// The account whose balance this statement affects
    pub owner_id: AccountId,
    #[serde(flatten)]
    pub counterparty: Option<Counterparty>,
    pub description: String,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub kind: StatementKind,
    pub created_at: DateTime<Utc>,
}

impl Statement {
    /// Set only on the credit half of a transfer.
    pub fn sender_id(&self) -> Option<AccountId> {
        match self.counterparty {
            Some(Counterparty::Sender(id)) => Some(id),
            _ => None,
        }
    }

    /// Set only on the debit half of a transfer.
    pub fn receiver_id(&self) -> Option<AccountId> {
        match self.counterparty {
            Some(Counterparty::Receiver(id)) => Some(id),
            _ => None,
        }
    }

    /// The effect of this statement on its owner's balance.
    pub fn signed_amount(&self) -> Cents {
        match (self.kind, self.counterparty) {
            (StatementKind::Deposit, _) => self.amount_cents,
            (StatementKind::Withdraw, _) => -self.amount_cents,
            (StatementKind::Transfer, Some(Counterparty::Sender(_))) => self.amount_cents,
            (StatementKind::Transfer, Some(Counterparty::Receiver(_))) => -self.amount_cents,
            // Malformed row; reported by the integrity check
            (StatementKind::Transfer, None) => 0,
        }
    }
}
