use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::StorageConfig;
use crate::domain::{Statement, format_cents, parse_cents};
use crate::storage::SqliteRepository;

/// Ledgerline - append-only account statement ledger
#[derive(Parser)]
#[command(name = "ledgerline")]
#[command(about = "Record deposits, withdrawals and transfers; derive balances from history")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "LEDGERLINE_DATABASE", default_value = "ledgerline.db")]
    pub database: String,

    /// Seconds a storage call may wait on a busy database
    #[arg(long, env = "LEDGERLINE_TIMEOUT_SECS", default_value_t = 5)]
    pub timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Record a deposit, withdrawal or transfer
    Record {
        /// Operation kind: deposit, withdraw or transfer
        kind: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Acting account ID
        #[arg(long)]
        account: String,

        /// Receiving account ID (transfers only)
        #[arg(long)]
        receiver: Option<String>,

        /// Description of the operation
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Show the balance of an account
    Balance {
        /// Account ID
        #[arg(long)]
        account: String,

        /// Also list the statements the balance was derived from
        #[arg(long)]
        statements: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a single statement
    Show {
        /// Statement ID
        id: String,

        /// Owning account ID
        #[arg(long)]
        account: String,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a new account
    Add {
        /// Account name
        name: String,
    },

    /// List all accounts
    List,
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID format (expected UUID)", what))
}

impl Cli {
    fn storage_config(&self) -> StorageConfig {
        StorageConfig::new(&self.database).with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.storage_config();

        match self.command {
            Commands::Init => {
                LedgerService::init(&config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(account_cmd) => {
                let repo = SqliteRepository::connect(&config).await?;
                run_account_command(&repo, account_cmd).await?;
            }

            Commands::Record {
                kind,
                amount,
                account,
                receiver,
                description,
            } => {
                let service = LedgerService::connect(&config).await?;
                let owner_id = parse_id(&account, "account")?;
                let receiver_id = receiver
                    .map(|r| parse_id(&r, "receiver"))
                    .transpose()?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let statement = service
                    .execute_named(owner_id, &kind, amount_cents, description, receiver_id)
                    .await?;

                println!(
                    "Recorded {}: {} ({})",
                    statement.kind,
                    format_cents(statement.amount_cents),
                    statement.id
                );
            }

            Commands::Balance {
                account,
                statements,
                json,
            } => {
                let service = LedgerService::connect(&config).await?;
                let owner_id = parse_id(&account, "account")?;
                let report = service.get_balance(owner_id, statements).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Balance: {}", format_cents(report.balance));
                    if let Some(statements) = &report.statements {
                        print_statement_table(statements);
                    }
                }
            }

            Commands::Show { id, account } => {
                let service = LedgerService::connect(&config).await?;
                let owner_id = parse_id(&account, "account")?;
                let statement_id = parse_id(&id, "statement")?;

                let statement = service.get_statement(owner_id, statement_id).await?;
                print_statement(&statement);
            }

            Commands::Check => {
                let service = LedgerService::connect(&config).await?;
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(repo: &SqliteRepository, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Add { name } => {
            let account = repo.create_account(&name).await?;
            println!("Created account: {} ({})", account.name, account.id);
        }

        AccountCommands::List => {
            let accounts = repo.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:<36}", "NAME", "ID");
                println!("{}", "-".repeat(57));
                for account in accounts {
                    println!("{:<20} {:<36}", account.name, account.id);
                }
            }
        }
    }

    Ok(())
}

fn print_statement_table(statements: &[Statement]) {
    if statements.is_empty() {
        println!("No statements.");
        return;
    }

    println!();
    println!(
        "{:<6} {:<20} {:<9} {:>12}  {}",
        "SEQ", "DATE", "KIND", "AMOUNT", "DESCRIPTION"
    );
    println!("{}", "-".repeat(70));
    for statement in statements {
        println!(
            "{:<6} {:<20} {:<9} {:>12}  {}",
            statement.sequence,
            statement.created_at.format("%Y-%m-%d %H:%M:%S"),
            statement.kind,
            format_cents(statement.signed_amount()),
            statement.description
        );
    }
}

fn print_statement(statement: &Statement) {
    println!("Statement: {}", statement.id);
    println!("  Sequence:    {}", statement.sequence);
    println!(
        "  Date:        {}",
        statement.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Kind:        {}", statement.kind);
    println!("  Amount:      {}", format_cents(statement.amount_cents));
    println!("  Account:     {}", statement.owner_id);
    if let Some(sender) = statement.sender_id() {
        println!("  From:        {}", sender);
    }
    if let Some(receiver) = statement.receiver_id() {
        println!("  To:          {}", receiver);
    }
    if !statement.description.is_empty() {
        println!("  Description: {}", statement.description);
    }
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Statements:     {}", report.statement_count);
    println!("Transfer pairs: {}", report.transfer_pairs);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}
