mod common;

use std::sync::Arc;

use anyhow::Result;
use common::Harness;
use ledgerline::application::{AppError, CreateStatement, LedgerService};
use ledgerline::config::StorageConfig;

const ATTEMPTS: usize = 20;
const AMOUNT: i64 = 2500;
const AFFORDABLE: usize = 7;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    for h in Harness::all().await? {
        let account = h.account("Shared").await?;
        h.service
            .execute(CreateStatement::deposit(account, AMOUNT * AFFORDABLE as i64, ""))
            .await?;

        let mut tasks = Vec::with_capacity(ATTEMPTS);
        for _ in 0..ATTEMPTS {
            let service = h.service.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .execute(CreateStatement::withdraw(account, AMOUNT, "race"))
                    .await
            }));
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await? {
                Ok(_) => succeeded += 1,
                Err(AppError::InsufficientFunds { .. }) => rejected += 1,
                Err(other) => panic!("{}: unexpected error: {}", h.name, other),
            }
        }

        assert_eq!(succeeded, AFFORDABLE, "{}", h.name);
        assert_eq!(rejected, ATTEMPTS - AFFORDABLE, "{}", h.name);
        assert_eq!(h.balance(account).await?, 0, "{}", h.name);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_keep_pairs_whole() -> Result<()> {
    for h in Harness::all().await? {
        let sender = h.account("Sender").await?;
        let mut receivers = Vec::new();
        for i in 0..4 {
            receivers.push(h.account(&format!("Receiver {}", i)).await?);
        }
        h.service
            .execute(CreateStatement::deposit(sender, AMOUNT * AFFORDABLE as i64, ""))
            .await?;

        let mut tasks = Vec::with_capacity(ATTEMPTS);
        for i in 0..ATTEMPTS {
            let service = h.service.clone();
            let receiver = receivers[i % receivers.len()];
            tasks.push(tokio::spawn(async move {
                service
                    .execute(CreateStatement::transfer(sender, receiver, AMOUNT, "race"))
                    .await
            }));
        }

        let mut succeeded = 0;
        for task in tasks {
            match task.await? {
                Ok(_) => succeeded += 1,
                Err(AppError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("{}: unexpected error: {}", h.name, other),
            }
        }
        assert_eq!(succeeded, AFFORDABLE, "{}", h.name);

        let mut received = 0;
        for receiver in &receivers {
            received += h.balance(*receiver).await?;
        }
        assert_eq!(received, AMOUNT * AFFORDABLE as i64, "{}", h.name);
        assert_eq!(h.balance(sender).await?, 0, "{}", h.name);

        let report = h.service.check_integrity().await?;
        assert!(report.is_healthy(), "{}: {:?}", h.name, report.issues);
        assert_eq!(report.transfer_pairs, AFFORDABLE);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() -> Result<()> {
    for h in Harness::all().await? {
        let a = h.account("A").await?;
        let b = h.account("B").await?;
        h.service.execute(CreateStatement::deposit(a, 10000, "")).await?;
        h.service.execute(CreateStatement::deposit(b, 10000, "")).await?;

        let mut tasks = Vec::new();
        for i in 0..ATTEMPTS {
            let service = h.service.clone();
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            tasks.push(tokio::spawn(async move {
                service
                    .execute(CreateStatement::transfer(from, to, 100, "ping-pong"))
                    .await
            }));
        }

        let all = tokio::time::timeout(std::time::Duration::from_secs(30), async {
            for task in tasks {
                task.await??;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await;
        assert!(matches!(all, Ok(Ok(()))), "{}: {:?}", h.name, all);

        assert_eq!(h.balance(a).await? + h.balance(b).await?, 20000, "{}", h.name);
        assert_eq!(h.balance(a).await?, 10000, "{}", h.name);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_services_sharing_a_database_never_overdraw() -> Result<()> {
    let h = Harness::sqlite().await?;
    let account = h.account("Shared").await?;
    h.service
        .execute(CreateStatement::deposit(account, AMOUNT * AFFORDABLE as i64, ""))
        .await?;

    // Separate pools and separate account locks, as two processes would have
    let path = h.database_path().expect("sqlite harness");
    let services = [
        Arc::new(LedgerService::connect(&StorageConfig::new(path)).await?),
        Arc::new(LedgerService::connect(&StorageConfig::new(path)).await?),
    ];

    let mut tasks = Vec::with_capacity(ATTEMPTS);
    for i in 0..ATTEMPTS {
        let service = services[i % services.len()].clone();
        tasks.push(tokio::spawn(async move {
            service
                .execute(CreateStatement::withdraw(account, AMOUNT, "race"))
                .await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(succeeded, AFFORDABLE);
    assert_eq!(h.balance(account).await?, 0);

    let report = h.service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);
    Ok(())
}
