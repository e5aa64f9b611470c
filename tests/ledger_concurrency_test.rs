//! Concurrent postings against one player must serialize: the final balance
//! is the algebraic sum of every accepted posting and no intermediate
//! balance is ever negative.

use futures::future::join_all;
use rgs_core::{
    audit::{AuditLog, MemoryAuditSink},
    common::{Money, TransactionType},
    config::RgsConfig,
    engine::PlayRequest,
    ledger::{verify_player, Ledger, LedgerError},
    rng::RngEngine,
    services::ServiceContainer,
    storage::{KvStore, MemoryStorage},
};
use std::sync::Arc;

fn usd(amount: i64) -> Money {
    Money::new(amount, "USD")
}

fn ledger() -> (Arc<Ledger>, Arc<dyn KvStore>) {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
    let audit = AuditLog::new(Arc::new(MemoryAuditSink::new()));
    let ledger = Arc::new(Ledger::new(store.clone(), audit, Default::default()));
    (ledger, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_postings_sum_exactly() {
    let (ledger, store) = ledger();
    ledger.open_account("whale", "USD").await.unwrap();
    ledger.deposit("whale", &usd(1_000), "seed").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..64i64 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let cycle = format!("cycle-{}", i);
            // signed effect on the balance when the posting is accepted
            let result = match i % 4 {
                0 => ledger
                    .deposit("whale", &usd(50), &format!("dep-{}", i))
                    .await
                    .map(|_| 50),
                1 => ledger
                    .withdraw("whale", &usd(120), &format!("wd-{}", i))
                    .await
                    .map(|_| -120),
                2 => ledger
                    .place_wager("whale", &usd(200), "fortune-slots", &cycle)
                    .await
                    .map(|_| -200),
                _ => ledger
                    .credit_win("whale", &usd(75), "fortune-slots", &cycle)
                    .await
                    .map(|_| 75),
            };
            match result {
                Ok(delta) => delta,
                Err(LedgerError::InsufficientFunds { .. }) => 0,
                Err(e) => panic!("unexpected ledger error: {}", e),
            }
        }));
    }

    let mut expected = 1_000i64;
    for delta in join_all(handles).await {
        expected += delta.unwrap();
    }

    let balance = ledger.get_balance("whale").await.unwrap();
    assert_eq!(balance.available().unwrap().amount, expected);
    assert!(expected >= 0);

    let log = ledger.get_transactions("whale", Some(500)).await.unwrap();
    assert!(log.iter().all(|tx| !tx.balance_after.is_negative()));
    assert_eq!(log.len() as u64, balance.version);

    let report = verify_player(&*store, "whale").unwrap();
    assert!(report.is_consistent(), "{:?}", report.problems);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_wagers_cannot_overdraw() {
    let (ledger, store) = ledger();
    ledger.open_account("p1", "USD").await.unwrap();
    ledger.deposit("p1", &usd(1_000), "seed").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .place_wager("p1", &usd(100), "fortune-slots", &format!("race-{}", i))
                .await
        }));
    }

    let mut accepted = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, LedgerError::InsufficientFunds { .. })),
        }
    }

    assert_eq!(accepted, 10);
    let balance = ledger.get_balance("p1").await.unwrap();
    assert_eq!(balance.available().unwrap(), usd(0));
    assert!(verify_player(&*store, "p1").unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_cycle_reference_posts_once() {
    let (ledger, _) = ledger();
    ledger.open_account("p1", "USD").await.unwrap();
    ledger.deposit("p1", &usd(1_000), "seed").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.place_wager("p1", &usd(100), "fortune-slots", "shared").await
        }));
    }

    let mut accepted = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, LedgerError::DuplicateReference { .. })),
        }
    }
    assert_eq!(accepted, 1);
    assert!(ledger
        .find_by_reference("shared", TransactionType::Wager)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        ledger.get_balance("p1").await.unwrap().available().unwrap(),
        usd(900)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_plays_keep_ledger_consistent() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
    let services =
        ServiceContainer::new(RgsConfig::development(), store.clone(), Arc::new(RngEngine::seeded(99)))
            .unwrap();
    let ledger = services.ledger();
    let engine = services.engine();

    let mut sessions = Vec::new();
    for player in ["p1", "p2", "p3"] {
        ledger.open_account(player, "USD").await.unwrap();
        ledger.deposit(player, &usd(5_000), "seed").await.unwrap();
        sessions.push(engine.start_session(player, "fortune-slots").await.unwrap());
    }

    let mut handles = Vec::new();
    for round in 0..10 {
        for session in &sessions {
            let engine = engine.clone();
            let session_id = session.id.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .play(PlayRequest {
                        session_id,
                        wager_amount: 100 + round,
                        cycle_id: None,
                    })
                    .await
            }));
        }
    }
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    for session in &sessions {
        let report = verify_player(&*store, &session.player_id).unwrap();
        assert!(report.is_consistent(), "{:?}", report.problems);

        let recalled = engine.get_session(&session.id).await.unwrap();
        assert_eq!(recalled.games_played, 10);
        let wagered: i64 = (0..10).map(|r| 100 + r).sum();
        assert_eq!(recalled.total_wagered, usd(wagered));
        assert_eq!(
            report.balance.amount,
            5_000 - wagered + recalled.total_won.amount
        );
    }
}
