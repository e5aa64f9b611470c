//! Balances, cycles and the audit trail survive closing and reopening the
//! RocksDB store; an interrupted cycle left behind by one process can be
//! voided by the next.

use rgs_core::{
    audit::{AuditEventType, AuditLog, StoreAuditSink},
    common::{Money, TransactionType},
    config::{GameConfig, LedgerConfig, OutcomeFailurePolicy, StorageConfig},
    engine::{CycleStatus, GameEngine, PlayRequest},
    games::GameCatalog,
    ledger::{store::load_all_balances, verify_player, Ledger},
    rng::ScriptedDraws,
    storage::{KvStore, OptimizedStorage},
};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;

const SEVEN: usize = 7;

struct Node {
    store: Arc<dyn KvStore>,
    audit_sink: Arc<StoreAuditSink>,
    ledger: Arc<Ledger>,
    engine: GameEngine,
    draws: Arc<ScriptedDraws>,
}

fn open_node(path: &Path) -> Node {
    let store: Arc<dyn KvStore> =
        Arc::new(OptimizedStorage::open(path, &StorageConfig::default()).unwrap());
    let audit_sink = Arc::new(StoreAuditSink::new(store.clone()));
    let audit = AuditLog::new(audit_sink.clone());
    let ledger = Arc::new(Ledger::new(store.clone(), audit.clone(), LedgerConfig::default()));
    let draws = Arc::new(ScriptedDraws::new(std::iter::empty()));
    let catalog = Arc::new(GameCatalog::with_default_games("USD", 0.75).unwrap());
    let config = GameConfig {
        outcome_failure_policy: OutcomeFailurePolicy::Interrupt,
        ..GameConfig::default()
    };
    let engine = GameEngine::new(
        store.clone(),
        ledger.clone(),
        draws.clone(),
        catalog,
        audit,
        config,
    );
    Node {
        store,
        audit_sink,
        ledger,
        engine,
        draws,
    }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rgs_data");

    // === Phase 1: play, leave one cycle interrupted, shut down ===
    let (session_id, won_cycle) = {
        let node = open_node(&db_path);
        node.ledger.open_account("alice", "USD").await.unwrap();
        node.ledger
            .deposit("alice", &Money::new(10_000, "USD"), "wire-1")
            .await
            .unwrap();
        let session = node
            .engine
            .start_session("alice", "fortune-slots")
            .await
            .unwrap();

        node.draws.push([SEVEN, SEVEN, SEVEN]);
        let win = node
            .engine
            .play(PlayRequest {
                session_id: session.id.clone(),
                wager_amount: 200,
                cycle_id: None,
            })
            .await
            .unwrap();
        // 10_000 is exactly the large-win threshold
        assert_eq!(win.win_amount.amount, 10_000);
        assert_eq!(win.balance.amount, 19_800);

        // no draws scripted: outcome fails after the debit
        assert!(node
            .engine
            .play(PlayRequest {
                session_id: session.id.clone(),
                wager_amount: 300,
                cycle_id: Some("stuck-cycle".to_string()),
            })
            .await
            .is_err());
        assert_eq!(
            node.engine.get_cycle("stuck-cycle").await.unwrap().status,
            CycleStatus::Interrupted
        );

        (session.id, win.cycle_id)
    };

    // === Phase 2: reopen and recover ===
    let node = open_node(&db_path);
    let balance = node.ledger.get_balance("alice").await.unwrap();
    assert_eq!(balance.available().unwrap().amount, 19_800 - 300);

    let session = node.engine.get_session(&session_id).await.unwrap();
    assert!(session.is_active());
    assert_eq!(session.games_played, 1);

    let won = node.engine.get_cycle(&won_cycle).await.unwrap();
    assert_eq!(won.status, CycleStatus::Completed);
    assert!(won.outcome.as_ref().unwrap().verify().unwrap());

    let interrupted = node.engine.get_interrupted_games("alice").await.unwrap();
    assert_eq!(interrupted.len(), 1);
    assert_eq!(interrupted[0].cycle_id, "stuck-cycle");

    node.engine
        .void_game("stuck-cycle", "recovered after restart")
        .await
        .unwrap();
    assert_eq!(
        node.ledger
            .get_balance("alice")
            .await
            .unwrap()
            .available()
            .unwrap()
            .amount,
        19_800
    );
    assert!(node
        .ledger
        .find_by_reference("stuck-cycle", TransactionType::Refund)
        .await
        .unwrap()
        .is_some());
    assert!(node.engine.get_interrupted_games("alice").await.unwrap().is_empty());

    let history = node.engine.get_history("alice", None).await.unwrap();
    assert_eq!(history.len(), 2);

    let report = verify_player(&*node.store, "alice").unwrap();
    assert!(report.is_consistent(), "{:?}", report.problems);
    assert_eq!(load_all_balances(&*node.store, 10).unwrap().len(), 1);

    let events = node.audit_sink.recent(100).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == AuditEventType::LargeWin));
    assert!(events
        .iter()
        .any(|e| e.event_type == AuditEventType::GameCycleVoided));
}

#[tokio::test]
async fn test_read_only_open_sees_committed_postings() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rgs_data");

    {
        let node = open_node(&db_path);
        node.ledger.open_account("bob", "USD").await.unwrap();
        node.ledger
            .deposit("bob", &Money::new(700, "USD"), "wire-1")
            .await
            .unwrap();
        node.ledger
            .withdraw("bob", &Money::new(200, "USD"), "payout-1")
            .await
            .unwrap();
    }

    let readonly = OptimizedStorage::open_read_only(&db_path).unwrap();
    let report = verify_player(&readonly, "bob").unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.transactions_checked, 2);
    assert_eq!(report.balance, Money::new(500, "USD"));
}
