//! End-to-end deposit lifecycle: detection, confirmation, ledger credit,
//! consolidation and the events the ledger receives along the way.

use chrono::Utc;

use custody_sweeper::chain::ChainError;
use custody_sweeper::store::{DepositStatus, DepositStore};
use custody_sweeper::sweep::SweepOutcome;

mod common;
use common::{dec, Harness, API_KEY, HOT_WALLET};

#[tokio::test]
async fn test_deposit_from_detection_to_sweep() {
    let h = Harness::new(19).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    // Cycle 1: seen with no confirmations
    h.chain.set_incoming(&wallet.address, vec![("abc123", "100.50", 0)]);
    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.detected, 1);

    let deposit = h.store.find_by_tx_hash("abc123").await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);
    assert_eq!(deposit.confirmations, 0);
    assert_eq!(deposit.amount, dec("100.50"));

    let detected = h.ledger.calls_of("deposit-detected");
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].api_key.as_deref(), Some(API_KEY));
    assert_eq!(detected[0].body["walletAddress"], wallet.address.as_str());
    assert_eq!(detected[0].body["txHash"], "abc123");
    assert_eq!(detected[0].body["network"], "tron");
    assert_eq!(detected[0].body["asset"], "USDT");
    assert_eq!(detected[0].body["amount"], "100.50");
    assert_eq!(detected[0].body["confirmations"], 0);

    // Cycle 2: past the required depth
    h.chain.set_incoming(&wallet.address, vec![("abc123", "100.50", 20)]);
    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.confirmed, 1);

    let deposit = h.store.get_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Confirmed);
    assert_eq!(deposit.confirmations, 20);
    assert!(deposit.confirmed_at.is_some());

    let confirmed = h.ledger.calls_of("deposit-confirmed");
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].body["depositId"], deposit.id.to_string());
    assert_eq!(confirmed[0].body["confirmations"], 20);

    // Nothing is swept until the ledger credits
    h.chain.set_balance(&wallet.address, "100.50");
    let sweep = h.sweeper.run().await.unwrap();
    assert_eq!(sweep.candidates, 0);
    assert!(h.chain.sent().is_empty());

    h.store.mark_credited(deposit.id, Utc::now()).await.unwrap();

    // Cycle 3: consolidation
    h.chain.push_transfer_result(Ok("sweep789".into()));
    let sweep = h.sweeper.run().await.unwrap();
    assert_eq!(sweep.candidates, 1);
    assert_eq!(sweep.swept, 1);

    let sent = h.chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, wallet.address);
    assert_eq!(sent[0].to, HOT_WALLET);
    assert_eq!(sent[0].amount, common::usdt("100.50"));

    let deposit = h.store.get_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Swept);
    assert_eq!(deposit.sweep_tx_hash.as_deref(), Some("sweep789"));
    assert!(deposit.swept_at.is_some());

    let records = h.store.sweep_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_hash, "sweep789");
    assert_eq!(records[0].amount, dec("100.50"));

    let swept = h.ledger.calls_of("deposit-swept");
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].body["depositId"], deposit.id.to_string());
    assert_eq!(swept[0].body["sweepTxHash"], "sweep789");
    assert_eq!(swept[0].body["amountSwept"], "100.50");

    // The delegation made for the sweep is queued and reclaimed
    assert_eq!(h.reclaims.pending_count().await.unwrap(), 1);
    let reclaimed = h.reclaims.process_due(Utc::now()).await.unwrap();
    assert_eq!(reclaimed.completed, 1);
    assert_eq!(h.delegation.reclaimed()[0].receiver, wallet.address);

    // Later cycles leave the swept deposit alone
    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.detected, 0);
    assert_eq!(h.sweeper.run().await.unwrap().candidates, 0);
}

#[tokio::test]
async fn test_every_credited_deposit_on_address_is_swept_together() {
    let h = Harness::new(1).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    h.chain.set_incoming(
        &wallet.address,
        vec![("tx-a", "40", 5), ("tx-b", "30", 5), ("tx-c", "10", 0)],
    );
    h.monitor.scan().await.unwrap();

    for hash in ["tx-a", "tx-b"] {
        let d = h.store.find_by_tx_hash(hash).await.unwrap().unwrap();
        h.store.mark_credited(d.id, Utc::now()).await.unwrap();
    }

    h.chain.set_balance(&wallet.address, "80");
    h.chain.push_transfer_result(Ok("sweep-batch".into()));
    let outcome = h.sweeper.sweep_address(&wallet).await.unwrap();
    assert_eq!(
        outcome,
        SweepOutcome::Swept {
            tx_hash: "sweep-batch".into(),
            amount: dec("80"),
            deposits: 2,
        }
    );

    for hash in ["tx-a", "tx-b"] {
        let d = h.store.find_by_tx_hash(hash).await.unwrap().unwrap();
        assert_eq!(d.status, DepositStatus::Swept);
        assert_eq!(d.sweep_tx_hash.as_deref(), Some("sweep-batch"));
    }
    // Still unconfirmed, so not part of the batch
    let pending = h.store.find_by_tx_hash("tx-c").await.unwrap().unwrap();
    assert_eq!(pending.status, DepositStatus::Pending);

    let swept = h.ledger.calls_of("deposit-swept");
    assert_eq!(swept.len(), 2);
    assert!(swept.iter().all(|c| c.body["amountSwept"] == "80.00"));
}

#[tokio::test]
async fn test_dust_is_ignored() {
    let h = Harness::new(19).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    h.chain.set_incoming(&wallet.address, vec![("dust1", "0.5", 30)]);
    let report = h.monitor.scan().await.unwrap();

    assert_eq!(report.dust, 1);
    assert_eq!(report.detected, 0);
    assert!(h.store.find_by_tx_hash("dust1").await.unwrap().is_none());
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test]
async fn test_repeated_observation_is_idempotent() {
    let h = Harness::new(19).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    h.chain.set_incoming(&wallet.address, vec![("dup1", "25", 3)]);
    h.monitor.scan().await.unwrap();
    h.monitor.scan().await.unwrap();
    h.monitor.scan().await.unwrap();

    assert_eq!(h.store.list_deposits(None).await.unwrap().len(), 1);
    assert_eq!(h.ledger.calls_of("deposit-detected").len(), 1);
}

#[tokio::test]
async fn test_confirmations_never_regress() {
    let h = Harness::new(19).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    h.chain.set_incoming(&wallet.address, vec![("reorg1", "25", 7)]);
    h.monitor.scan().await.unwrap();

    h.chain.set_incoming(&wallet.address, vec![("reorg1", "25", 4)]);
    h.monitor.scan().await.unwrap();

    let d = h.store.find_by_tx_hash("reorg1").await.unwrap().unwrap();
    assert_eq!(d.confirmations, 7);
    assert_eq!(d.status, DepositStatus::Pending);
}

#[tokio::test]
async fn test_deposit_confirmed_at_first_sight_emits_both_events() {
    let h = Harness::new(19).await;
    let wallet = common::provision(&h.store, &h.keys).await;

    h.chain.set_incoming(&wallet.address, vec![("late1", "60", 40)]);
    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.detected, 1);
    assert_eq!(report.confirmed, 1);

    let kinds: Vec<String> = h.ledger.calls().into_iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec!["deposit-detected", "deposit-confirmed"]);

    let d = h.store.find_by_tx_hash("late1").await.unwrap().unwrap();
    assert_eq!(d.status, DepositStatus::Confirmed);
}

#[tokio::test]
async fn test_provider_error_on_one_address_does_not_stop_scan() {
    let h = Harness::new(19).await;
    let broken = common::provision(&h.store, &h.keys).await;
    let healthy = common::provision(&h.store, &h.keys).await;
    assert!(broken.derivation_index < healthy.derivation_index);

    h.chain.set_incoming(&broken.address, vec![("lost1", "60", 3)]);
    h.chain.fail_listing(&broken.address, ChainError::Timeout(10));
    h.chain.set_incoming(&healthy.address, vec![("kept1", "75", 3)]);

    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.addresses, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.detected, 1);

    let deposit = h.store.find_by_tx_hash("kept1").await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);
    assert!(h.store.find_by_tx_hash("lost1").await.unwrap().is_none());

    let detected = h.ledger.calls_of("deposit-detected");
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].body["txHash"], "kept1");
    assert_eq!(detected[0].body["walletAddress"], healthy.address.as_str());

    // Once the provider recovers the missed transfer is picked up
    h.chain.clear_listing_failure(&broken.address);
    let report = h.monitor.scan().await.unwrap();
    assert_eq!(report.errors, 0);
    assert_eq!(report.detected, 1);
    assert!(h.store.find_by_tx_hash("lost1").await.unwrap().is_some());
}
