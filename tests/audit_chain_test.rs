//! End-to-end chain behavior against the SQLite-backed record store:
//! sequential appends, tamper detection through direct storage mutation,
//! toggle no-ops, and concurrent appenders.

use std::sync::Arc;

use chainlog::audit::{Payload, RecordStore};
use chainlog::error::AuditError;
use serde_json::json;

mod common;
use common::*;

#[tokio::test]
async fn test_chain_valid_after_sequential_appends() {
    let db = Arc::new(setup_test_db().await);
    let log = build_audit_log(db.clone(), true);

    for i in 0..8 {
        log.append(
            Some("u1"),
            "job.completed",
            payload_of(&[("index", json!(i))]),
            Some("10.0.0.1"),
        )
        .await
        .unwrap();
    }

    assert_eq!(log.verify_integrity().await.unwrap(), 8);

    let records = db.fetch_all().await.unwrap();
    assert_eq!(records.len(), 8);
    for i in 1..records.len() {
        assert_eq!(records[i].prev_hash, records[i - 1].hash);
    }
}

#[tokio::test]
async fn test_first_and_second_append_link_correctly() {
    let db = Arc::new(setup_test_db().await);
    let log = build_audit_log(db.clone(), true);

    let first = log
        .append(Some("u1"), "login", Payload::new(), Some("1.2.3.4"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.prev_hash, "");
    assert_eq!(first.hash.len(), 64);

    let second = log
        .append(Some("u1"), "logout", Payload::new(), Some("1.2.3.4"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.prev_hash, first.hash);
}

#[tokio::test]
async fn test_disabled_toggle_leaves_store_empty() {
    let db = Arc::new(setup_test_db().await);
    let log = build_audit_log(db.clone(), false);

    let result = log
        .append(Some("u1"), "login", Payload::new(), None)
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(db.fetch_all().await.unwrap().is_empty());
    assert_eq!(db.tip_hash().await.unwrap(), None);
}

#[tokio::test]
async fn test_corrupted_payload_detected_at_that_record() {
    let db = Arc::new(setup_test_db().await);
    let log = build_audit_log(db.clone(), true);

    let mut ids = Vec::new();
    for i in 0..4 {
        let record = log
            .append(
                Some("u1"),
                "transfer",
                payload_of(&[("amount", json!(i * 100))]),
                None,
            )
            .await
            .unwrap()
            .unwrap();
        ids.push(record.id);
    }

    // Tamper with the third record's payload behind the core's back.
    sqlx::query("UPDATE audit_records SET payload = ?1 WHERE id = ?2")
        .bind(r#"{"amount":999999}"#)
        .bind(&ids[2])
        .execute(db.pool())
        .await
        .unwrap();

    let err = log.verify_integrity().await.unwrap_err();
    match err {
        AuditError::Integrity(violation) => {
            assert_eq!(violation.at_record_id, ids[2]);
            assert_ne!(violation.expected_prev_hash, violation.found_prev_hash);
        }
        other => panic!("expected integrity violation, got {other}"),
    }
}

#[tokio::test]
async fn test_tampering_any_field_is_detected() {
    for (column, forged) in [
        ("actor_id", "'mallory'"),
        ("action", "'harmless.noop'"),
        ("origin", "'127.0.0.1'"),
        ("prev_hash", "'0000000000000000000000000000000000000000000000000000000000000000'"),
    ] {
        let db = Arc::new(setup_test_db().await);
        let log = build_audit_log(db.clone(), true);

        log.append(Some("u1"), "login", Payload::new(), Some("1.2.3.4"))
            .await
            .unwrap();
        let target = log
            .append(Some("u2"), "delete", Payload::new(), Some("5.6.7.8"))
            .await
            .unwrap()
            .unwrap();

        let sql = format!("UPDATE audit_records SET {} = {} WHERE id = ?1", column, forged);
        sqlx::query(&sql)
            .bind(&target.id)
            .execute(db.pool())
            .await
            .unwrap();

        let result = log.verify_integrity().await;
        assert!(
            matches!(result, Err(AuditError::Integrity(_))),
            "tampering with {} went undetected",
            column
        );
    }
}

#[tokio::test]
async fn test_concurrent_appenders_produce_one_linear_chain() {
    let db = Arc::new(setup_test_db().await);
    let log = Arc::new(build_audit_log(db.clone(), true));

    let mut handles = Vec::new();
    for t in 0..4 {
        let log = Arc::clone(&log);
        handles.push(tokio::spawn(async move {
            let actor = format!("worker-{}", t);
            for i in 0..10 {
                log.append(
                    Some(actor.as_str()),
                    "task.done",
                    payload_of(&[("i", json!(i))]),
                    None,
                )
                .await
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(log.verify_integrity().await.unwrap(), 40);

    // No fork: every prev_hash is unique, except the single empty chain head.
    let records = db.fetch_all().await.unwrap();
    let mut prev_hashes: Vec<&str> = records.iter().map(|r| r.prev_hash.as_str()).collect();
    prev_hashes.sort_unstable();
    let before = prev_hashes.len();
    prev_hashes.dedup();
    assert_eq!(before, prev_hashes.len());
    assert_eq!(records.iter().filter(|r| r.prev_hash.is_empty()).count(), 1);
}

#[tokio::test]
async fn test_verify_empty_store_succeeds() {
    let db = Arc::new(setup_test_db().await);
    let log = build_audit_log(db, true);
    assert_eq!(log.verify_integrity().await.unwrap(), 0);
}
