//! cascading user and server deletes.

mod common;

use common::{add_server, add_user, harness, key_for};
use keygate_access::{AccessError, CascadeSubject};
use keygate_db::Database;
use keygate_shell::KeyOperation;
use keygate_types::{GrantKey, ServerId, UserId};

#[tokio::test]
async fn test_delete_user_revokes_everywhere() {
    let h = harness().await;
    let alice = add_user(&h.db, "alice").await;
    let bob = add_user(&h.db, "bob").await;
    let mut servers = Vec::new();
    for host in ["10.0.0.5", "10.0.0.6", "10.0.0.7"] {
        let server = add_server(&h.db, host).await;
        h.orchestrator.grant(alice.id, server.id).await.unwrap();
        servers.push(server);
    }
    h.orchestrator.grant(bob.id, servers[0].id).await.unwrap();

    h.orchestrator.delete_user(alice.id).await.unwrap();

    for server in &servers {
        assert!(!h.shell.has_key(&server.address(), &key_for("alice")));
    }
    assert!(h.db.get_user(alice.id).await.unwrap_err().is_not_found());
    assert!(h.db.list_grants_for_user(alice.id).await.unwrap().is_empty());

    // bob is untouched
    assert!(h.shell.has_key("10.0.0.5:22", &key_for("bob")));
    assert_eq!(h.db.list_grants_for_user(bob.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_server_aborts_on_first_failure() {
    let h = harness().await;
    let db1 = add_server(&h.db, "10.0.0.5").await;
    let mut grantees = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let user = add_user(&h.db, name).await;
        h.orchestrator.grant(user.id, db1.id).await.unwrap();
        grantees.push(user);
    }
    // removal for the second grantee times out
    h.shell
        .hang_key("10.0.0.5:22", KeyOperation::RemoveKey, &key_for("bob"));

    let err = h.orchestrator.delete_server(db1.id).await.unwrap_err();
    let report = match err {
        AccessError::CascadeAborted(report) => report,
        other => panic!("expected cascade abort, got {other:?}"),
    };

    let key = |i: usize| GrantKey::new(grantees[i].id, db1.id);
    assert_eq!(report.subject, CascadeSubject::Server(db1.id));
    assert_eq!(report.revoked, vec![key(0)]);
    assert_eq!(report.failed, key(1));
    assert_eq!(report.not_attempted, vec![key(2)]);
    match &report.error {
        AccessError::RemoteCommand { source, .. } => assert!(source.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }

    // server row stays; only the revoked grantee's row is gone
    h.db.get_server(db1.id).await.unwrap();
    let remaining: Vec<UserId> = h
        .db
        .list_grants_for_server(db1.id)
        .await
        .unwrap()
        .iter()
        .map(|g| g.user_id)
        .collect();
    assert_eq!(remaining, vec![grantees[1].id, grantees[2].id]);

    assert!(!h.shell.has_key("10.0.0.5:22", &key_for("alice")));
    assert!(h.shell.has_key("10.0.0.5:22", &key_for("bob")));
    assert!(h.shell.has_key("10.0.0.5:22", &key_for("carol")));
    assert_eq!(h.shell.open_sessions(), 0);

    // a retry only walks what is left
    h.shell.clear_faults();
    let calls_before = h.shell.calls().len();
    h.orchestrator.delete_server(db1.id).await.unwrap();

    let retried: Vec<String> = h.shell.calls()[calls_before..]
        .iter()
        .map(|c| c.key.clone())
        .collect();
    assert_eq!(retried, vec![key_for("bob"), key_for("carol")]);
    assert!(h.shell.authorized_keys("10.0.0.5:22").is_empty());
    assert!(h.db.get_server(db1.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_user_unreachable_server_keeps_user() {
    let h = harness().await;
    let alice = add_user(&h.db, "alice").await;
    let db1 = add_server(&h.db, "10.0.0.5").await;
    let db2 = add_server(&h.db, "10.0.0.6").await;
    h.orchestrator.grant(alice.id, db1.id).await.unwrap();
    h.orchestrator.grant(alice.id, db2.id).await.unwrap();
    h.shell.set_unreachable("10.0.0.5:22", true);

    let err = h.orchestrator.delete_user(alice.id).await.unwrap_err();
    let AccessError::CascadeAborted(report) = err else {
        panic!("expected cascade abort");
    };
    assert!(report.revoked.is_empty());
    assert_eq!(report.failed, GrantKey::new(alice.id, db1.id));
    assert_eq!(report.not_attempted, vec![GrantKey::new(alice.id, db2.id)]);
    assert!(matches!(report.error, AccessError::Connection { .. }));

    h.db.get_user(alice.id).await.unwrap();
    assert_eq!(h.db.list_grants_for_user(alice.id).await.unwrap().len(), 2);
    assert!(h.shell.has_key("10.0.0.6:22", &key_for("alice")));
}

#[tokio::test]
async fn test_delete_user_with_grant_revoked_concurrently() {
    let h = harness().await;
    let alice = add_user(&h.db, "alice").await;
    let db1 = add_server(&h.db, "10.0.0.5").await;
    let db2 = add_server(&h.db, "10.0.0.6").await;
    h.orchestrator.grant(alice.id, db1.id).await.unwrap();
    h.orchestrator.grant(alice.id, db2.id).await.unwrap();

    // the first row is gone by the time the cascade reaches it
    h.db.vanish_after_listing(GrantKey::new(alice.id, db1.id));

    h.orchestrator.delete_user(alice.id).await.unwrap();

    assert!(!h.shell.has_key(&db1.address(), &key_for("alice")));
    assert!(!h.shell.has_key(&db2.address(), &key_for("alice")));
    assert!(h.db.get_user(alice.id).await.unwrap_err().is_not_found());
    assert!(h.db.list_grants_for_user(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_without_grants() {
    let h = harness().await;
    let alice = add_user(&h.db, "alice").await;
    let db1 = add_server(&h.db, "10.0.0.5").await;

    h.orchestrator.delete_user(alice.id).await.unwrap();
    h.orchestrator.delete_server(db1.id).await.unwrap();

    assert!(h.shell.calls().is_empty());
    assert!(h.db.list_users().await.unwrap().is_empty());
    assert!(h.db.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_unknown_subject() {
    let h = harness().await;

    let err = h.orchestrator.delete_user(UserId(42)).await.unwrap_err();
    assert!(matches!(err, AccessError::UserNotFound(UserId(42))));

    let err = h.orchestrator.delete_server(ServerId(42)).await.unwrap_err();
    assert!(matches!(err, AccessError::ServerNotFound(ServerId(42))));
}

#[tokio::test]
async fn test_abort_report_serializes_subject() {
    let subject = CascadeSubject::Server(ServerId(7));
    assert_eq!(
        serde_json::to_value(subject).unwrap(),
        serde_json::json!({ "kind": "server", "id": 7 })
    );
}
