use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{Amount, BillListFilter, Engine, EngineError, ExpenseDraft, Transfer};
use migration::MigratorTrait;

/// Fresh in-memory DB seeded with four users, a finalized event "trip"
/// (creator alice, participants bob and carol) and an unfinalized event
/// "dinner". dave exists but belongs to no event.
async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();

    for user in ["alice", "bob", "carol", "dave"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username) VALUES (?)",
            vec![user.into()],
        ))
        .await
        .unwrap();
    }
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO events (id, title, created_by, is_finalized) VALUES (?, ?, ?, ?)",
        vec![
            "trip".into(),
            "Ski trip".into(),
            "alice".into(),
            true.into(),
        ],
    ))
    .await
    .unwrap();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO events (id, title, created_by, is_finalized) VALUES (?, ?, ?, ?)",
        vec![
            "dinner".into(),
            "Team dinner".into(),
            "alice".into(),
            false.into(),
        ],
    ))
    .await
    .unwrap();
    for user in ["bob", "carol"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO event_participants (event_id, user_id) VALUES (?, ?)",
            vec!["trip".into(), user.into()],
        ))
        .await
        .unwrap();
    }

    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

fn draft(description: &str, minor: i64, paid_by: &str, shared_by: &[&str]) -> ExpenseDraft {
    ExpenseDraft {
        description: description.to_string(),
        amount: Amount::new(minor),
        paid_by: paid_by.to_string(),
        shared_by: shared_by.iter().map(|s| (*s).to_string()).collect(),
        receipt_ref: None,
    }
}

#[tokio::test]
async fn create_bill_requires_finalized_event() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .create_bill("dinner", "Pizza", None, "alice")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState("event date is not finalized".to_string())
    );

    let bill_id = engine
        .create_bill("trip", "Groceries", Some("first day"), "alice")
        .await
        .unwrap();
    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.title, "Groceries");
    assert_eq!(detail.bill.description.as_deref(), Some("first day"));
    assert!(!detail.bill.is_settled);
}

#[tokio::test]
async fn create_bill_requires_event_membership() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .create_bill("trip", "Sneaky", None, "dave")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    let err = engine
        .create_bill("nope", "Ghost", None, "alice")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("event".to_string()));
}

#[tokio::test]
async fn expense_mutations_keep_total_in_sync() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();

    engine
        .add_expense(&bill_id, draft("wine", 20_00, "alice", &["alice", "bob"]), "alice")
        .await
        .unwrap();
    let cheese_id = engine
        .add_expense(&bill_id, draft("cheese", 10_50, "bob", &["alice", "bob"]), "bob")
        .await
        .unwrap();

    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.total_amount, Amount::new(30_50));

    // Reading twice without mutation yields the same cached total.
    let again = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(again.bill.total_amount, Amount::new(30_50));

    engine
        .update_expense(cheese_id, draft("cheese", 12_00, "bob", &["alice", "bob"]), "bob")
        .await
        .unwrap();
    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.total_amount, Amount::new(32_00));

    engine.delete_expense(cheese_id, "bob").await.unwrap();
    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.total_amount, Amount::new(20_00));
    assert_eq!(detail.expenses.len(), 1);
}

#[tokio::test]
async fn split_matches_worked_example() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Weekend", None, "alice")
        .await
        .unwrap();

    engine
        .add_expense(
            &bill_id,
            draft("dinner", 45_99, "bob", &["alice", "bob", "carol"]),
            "bob",
        )
        .await
        .unwrap();
    engine
        .add_expense(
            &bill_id,
            draft("taxi", 23_50, "alice", &["alice", "bob", "carol"]),
            "alice",
        )
        .await
        .unwrap();
    engine
        .add_expense(
            &bill_id,
            draft("drinks", 15_99, "carol", &["bob", "carol"]),
            "carol",
        )
        .await
        .unwrap();

    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    let split = &detail.split;

    assert_eq!(split.total_amount, Amount::new(85_48));
    assert_eq!(split.balances["alice"], Decimal::new(34, 2));
    assert_eq!(split.balances["bob"], Decimal::new(14_83, 2));
    assert_eq!(split.balances["carol"], Decimal::new(-15_17, 2));
    assert_eq!(
        split.transfers,
        vec![
            Transfer {
                from: "carol".to_string(),
                to: "bob".to_string(),
                amount: Decimal::new(14_83, 2),
            },
            Transfer {
                from: "carol".to_string(),
                to: "alice".to_string(),
                amount: Decimal::new(34, 2),
            },
        ]
    );

    // The plan is deterministic for identical input.
    let again = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(again.split, detail.split);
}

#[tokio::test]
async fn empty_bill_has_empty_split() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Untouched", None, "alice")
        .await
        .unwrap();

    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.bill.total_amount, Amount::ZERO);
    assert!(detail.split.balances.is_empty());
    assert!(detail.split.transfers.is_empty());
}

#[tokio::test]
async fn empty_shared_by_credits_only_the_payer() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Deposit", None, "alice")
        .await
        .unwrap();

    engine
        .add_expense(&bill_id, draft("cabin deposit", 30_00, "bob", &[]), "bob")
        .await
        .unwrap();

    let detail = engine.bill_detail(&bill_id, "alice").await.unwrap();
    assert_eq!(detail.split.balances.len(), 1);
    assert_eq!(detail.split.balances["bob"], Decimal::new(30_00, 2));
}

#[tokio::test]
async fn expense_validation_rejects_bad_input() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();

    let err = engine
        .add_expense(&bill_id, draft("", 10_00, "alice", &["alice"]), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .add_expense(&bill_id, draft("wine", -1, "alice", &["alice"]), "alice")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Validation("expense amount must be >= 0".to_string())
    );

    // dave is not a member of the event, neither as payer nor as sharer.
    let err = engine
        .add_expense(&bill_id, draft("wine", 10_00, "dave", &["alice"]), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .add_expense(&bill_id, draft("wine", 10_00, "alice", &["dave"]), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn expense_edits_are_limited_to_payer_and_creators() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();
    let expense_id = engine
        .add_expense(&bill_id, draft("wine", 20_00, "bob", &["bob", "carol"]), "bob")
        .await
        .unwrap();

    // carol can see the bill but may not edit bob's expense.
    let err = engine
        .update_expense(
            expense_id,
            draft("wine", 25_00, "bob", &["bob", "carol"]),
            "carol",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    // The payer and the bill creator may.
    engine
        .update_expense(
            expense_id,
            draft("wine", 25_00, "bob", &["bob", "carol"]),
            "bob",
        )
        .await
        .unwrap();
    engine
        .update_expense(
            expense_id,
            draft("wine", 26_00, "bob", &["bob", "carol"]),
            "alice",
        )
        .await
        .unwrap();

    let err = engine.delete_expense(expense_id, "carol").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn bill_detail_enrolls_participant_lazily() {
    let (engine, db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();

    engine.bill_detail(&bill_id, "bob").await.unwrap();

    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT COUNT(*) AS n FROM bill_participants WHERE bill_id = ? AND user_id = ?",
            vec![bill_id.clone().into(), "bob".into()],
        ))
        .await
        .unwrap()
        .unwrap();
    let n: i64 = row.try_get("", "n").unwrap();
    assert_eq!(n, 1);

    // Enrollment is idempotent.
    engine.bill_detail(&bill_id, "bob").await.unwrap();

    // dave still has no way in.
    let err = engine.bill_detail(&bill_id, "dave").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn settled_flag_is_a_manual_creator_toggle() {
    let (engine, _db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();
    engine
        .add_expense(&bill_id, draft("wine", 20_00, "bob", &["alice", "bob"]), "bob")
        .await
        .unwrap();

    let err = engine.toggle_bill_settled(&bill_id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    // Settling is allowed with debts outstanding; the flag is not derived
    // from the balances.
    assert!(engine.toggle_bill_settled(&bill_id, "alice").await.unwrap());
    assert!(!engine.toggle_bill_settled(&bill_id, "alice").await.unwrap());
}

#[tokio::test]
async fn list_bills_filters_by_event_and_settled() {
    let (engine, _db) = engine_with_db().await;
    let first = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();
    let second = engine
        .create_bill("trip", "Fuel", None, "alice")
        .await
        .unwrap();
    engine.toggle_bill_settled(&second, "alice").await.unwrap();

    engine
        .add_expense(&first, draft("wine", 20_00, "bob", &["alice", "bob"]), "bob")
        .await
        .unwrap();

    let all = engine
        .list_bills("bob", &BillListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let unsettled = engine
        .list_bills(
            "bob",
            &BillListFilter {
                settled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unsettled.len(), 1);
    assert_eq!(unsettled[0].bill.id, first);
    assert_eq!(unsettled[0].expense_count, 1);
    assert_eq!(unsettled[0].user_balance, Decimal::new(10_00, 2));

    let none = engine
        .list_bills(
            "bob",
            &BillListFilter {
                event_id: Some("dinner".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());

    // dave is associated with nothing.
    let empty = engine
        .list_bills("dave", &BillListFilter::default())
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn user_summary_excludes_settled_bills_from_totals() {
    let (engine, _db) = engine_with_db().await;
    let open_bill = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();
    let settled_bill = engine
        .create_bill("trip", "Fuel", None, "alice")
        .await
        .unwrap();

    engine
        .add_expense(
            &open_bill,
            draft("wine", 20_00, "bob", &["bob", "carol"]),
            "bob",
        )
        .await
        .unwrap();
    engine
        .add_expense(
            &settled_bill,
            draft("diesel", 40_00, "carol", &["bob", "carol"]),
            "carol",
        )
        .await
        .unwrap();
    engine
        .toggle_bill_settled(&settled_bill, "alice")
        .await
        .unwrap();

    let summary = engine.user_summary("carol").await.unwrap();
    assert_eq!(summary.total_bills, 2);
    assert_eq!(summary.settled_bills, 1);
    assert_eq!(summary.unsettled_bills, 1);
    // Only the open bill counts: carol owes 10.00 there. Her +20.00 position
    // on the settled bill stays out of the totals but in the breakdown.
    assert_eq!(summary.total_owed_to_user, Decimal::ZERO);
    assert_eq!(summary.total_user_owes, Decimal::new(10_00, 2));
    assert_eq!(summary.breakdown.len(), 2);
    let settled_row = summary
        .breakdown
        .iter()
        .find(|row| row.bill_id == settled_bill)
        .unwrap();
    assert!(settled_row.is_settled);
    assert_eq!(settled_row.balance, Decimal::new(20_00, 2));
}

#[tokio::test]
async fn delete_bill_cascades_to_owned_rows() {
    let (engine, db) = engine_with_db().await;
    let bill_id = engine
        .create_bill("trip", "Groceries", None, "alice")
        .await
        .unwrap();
    engine
        .add_expense(&bill_id, draft("wine", 20_00, "bob", &["alice", "bob"]), "bob")
        .await
        .unwrap();
    engine
        .propose_settlement(&bill_id, "alice", "bob", Amount::new(10_00), None)
        .await
        .unwrap();

    let err = engine.delete_bill(&bill_id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    engine.delete_bill(&bill_id, "alice").await.unwrap();

    let err = engine.bill_detail(&bill_id, "alice").await.unwrap_err();
    assert_eq!(err, EngineError::NotFound("bill".to_string()));

    let backend = db.get_database_backend();
    for table in ["expenses", "expense_shares", "settlements", "bill_participants"] {
        let row = db
            .query_one(Statement::from_string(
                backend,
                format!("SELECT COUNT(*) AS n FROM {table}"),
            ))
            .await
            .unwrap()
            .unwrap();
        let n: i64 = row.try_get("", "n").unwrap();
        assert_eq!(n, 0, "{table} should be empty after bill deletion");
    }
}
