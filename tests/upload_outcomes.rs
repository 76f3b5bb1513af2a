mod common;

use std::sync::Arc;

use common::{ORDERS_DDL, RecordingObserver, Scratch, orders, orders_schema};
use dataset_upload::connection::{ConnectionManager, ConnectionParams, SqliteDriver};
use dataset_upload::execution::UploadEvent;
use dataset_upload::job::{CommitState, UploadTarget};
use dataset_upload::strategy::{Binding, ExistencePolicy, StagingOptions, Strategy};
use dataset_upload::types::{DataSet, Value};
use dataset_upload::{ErrorKind, UploadError, UploadRequest, Uploader};

#[test]
fn silent_row_loss_is_reported_as_fault() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql(
        "CREATE TRIGGER drop_odd AFTER INSERT ON orders WHEN NEW.id % 2 = 1
         BEGIN DELETE FROM orders WHERE rowid = NEW.rowid; END;",
    );

    let uploader = Uploader::new(scratch.manager());
    let request = UploadRequest::new(orders(4), UploadTarget::new("orders").unwrap());
    let report = uploader.upload(&request);

    assert_eq!(report.commit_state(), CommitState::Fault);
    match &report.outcome {
        Err(UploadError::VerificationMismatch {
            target,
            expected,
            actual,
        }) => {
            assert_eq!(target, "orders");
            assert_eq!(*expected, 4);
            assert_eq!(*actual, 2);
        }
        other => panic!("expected verification mismatch, got {other:?}"),
    }
    // The load itself committed.
    assert_eq!(scratch.ids("orders"), vec![2, 4]);
    assert_eq!(uploader.metrics().snapshot().faulted, 1);
}

#[test]
fn append_does_not_detect_row_loss() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql(
        "CREATE TRIGGER drop_odd AFTER INSERT ON orders WHEN NEW.id % 2 = 1
         BEGIN DELETE FROM orders WHERE rowid = NEW.rowid; END;",
    );

    let uploader = Uploader::new(scratch.manager());
    let request =
        UploadRequest::new(orders(4), UploadTarget::new("orders").unwrap()).policy(ExistencePolicy::Append);
    assert_eq!(uploader.upload(&request).commit_state(), CommitState::Committed);
}

#[test]
fn failure_in_a_middle_chunk_rolls_back_everything() {
    let scratch = Scratch::new();
    scratch.sql("CREATE TABLE orders (id INTEGER, customer TEXT NOT NULL, amount REAL, paid INTEGER);");
    scratch.sql("INSERT INTO orders VALUES (99, 'seed', 1.0, 0);");

    let observer = Arc::new(RecordingObserver::default());
    let uploader = Uploader::new(scratch.manager()).with_observer(observer.clone());
    // Row 3 has a null customer and lands in the second of three chunks.
    let request = UploadRequest::new(orders(5), UploadTarget::new("orders").unwrap()).chunk_size(2);
    let report = uploader.upload(&request);

    assert_eq!(report.commit_state(), CommitState::RolledBack);
    let err = report.outcome.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(!err.is_retryable());
    assert_eq!(scratch.ids("orders"), vec![99]);

    let sent: Vec<usize> = observer
        .events()
        .iter()
        .filter_map(|e| match e {
            UploadEvent::ChunkSent { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![0]);
    assert!(
        !observer
            .events()
            .iter()
            .any(|e| matches!(e, UploadEvent::Verified { .. }))
    );
}

#[test]
fn failure_in_a_middle_chunk_rolls_back_under_every_strategy() {
    for i in 0..3 {
        let scratch = Scratch::new();
        scratch.sql("CREATE TABLE orders (id INTEGER, customer TEXT NOT NULL, amount REAL, paid INTEGER);");
        scratch.sql("INSERT INTO orders VALUES (99, 'seed', 1.0, 0);");
        let strategy = vec![
            Strategy::MassStatementInsert {
                binding: Binding::Parameterized,
            },
            Strategy::MassStatementInsert {
                binding: Binding::InlineLiterals,
            },
            Strategy::BulkFileLoad(StagingOptions::in_folder(scratch.staging_dir())),
        ]
        .swap_remove(i);

        let uploader = Uploader::new(scratch.manager());
        // Row 3 has a null customer and lands in the second of three chunks.
        let request = UploadRequest::new(orders(5), UploadTarget::new("orders").unwrap())
            .strategy(strategy.clone())
            .chunk_size(2);
        let report = uploader.upload(&request);

        assert_eq!(report.commit_state(), CommitState::RolledBack, "{strategy:?}");
        assert_eq!(
            report.outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Execution,
            "{strategy:?}"
        );
        assert_eq!(scratch.ids("orders"), vec![99], "{strategy:?}");
    }
}

#[test]
fn formatting_error_issues_no_statements() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql("INSERT INTO orders VALUES (99, 'seed', 1.0, 0);");

    let ds = DataSet::try_new(
        orders_schema(),
        vec![
            vec![
                Value::Int64(1),
                Value::Utf8("a".to_string()),
                Value::Float64(1.0),
                Value::Bool(true),
            ],
            vec![
                Value::Int64(2),
                Value::Utf8("b".to_string()),
                Value::Float64(f64::INFINITY),
                Value::Bool(false),
            ],
        ],
    )
    .unwrap();

    let observer = Arc::new(RecordingObserver::default());
    let uploader = Uploader::new(scratch.manager()).with_observer(observer.clone());
    let report = uploader.upload(&UploadRequest::new(Arc::new(ds), UploadTarget::new("orders").unwrap()));

    assert_eq!(report.commit_state(), CommitState::RolledBack);
    match report.outcome {
        Err(UploadError::Formatting { row, ref column, .. }) => {
            assert_eq!(row, 1);
            assert_eq!(column, "amount");
        }
        ref other => panic!("expected formatting error, got {other:?}"),
    }
    assert_eq!(scratch.ids("orders"), vec![99]);
    assert!(observer.events().iter().all(|e| matches!(
        e,
        UploadEvent::UploadStarted { .. } | UploadEvent::UploadFinished { .. }
    )));
}

#[test]
fn ragged_dataset_is_rejected_before_loading() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql("INSERT INTO orders VALUES (99, 'seed', 1.0, 0);");

    let ds = DataSet::new(orders_schema(), vec![vec![Value::Int64(1)]]);
    let uploader = Uploader::new(scratch.manager());
    let report = uploader.upload(&UploadRequest::new(Arc::new(ds), UploadTarget::new("orders").unwrap()));

    assert_eq!(report.commit_state(), CommitState::RolledBack);
    assert!(matches!(report.outcome, Err(UploadError::InvalidDataset { .. })));
    assert_eq!(scratch.count("orders"), 1);
}

#[test]
fn zero_chunk_size_is_rejected() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    let uploader = Uploader::new(scratch.manager());
    let request = UploadRequest::new(orders(3), UploadTarget::new("orders").unwrap()).chunk_size(0);
    let err = uploader.upload(&request).into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn missing_target_rolls_back() {
    let scratch = Scratch::new();
    let uploader = Uploader::new(scratch.manager());
    let report = uploader.upload(&UploadRequest::new(orders(3), UploadTarget::new("nowhere").unwrap()));
    assert_eq!(report.commit_state(), CommitState::RolledBack);
    assert_eq!(report.outcome.unwrap_err().kind(), ErrorKind::Execution);
}

#[test]
fn unreachable_database_fails_at_connect() {
    let scratch = Scratch::new();
    let path = scratch.dir.path().join("no/such/dir/warehouse.db");
    let err = ConnectionManager::connect(ConnectionParams::sqlite(path), Arc::new(SqliteDriver)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_retryable());
}

#[test]
fn blank_target_is_rejected() {
    let err = UploadTarget::new("  ").unwrap_err();
    assert!(matches!(err, UploadError::InvalidOptions { .. }));
}

#[test]
fn events_follow_the_upload_lifecycle() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    let observer = Arc::new(RecordingObserver::default());
    let uploader = Uploader::new(scratch.manager()).with_observer(observer.clone());
    let report = uploader.upload(&UploadRequest::new(orders(3), UploadTarget::new("orders").unwrap()));
    assert!(report.is_success());

    let events = observer.events();
    assert!(matches!(events.first(), Some(UploadEvent::UploadStarted { rows: 3, .. })));
    assert!(matches!(
        events.get(1),
        Some(UploadEvent::PreloadApplied {
            policy: ExistencePolicy::DeleteThenInsert,
            ..
        })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        UploadEvent::Verified {
            expected: 3,
            actual: 3,
            ..
        }
    )));
    assert!(matches!(
        events.last(),
        Some(UploadEvent::UploadFinished {
            state: CommitState::Committed,
            ..
        })
    ));
}
