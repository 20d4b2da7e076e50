use recordkeep_core::db::open_db;
use recordkeep_core::{
    Customer, Filter, Record, RecordRepository, RepoError, SqliteRecordRepository, StoreContext,
    TransactionState,
};

fn customers() -> SqliteRecordRepository<Customer> {
    SqliteRecordRepository::new(StoreContext::in_memory().unwrap())
}

#[test]
fn commit_persists_every_write_in_scope() {
    let repo = customers();
    repo.begin_transaction().unwrap();
    assert_eq!(repo.transaction_state().unwrap(), TransactionState::Active);

    let a = repo.add(Customer::new("a@example.com", "A")).unwrap();
    let mut edited = a.clone();
    edited.display_name = "A2".to_string();
    repo.update(edited).unwrap();
    repo.add(Customer::new("b@example.com", "B")).unwrap();

    // Reads inside the scope see its own writes.
    assert_eq!(repo.count(&Filter::All).unwrap(), 2);

    repo.commit_transaction().unwrap();
    assert_eq!(repo.transaction_state().unwrap(), TransactionState::Committed);
    let loaded = repo.find(&Filter::id(a.id())).unwrap().unwrap();
    assert_eq!(loaded.meta.version, 2);
}

#[test]
fn explicit_rollback_discards_scope() {
    let repo = customers();
    let before = repo.add(Customer::new("keep@example.com", "Keep")).unwrap();

    repo.begin_transaction().unwrap();
    repo.add(Customer::new("a@example.com", "A")).unwrap();
    repo.delete(before.clone()).unwrap();
    repo.rollback_transaction().unwrap();

    assert_eq!(repo.transaction_state().unwrap(), TransactionState::RolledBack);
    let live = repo.get_all().unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].meta, before.meta);
}

#[test]
fn failing_write_rolls_back_whole_scope() {
    let repo = customers();
    let before = repo.add(Customer::new("a@example.com", "A")).unwrap();
    let snapshot = repo.get_all_including_deleted().unwrap();

    repo.begin_transaction().unwrap();
    let mut edited = before.clone();
    edited.display_name = "Changed in scope".to_string();
    repo.update(edited).unwrap();
    repo.add(Customer::new("b@example.com", "B")).unwrap();

    let err = repo
        .add(Customer::new("a@example.com", "Duplicate"))
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateKey { .. }));
    assert_eq!(repo.transaction_state().unwrap(), TransactionState::RolledBack);

    let after = repo.get_all_including_deleted().unwrap();
    assert_eq!(after.len(), snapshot.len());
    assert_eq!(after[0].meta, snapshot[0].meta);
    assert_eq!(after[0].display_name, "A");
}

#[test]
fn conflict_inside_scope_rolls_back() {
    let repo = customers();
    let original = repo.add(Customer::new("a@example.com", "A")).unwrap();

    repo.begin_transaction().unwrap();
    repo.update(original.clone()).unwrap();
    let err = repo.update(original.clone()).unwrap_err();
    assert!(matches!(err, RepoError::ConcurrencyConflict { .. }));
    assert_eq!(repo.transaction_state().unwrap(), TransactionState::RolledBack);

    let persisted = repo.find(&Filter::id(original.id())).unwrap().unwrap();
    assert_eq!(persisted.meta.version, 1);
}

#[test]
fn misuse_fails_fast() {
    let repo = customers();
    assert!(matches!(
        repo.commit_transaction(),
        Err(RepoError::TransactionState {
            state: TransactionState::Idle,
            ..
        })
    ));
    assert!(matches!(
        repo.rollback_transaction(),
        Err(RepoError::TransactionState { .. })
    ));

    repo.begin_transaction().unwrap();
    assert!(matches!(
        repo.begin_transaction(),
        Err(RepoError::TransactionState {
            state: TransactionState::Active,
            ..
        })
    ));
    repo.rollback_transaction().unwrap();

    // A finished scope can be followed by a new one.
    repo.begin_transaction().unwrap();
    repo.commit_transaction().unwrap();
    assert!(matches!(
        repo.commit_transaction(),
        Err(RepoError::TransactionState {
            state: TransactionState::Committed,
            ..
        })
    ));
}

#[test]
fn repositories_on_one_context_share_the_scope() {
    let context = StoreContext::in_memory().unwrap();
    let first = SqliteRecordRepository::<Customer>::new(context.clone());
    let second = SqliteRecordRepository::<Customer>::new(context);

    first.begin_transaction().unwrap();
    second.add(Customer::new("a@example.com", "A")).unwrap();
    assert_eq!(second.transaction_state().unwrap(), TransactionState::Active);
    first.rollback_transaction().unwrap();

    assert_eq!(second.count(&Filter::All).unwrap(), 0);
}

#[test]
fn dropping_context_with_active_scope_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");

    {
        let repo = SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));
        repo.begin_transaction().unwrap();
        repo.add(Customer::new("a@example.com", "A")).unwrap();
    }

    let reopened = SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));
    assert_eq!(reopened.count_including_deleted(&Filter::All).unwrap(), 0);
}

#[test]
fn separate_contexts_detect_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let alice = SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));
    let bob = SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));

    let created = alice.add(Customer::new("shared@example.com", "Shared")).unwrap();
    let alice_copy = alice.find(&Filter::id(created.id())).unwrap().unwrap();
    let bob_copy = bob.find(&Filter::id(created.id())).unwrap().unwrap();

    let mut bob_edit = bob_copy;
    bob_edit.display_name = "Bob".to_string();
    bob.update(bob_edit).unwrap();

    let mut alice_edit = alice_copy;
    alice_edit.display_name = "Alice".to_string();
    assert!(matches!(
        alice.update(alice_edit).unwrap_err(),
        RepoError::ConcurrencyConflict { expected: 1, actual: 2, .. }
    ));

    let persisted = alice.find(&Filter::id(created.id())).unwrap().unwrap();
    assert_eq!(persisted.display_name, "Bob");
}

#[test]
fn concurrent_writers_on_threads_serialize_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let seed = SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));
    let created = seed.add(Customer::new("race@example.com", "Race")).unwrap();

    let handles = (0..4)
        .map(|worker| {
            let path = path.clone();
            let stale = created.clone();
            std::thread::spawn(move || {
                let repo =
                    SqliteRecordRepository::<Customer>::new(StoreContext::new(open_db(&path).unwrap()));
                let mut edit = stale;
                edit.display_name = format!("worker-{worker}");
                repo.update(edit)
            })
        })
        .collect::<Vec<_>>();

    let outcomes = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes.iter().all(|outcome| match outcome {
        Ok(_) => true,
        Err(err) => matches!(err, RepoError::ConcurrencyConflict { .. }),
    }));

    let persisted = seed.find(&Filter::id(created.id())).unwrap().unwrap();
    assert_eq!(persisted.meta.version, 2);
}
