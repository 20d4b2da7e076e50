use recordkeep_core::{
    AsyncRecordRepository, Customer, Filter, Record, RepoError, SqliteRecordRepository,
    StoreContext, TransactionState,
};
use tokio_util::sync::CancellationToken;

fn customers() -> AsyncRecordRepository<Customer> {
    AsyncRecordRepository::new(SqliteRecordRepository::new(StoreContext::in_memory().unwrap()))
}

#[tokio::test]
async fn async_crud_matches_sync_semantics() {
    let repo = customers();
    let created = repo.add(Customer::new("a@example.com", "A")).await.unwrap();
    assert_eq!(created.meta.version, 1);

    let mut edited = created.clone();
    edited.display_name = "A2".to_string();
    let updated = repo.update(edited).await.unwrap();
    assert_eq!(updated.meta.version, 2);

    let err = repo.update(created.clone()).await.unwrap_err();
    assert!(matches!(err, RepoError::ConcurrencyConflict { .. }));

    repo.delete(updated).await.unwrap();
    assert!(repo.find(&Filter::id(created.id())).await.unwrap().is_none());
    assert!(repo
        .find_including_deleted(&Filter::id(created.id()))
        .await
        .unwrap()
        .is_some());
    assert_eq!(repo.count(&Filter::All).await.unwrap(), 0);
    assert_eq!(repo.count_including_deleted(&Filter::All).await.unwrap(), 1);
}

#[tokio::test]
async fn async_ranges_and_upsert() {
    let repo = customers();
    let saved = repo
        .add_range(vec![
            Customer::new("a@example.com", "A"),
            Customer::new("b@example.com", "B"),
        ])
        .await
        .unwrap();
    assert_eq!(repo.get_all().await.unwrap().len(), 2);

    let by_email = Filter::equals("email", "a@example.com");
    let mut first = saved[0].clone();
    first.note = Some("upserted".to_string());
    let upserted = repo.upsert(first, &by_email).await.unwrap();
    assert_eq!(upserted.meta.version, 2);
    assert!(repo.exists(&Filter::equals("note", "upserted")).await.unwrap());

    let fresh = repo
        .upsert(
            Customer::new("c@example.com", "C"),
            &Filter::equals("email", "c@example.com"),
        )
        .await
        .unwrap();
    assert_eq!(fresh.meta.version, 1);

    let deleted = repo.delete_range(repo.get_all().await.unwrap()).await.unwrap();
    assert_eq!(deleted.len(), 3);
    assert_eq!(repo.get_all_including_deleted().await.unwrap().len(), 3);

    let revived = repo.revive(deleted[0].clone()).await.unwrap();
    assert!(revived.meta.deleted.is_none());
    repo.hard_delete(revived).await.unwrap();
    assert_eq!(repo.get_all_including_deleted().await.unwrap().len(), 2);
}

#[tokio::test]
async fn async_scope_rolls_back_on_write_error() {
    let repo = customers();
    repo.add(Customer::new("a@example.com", "A")).await.unwrap();

    repo.begin_transaction().await.unwrap();
    repo.add(Customer::new("b@example.com", "B")).await.unwrap();
    let err = repo
        .add(Customer::new("a@example.com", "dup"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateKey { .. }));
    assert_eq!(
        repo.transaction_state().await.unwrap(),
        TransactionState::RolledBack
    );
    assert_eq!(repo.count(&Filter::All).await.unwrap(), 1);

    repo.begin_transaction().await.unwrap();
    repo.add(Customer::new("c@example.com", "C")).await.unwrap();
    repo.commit_transaction().await.unwrap();
    assert_eq!(repo.count(&Filter::All).await.unwrap(), 2);
}

#[tokio::test]
async fn cancellation_stops_reads_and_writes() {
    let cancel = CancellationToken::new();
    let repo = AsyncRecordRepository::<Customer>::with_cancellation(
        SqliteRecordRepository::new(StoreContext::in_memory().unwrap()),
        cancel.clone(),
    );
    repo.add(Customer::new("a@example.com", "A")).await.unwrap();

    cancel.cancel();
    assert!(matches!(
        repo.get_all().await.unwrap_err(),
        RepoError::Cancelled
    ));
    assert!(matches!(
        repo.add(Customer::new("b@example.com", "B")).await.unwrap_err(),
        RepoError::Cancelled
    ));

    let fresh = AsyncRecordRepository::new(repo.blocking().clone());
    assert_eq!(fresh.count(&Filter::All).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_share_one_context() {
    let repo = customers();
    let tasks = (0..8)
        .map(|index| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.add(Customer::new(format!("user{index}@example.com"), "User"))
                    .await
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(repo.count(&Filter::All).await.unwrap(), 8);
}
