use recordkeep_core::{
    Customer, Filter, Record, RecordRepository, RecordService, RepoError, SqliteRecordRepository,
    StoreContext,
};

fn service() -> RecordService<Customer, SqliteRecordRepository<Customer>> {
    RecordService::new(SqliteRecordRepository::new(StoreContext::in_memory().unwrap()))
}

#[test]
fn service_delegates_crud_to_repository() {
    let service = service();
    let created = service.add(Customer::new("a@example.com", "A")).unwrap();
    assert!(service.exists(&Filter::id(created.id())).unwrap());

    let mut edited = created.clone();
    edited.display_name = "A2".to_string();
    let updated = service.update(edited).unwrap();
    assert_eq!(updated.meta.version, 2);

    let deleted = service.delete(updated).unwrap();
    assert!(service.find(&Filter::id(created.id())).unwrap().is_none());
    let revived = service.revive(deleted).unwrap();
    assert_eq!(service.get_all().unwrap(), vec![revived.clone()]);

    service.hard_delete(&revived).unwrap();
    assert!(service
        .find_including_deleted(&Filter::id(created.id()))
        .unwrap()
        .is_none());
}

#[test]
fn transactional_transfer_is_atomic() {
    let service = service();
    let source = service.add(Customer::new("src@example.com", "Source")).unwrap();
    service.add(Customer::new("dst@example.com", "Target")).unwrap();

    let err = service
        .transactional(|repo| {
            let mut renamed = source.clone();
            renamed.display_name = "Moved".to_string();
            repo.update(renamed)?;
            let mut clash = source.clone();
            clash.email = "dst@example.com".to_string();
            repo.update(clash)
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::ConcurrencyConflict { .. }));
    let persisted = service.find(&Filter::id(source.id())).unwrap().unwrap();
    assert_eq!(persisted.display_name, "Source");
    assert_eq!(persisted.meta.version, 1);
}
