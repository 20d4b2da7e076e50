use recordkeep_core::{
    Category, Filter, Record, RecordRepository, ReferenceDataService, RepoError,
    SqliteRecordRepository, StoreContext,
};

type Categories = ReferenceDataService<Category, SqliteRecordRepository<Category>>;

fn service(capacity: usize) -> Categories {
    let context = StoreContext::in_memory().unwrap();
    ReferenceDataService::new(SqliteRecordRepository::new(context), capacity)
}

#[test]
fn lookup_populates_cache_and_then_hits_it() {
    let categories = service(8);
    categories
        .repository()
        .add(Category::new(7, "Hardware"))
        .unwrap();
    assert!(categories.cache().is_empty());

    let first = categories.get_by_key(7).unwrap().unwrap();
    assert_eq!(first.name, "Hardware");
    assert_eq!(categories.cache().len(), 1);

    // Changed behind the service's back: the cached copy is still served.
    let mut renamed = first.clone();
    renamed.name = "Tools".to_string();
    categories.repository().update(renamed).unwrap();
    assert_eq!(categories.get_by_key(7).unwrap().unwrap().name, "Hardware");

    categories.invalidate_all();
    assert_eq!(categories.get_by_key(7).unwrap().unwrap().name, "Tools");
}

#[test]
fn missing_key_is_not_cached() {
    let categories = service(8);
    assert!(categories.get_by_key(404).unwrap().is_none());
    assert!(categories.cache().is_empty());
}

#[test]
fn writes_refresh_cached_entries() {
    let categories = service(8);
    let added = categories.add(Category::new(1, "Books")).unwrap();
    assert_eq!(categories.cache().get(1).unwrap().meta.version, 1);

    let mut edited = added.clone();
    edited.name = "Paper books".to_string();
    categories.update(edited).unwrap();
    let cached = categories.cache().get(1).unwrap();
    assert_eq!(cached.name, "Paper books");
    assert_eq!(cached.meta.version, 2);

    let mut recoded = cached.clone();
    recoded.code = 2;
    // Nothing carries code 2 yet, so the recoded copy takes the add path
    // and collides on its own id.
    assert!(matches!(
        categories.upsert(recoded).unwrap_err(),
        RepoError::DuplicateKey { .. }
    ));
    assert!(categories.cache().get(1).is_some());
}

#[test]
fn delete_evicts_and_revive_restores() {
    let categories = service(8);
    let added = categories.add(Category::new(3, "Games")).unwrap();

    categories.delete(added.clone()).unwrap();
    assert!(categories.cache().get(3).is_none());
    assert!(categories.get_by_key(3).unwrap().is_none());

    let deleted = categories
        .repository()
        .find_including_deleted(&Filter::id(added.id()))
        .unwrap()
        .unwrap();
    categories.revive(deleted).unwrap();
    assert!(categories.cache().get(3).is_some());

    let live = categories.get_by_key(3).unwrap().unwrap();
    categories.hard_delete(&live).unwrap();
    assert!(categories.cache().get(3).is_none());
    assert!(categories.get_by_key(3).unwrap().is_none());
}

#[test]
fn upsert_by_key_updates_existing_row() {
    let categories = service(8);
    let added = categories.add(Category::new(5, "Music")).unwrap();

    let mut edited = added.clone();
    edited.sort_order = 9;
    let saved = categories.upsert(edited).unwrap();
    assert_eq!(saved.meta.version, 2);
    assert_eq!(categories.cache().get(5).unwrap().sort_order, 9);

    let fresh = categories.upsert(Category::new(6, "Film")).unwrap();
    assert_eq!(fresh.meta.version, 1);
    assert!(categories.cache().get(6).is_some());
}

#[test]
fn upsert_of_new_instance_replaces_row_with_same_key() {
    let categories = service(8);
    let added = categories.add(Category::new(5, "Music")).unwrap();

    let saved = categories.upsert(Category::new(5, "Music v2")).unwrap();
    assert_eq!(saved.id(), added.id());
    assert_eq!(saved.meta.version, 2);
    assert_eq!(saved.name, "Music v2");
    assert_eq!(saved.meta.created, added.meta.created);
    assert_eq!(
        categories.repository().count_including_deleted(&Filter::All).unwrap(),
        1
    );

    let stored = categories.repository().find(&Filter::id(added.id())).unwrap().unwrap();
    let cached = categories.cache().get(5).unwrap();
    assert_eq!(stored.meta, saved.meta);
    assert_eq!(cached.meta, stored.meta);
    assert_eq!(cached.name, "Music v2");
}

#[test]
fn upsert_rejects_predicate_matching_several_other_rows() {
    let categories = service(8);
    categories.add(Category::new(1, "Same")).unwrap();
    categories.add(Category::new(2, "Same")).unwrap();

    let err = categories
        .repository()
        .upsert(Category::new(3, "Same"), &Filter::equals("name", "Same"))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::AmbiguousUpsert { table: "categories", matches: 2 }
    ));
    assert_eq!(categories.repository().count(&Filter::All).unwrap(), 2);
}

#[test]
fn update_returns_and_caches_stored_created_stamp() {
    let categories = service(8);
    let added = categories.add(Category::new(4, "Maps")).unwrap();

    // Rebuilt from scratch: only identity and version are carried over.
    let mut rebuilt = Category::new(4, "Atlases");
    rebuilt.meta.id = added.id();
    rebuilt.meta.version = added.meta.version;
    let returned = categories.update(rebuilt).unwrap();

    let stored = categories.repository().find(&Filter::id(added.id())).unwrap().unwrap();
    let cached = categories.cache().get(4).unwrap();
    assert_eq!(stored.meta.created, added.meta.created);
    assert_eq!(returned.meta, stored.meta);
    assert_eq!(cached.meta, stored.meta);
    assert_eq!(cached.name, "Atlases");
}

#[test]
fn rollback_clears_cache() {
    let categories = service(8);
    categories.add(Category::new(1, "Kept")).unwrap();
    assert_eq!(categories.cache().len(), 1);

    categories.begin_transaction().unwrap();
    categories.add(Category::new(2, "Uncommitted")).unwrap();
    assert_eq!(categories.cache().len(), 2);
    categories.rollback_transaction().unwrap();

    assert!(categories.cache().is_empty());
    assert!(categories.get_by_key(2).unwrap().is_none());
    assert!(categories.get_by_key(1).unwrap().is_some());
}

#[test]
fn failing_write_in_scope_clears_cache() {
    let categories = service(8);
    categories.add(Category::new(1, "One")).unwrap();

    categories.begin_transaction().unwrap();
    categories.add(Category::new(2, "Two")).unwrap();
    let err = categories.add(Category::new(1, "Clash")).unwrap_err();
    assert!(matches!(err, RepoError::DuplicateKey { table: "categories", .. }));

    assert!(categories.cache().is_empty());
    assert!(categories.get_by_key(2).unwrap().is_none());
}

#[test]
fn cache_respects_capacity() {
    let categories = service(2);
    for code in 1..=3 {
        categories.add(Category::new(code, format!("C{code}"))).unwrap();
    }
    assert_eq!(categories.cache().len(), 2);
    assert!(categories.cache().get(1).is_none());
    assert_eq!(categories.get_by_key(1).unwrap().unwrap().name, "C1");
}
