use pagemark_core::cascade::{delete_referencing, effective_chunk_size};
use pagemark_core::{
    cascade_delete, cascade_repoint_and_rename, fields, CascadeReport, ChildLink, DocRef,
    DocumentStore, Error, MemoryStore, Query, WriteBatch,
};

fn seed_category(store: &mut MemoryStore, category: &str, products: usize) {
    let mut batch = WriteBatch::new();
    batch.create("categories", &category.into(), fields! { "title" => "Drinks", "order" => 0 });
    store.commit(batch).unwrap();

    let mut batch = WriteBatch::new();
    for i in 0..products {
        if batch.len() == store.max_batch_ops() {
            store.commit(std::mem::take(&mut batch)).unwrap();
        }
        batch.create(
            "products",
            &format!("{category}-{i:04}").into(),
            fields! { "category" => category, "order" => i },
        );
    }
    store.commit(batch).unwrap();
    store.clear_history();
}

fn products_of(store: &MemoryStore, category: &str) -> usize {
    store
        .query(&Query::collection("products").filter_eq("category", category))
        .unwrap()
        .len()
}

fn links() -> Vec<ChildLink> {
    vec![ChildLink::new("products", "category")]
}

#[test]
fn deletes_children_in_bounded_chunks_then_the_parent() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 1000);

    let parent = DocRef::new("categories", "drinks");
    let report = cascade_delete(&mut store, &parent, &links(), 400).unwrap();

    assert_eq!(store.committed_batches(), &[400, 400, 200, 1]);
    assert_eq!(report.batches, 4);
    assert_eq!(report.deleted, 1001);
    assert!(store.is_empty("products"));
    assert!(store.get("categories", &"drinks".into()).unwrap().is_none());
}

#[test]
fn delete_spares_other_parents_children() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 12);
    seed_category(&mut store, "food", 5);

    cascade_delete(&mut store, &DocRef::new("categories", "drinks"), &links(), 5).unwrap();
    assert_eq!(products_of(&store, "drinks"), 0);
    assert_eq!(products_of(&store, "food"), 5);
}

#[test]
fn chunk_size_is_clamped_to_the_store_limit() {
    let mut store = MemoryStore::with_max_batch_ops(50);
    seed_category(&mut store, "drinks", 120);

    cascade_delete(&mut store, &DocRef::new("categories", "drinks"), &links(), 400).unwrap();
    assert_eq!(store.committed_batches(), &[50, 50, 20, 1]);
    assert_eq!(effective_chunk_size(&store, 10).unwrap(), 10);
    assert!(matches!(
        effective_chunk_size(&store, 0),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn failure_mid_cascade_is_partial_and_rerun_completes() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 1000);
    store.fail_nth_commit(2);

    let parent = DocRef::new("categories", "drinks");
    let err = cascade_delete(&mut store, &parent, &links(), 400).unwrap_err();
    match &err {
        Error::PartialCascade {
            parent: reported,
            committed_batches,
            source,
        } => {
            assert_eq!(reported, "categories/drinks");
            assert_eq!(*committed_batches, 1);
            assert!(matches!(**source, Error::Storage(_)));
        }
        other => panic!("expected a partial cascade, got {other:?}"),
    }
    assert_eq!(products_of(&store, "drinks"), 600);
    assert!(store.get("categories", &"drinks".into()).unwrap().is_some());

    let report = cascade_delete(&mut store, &parent, &links(), 400).unwrap();
    assert_eq!(report.deleted, 601);
    assert_eq!(products_of(&store, "drinks"), 0);
    assert!(store.get("categories", &"drinks".into()).unwrap().is_none());
}

#[test]
fn failure_before_any_commit_is_reported_as_is() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 3);
    store.fail_nth_commit(1);

    let err = cascade_delete(&mut store, &DocRef::new("categories", "drinks"), &links(), 400)
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[test]
fn rename_repoints_every_child_and_removes_the_old_parent() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 450);
    let old = store.get("categories", &"drinks".into()).unwrap().unwrap();

    let report = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"drinks".into(),
        &"beverages".into(),
        &links(),
        200,
    )
    .unwrap();

    assert_eq!(report.repointed, 450);
    assert_eq!(store.committed_batches(), &[1, 200, 200, 50, 1]);
    assert_eq!(products_of(&store, "drinks"), 0);
    assert_eq!(products_of(&store, "beverages"), 450);
    assert!(store.get("categories", &"drinks".into()).unwrap().is_none());
    let renamed = store.get("categories", &"beverages".into()).unwrap().unwrap();
    assert_eq!(renamed.fields, old.fields);
}

#[test]
fn rename_onto_a_different_document_conflicts() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 2);
    let mut batch = WriteBatch::new();
    batch.create("categories", &"food".into(), fields! { "title" => "Food", "order" => 1 });
    store.commit(batch).unwrap();

    let err = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"drinks".into(),
        &"food".into(),
        &links(),
        400,
    )
    .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(products_of(&store, "drinks"), 2);
}

#[test]
fn rename_rejects_missing_and_identical_ids() {
    let mut store = MemoryStore::default();
    let err = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"ghost".into(),
        &"spirit".into(),
        &links(),
        400,
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    seed_category(&mut store, "drinks", 1);
    let err = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"drinks".into(),
        &"drinks".into(),
        &links(),
        400,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
}

#[test]
fn rename_from_missing_id_onto_existing_target_is_not_found() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 3);

    let err = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"ghost".into(),
        &"drinks".into(),
        &links(),
        400,
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(store.committed_batches().is_empty());
    assert_eq!(products_of(&store, "drinks"), 3);
}

#[test]
fn rename_resumes_when_old_is_gone_but_children_still_point_at_it() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 4);
    let mut batch = WriteBatch::new();
    batch
        .create("categories", &"beverages".into(), fields! { "title" => "Drinks", "order" => 0 })
        .delete("categories", &"drinks".into());
    store.commit(batch).unwrap();

    let report = cascade_repoint_and_rename(
        &mut store,
        "categories",
        &"drinks".into(),
        &"beverages".into(),
        &links(),
        400,
    )
    .unwrap();
    assert_eq!(report.repointed, 4);
    assert_eq!(products_of(&store, "beverages"), 4);
}

#[test]
fn interrupted_rename_can_be_resumed() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 30);
    store.fail_nth_commit(3);

    let rename = |store: &mut MemoryStore| {
        cascade_repoint_and_rename(
            store,
            "categories",
            &"drinks".into(),
            &"beverages".into(),
            &links(),
            10,
        )
    };
    let err = rename(&mut store).unwrap_err();
    assert!(err.is_partial_cascade());
    assert_eq!(products_of(&store, "beverages"), 10);

    rename(&mut store).unwrap();
    assert_eq!(products_of(&store, "drinks"), 0);
    assert_eq!(products_of(&store, "beverages"), 30);
    assert!(store.get("categories", &"drinks".into()).unwrap().is_none());
}

#[test]
fn delete_referencing_reports_progress() {
    let mut store = MemoryStore::default();
    seed_category(&mut store, "drinks", 7);
    let mut report = CascadeReport::default();

    delete_referencing(&mut store, &links()[0], &"drinks".into(), 3, &mut report).unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.deleted, 7);
    assert!(store.get("categories", &"drinks".into()).unwrap().is_some());
}
