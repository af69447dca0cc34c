//! Backend conformance suite: every `DocumentStore` adapter must pass `run_all`.

use std::time::Duration;

use pagemark_core::{
    fields, ChangeKind, DocId, DocRef, DocumentStore, Engine, EngineConfig, Error, LiveQuery,
    MarkerScope, Query, Schema, SetMode, WriteBatch,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ids<S: DocumentStore>(store: &S, query: &Query) -> Vec<String> {
    store
        .query(query)
        .unwrap()
        .into_iter()
        .map(|doc| doc.id.0)
        .collect()
}

fn seed_products<S: DocumentStore>(store: &mut S) {
    let mut batch = WriteBatch::new();
    batch
        .create("products", &"cola".into(), fields! { "category" => "drinks", "order" => 2 })
        .create("products", &"tea".into(), fields! { "category" => "drinks", "order" => 0 })
        .create("products", &"juice".into(), fields! { "category" => "drinks", "order" => 1 })
        .create("products", &"soup".into(), fields! { "category" => "food", "order" => 0 });
    store.commit(batch).unwrap();
}

pub fn query_filters_orders_and_limits<S: DocumentStore>(mut store: S) {
    seed_products(&mut store);
    let drinks = Query::collection("products").filter_eq("category", "drinks");

    assert_eq!(ids(&store, &drinks), ["cola", "juice", "tea"]);
    assert_eq!(ids(&store, &drinks.clone().order_by("order")), ["tea", "juice", "cola"]);
    assert_eq!(ids(&store, &drinks.order_by("order").limit(2)), ["tea", "juice"]);
    assert!(ids(&store, &Query::collection("categories")).is_empty());
}

pub fn missing_values_sort_first_and_ties_break_by_id<S: DocumentStore>(mut store: S) {
    let mut batch = WriteBatch::new();
    batch
        .create("categories", &"b".into(), fields! { "order" => 1 })
        .create("categories", &"a".into(), fields! { "order" => 1 })
        .create("categories", &"z".into(), fields! { "title" => "no order" })
        .create("categories", &"n".into(), fields! { "order" => pagemark_core::serde_json::Value::Null })
        .create("categories", &"c".into(), fields! { "order" => 0 });
    store.commit(batch).unwrap();

    assert_eq!(
        ids(&store, &Query::collection("categories").order_by("order")),
        ["n", "z", "c", "a", "b"]
    );
}

pub fn null_filter_matches_missing_fields<S: DocumentStore>(mut store: S) {
    let mut batch = WriteBatch::new();
    batch
        .create("comments", &"orphan".into(), fields! { "body" => "hi" })
        .create("comments", &"cleared".into(), fields! { "thread" => pagemark_core::serde_json::Value::Null })
        .create("comments", &"linked".into(), fields! { "thread" => "launch" });
    store.commit(batch).unwrap();

    let query = Query::collection("comments").filter_eq("thread", pagemark_core::serde_json::Value::Null);
    assert_eq!(ids(&store, &query), ["cleared", "orphan"]);
}

pub fn numeric_filters_ignore_integer_float_spelling<S: DocumentStore>(mut store: S) {
    let mut batch = WriteBatch::new();
    batch
        .create("products", &"int".into(), fields! { "price" => 1 })
        .create("products", &"float".into(), fields! { "price" => 1.0 })
        .create("products", &"half".into(), fields! { "price" => 1.5 })
        .create("products", &"text".into(), fields! { "price" => "1" });
    store.commit(batch).unwrap();

    let priced = |value: f64| Query::collection("products").filter_eq("price", value);
    assert_eq!(ids(&store, &priced(1.0)), ["float", "int"]);
    assert_eq!(
        ids(&store, &Query::collection("products").filter_eq("price", 1)),
        ["float", "int"]
    );
    assert_eq!(ids(&store, &priced(1.5)), ["half"]);
}

pub fn write_kinds_follow_the_contract<S: DocumentStore>(mut store: S) {
    let id = DocId::from("drinks");
    store
        .set("categories", &id, fields! { "title" => "Drinks", "order" => 0 }, SetMode::Overwrite)
        .unwrap();
    store
        .set("categories", &id, fields! { "visible" => false }, SetMode::Merge)
        .unwrap();
    let doc = store.get("categories", &id).unwrap().unwrap();
    assert_eq!(doc.revision, 2);
    assert_eq!(doc.get_str("title"), Some("Drinks"));
    assert!(!doc.is_visible());

    store
        .set("categories", &id, fields! { "title" => "Beverages" }, SetMode::Overwrite)
        .unwrap();
    let doc = store.get("categories", &id).unwrap().unwrap();
    assert_eq!(doc.fields, fields! { "title" => "Beverages" });

    let mut create = WriteBatch::new();
    create.create("categories", &id, fields! {});
    assert!(store.commit(create).unwrap_err().is_conflict());

    let mut update = WriteBatch::new();
    update.update("categories", &"ghost".into(), fields! { "order" => 1 });
    assert!(matches!(store.commit(update), Err(Error::NotFound(_))));

    let mut delete = WriteBatch::new();
    delete
        .delete("categories", &"ghost".into())
        .delete("categories", &id);
    store.commit(delete).unwrap();
    assert!(store.get("categories", &id).unwrap().is_none());
}

pub fn batches_are_atomic<S: DocumentStore>(mut store: S) {
    seed_products(&mut store);
    let before = store.get("products", &"tea".into()).unwrap().unwrap();

    let mut batch = WriteBatch::new();
    batch
        .update("products", &"tea".into(), fields! { "order" => 9 })
        .delete("products", &"soup".into())
        .update_at("products", &"cola".into(), 99, fields! { "order" => 0 });
    assert!(store.commit(batch).unwrap_err().is_conflict());

    assert_eq!(store.get("products", &"tea".into()).unwrap().unwrap(), before);
    assert!(store.get("products", &"soup".into()).unwrap().is_some());
}

pub fn oversized_batches_are_rejected<S: DocumentStore>(mut store: S) {
    let max = store.max_batch_ops();
    let mut batch = WriteBatch::new();
    for i in 0..=max {
        batch.create("comments", &format!("c{i}").into(), fields! {});
    }
    match store.commit(batch) {
        Err(Error::BatchTooLarge { len, max: limit }) => {
            assert_eq!(len, max + 1);
            assert_eq!(limit, max);
        }
        other => panic!("expected BatchTooLarge, got {other:?}"),
    }
    assert!(ids(&store, &Query::collection("comments")).is_empty());
    store.commit(WriteBatch::new()).unwrap();
}

pub fn revisions_guard_concurrent_writes<S: DocumentStore>(mut store: S) {
    seed_products(&mut store);
    let read = store.get("products", &"tea".into()).unwrap().unwrap();
    assert_eq!(read.revision, 1);

    let mut first = WriteBatch::new();
    first.update_at("products", &read.id, read.revision, fields! { "order" => 5 });
    store.commit(first).unwrap();

    let mut stale = WriteBatch::new();
    stale.update_at("products", &read.id, read.revision, fields! { "order" => 6 });
    assert!(store.commit(stale).unwrap_err().is_conflict());

    let doc = store.get("products", &read.id).unwrap().unwrap();
    assert_eq!((doc.revision, doc.order()), (2, Some(5)));
}

pub fn revisions_survive_delete_and_recreate<S: DocumentStore>(mut store: S) {
    let id = DocId::from("drinks");
    store
        .set("categories", &id, fields! { "order" => 0 }, SetMode::Overwrite)
        .unwrap();
    let stale = store.get("categories", &id).unwrap().unwrap();
    assert_eq!(stale.revision, 1);

    let mut delete = WriteBatch::new();
    delete.delete("categories", &id);
    store.commit(delete).unwrap();
    let mut create = WriteBatch::new();
    create.create("categories", &id, fields! { "order" => 0 });
    store.commit(create).unwrap();

    let recreated = store.get("categories", &id).unwrap().unwrap();
    assert_eq!(recreated.revision, 2);

    let mut write = WriteBatch::new();
    write.update_at("categories", &id, stale.revision, fields! { "order" => 3 });
    assert!(store.commit(write).unwrap_err().is_conflict());

    let mut batch = WriteBatch::new();
    batch
        .delete("categories", &id)
        .create("categories", &id, fields! {});
    store.commit(batch).unwrap();
    assert_eq!(store.get("categories", &id).unwrap().unwrap().revision, 3);
}

pub fn live_queries_follow_commits<S: DocumentStore + LiveQuery>(mut store: S) {
    seed_products(&mut store);
    let sub = store
        .subscribe(Query::collection("products").filter_eq("category", "drinks"))
        .unwrap();
    assert_eq!(sub.initial().len(), 3);

    let mut failing = WriteBatch::new();
    failing
        .delete("products", &"tea".into())
        .create("products", &"cola".into(), fields! {});
    assert!(store.commit(failing).is_err());
    assert!(sub.try_next().is_none());

    let mut batch = WriteBatch::new();
    batch
        .create("products", &"water".into(), fields! { "category" => "drinks" })
        .update("products", &"tea".into(), fields! { "order" => 3 })
        .update("products", &"cola".into(), fields! { "category" => "food" })
        .update("products", &"soup".into(), fields! { "order" => 4 });
    store.commit(batch).unwrap();

    let events: Vec<_> = sub
        .drain()
        .into_iter()
        .map(|event| (event.kind, event.document.id.0))
        .collect();
    assert_eq!(
        events,
        [
            (ChangeKind::Added, "water".to_string()),
            (ChangeKind::Modified, "tea".to_string()),
            (ChangeKind::Removed, "cola".to_string()),
        ]
    );
    assert!(sub.next_timeout(Duration::from_millis(10)).is_none());
}

/// Drives the engine facade end to end over `store`.
pub fn engine_chains_hold<S: DocumentStore>(store: S) {
    let config = EngineConfig {
        chunk_size: 10,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(store, Schema::restaurant(), &config).unwrap();
    for id in ["drinks", "food", "wine"] {
        engine
            .insert("categories", None, Some(id.into()), fields! { "title" => id })
            .unwrap();
    }
    let drinks = DocId::from("drinks");
    for i in 0..25 {
        engine
            .insert("products", Some(&drinks), Some(format!("p{i:02}").into()), fields! {})
            .unwrap();
    }
    let product_pages = Query::collection("product_pages");
    assert_eq!(
        ids(engine.store(), &product_pages),
        ["drinks:0", "drinks:1", "drinks:2", "drinks:3", "drinks:4"]
    );

    engine.move_down("categories", &drinks).unwrap();
    let order: Vec<_> = engine
        .siblings("categories", None)
        .unwrap()
        .into_iter()
        .map(|doc| doc.id.0)
        .collect();
    assert_eq!(order, ["food", "drinks", "wine"]);

    let beverages = DocId::from("beverages");
    let report = engine.rename("categories", &drinks, &beverages).unwrap();
    assert_eq!(report.repointed, 25);
    assert_eq!(
        ids(engine.store(), &product_pages),
        ["beverages:0", "beverages:1", "beverages:2", "beverages:3", "beverages:4"]
    );

    let hidden: Vec<_> = (0..13).map(|i| DocId::from(format!("p{i:02}"))).collect();
    for id in &hidden {
        engine.set_visible("products", id, false).unwrap();
    }
    assert_eq!(
        ids(engine.store(), &product_pages),
        ["beverages:0", "beverages:1"]
    );

    let report = engine.remove("categories", &beverages).unwrap();
    assert_eq!(report.deleted, 25 + 2 + 1);
    assert!(ids(engine.store(), &Query::collection("products")).is_empty());
    assert!(ids(engine.store(), &product_pages).is_empty());
    assert_eq!(
        pagemark_core::marker_indices(engine.store(), &MarkerScope::collection("category_pages"))
            .unwrap(),
        [0]
    );
    let remaining = engine.siblings("categories", None).unwrap();
    let slots: Vec<_> = remaining
        .iter()
        .map(|doc| (doc.id.as_str(), doc.order()))
        .collect();
    assert_eq!(slots, [("food", Some(0)), ("wine", Some(1))]);
}

pub fn cascades_run_in_bounded_chunks<S: DocumentStore>(mut store: S) {
    let mut batch = WriteBatch::new();
    batch.create("comment_threads", &"launch".into(), fields! {});
    for i in 0..23 {
        if batch.len() == store.max_batch_ops() {
            store.commit(std::mem::take(&mut batch)).unwrap();
        }
        batch.create(
            "comments",
            &format!("c{i:02}").into(),
            fields! { "thread" => "launch" },
        );
    }
    store.commit(batch).unwrap();

    let report = pagemark_core::cascade_delete(
        &mut store,
        &DocRef::new("comment_threads", "launch"),
        &[pagemark_core::ChildLink::new("comments", "thread")],
        10,
    )
    .unwrap();
    assert_eq!(report.batches, 4);
    assert_eq!(report.deleted, 24);
    assert!(ids(&store, &Query::collection("comments")).is_empty());
}

/// Run every conformance case, each against a fresh store from `make`.
pub fn run_all<S, F>(make: F)
where
    S: DocumentStore + LiveQuery,
    F: Fn() -> S,
{
    init_tracing();
    query_filters_orders_and_limits(make());
    missing_values_sort_first_and_ties_break_by_id(make());
    null_filter_matches_missing_fields(make());
    numeric_filters_ignore_integer_float_spelling(make());
    write_kinds_follow_the_contract(make());
    batches_are_atomic(make());
    oversized_batches_are_rejected(make());
    revisions_guard_concurrent_writes(make());
    revisions_survive_delete_and_recreate(make());
    live_queries_follow_commits(make());
    engine_chains_hold(make());
    cascades_run_in_bounded_chunks(make());
}
