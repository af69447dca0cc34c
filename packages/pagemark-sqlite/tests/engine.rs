use pagemark_core::{fields, ChangeKind, DocumentStore, EngineConfig, Query};
use pagemark_sqlite::{restaurant_engine_in_memory, SqliteStore};

#[test]
fn engine_over_sqlite_keeps_comment_pages() {
    pagemark_test_support::init_tracing();
    let mut engine = restaurant_engine_in_memory(&EngineConfig::default()).unwrap();
    let thread = engine
        .insert("comment_threads", None, Some("launch".into()), fields! {})
        .unwrap();
    let sub = engine.watch("comments", Some(&thread)).unwrap();

    for i in 0..11 {
        engine
            .insert("comments", Some(&thread), Some(format!("c{i:02}").into()), fields! {})
            .unwrap();
    }
    let added = sub
        .drain()
        .into_iter()
        .filter(|event| event.kind == ChangeKind::Added)
        .count();
    assert_eq!(added, 11);
    assert_eq!(
        pagemark_test_support::ids(engine.store(), &Query::collection("comment_pages")),
        ["launch:0", "launch:1", "launch:2"]
    );

    engine.remove("comments", &"c00".into()).unwrap();
    let first = engine.siblings("comments", Some(&thread)).unwrap();
    assert_eq!(first[0].id.as_str(), "c01");
    assert_eq!((first[0].order(), first[0].page(), first[0].pos()), (Some(0), Some(0), Some(0)));
    assert_eq!(
        pagemark_test_support::ids(engine.store(), &Query::collection("comment_pages")),
        ["launch:0", "launch:1"]
    );
}

#[test]
fn documents_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pagemark.db");
    {
        let mut store = SqliteStore::new(&path).unwrap();
        store
            .set(
                "categories",
                &"drinks".into(),
                fields! { "order" => 0, "title" => "Drinks" },
                pagemark_core::SetMode::Overwrite,
            )
            .unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    let doc = store.get("categories", &"drinks".into()).unwrap().unwrap();
    assert_eq!(doc.revision, 1);
    assert_eq!(doc.get_str("title"), Some("Drinks"));
}

#[test]
fn retired_revisions_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pagemark.db");
    {
        let mut store = SqliteStore::new(&path).unwrap();
        for _ in 0..3 {
            store
                .set("categories", &"drinks".into(), fields! {}, pagemark_core::SetMode::Merge)
                .unwrap();
        }
        let mut batch = pagemark_core::WriteBatch::new();
        batch.delete("categories", &"drinks".into());
        store.commit(batch).unwrap();
    }

    let mut store = SqliteStore::new(&path).unwrap();
    store
        .set("categories", &"drinks".into(), fields! {}, pagemark_core::SetMode::Overwrite)
        .unwrap();
    let doc = store.get("categories", &"drinks".into()).unwrap().unwrap();
    assert_eq!(doc.revision, 4);
}
