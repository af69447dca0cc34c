use pagemark_core::ordering::{append, position_of, renumber, siblings, swap};
use pagemark_core::{fields, DocumentStore, MemoryStore, Scope, WriteBatch};

fn categories() -> Scope {
    Scope::collection("categories")
}

fn seed(store: &mut MemoryStore, scope: &Scope, ids: &[&str]) {
    for id in ids {
        let order = append(store, scope).unwrap();
        let mut batch = WriteBatch::new();
        batch.create(&scope.collection, &(*id).into(), fields! { "order" => order });
        store.commit(batch).unwrap();
    }
}

fn ids(store: &MemoryStore, scope: &Scope) -> Vec<String> {
    siblings(store, scope)
        .unwrap()
        .into_iter()
        .map(|doc| doc.id.0)
        .collect()
}

fn orders(store: &MemoryStore, scope: &Scope) -> Vec<Option<u64>> {
    siblings(store, scope)
        .unwrap()
        .iter()
        .map(|doc| doc.order())
        .collect()
}

#[test]
fn swap_exchanges_adjacent_siblings() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b", "c"]);

    assert!(swap(&mut store, &scope, 1, 2).unwrap());
    assert_eq!(ids(&store, &scope), ["a", "c", "b"]);
    assert_eq!(orders(&store, &scope), [Some(0), Some(1), Some(2)]);
}

#[test]
fn swap_out_of_range_is_a_noop() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b", "c"]);
    let before = store.committed_batches().len();

    assert!(!swap(&mut store, &scope, 0, -1).unwrap());
    assert!(!swap(&mut store, &scope, 2, 3).unwrap());
    assert!(!swap(&mut store, &scope, 1, 1).unwrap());
    assert_eq!(store.committed_batches().len(), before);
    assert_eq!(ids(&store, &scope), ["a", "b", "c"]);
}

#[test]
fn swap_commits_exactly_two_updates() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b"]);
    store.clear_history();

    swap(&mut store, &scope, 0, 1).unwrap();
    assert_eq!(store.committed_batches(), &[2]);
}

#[test]
fn renumber_closes_gaps_after_deletes() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b", "c", "d", "e"]);

    let mut batch = WriteBatch::new();
    batch
        .delete("categories", &"b".into())
        .delete("categories", &"d".into());
    store.commit(batch).unwrap();
    assert_eq!(orders(&store, &scope), [Some(0), Some(2), Some(4)]);

    assert_eq!(renumber(&mut store, &scope).unwrap(), 3);
    assert_eq!(ids(&store, &scope), ["a", "c", "e"]);
    assert_eq!(orders(&store, &scope), [Some(0), Some(1), Some(2)]);
    assert_eq!(append(&store, &scope).unwrap(), 3);
}

#[test]
fn renumber_of_dense_scope_writes_nothing() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b", "c"]);
    store.clear_history();

    renumber(&mut store, &scope).unwrap();
    assert!(store.committed_batches().is_empty());
}

#[test]
fn renumber_only_touches_its_scope() {
    let mut store = MemoryStore::default();
    let drinks = Scope::child("products", "category", "drinks");
    let food = Scope::child("products", "category", "food");
    let mut batch = WriteBatch::new();
    batch
        .create("products", &"cola".into(), fields! { "category" => "drinks", "order" => 3 })
        .create("products", &"tea".into(), fields! { "category" => "drinks", "order" => 7 })
        .create("products", &"soup".into(), fields! { "category" => "food", "order" => 5 });
    store.commit(batch).unwrap();

    renumber(&mut store, &drinks).unwrap();
    assert_eq!(orders(&store, &drinks), [Some(0), Some(1)]);
    assert_eq!(orders(&store, &food), [Some(5)]);
}

#[test]
fn documents_without_order_sort_first_and_get_numbered() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b"]);
    let mut batch = WriteBatch::new();
    batch.create("categories", &"legacy".into(), fields! { "title" => "Old" });
    store.commit(batch).unwrap();

    renumber(&mut store, &scope).unwrap();
    assert_eq!(ids(&store, &scope), ["legacy", "a", "b"]);
    assert_eq!(position_of(&store, &scope, &"a".into()).unwrap(), Some(1));
}

#[test]
fn stale_swap_fails_with_conflict_and_leaves_state() {
    let mut store = MemoryStore::default();
    let scope = categories();
    seed(&mut store, &scope, &["a", "b", "c"]);

    // Another admin's swap lands between this admin's read and write.
    let stale = siblings(&store, &scope).unwrap();
    swap(&mut store, &scope, 0, 1).unwrap();

    let mut batch = WriteBatch::new();
    batch
        .update_at("categories", &stale[1].id, stale[1].revision, fields! { "order" => 2 })
        .update_at("categories", &stale[2].id, stale[2].revision, fields! { "order" => 1 });
    let err = store.commit(batch).unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(ids(&store, &scope), ["b", "a", "c"]);
    assert_eq!(orders(&store, &scope), [Some(0), Some(1), Some(2)]);
}
