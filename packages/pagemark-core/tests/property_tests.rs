use proptest::prelude::*;
use pagemark_core::{
    fields, last_page, marker_indices, page_slot, DocId, Engine, EngineConfig, MarkerScope,
    MemoryStore, Schema,
};

#[derive(Clone, Debug)]
enum Step {
    Insert { visible: bool },
    Remove(usize),
    Hide(usize),
    Show(usize),
    Up(usize),
    Down(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => any::<bool>().prop_map(|visible| Step::Insert { visible }),
        1 => (0usize..16).prop_map(Step::Remove),
        1 => (0usize..16).prop_map(Step::Hide),
        1 => (0usize..16).prop_map(Step::Show),
        1 => (0usize..16).prop_map(Step::Up),
        1 => (0usize..16).prop_map(Step::Down),
    ]
}

fn pick(engine: &Engine<MemoryStore>, idx: usize) -> Option<DocId> {
    let docs = engine.siblings("chef_cards", None).unwrap();
    if docs.is_empty() {
        return None;
    }
    Some(docs[idx % docs.len()].id.clone())
}

proptest! {
    #[test]
    fn engine_keeps_order_dense_and_pages_consistent(
        page_size in 1u64..5,
        steps in prop::collection::vec(step(), 1..40),
    ) {
        let config = EngineConfig::from_json(
            &format!(r#"{{"page_sizes": {{"chef_cards": {page_size}}}}}"#),
        )
        .unwrap();
        let mut engine = Engine::new(MemoryStore::default(), Schema::restaurant(), &config).unwrap();

        for step in steps {
            match step {
                Step::Insert { visible } => {
                    engine
                        .insert("chef_cards", None, None, fields! { "visible" => visible })
                        .unwrap();
                }
                Step::Remove(idx) => {
                    if let Some(id) = pick(&engine, idx) {
                        engine.remove("chef_cards", &id).unwrap();
                    }
                }
                Step::Hide(idx) | Step::Show(idx) => {
                    if let Some(id) = pick(&engine, idx) {
                        let visible = matches!(step, Step::Show(_));
                        engine.set_visible("chef_cards", &id, visible).unwrap();
                    }
                }
                Step::Up(idx) => {
                    if let Some(id) = pick(&engine, idx) {
                        engine.move_up("chef_cards", &id).unwrap();
                    }
                }
                Step::Down(idx) => {
                    if let Some(id) = pick(&engine, idx) {
                        engine.move_down("chef_cards", &id).unwrap();
                    }
                }
            }

            let docs = engine.siblings("chef_cards", None).unwrap();
            let orders: Vec<_> = docs.iter().map(|doc| doc.order()).collect();
            let dense: Vec<_> = (0..docs.len() as u64).map(Some).collect();
            prop_assert_eq!(orders, dense);

            let visible: Vec<_> = docs.iter().filter(|doc| doc.is_visible()).collect();
            for (rank, doc) in visible.iter().enumerate() {
                let (page, pos) = page_slot(rank, page_size).unwrap();
                prop_assert_eq!((doc.page(), doc.pos()), (Some(page), Some(pos)));
            }

            let markers = marker_indices(engine.store(), &MarkerScope::collection("chef_card_pages")).unwrap();
            let expected: Vec<u64> = match last_page(visible.len(), page_size).unwrap() {
                Some(last) => (0..=last).collect(),
                None => Vec::new(),
            };
            prop_assert_eq!(markers, expected);
        }
    }

    #[test]
    fn marker_count_matches_ceiling_division(visible in 0usize..200, page_size in 1u64..10) {
        let pages = last_page(visible, page_size).unwrap().map_or(0, |last| last + 1);
        prop_assert_eq!(pages, (visible as u64).div_ceil(page_size));
    }
}
