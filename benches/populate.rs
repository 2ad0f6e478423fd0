//! This bench test simulates populating a branching course and reading it
//! back by category.

#![allow(missing_docs)]

use coursestore::{
    domain::{Category, CourseKey, Location},
    store::{ModuleStore, RevisionOption},
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const BRANCHING: usize = 2;

/// Creates `BRANCHING` children of each category level beneath the parent.
fn populate(store: &ModuleStore, parent: &Location, levels: &[Category], counter: &mut u32) {
    let Some((category, rest)) = levels.split_first() else {
        return;
    };
    let mut parent_node = store.get_item(parent, 0).unwrap();
    for _ in 0..BRANCHING {
        *counter += 1;
        let child = parent
            .course_key()
            .make_usage_key(category.clone(), &format!("{category}_{counter}"))
            .unwrap();
        store.create_and_save_xmodule(&child, 1, None).unwrap();
        populate(store, &child, rest, counter);
        parent_node.children_mut().push(child);
    }
    store.update_item(&parent_node, 1, false).unwrap();
}

fn populated_store() -> (ModuleStore, CourseKey) {
    let course_key: CourseKey = "MITx/999/Robot_Super_Course".parse().unwrap();
    let store = ModuleStore::new();
    store.create_course(&course_key, 1).unwrap();

    let levels = [
        Category::Chapter,
        Category::Sequential,
        Category::Vertical,
        Category::Problem,
    ];
    let mut counter = 0;
    populate(&store, &course_key.root_location(), &levels, &mut counter);
    (store, course_key)
}

fn populate_course(c: &mut Criterion) {
    c.bench_function("populate course", |b| {
        b.iter(populated_store);
    });
}

fn get_items_by_category(c: &mut Criterion) {
    c.bench_function("get items by category", |b| {
        b.iter_batched(
            populated_store,
            |(store, course_key)| {
                let verticals =
                    store.get_items(&course_key, Some(&Category::Vertical), RevisionOption::All);
                assert_eq!(verticals.len(), 8);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, populate_course, get_items_by_category);
criterion_main!(benches);
