//! Property-based tests for post-flush membership.
//!
//! Random sequences of entity updates are applied to a source and reported
//! to the manager, with flushes at random points. After the final flush every
//! derived array must equal the set its definition describes, and the
//! owning-set index must mirror array content exactly.

mod common;

use common::{kind, older_than, person, MapSource};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::rc::Rc;
use trellis_core::{EntityId, EntityKey, EntityState, Kind};
use trellis_reactive::{EntitySource, QueryResult, RecordArray, RecordArrayManager, TaskQueue};

const MAX_ID: EntityId = 16;

#[derive(Clone, Debug)]
enum Op {
    Put { id: EntityId, age: i64, state: EntityState },
    Flush,
}

fn state_strategy() -> impl Strategy<Value = EntityState> {
    prop_oneof![
        1 => Just(EntityState::Empty),
        1 => Just(EntityState::Loading),
        3 => Just(EntityState::Loaded),
        1 => Just(EntityState::Deleted),
        1 => Just(EntityState::Unloaded),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..MAX_ID, 0i64..40, state_strategy()).prop_map(|(id, age, state)| Op::Put { id, age, state }),
        1 => Just(Op::Flush),
    ]
}

fn content_set(array: &RecordArray) -> BTreeSet<EntityId> {
    array.content().into_iter().collect()
}

fn expected_live(source: &MapSource, kind: &Kind) -> BTreeSet<EntityId> {
    source
        .entity_ids(kind)
        .into_iter()
        .filter(|&id| !source.is_hidden(kind, id) && !source.is_empty(kind, id))
        .collect()
}

fn expected_filtered(source: &MapSource, kind: &Kind, min_age: i64) -> BTreeSet<EntityId> {
    let predicate = older_than(min_age);
    source
        .entity_ids(kind)
        .into_iter()
        .filter(|&id| !source.is_hidden(kind, id))
        .filter(|&id| source.record(kind, id).map_or(false, |r| predicate(&r)))
        .collect()
}

/// Every member lists the array as an owner, and every owner holds the member.
fn assert_owning_sets(manager: &RecordArrayManager, kind: &Kind, arrays: &[RecordArray]) {
    for id in 0..MAX_ID {
        let key = EntityKey::new(kind.clone(), id);
        let owners = manager.owners(&key);
        for array in arrays {
            let listed = owners.iter().any(|owner| owner.ptr_eq(array));
            assert_eq!(array.contains(id), listed, "entity {id} in array {}", array.id());
        }
        for owner in &owners {
            assert!(owner.contains(id));
        }
    }
}

proptest! {
    /// Property: after a flush, live and filtered arrays hold exactly the
    /// entities their definitions select.
    #[test]
    fn flushed_arrays_match_definition(
        ops in prop::collection::vec(op_strategy(), 1..60),
        create_at in 0usize..60,
    ) {
        let source = MapSource::new();
        let queue = Rc::new(TaskQueue::new());
        let manager = RecordArrayManager::new(source.clone(), queue.clone());
        let person_kind = kind("person");

        let live = manager.live_array_for(&person_kind).unwrap();
        let adults = manager.create_filtered_array(&person_kind, older_than(18), None).unwrap();
        let mut late = None;

        for (step, op) in ops.iter().enumerate() {
            if step == create_at {
                // Created mid-stream: evaluated against every tracked entity
                late = Some(manager.create_filtered_array(&person_kind, older_than(30), None).unwrap());
            }
            match op {
                Op::Put { id, age, state } => {
                    source.put(&person_kind, person(*id, *age), *state);
                    manager.mark_changed(&EntityKey::new(person_kind.clone(), *id));
                }
                Op::Flush => {
                    queue.run_until_idle();
                }
            }
        }
        queue.run_until_idle();

        prop_assert_eq!(content_set(&live), expected_live(&source, &person_kind));
        prop_assert_eq!(content_set(&adults), expected_filtered(&source, &person_kind, 18));
        if let Some(late) = &late {
            prop_assert_eq!(content_set(late), expected_filtered(&source, &person_kind, 30));
        }
        prop_assert!(!manager.has_pending());
    }

    /// Property: the owning-set index mirrors array content, and hidden
    /// entities have left every populated array.
    #[test]
    fn owning_sets_mirror_content(
        ops in prop::collection::vec(op_strategy(), 1..60),
        query_ids in prop::collection::vec(0..MAX_ID, 0..10),
    ) {
        let source = MapSource::new();
        let queue = Rc::new(TaskQueue::new());
        let manager = RecordArrayManager::new(source.clone(), queue.clone());
        let person_kind = kind("person");

        let live = manager.live_array_for(&person_kind).unwrap();
        let adults = manager.create_filtered_array(&person_kind, older_than(18), None).unwrap();
        let populated = manager
            .create_populated_array(&person_kind, None, Some(QueryResult::new(query_ids)))
            .unwrap();

        let mut touched = BTreeSet::new();
        for op in &ops {
            match op {
                Op::Put { id, age, state } => {
                    source.put(&person_kind, person(*id, *age), *state);
                    manager.mark_changed(&EntityKey::new(person_kind.clone(), *id));
                    touched.insert(*id);
                }
                Op::Flush => {
                    queue.run_until_idle();
                }
            }
        }
        queue.run_until_idle();

        let arrays = [live, adults, populated.clone()];
        assert_owning_sets(&manager, &person_kind, &arrays);
        for id in populated.content() {
            if touched.contains(&id) {
                prop_assert!(!source.is_hidden(&person_kind, id));
            }
        }
    }
}
