// WeakMap property tests.
//
// Property 1: per-key observability matches outstanding roots.
//  - Model: per-slot stack of rooted handles to the slot's current object
//    and the value last stored for it.
//  - Invariant: while a slot is rooted, has() and get() match the model;
//    after collect, entry_count() == number of rooted, mapped slots.
//  - Operations: fresh object, set, delete, clone root, drop root, collect.
//
// Property 2: ephemeron reachability over a graph of map entries.
//  - Model: nodes with external roots and at most one outgoing edge i -> j
//    meaning `map[node i] == node j`. Edges may form cycles.
//  - Invariant after collect: surviving nodes == closure of rooted nodes
//    under edges; entry_count() == edges out of surviving nodes.
//  - Operations: set edge, delete edge, drop root, clone root, re-root a
//    node through get(), collect.
use ephemeron_map::{Heap, ObjectId, Value, WeakMap};
use proptest::prelude::*;

fn id_of(v: &Value) -> ObjectId {
    v.as_object().expect("an object").id()
}

// Property 1: per-key liveness.
proptest! {
    #[test]
    fn prop_weak_map_observability(
        keys in 1usize..=5,
        ops in proptest::collection::vec((0u8..=5u8, 0usize..100usize, -50i32..50i32), 1..120),
    ) {
        let heap = Heap::new();
        let map = WeakMap::new(&heap);
        let mut live: Vec<Vec<Value>> = vec![Vec::new(); keys];
        let mut mapped: Vec<Option<i32>> = vec![None; keys];

        for (op, raw_k, v) in ops {
            let k = raw_k % keys;
            match op {
                // Point an unrooted slot at a brand new object.
                0 => {
                    if live[k].is_empty() {
                        live[k].push(heap.alloc_object());
                        mapped[k] = None;
                    }
                }
                1 => {
                    if let Some(key) = live[k].last() {
                        map.set(key, &Value::from(v)).unwrap();
                        mapped[k] = Some(v);
                    }
                }
                2 => {
                    if let Some(key) = live[k].last() {
                        prop_assert_eq!(map.delete(key), mapped[k].is_some());
                        mapped[k] = None;
                    }
                }
                3 => {
                    if let Some(key) = live[k].last().cloned() {
                        live[k].push(key);
                    }
                }
                // Dropping the last root makes the slot's object unobservable.
                4 => {
                    live[k].pop();
                    if live[k].is_empty() {
                        mapped[k] = None;
                    }
                }
                5 => {
                    heap.collect();
                    let expected = mapped.iter().filter(|m| m.is_some()).count();
                    prop_assert_eq!(map.entry_count(), expected);
                }
                _ => unreachable!(),
            }

            if let Some(key) = live[k].last() {
                prop_assert_eq!(map.has(key), mapped[k].is_some());
                let want = mapped[k].map_or(Value::Undefined, Value::from);
                prop_assert_eq!(map.get(key), want);
            }
            let expected = mapped.iter().filter(|m| m.is_some()).count();
            prop_assert!(map.entry_count() >= expected);
        }

        heap.collect();
        let expected = mapped.iter().filter(|m| m.is_some()).count();
        prop_assert_eq!(map.entry_count(), expected);
        let rooted = live.iter().filter(|l| !l.is_empty()).count();
        prop_assert_eq!(heap.live_objects(), 1 + rooted);
    }
}

// ---- Property 2: ephemeron graph ----

fn reachable(roots: &[Vec<Value>], edge: &[Option<usize>]) -> Vec<bool> {
    let mut seen = vec![false; roots.len()];
    let mut stack: Vec<usize> = (0..roots.len()).filter(|&i| !roots[i].is_empty()).collect();
    while let Some(i) = stack.pop() {
        if seen[i] {
            continue;
        }
        seen[i] = true;
        if let Some(j) = edge[i] {
            stack.push(j);
        }
    }
    seen
}

proptest! {
    #[test]
    fn prop_weak_map_ephemeron_graph(
        nodes in 2usize..=6,
        ops in proptest::collection::vec((0u8..=5u8, 0usize..100usize, 0usize..100usize), 1..150),
    ) {
        let heap = Heap::new();
        let map = WeakMap::new(&heap);
        let mut roots: Vec<Vec<Value>> = (0..nodes).map(|_| vec![heap.alloc_object()]).collect();
        let ids: Vec<ObjectId> = roots.iter().map(|r| id_of(&r[0])).collect();
        let mut alive = vec![true; nodes];
        let mut edge: Vec<Option<usize>> = vec![None; nodes];

        for (op, raw_i, raw_j) in ops {
            let i = raw_i % nodes;
            let j = raw_j % nodes;
            match op {
                0 => {
                    if !roots[i].is_empty() && !roots[j].is_empty() {
                        map.set(&roots[i][0], &roots[j][0]).unwrap();
                        edge[i] = Some(j);
                    }
                }
                1 => {
                    if let Some(key) = roots[i].first() {
                        prop_assert_eq!(map.delete(key), edge[i].is_some());
                        edge[i] = None;
                    }
                }
                2 => {
                    roots[i].pop();
                }
                3 => {
                    if let Some(r) = roots[i].first().cloned() {
                        roots[i].push(r);
                    }
                }
                // Re-root the target of i's entry through get().
                4 => {
                    if let Some(key) = roots[i].first().cloned() {
                        let got = map.get(&key);
                        match edge[i] {
                            Some(t) => {
                                prop_assert_eq!(id_of(&got), ids[t]);
                                roots[t].push(got);
                            }
                            None => {
                                prop_assert_eq!(got, Value::Undefined);
                            }
                        }
                    }
                }
                5 => {
                    let keep = reachable(&roots, &edge);
                    let stats = heap.collect();
                    for n in 0..nodes {
                        if alive[n] && !keep[n] {
                            alive[n] = false;
                            edge[n] = None;
                        }
                    }
                    let survivors = alive.iter().filter(|a| **a).count();
                    prop_assert_eq!(heap.live_objects(), 1 + survivors);
                    prop_assert_eq!(stats.marked, 1 + survivors);
                    let entries = edge.iter().filter(|e| e.is_some()).count();
                    prop_assert_eq!(map.entry_count(), entries);
                }
                _ => unreachable!(),
            }
        }
    }
}
