// WeakMap behavior through the installed built-ins.
//
// Each test names the behavior it checks. Core invariants exercised:
// - Round trip and overwrite: set then get returns the last value; an
//   overwrite does not add an entry.
// - Read paths treat bad or never-seen keys as absent, never as errors.
// - Write paths reject non-object keys before touching the table.
// - Receiver checks: methods applied to other kinds fail with
//   ReceiverMismatch.
// - Construction drains the source through the currently bound `set`.
use ephemeron_map::{
    native, Attributes, Error, Intrinsic, Invocation, Property, Realm, Target, Value, WeakMap,
};
use std::cell::Cell;
use std::rc::Rc;

fn new_map(realm: &Realm) -> Value {
    realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[])
        .expect("construct WeakMap")
}

#[test]
fn set_then_get_round_trips() {
    let realm = Realm::new();
    let heap = realm.heap();
    let map = new_map(&realm);
    let key = heap.alloc_object();
    let value = heap.alloc_object();

    let ret = realm
        .call_method(&map, "set", &[key.clone(), value.clone()])
        .unwrap();
    assert_eq!(ret, map, "set returns its receiver");
    assert_eq!(realm.call_method(&map, "get", &[key.clone()]).unwrap(), value);
    assert_eq!(
        realm.call_method(&map, "has", &[key]).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn overwrite_replaces_without_growing() {
    let realm = Realm::new();
    let heap = realm.heap();
    let map = new_map(&realm);
    let key = heap.alloc_object();

    realm
        .call_method(&map, "set", &[key.clone(), Value::from(1)])
        .unwrap();
    realm
        .call_method(&map, "set", &[key.clone(), Value::from(2)])
        .unwrap();
    assert_eq!(
        realm.call_method(&map, "get", &[key]).unwrap(),
        Value::from(2)
    );
    assert_eq!(heap.weak_entry_count(&map), Some(1));
}

#[test]
fn delete_reports_presence() {
    let realm = Realm::new();
    let heap = realm.heap();
    let map = new_map(&realm);
    let key = heap.alloc_object();
    let never_seen = heap.alloc_object();

    realm
        .call_method(&map, "set", &[key.clone(), Value::from("v")])
        .unwrap();
    assert_eq!(
        realm.call_method(&map, "delete", &[key.clone()]).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        realm.call_method(&map, "has", &[key.clone()]).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        realm.call_method(&map, "delete", &[key]).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        realm.call_method(&map, "delete", &[never_seen]).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn read_paths_accept_any_key() {
    let realm = Realm::new();
    let map = new_map(&realm);
    for key in [
        Value::Undefined,
        Value::Null,
        Value::from(1),
        Value::from("k"),
        Value::from(true),
    ] {
        assert_eq!(
            realm.call_method(&map, "get", &[key.clone()]).unwrap(),
            Value::Undefined
        );
        assert_eq!(
            realm.call_method(&map, "has", &[key.clone()]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            realm.call_method(&map, "delete", &[key]).unwrap(),
            Value::Bool(false)
        );
    }
    // Missing argument reads as undefined.
    assert_eq!(realm.call_method(&map, "get", &[]).unwrap(), Value::Undefined);
}

#[test]
fn probing_does_not_assign_hashes() {
    let realm = Realm::new();
    let heap = realm.heap();
    let map = new_map(&realm);
    let key = heap.alloc_object();
    for _ in 0..3 {
        realm.call_method(&map, "get", &[key.clone()]).unwrap();
        realm.call_method(&map, "has", &[key.clone()]).unwrap();
        realm.call_method(&map, "delete", &[key.clone()]).unwrap();
    }
    assert_eq!(heap.get_existing_hash(key.as_object().unwrap()), None);
    assert_eq!(heap.hashed_objects(), 0);
}

#[test]
fn primitive_keys_are_rejected_on_set() {
    let realm = Realm::new();
    let map = new_map(&realm);
    for key in [Value::Undefined, Value::Null, Value::from(42), Value::from("key")] {
        let err = realm
            .call_method(&map, "set", &[key, Value::from(1)])
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidKey {
                usage: "as weak map key"
            }
        );
    }
    assert_eq!(realm.heap().weak_entry_count(&map), Some(0));
}

#[test]
fn distinct_keys_do_not_leak_into_each_other() {
    let realm = Realm::new();
    let heap = realm.heap();
    let map = WeakMap::new(heap);
    let keys: Vec<Value> = (0..256).map(|_| heap.alloc_object()).collect();
    for (i, k) in keys.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        map.set(k, &Value::from(i as i32)).unwrap();
    }
    for (i, k) in keys.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(map.get(k), Value::from(i as i32));
        } else {
            assert_eq!(map.get(k), Value::Undefined);
            assert!(!map.has(k));
        }
    }
}

#[test]
fn methods_check_their_receiver() {
    let realm = Realm::new();
    let heap = realm.heap();
    let set = realm
        .construct(Intrinsic::WeakSet, Invocation::Construct, &[])
        .unwrap();
    let plain = heap.alloc_object();
    let key = heap.alloc_object();

    for this in [set, plain, Value::from(3)] {
        for method in ["get", "set", "has", "delete"] {
            let err = realm
                .apply(Intrinsic::WeakMap, method, &this, &[key.clone()])
                .unwrap_err();
            assert!(
                matches!(err, Error::ReceiverMismatch { .. }),
                "{method} on {} gave {err:?}",
                heap.describe(&this)
            );
        }
    }
}

#[test]
fn receiver_mismatch_message_names_method_and_receiver() {
    let realm = Realm::new();
    let set = realm
        .construct(Intrinsic::WeakSet, Invocation::Construct, &[])
        .unwrap();
    let err = realm
        .apply(Intrinsic::WeakMap, "get", &set, &[])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Method WeakMap.prototype.get called on incompatible receiver #<WeakSet>"
    );
}

#[test]
fn constructor_requires_construct_invocation() {
    let realm = Realm::new();
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Call, &[])
        .unwrap_err();
    assert_eq!(
        err,
        Error::ConstructorMisuse {
            constructor: "WeakMap"
        }
    );
    assert_eq!(realm.heap().live_objects(), 0, "nothing allocated on misuse");
}

#[test]
fn construct_from_pairs() {
    let realm = Realm::new();
    let heap = realm.heap();
    let a = heap.alloc_object();
    let b = heap.alloc_object();
    let source = heap.alloc_array([
        heap.alloc_array([a.clone(), Value::from(1)]),
        heap.alloc_array([b.clone(), Value::from(2)]),
    ]);
    let map = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
        .unwrap();
    assert_eq!(realm.call_method(&map, "get", &[a]).unwrap(), Value::from(1));
    assert_eq!(realm.call_method(&map, "get", &[b]).unwrap(), Value::from(2));
}

#[test]
fn construct_with_nullish_source_is_empty() {
    let realm = Realm::new();
    for source in [Value::Undefined, Value::Null] {
        let map = realm
            .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
            .unwrap();
        assert_eq!(realm.heap().weak_entry_count(&map), Some(0));
    }
}

#[test]
fn construct_rejects_non_pair_items() {
    let realm = Realm::new();
    let heap = realm.heap();
    let a = heap.alloc_object();
    let source = heap.alloc_array([heap.alloc_array([a, Value::from(1)]), Value::from(5)]);
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
        .unwrap_err();
    assert_eq!(
        err,
        Error::TypeMismatch {
            item: "5".to_string()
        }
    );
}

#[test]
fn construct_rejects_non_iterable_source() {
    let realm = Realm::new();
    let heap = realm.heap();
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[heap.alloc_object()])
        .unwrap_err();
    assert_eq!(
        err,
        Error::NotIterable {
            value: "#<Object>".to_string()
        }
    );
}

#[test]
fn construct_propagates_invalid_key() {
    let realm = Realm::new();
    let heap = realm.heap();
    let source = heap.alloc_array([heap.alloc_array([Value::from("k"), Value::from(1)])]);
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKey { .. }));
}

#[test]
fn construct_uses_the_currently_bound_set() {
    let mut realm = Realm::new();
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    realm.define_property(
        Target::Prototype(Intrinsic::WeakMap),
        "set",
        Property::Method(native(move |heap, this, args| {
            seen.set(seen.get() + 1);
            // Store every value doubled to prove this routine ran.
            let key = args.first().cloned().unwrap_or_default();
            let doubled = Value::from(args.get(1).map(Value::to_number).unwrap_or(0.0) * 2.0);
            ephemeron_map::weak_map_set(heap, this, &key, &doubled)
        })),
        Attributes::DONT_ENUM,
    );

    let heap = realm.heap();
    let a = heap.alloc_object();
    let b = heap.alloc_object();
    let source = heap.alloc_array([
        heap.alloc_array([a.clone(), Value::from(1)]),
        heap.alloc_array([b.clone(), Value::from(2)]),
    ]);
    let map = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
        .unwrap();
    assert_eq!(calls.get(), 2);
    assert_eq!(realm.apply(Intrinsic::WeakMap, "get", &map, &[a]).unwrap(), Value::from(2));
    assert_eq!(realm.apply(Intrinsic::WeakMap, "get", &map, &[b]).unwrap(), Value::from(4));
}

#[test]
fn construct_fails_when_set_is_not_callable() {
    let mut realm = Realm::new();
    realm.define_property(
        Target::Prototype(Intrinsic::WeakMap),
        "set",
        Property::Data(Value::from(1)),
        Attributes::DONT_ENUM,
    );
    let heap = realm.heap();
    let source = heap.alloc_array([]);
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source.clone()])
        .unwrap_err();
    assert_eq!(
        err,
        Error::NotCallable {
            property: "set".to_string(),
            receiver: "#<WeakMap>".to_string()
        }
    );

    // Without a source the adder is never consulted.
    assert!(realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[])
        .is_ok());

    realm.delete_property(Target::Prototype(Intrinsic::WeakMap), "set");
    let err = realm
        .construct(Intrinsic::WeakMap, Invocation::Construct, &[source])
        .unwrap_err();
    assert!(matches!(err, Error::NotCallable { .. }));
}

#[test]
fn to_string_tag_is_weak_map() {
    let realm = Realm::new();
    let map = new_map(&realm);
    assert_eq!(realm.to_string_tag(&map).as_deref(), Some("WeakMap"));
    assert_eq!(realm.to_string_tag(&realm.heap().alloc_object()), None);
}

#[test]
fn typed_handle_matches_installed_methods() {
    let realm = Realm::new();
    let heap = realm.heap();
    let key = heap.alloc_object();
    let typed = WeakMap::from_entries(heap, [heap.alloc_array([key.clone(), Value::from(7)])])
        .unwrap();
    let as_value = typed.to_value();
    assert_eq!(
        realm.call_method(&as_value, "get", &[key.clone()]).unwrap(),
        Value::from(7)
    );
    assert!(typed.delete(&key));
    assert_eq!(
        realm.call_method(&as_value, "has", &[key]).unwrap(),
        Value::Bool(false)
    );
}
