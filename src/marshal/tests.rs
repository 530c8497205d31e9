//! Test suite for type marshalling and tuple sequencing

use super::*;
use crate::state::LuaState;
use crate::stack::StackMarker;
use proptest::prelude::*;

fn fresh() -> LuaState {
    LuaState::new().expect("state allocation")
}

#[test]
fn test_scalar_round_trips() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, true);
    push(raw, -42i32);
    push(raw, 255u8);
    push(raw, 2.5f64);
    push(raw, "hello");

    assert_eq!(get::<bool>(raw, 1), Some(true));
    assert_eq!(get::<i32>(raw, 2), Some(-42));
    assert_eq!(get::<u8>(raw, 3), Some(255));
    assert_eq!(get::<f64>(raw, 4), Some(2.5));
    assert_eq!(get::<String>(raw, 5), Some("hello".to_string()));
    assert_eq!(raw.top(), 5);
}

#[test]
fn test_get_has_no_stack_effect() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, 17i64);
    let before = raw.top();
    let _ = get::<String>(raw, -1);
    let _ = get::<Vec<i32>>(raw, -1);
    let _ = check::<bool>(raw, -1);
    assert_eq!(raw.top(), before);
    // Converting a number to a string must not rewrite the slot
    assert_eq!(raw.value_type(-1), crate::stack::ValueType::Number);
}

#[test]
fn test_integer_refuses_fractional_values() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, 3.0f64);
    push(raw, 3.5f64);
    assert_eq!(get::<i32>(raw, 1), Some(3));
    assert_eq!(get::<i32>(raw, 2), None);

    let err = check::<i32>(raw, 2).unwrap_err();
    assert_eq!(err.position, 2);
    assert_eq!(err.expected, "integer");
    assert_eq!(err.found, "number");
}

#[test]
fn test_integer_range_checks() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, 300i32);
    push(raw, -1i32);
    assert_eq!(get::<u8>(raw, 1), None);
    assert_eq!(get::<i16>(raw, 1), Some(300));
    assert_eq!(get::<u32>(raw, 2), None);
    assert_eq!(get::<i8>(raw, 2), Some(-1));
}

#[test]
fn test_numeric_strings_convert_to_numbers() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, "12");
    push(raw, "abc");
    assert_eq!(get::<i64>(raw, 1), Some(12));
    assert_eq!(get::<f64>(raw, 1), Some(12.0));
    assert_eq!(get::<f64>(raw, 2), None);
}

#[test]
fn test_bool_follows_truthiness() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, Nil);
    push(raw, false);
    push(raw, 0i32);
    push(raw, "");
    assert_eq!(get::<bool>(raw, 1), Some(false));
    assert_eq!(get::<bool>(raw, 2), Some(false));
    assert_eq!(get::<bool>(raw, 3), Some(true));
    assert_eq!(get::<bool>(raw, 4), Some(true));
    assert_eq!(get::<bool>(raw, 10), Some(false));
}

#[test]
fn test_option_maps_nil() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, None::<i32>);
    push(raw, Some(9i32));
    push(raw, "nine");
    assert_eq!(check::<Option<i32>>(raw, 1).unwrap(), None);
    assert_eq!(check::<Option<i32>>(raw, 2).unwrap(), Some(9));
    assert!(check::<Option<i32>>(raw, 3).is_err());
    assert_eq!(check::<Option<i32>>(raw, 4).unwrap(), None);
}

#[test]
fn test_vec_round_trip() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, vec![1i32, 2, 3]);
    assert_eq!(raw.top(), 1);
    assert_eq!(get::<Vec<i32>>(raw, 1), Some(vec![1, 2, 3]));
    assert_eq!(get::<Vec<String>>(raw, 1), Some(vec!["1".into(), "2".into(), "3".into()]));
    assert_eq!(raw.top(), 1);

    push(raw, vec!["a", "b"]);
    assert_eq!(get::<Vec<i32>>(raw, 2), None);
    assert_eq!(raw.top(), 2);
}

#[test]
fn test_get_or_falls_back() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, "not a number");
    assert_eq!(get_or(raw, 1, 5i32), 5);
    assert_eq!(get_or(raw, 1, String::new()), "not a number");
}

#[test]
fn test_tuple_preserves_order() {
    let lua = fresh();
    let raw = lua.raw();

    let pushed = (3i32, "x", true).push_all(raw);
    assert_eq!(pushed, 3);

    let (a, b, c) = <(i32, String, bool)>::extract(raw, 1).unwrap();
    assert_eq!((a, b.as_str(), c), (3, "x", true));
}

#[test]
fn test_tuple_reports_first_mismatched_position() {
    let lua = fresh();
    let raw = lua.raw();

    (3i32, "x", true).push_all(raw);

    // bool accepts anything and String accepts numbers, so the
    // reversed declaration first fails on the integer at position 3
    let err = <(bool, String, i32)>::extract(raw, 1).unwrap_err();
    assert_eq!(err.position, 3);
    assert_eq!(err.expected, "integer");
    assert_eq!(err.found, "boolean");

    assert!(<(bool, String, i32)>::get(raw, 1).is_none());
}

#[test]
fn test_tuple_respects_start_offset() {
    let lua = fresh();
    let raw = lua.raw();

    ("skip", 10i32, 20i32).push_all(raw);
    let (x, y) = <(i32, i32)>::extract(raw, 2).unwrap();
    assert_eq!((x, y), (10, 20));
}

#[test]
fn test_empty_tuple_is_identity() {
    let lua = fresh();
    let raw = lua.raw();

    assert_eq!(().push_all(raw), 0);
    assert_eq!(raw.top(), 0);
    assert!(<()>::extract(raw, 1).is_ok());
    assert_eq!(<() as FromArgs>::COUNT, 0);
    assert_eq!(<(i32, bool, f64) as FromArgs>::COUNT, 3);
}

#[test]
fn test_rest_collects_remaining() {
    let lua = fresh();
    let raw = lua.raw();

    ("head", 1i32, 2i32, 3i32).push_all(raw);
    let (head, Rest(tail)) = <(String, Rest<i32>)>::extract(raw, 1).unwrap();
    assert_eq!(head, "head");
    assert_eq!(tail, vec![1, 2, 3]);

    raw.set_top(1);
    let (_, Rest(tail)) = <(String, Rest<i32>)>::extract(raw, 1).unwrap();
    assert!(tail.is_empty());

    assert_eq!(Rest(vec![4i32, 5]).push_all(raw), 2);
    assert_eq!(raw.top(), 3);
}

#[test]
fn test_rest_reports_bad_position() {
    let lua = fresh();
    let raw = lua.raw();

    (1i32, 2i32, "three").push_all(raw);
    let err = <(Rest<i32>,)>::extract(raw, 1).unwrap_err();
    assert_eq!(err.position, 3);
}

// Polymorphic native objects are modelled as one enum with accessors
#[derive(Debug, PartialEq)]
enum Entity {
    Spawn { id: u32 },
    Item { name: String },
}

impl Entity {
    fn as_spawn(&self) -> Option<u32> {
        match self {
            Entity::Spawn { id } => Some(*id),
            _ => None,
        }
    }

    fn as_item(&self) -> Option<&str> {
        match self {
            Entity::Item { name } => Some(name),
            _ => None,
        }
    }
}

impl NativeObject for Entity {
    const TYPE_NAME: &'static str = "test.Entity";
}

struct Other;

impl NativeObject for Other {
    const TYPE_NAME: &'static str = "test.Other";
}

#[test]
fn test_native_object_variant_access() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, Object(Entity::Spawn { id: 7 }));
    push(raw, Object(Entity::Item { name: "sword".into() }));

    let spawn = get::<ObjectRef<Entity>>(raw, 1).unwrap();
    assert_eq!(spawn.as_spawn(), Some(7));
    assert_eq!(spawn.as_item(), None);

    let item = get::<ObjectRef<Entity>>(raw, 2).unwrap();
    assert_eq!(item.as_item(), Some("sword"));
    assert_eq!(raw.top(), 2);
}

#[test]
fn test_native_object_mismatch_fails_cleanly() {
    let lua = fresh();
    let raw = lua.raw();

    push(raw, Object(Other));
    push(raw, "not userdata");
    push(raw, vec![1i32]);

    assert!(get::<ObjectRef<Entity>>(raw, 1).is_none());
    assert!(get::<ObjectRef<Entity>>(raw, 2).is_none());
    assert!(get::<ObjectRef<Entity>>(raw, 3).is_none());
    assert!(get::<ObjectRef<Other>>(raw, 1).is_some());

    let err = check::<ObjectRef<Entity>>(raw, 1).unwrap_err();
    assert_eq!(err.expected, "test.Entity");
    assert_eq!(err.found, "userdata");
    assert_eq!(raw.top(), 3);
}

#[test]
fn test_native_object_dropped_by_collector() {
    use std::rc::Rc;

    struct Tracked(#[allow(dead_code)] Rc<()>);

    impl NativeObject for Tracked {
        const TYPE_NAME: &'static str = "test.Tracked";
    }

    let token = Rc::new(());
    let lua = fresh();
    let raw = lua.raw();
    {
        let _marker = StackMarker::new(raw);
        push(raw, Object(Tracked(Rc::clone(&token))));
        assert_eq!(Rc::strong_count(&token), 2);
    }
    lua.eval("collectgarbage('collect')");
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn test_native_objects_sharing_a_name_stay_distinct() {
    use std::rc::Rc;

    struct Apple(Rc<()>);
    struct Pear(#[allow(dead_code)] Rc<()>, u64);

    impl NativeObject for Apple {
        const TYPE_NAME: &'static str = "test.Fruit";
    }

    impl NativeObject for Pear {
        const TYPE_NAME: &'static str = "test.Fruit";
    }

    let apples = Rc::new(());
    let pears = Rc::new(());
    let lua = fresh();
    let raw = lua.raw();
    {
        let _marker = StackMarker::new(raw);
        push(raw, Object(Apple(Rc::clone(&apples))));
        push(raw, Object(Pear(Rc::clone(&pears), 3)));

        assert!(get::<ObjectRef<Pear>>(raw, 1).is_none());
        assert!(get::<ObjectRef<Apple>>(raw, 2).is_none());
        assert!(check::<ObjectRef<Pear>>(raw, 1).is_err());
        assert_eq!(get::<ObjectRef<Pear>>(raw, 2).map(|pear| pear.1), Some(3));
        assert_eq!(
            get::<ObjectRef<Apple>>(raw, 1).map(|apple| Rc::ptr_eq(&apple.0, &apples)),
            Some(true)
        );
    }
    lua.eval("collectgarbage('collect')");
    assert_eq!(Rc::strong_count(&apples), 1);
    assert_eq!(Rc::strong_count(&pears), 1);
}

#[test]
fn test_sequence_with_bad_element_is_rejected() {
    let lua = fresh();
    let raw = lua.raw();

    assert!(lua.eval("mixed = { 1, 2, 'three' }"));
    raw.get_global("mixed");
    assert_eq!(get::<Vec<i64>>(raw, -1), None);
    assert_eq!(get::<Vec<String>>(raw, -1), Some(vec!["1".into(), "2".into(), "three".into()]));
    assert_eq!(raw.top(), 1);
}

proptest! {
    #[test]
    fn prop_integer_round_trip(value in any::<i64>()) {
        let lua = fresh();
        let raw = lua.raw();
        push(raw, value);
        prop_assert_eq!(get::<i64>(raw, -1), Some(value));
    }

    #[test]
    fn prop_string_round_trip(value in "\\PC*") {
        let lua = fresh();
        let raw = lua.raw();
        push(raw, value.as_str());
        prop_assert_eq!(get::<String>(raw, -1), Some(value));
    }

    #[test]
    fn prop_float_round_trip(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        let lua = fresh();
        let raw = lua.raw();
        push(raw, value);
        prop_assert_eq!(get::<f64>(raw, -1), Some(value));
    }
}
