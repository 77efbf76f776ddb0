//! Integration tests for Value types
//!
//! Tests Value variants, equality, hashing, ordering, display, and typing.

use std::collections::HashSet;
use std::sync::Arc;

use thicket_foundation::{EntryPointId, FactHandle, Interner, LtVec, Type, Value};

// =============================================================================
// Construction and Accessors
// =============================================================================

#[test]
fn value_accessors() {
    assert!(Value::Nil.is_nil());
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(Value::Int(42).as_int(), Some(42));
    assert_eq!(Value::Int(42).as_str(), None);
    assert_eq!(Value::from("hi").as_str(), Some("hi"));

    let handle = FactHandle::new(9, EntryPointId::DEFAULT);
    assert_eq!(Value::from(handle).as_fact(), Some(handle));
}

#[test]
fn value_as_number_promotes_ints() {
    assert_eq!(Value::Int(3).as_number(), Some(3.0));
    assert_eq!(Value::Float(2.5).as_number(), Some(2.5));
    assert_eq!(Value::from("3").as_number(), None);
}

#[test]
fn value_keyword() {
    let mut interner = Interner::new();
    let kw = interner.intern_keyword("status");
    let v = Value::from(kw);
    assert_eq!(v.as_keyword(), Some(kw));
    assert_eq!(interner.get_keyword(kw), Some("status"));
}

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn int_and_float_are_distinct_values() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
}

#[test]
fn nan_equals_itself() {
    assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
}

#[test]
fn values_hash_consistently() {
    let mut set = HashSet::new();
    set.insert(Value::String(Arc::from("a")));
    set.insert(Value::from("a"));
    set.insert(Value::Int(1));
    set.insert(Value::Float(1.0));
    assert_eq!(set.len(), 3);
}

#[test]
fn vectors_compare_elementwise() {
    let a: LtVec<Value> = vec![Value::Int(1), Value::Int(2)].into_iter().collect();
    let b = LtVec::new().push_back(Value::Int(1)).push_back(Value::Int(2));
    assert_eq!(Value::Vec(a), Value::Vec(b));
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn numbers_order_across_types() {
    assert!(Value::Int(1) < Value::Float(1.5));
    assert!(Value::Float(2.5) > Value::Int(2));
}

#[test]
fn unrelated_types_are_unordered() {
    assert_eq!(Value::Int(1).partial_cmp(&Value::from("1")), None);
    assert_eq!(Value::Nil.partial_cmp(&Value::Bool(false)), None);
}

// =============================================================================
// Display and Types
// =============================================================================

#[test]
fn display_forms() {
    assert_eq!(Value::Nil.to_string(), "nil");
    assert_eq!(Value::Int(-4).to_string(), "-4");
    assert_eq!(Value::from("x").to_string(), "x");
    let handle = FactHandle::new(12, EntryPointId::DEFAULT);
    assert_eq!(Value::Fact(handle).to_string(), "Fact(12)");
    let v: LtVec<Value> = vec![Value::Int(1), Value::Bool(true)].into_iter().collect();
    assert_eq!(Value::Vec(v).to_string(), "[1 true]");
}

#[test]
fn value_types() {
    assert_eq!(Value::Int(1).value_type(), Type::Int);
    assert_eq!(Value::Nil.value_type(), Type::Nil);
    let handle = FactHandle::new(1, EntryPointId::DEFAULT);
    assert_eq!(Value::Fact(handle).value_type(), Type::FactRef);
}

#[test]
fn type_acceptance() {
    assert!(Type::Float.accepts(&Type::Int));
    assert!(!Type::Int.accepts(&Type::Float));
    assert!(Type::option(Type::String).accepts(&Type::Nil));
    assert!(Type::Any.accepts(&Type::Keyword));
    assert!(Type::vec(Type::Int).accepts(&Type::vec(Type::Any)));
}
