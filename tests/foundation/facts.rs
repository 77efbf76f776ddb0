//! Integration tests for facts, templates, and errors

use thicket_foundation::{
    EntryPointId, Error, ErrorContext, ErrorKind, Fact, FactHandle, FactTemplate, FieldExtractor,
    Interner, SemanticLimit, Type, Value,
};

fn setup() -> (Interner, FactTemplate) {
    let mut interner = Interner::new();
    let person = interner.intern_keyword("person");
    let name = interner.intern_keyword("name");
    let age = interner.intern_keyword("age");
    let template = FactTemplate::new(person)
        .with_field(name, Type::String)
        .with_field(age, Type::option(Type::Int));
    (interner, template)
}

// =============================================================================
// Facts
// =============================================================================

#[test]
fn fact_builder_and_accessors() {
    let mut interner = Interner::new();
    let person = interner.intern_keyword("person");
    let name = interner.intern_keyword("name");
    let age = interner.intern_keyword("age");

    let mut fact = Fact::new(person).with(name, "ada");
    assert_eq!(fact.object_type(), person);
    assert_eq!(fact.get(name), Some(&Value::from("ada")));
    assert_eq!(fact.get(age), None);
    assert_eq!(fact.get_or_nil(age), Value::Nil);

    fact.set(age, 36);
    assert_eq!(fact.fields().count(), 2);
}

#[test]
fn equal_facts_are_equal_values() {
    let mut interner = Interner::new();
    let point = interner.intern_keyword("point");
    let x = interner.intern_keyword("x");
    let y = interner.intern_keyword("y");

    let a = Fact::new(point).with(x, 1).with(y, 2);
    let b = Fact::new(point).with(y, 2).with(x, 1);
    assert_eq!(a, b);
    assert_ne!(a, Fact::new(point).with(x, 1));
}

#[test]
fn field_extractor_reads_fields() {
    let mut interner = Interner::new();
    let point = interner.intern_keyword("point");
    let x = interner.intern_keyword("x");
    let fact = Fact::new(point).with(x, 4);

    assert_eq!(FieldExtractor::new(x).value(&fact), Value::Int(4));
    let missing = interner.intern_keyword("z");
    assert!(FieldExtractor::new(missing).is_null(&fact));
}

// =============================================================================
// Templates
// =============================================================================

#[test]
fn template_creates_nil_facts_that_validate() {
    let (interner, template) = setup();
    let fact = template.create_fact();
    assert_eq!(fact.fields().count(), 2);
    assert!(template.validate(&fact, &interner).is_ok());
}

#[test]
fn template_rejects_unknown_field() {
    let (mut interner, template) = setup();
    let email = interner.intern_keyword("email");
    let person = interner.lookup_keyword("person").unwrap();
    let fact = Fact::new(person).with(email, "a@b");

    let err = template.validate(&fact, &interner).unwrap_err();
    match err.kind {
        ErrorKind::UnknownField { template, field } => {
            assert_eq!(template, "person");
            assert_eq!(field, "email");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn template_rejects_wrong_type() {
    let (interner, template) = setup();
    let person = interner.lookup_keyword("person").unwrap();
    let age = interner.lookup_keyword("age").unwrap();
    let fact = Fact::new(person).with(age, "old");

    let err = template.validate(&fact, &interner).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn only_network_inconsistency_is_fatal() {
    assert!(Error::inconsistent("broken index").is_fatal());
    assert!(!Error::unknown_handle(FactHandle::new(1, EntryPointId::DEFAULT)).is_fatal());
    assert!(!Error::new(ErrorKind::SessionHalted).is_fatal());
}

#[test]
fn error_messages_carry_details() {
    let err = Error::action_failure("greet", "boom");
    assert_eq!(err.to_string(), "action of rule greet failed: boom");

    let limit = Error::limit_exceeded(SemanticLimit::MaxActivations {
        limit: 10,
        context: Some("last fired rule loop".to_string()),
    });
    assert_eq!(
        limit.to_string(),
        "limit exceeded: max activations (10) exceeded: last fired rule loop"
    );
}

#[test]
fn error_context_accumulates() {
    let handle = FactHandle::new(3, EntryPointId::DEFAULT);
    let err = Error::invalid_rule("r", "bad").with_context(
        ErrorContext::new()
            .with_rule("r")
            .with_handle(handle)
            .with_frame("compile"),
    );
    let context = err.context.unwrap();
    assert_eq!(context.rule.as_deref(), Some("r"));
    assert_eq!(context.handle, Some(handle));
    assert_eq!(context.stack, vec!["compile".to_string()]);
}
