//! Integration tests for the match network
//!
//! Tests joins, negation, existence, accumulation, entry points, and alpha
//! node sharing through the public session API.

use std::sync::Arc;

use thicket_engine::{
    Accumulate, AccumulateInput, AlphaConstraint, CompareOp, Condition, Count, JoinConstraint,
    EqualityMode, NodeKind, Pattern, Rule, RuleBaseBuilder, Session, SessionConfig, TupleEntry,
};
use thicket_foundation::{EntryPointId, ErrorKind, Fact, KeywordId, Value};

struct Shop {
    customer: KeywordId,
    order: KeywordId,
    id: KeywordId,
    owner: KeywordId,
    amount: KeywordId,
}

fn shop(builder: &mut RuleBaseBuilder) -> Shop {
    Shop {
        customer: builder.keyword("customer"),
        order: builder.keyword("order"),
        id: builder.keyword("id"),
        owner: builder.keyword("owner"),
        amount: builder.keyword("amount"),
    }
}

fn pending_rules(session: &Session) -> Vec<String> {
    let mut names: Vec<String> = session
        .pending_activations()
        .iter()
        .filter_map(|a| session.activation_rule(a.id).map(str::to_string))
        .collect();
    names.sort();
    names
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn join_pairs_matching_facts_only() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("customer-order")
            .when(Condition::Pattern(
                Pattern::new(s.customer).bind_fact("c").bind_field("cid", s.id),
            ))
            .when(Condition::Pattern(
                Pattern::new(s.order).bind_fact("o").join(JoinConstraint::equals(s.owner, "cid")),
            )),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();

    let ann = session.insert(Fact::new(s.customer).with(s.id, 1)).unwrap();
    session.insert(Fact::new(s.customer).with(s.id, 2)).unwrap();
    let order = session.insert(Fact::new(s.order).with(s.owner, 1)).unwrap();
    session.insert(Fact::new(s.order).with(s.owner, 3)).unwrap();

    let pending = session.pending_activations();
    assert_eq!(pending.len(), 1);
    assert_eq!(session.activation_handles(pending[0].id).unwrap(), vec![ann, order]);

    session.retract(ann).unwrap();
    assert!(session.pending_activations().is_empty());
}

#[test]
fn join_compare_uses_earlier_binding() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("bigger")
            .when(Condition::Pattern(Pattern::new(s.customer).bind_field("limit", s.amount)))
            .when(Condition::Pattern(
                Pattern::new(s.order).join(JoinConstraint::compare(s.amount, CompareOp::Gt, "limit")),
            )),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(s.customer).with(s.amount, 50)).unwrap();
    session.insert(Fact::new(s.order).with(s.amount, 10)).unwrap();
    session.insert(Fact::new(s.order).with(s.amount, 60)).unwrap();
    session.insert(Fact::new(s.order).with(s.amount, 70.5)).unwrap();
    assert_eq!(session.pending_activations().len(), 2);
}

#[test]
fn repeated_field_variable_unifies() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("same-id")
            .when(Condition::Pattern(Pattern::new(s.customer).bind_field("x", s.id)))
            .when(Condition::Pattern(Pattern::new(s.order).bind_field("x", s.owner))),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(s.customer).with(s.id, 7)).unwrap();
    session.insert(Fact::new(s.order).with(s.owner, 7)).unwrap();
    session.insert(Fact::new(s.order).with(s.owner, 8)).unwrap();
    assert_eq!(session.pending_activations().len(), 1);
}

#[test]
fn undefined_join_variable_is_rejected() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("broken").when(Condition::Pattern(
            Pattern::new(s.order).join(JoinConstraint::equals(s.owner, "nobody")),
        )),
    );
    let err = builder.build().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UndefinedVariable { ref variable, .. } if variable == "nobody"));
}

// =============================================================================
// Negation and Existence
// =============================================================================

#[test]
fn not_blocks_while_a_match_exists() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("idle")
            .when(Condition::Pattern(Pattern::new(s.customer).bind_field("cid", s.id)))
            .when(Condition::Not(
                Pattern::new(s.order).join(JoinConstraint::equals(s.owner, "cid")),
            )),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(s.customer).with(s.id, 1)).unwrap();
    assert_eq!(session.pending_activations().len(), 1);

    let first = session.insert(Fact::new(s.order).with(s.owner, 1)).unwrap();
    let second = session.insert(Fact::new(s.order).with(s.owner, 1)).unwrap();
    assert!(session.pending_activations().is_empty());

    session.retract(first).unwrap();
    assert!(session.pending_activations().is_empty());
    session.retract(second).unwrap();
    assert_eq!(session.pending_activations().len(), 1);
}

#[test]
fn exists_matches_once() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(Rule::new("any-order").when(Condition::Exists(Pattern::new(s.order))));
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    assert!(session.pending_activations().is_empty());

    let a = session.insert(Fact::new(s.order)).unwrap();
    let b = session.insert(Fact::new(s.order)).unwrap();
    let pending = session.pending_activations();
    assert_eq!(pending.len(), 1);
    assert_eq!(session.activation_entries(pending[0].id).unwrap(), &[TupleEntry::Absent]);

    session.retract(a).unwrap();
    assert_eq!(session.pending_activations().len(), 1);
    session.retract(b).unwrap();
    assert!(session.pending_activations().is_empty());
}

#[test]
fn empty_and_leading_not_rules_match_the_root() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(Rule::new("boot"));
    builder.add_rule(Rule::new("no-orders").when(Condition::Not(Pattern::new(s.order))));
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    assert_eq!(pending_rules(&session), vec!["boot", "no-orders"]);

    session.insert(Fact::new(s.order)).unwrap();
    assert_eq!(pending_rules(&session), vec!["boot"]);
}

// =============================================================================
// Accumulation
// =============================================================================

#[test]
fn accumulate_result_test_gates_the_match() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    builder.add_rule(
        Rule::new("busy")
            .when(Condition::Pattern(Pattern::new(s.customer).bind_field("cid", s.id)))
            .when(Condition::Accumulate(
                Accumulate::new(
                    Pattern::new(s.order).join(JoinConstraint::equals(s.owner, "cid")),
                    Count,
                    AccumulateInput::Fact,
                    "n",
                )
                .with_test(CompareOp::Ge, 2),
            )),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(s.customer).with(s.id, 1)).unwrap();
    let first = session.insert(Fact::new(s.order).with(s.owner, 1)).unwrap();
    session.insert(Fact::new(s.order).with(s.owner, 2)).unwrap();
    assert!(session.pending_activations().is_empty());

    session.insert(Fact::new(s.order).with(s.owner, 1)).unwrap();
    let pending = session.pending_activations();
    assert_eq!(pending.len(), 1);
    let entries = session.activation_entries(pending[0].id).unwrap();
    assert_eq!(entries[1], TupleEntry::Accumulated(Value::Int(2)));

    session.retract(first).unwrap();
    assert!(session.pending_activations().is_empty());
}

// =============================================================================
// Entry Points and Alpha Sharing
// =============================================================================

#[test]
fn patterns_only_see_their_entry_point() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    let web = builder.entry_point("web");
    builder.add_rule(Rule::new("web-order").when(Condition::Pattern(
        Pattern::new(s.order).from_entry_point(web),
    )));
    let mut session = Session::new(builder.build().unwrap()).unwrap();

    session.insert(Fact::new(s.order)).unwrap();
    assert!(session.pending_activations().is_empty());
    let handle = session.insert_into(web, Fact::new(s.order)).unwrap();
    assert_eq!(handle.entry_point, web);
    assert_eq!(session.pending_activations().len(), 1);
    assert_eq!(session.facts(web).len(), 1);

    let err = session.insert_into(EntryPointId(42), Fact::new(s.order)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownEntryPoint(_)));
}

#[test]
fn shared_alpha_node_evaluates_once_per_fact() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    let large = AlphaConstraint::compare(s.amount, CompareOp::Ge, 100);
    builder.add_rule(Rule::new("a").when(Condition::Pattern(Pattern::new(s.order).filter(large.clone()))));
    builder.add_rule(Rule::new("b").when(Condition::Pattern(Pattern::new(s.order).filter(large))));
    let rule_base = builder.build().unwrap();
    let alpha: Vec<_> = rule_base
        .nodes()
        .filter(|(_, n)| matches!(n, NodeKind::Alpha { .. }))
        .map(|(id, _)| id)
        .collect();
    assert_eq!(alpha.len(), 1);

    let mut session = Session::new(Arc::clone(&rule_base)).unwrap();
    for amount in [50, 150, 250] {
        session.insert(Fact::new(s.order).with(s.amount, amount)).unwrap();
    }
    assert_eq!(session.alpha_evaluations(alpha[0]), Some(3));
    assert_eq!(session.pending_activations().len(), 4);
}

#[test]
fn equality_mode_merges_equal_direct_facts() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    let rule_base = builder.build().unwrap();

    let mut identity = Session::new(Arc::clone(&rule_base)).unwrap();
    let a = identity.insert(Fact::new(s.order).with(s.amount, 1)).unwrap();
    let b = identity.insert(Fact::new(s.order).with(s.amount, 1)).unwrap();
    assert_ne!(a, b);

    let config = SessionConfig::new().equality_mode(EqualityMode::Equality);
    let mut equality = Session::with_config(rule_base, config).unwrap();
    let a = equality.insert(Fact::new(s.order).with(s.amount, 1)).unwrap();
    let b = equality.insert(Fact::new(s.order).with(s.amount, 1)).unwrap();
    assert_eq!(a, b);
    assert_eq!(equality.fact_count(), 1);
}

#[test]
fn stale_handles_are_rejected() {
    let mut builder = RuleBaseBuilder::new();
    let s = shop(&mut builder);
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    let handle = session.insert(Fact::new(s.order)).unwrap();
    session.retract(handle).unwrap();

    assert!(matches!(session.retract(handle).unwrap_err().kind, ErrorKind::UnknownHandle(_)));
    assert!(matches!(
        session.update(handle, Fact::new(s.order)).unwrap_err().kind,
        ErrorKind::UnknownHandle(_)
    ));
    let next = session.insert(Fact::new(s.order)).unwrap();
    assert!(next.id > handle.id);
}
