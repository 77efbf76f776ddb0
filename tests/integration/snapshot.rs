//! Persistence round trips through `thicket_runtime`

use std::sync::Arc;

use thicket_engine::{
    Accumulate, AccumulateFunction, AccumulateInput, CollectList, Condition, Min, Pattern, Rule,
    RuleBaseBuilder, Session, Sum, TupleEntry,
};
use thicket_foundation::{ErrorKind, Fact, KeywordId, LtVec, Value};
use thicket_runtime::{from_bytes, to_bytes};

use crate::shop::Shop;

/// Customer 1 is a fired vip; customer 2 qualifies but has not fired yet.
fn mid_run(shop: &Shop) -> Session {
    let mut session = shop.session();
    shop.add_customer(&mut session, 1);
    shop.add_order(&mut session, 1, 60);
    shop.add_order(&mut session, 1, 50);
    session.fire_all_rules().unwrap();

    shop.add_customer(&mut session, 2);
    shop.add_order(&mut session, 2, 120);
    session
}

fn through_bytes(shop: &Shop, session: &Session) -> Session {
    let bytes = to_bytes(&session.snapshot().unwrap()).unwrap();
    Session::restore(Arc::clone(&shop.rule_base), from_bytes(&bytes).unwrap()).unwrap()
}

#[test]
fn restored_session_matches_original() {
    let shop = Shop::new();
    let session = mid_run(&shop);
    let restored = through_bytes(&shop, &session);

    assert_eq!(restored.fact_count(), session.fact_count());
    assert_eq!(shop.vips(&restored), vec![1]);
    assert_eq!(restored.facts_of_type(shop.email).len(), 1);
    let rebuilt = restored.node_contents().unwrap();
    let recorded = session.node_contents().unwrap();
    assert_eq!(rebuilt.len(), recorded.len());
    assert!(rebuilt.iter().zip(&recorded).all(|(a, b)| a.same_as(b)));

    let pending = restored.pending_activations();
    assert_eq!(pending.len(), 1);
    assert_eq!(restored.activation_rule(pending[0].id), Some("big-spender"));
    assert_eq!(pending[0].id, session.pending_activations()[0].id);
}

#[test]
fn restored_session_keeps_firing() {
    let shop = Shop::new();
    let session = mid_run(&shop);
    let mut restored = through_bytes(&shop, &session);

    let summary = restored.fire_all_rules().unwrap();
    assert_eq!(summary.fired, 2);
    assert!(summary.is_clean());
    assert_eq!(shop.vips(&restored), vec![1, 2]);
    assert_eq!(restored.facts_of_type(shop.email).len(), 2);
}

#[test]
fn restored_justifications_still_cascade() {
    let shop = Shop::new();
    let mut session = mid_run(&shop);
    session.fire_all_rules().unwrap();
    let mut restored = through_bytes(&shop, &session);

    let customer = restored.facts_of_type(shop.customer)[0];
    restored.retract(customer).unwrap();

    assert_eq!(shop.vips(&restored), vec![2]);
    // Emails are direct facts and outlive the vip that caused them.
    assert_eq!(restored.facts_of_type(shop.email).len(), 2);
}

#[test]
fn restored_ids_move_forward() {
    let shop = Shop::new();
    let session = mid_run(&shop);
    let last = session.registry().last_id();
    let mut restored = through_bytes(&shop, &session);

    let handle = shop.add_customer(&mut restored, 3);
    assert!(handle.id > last);
    assert!(
        session
            .facts_of_type(shop.customer)
            .iter()
            .all(|h| h.id != handle.id)
    );
}

#[test]
fn halt_survives_restore() {
    let shop = Shop::new();
    let mut session = mid_run(&shop);
    session.halt();
    let mut restored = through_bytes(&shop, &session);

    assert!(restored.is_halted());
    let err = restored.fire_all_rules().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SessionHalted));

    restored.resume();
    assert_eq!(restored.fire_all_rules().unwrap().fired, 2);
}

#[test]
fn snapshot_rejects_other_rule_base() {
    let shop = Shop::new();
    let session = mid_run(&shop);
    let snapshot = session.snapshot().unwrap();

    let mut builder = RuleBaseBuilder::new();
    let thing = builder.keyword("thing");
    builder.add_rule(Rule::new("other").when(Condition::Pattern(Pattern::new(thing))));
    let other = builder.build().unwrap();

    let err = Session::restore(other, snapshot).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InconsistentNetworkState(_)));
}

#[test]
fn tampered_memories_are_rejected() {
    let shop = Shop::new();
    let session = mid_run(&shop);
    let mut snapshot = session.snapshot().unwrap();

    let memory = snapshot
        .memories
        .iter_mut()
        .find(|m| !m.right.is_empty())
        .unwrap();
    memory.right.pop();

    let err = Session::restore(Arc::clone(&shop.rule_base), snapshot).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InconsistentNetworkState(_)));
}

#[test]
fn empty_session_round_trips() {
    let shop = Shop::new();
    let session = shop.session();
    let mut restored = through_bytes(&shop, &session);

    assert_eq!(restored.fact_count(), 0);
    assert!(restored.pending_activations().is_empty());
    restored.insert(Fact::new(shop.customer).with(shop.id, 9)).unwrap();
    assert_eq!(restored.fact_count(), 1);
}

/// One root-fed rule per aggregation over the `v` field of `item` facts.
fn aggregating(function: impl AccumulateFunction + 'static) -> (Session, KeywordId, KeywordId) {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    let v = builder.keyword("v");
    builder.add_rule(Rule::new("aggregate").when(Condition::Accumulate(Accumulate::new(
        Pattern::new(item),
        function,
        AccumulateInput::Field(v),
        "result",
    ))));
    let session = Session::new(builder.build().unwrap()).unwrap();
    (session, item, v)
}

fn restore_in_place(session: &Session) -> Session {
    let bytes = to_bytes(&session.snapshot().unwrap()).unwrap();
    Session::restore(Arc::clone(session.rule_base()), from_bytes(&bytes).unwrap()).unwrap()
}

fn aggregate_entries(session: &Session) -> Vec<TupleEntry> {
    let pending = session.pending_activations();
    assert_eq!(pending.len(), 1);
    session.activation_entries(pending[0].id).unwrap().to_vec()
}

#[test]
fn collected_list_survives_update_and_restore() {
    let (mut session, item, v) = aggregating(CollectList);
    let first = session.insert(Fact::new(item).with(v, 1)).unwrap();
    session.insert(Fact::new(item).with(v, 2)).unwrap();
    session.update(first, Fact::new(item).with(v, 3)).unwrap();

    let expected = Value::Vec([Value::Int(3), Value::Int(2)].into_iter().collect::<LtVec<Value>>());
    assert_eq!(aggregate_entries(&session), vec![TupleEntry::Accumulated(expected)]);

    let restored = restore_in_place(&session);
    assert_eq!(aggregate_entries(&restored), aggregate_entries(&session));
}

#[test]
fn tied_minimum_survives_update_and_restore() {
    let (mut session, item, v) = aggregating(Min);
    let first = session.insert(Fact::new(item).with(v, 1)).unwrap();
    session.insert(Fact::new(item).with(v, 1.0)).unwrap();
    session.update(first, Fact::new(item).with(v, 1)).unwrap();

    assert_eq!(aggregate_entries(&session), vec![TupleEntry::Accumulated(Value::Int(1))]);
    let restored = restore_in_place(&session);
    assert_eq!(aggregate_entries(&restored), aggregate_entries(&session));
}

#[test]
fn float_sum_is_exact_after_retracts_and_restore() {
    let (mut session, item, v) = aggregating(Sum);
    let a = session.insert(Fact::new(item).with(v, 0.1)).unwrap();
    let b = session.insert(Fact::new(item).with(v, 0.2)).unwrap();
    session.insert(Fact::new(item).with(v, 0.3)).unwrap();
    session.retract(a).unwrap();
    session.retract(b).unwrap();

    assert_eq!(aggregate_entries(&session), vec![TupleEntry::Accumulated(Value::Float(0.3))]);
    let restored = restore_in_place(&session);
    assert_eq!(aggregate_entries(&restored), aggregate_entries(&session));
}
