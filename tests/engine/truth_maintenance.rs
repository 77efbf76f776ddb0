//! Integration tests for truth maintenance
//!
//! Tests logical assertion, multiple support, cascading retraction, and the
//! explicit justification API.

use std::sync::{Arc, Mutex};

use thicket_engine::{
    BeliefState, Condition, JoinConstraint, Pattern, Rule, RuleBaseBuilder, Session, SessionEvent,
};
use thicket_foundation::{EntryPointId, ErrorKind, Fact, KeywordId, Value};

struct Kw {
    sensor: KeywordId,
    alarm: KeywordId,
    page: KeywordId,
    room: KeywordId,
    hot: KeywordId,
    smoky: KeywordId,
}

fn keywords(builder: &mut RuleBaseBuilder) -> Kw {
    Kw {
        sensor: builder.keyword("sensor"),
        alarm: builder.keyword("alarm"),
        page: builder.keyword("page"),
        room: builder.keyword("room"),
        hot: builder.keyword("hot"),
        smoky: builder.keyword("smoky"),
    }
}

/// `hot` or `smoky` sensors raise an alarm for their room; an alarm pages.
fn alarm_session() -> (Session, Kw) {
    let mut builder = RuleBaseBuilder::new();
    let kw = keywords(&mut builder);
    let (alarm, page, room) = (kw.alarm, kw.page, kw.room);
    for (name, flag) in [("heat", kw.hot), ("smoke", kw.smoky)] {
        builder.add_rule(
            Rule::new(name)
                .when(Condition::Pattern(
                    Pattern::new(kw.sensor)
                        .filter(thicket_engine::AlphaConstraint::equals(flag, true))
                        .bind_field("r", kw.room),
                ))
                .then(move |ctx| {
                    let r = ctx.get("r").cloned().unwrap_or(Value::Nil);
                    ctx.insert_logical(Fact::new(alarm).with(room, r))?;
                    Ok(())
                }),
        );
    }
    builder.add_rule(
        Rule::new("page")
            .when(Condition::Pattern(Pattern::new(kw.alarm).bind_field("r", kw.room)))
            .then(move |ctx| {
                let r = ctx.get("r").cloned().unwrap_or(Value::Nil);
                ctx.insert_logical(Fact::new(page).with(room, r))?;
                Ok(())
            }),
    );
    (Session::new(builder.build().unwrap()).unwrap(), kw)
}

// =============================================================================
// Rule-Driven Support
// =============================================================================

#[test]
fn equal_derivations_share_one_handle() {
    let (mut session, kw) = alarm_session();
    let hot = session
        .insert(Fact::new(kw.sensor).with(kw.room, "lab").with(kw.hot, true))
        .unwrap();
    let smoky = session
        .insert(Fact::new(kw.sensor).with(kw.room, "lab").with(kw.smoky, true))
        .unwrap();
    session.fire_all_rules().unwrap();

    let alarms = session.facts_of_type(kw.alarm);
    assert_eq!(alarms.len(), 1);
    assert_eq!(session.justifications(alarms[0]).len(), 2);

    session.retract(hot).unwrap();
    assert!(session.is_live(alarms[0]));
    assert_eq!(session.justifications(alarms[0]).len(), 1);

    session.retract(smoky).unwrap();
    assert!(!session.is_live(alarms[0]));
}

#[test]
fn retraction_cascades_through_chains() {
    let (mut session, kw) = alarm_session();
    let events = Arc::new(Mutex::new(Vec::<SessionEvent>::new()));
    session.add_listener(Arc::clone(&events));

    let sensor = session
        .insert(Fact::new(kw.sensor).with(kw.room, "hall").with(kw.hot, true))
        .unwrap();
    let summary = session.fire_all_rules().unwrap();
    assert_eq!(summary.fired, 2);
    assert_eq!(session.facts_of_type(kw.page).len(), 1);

    session.retract(sensor).unwrap();
    assert!(session.facts_of_type(kw.alarm).is_empty());
    assert!(session.facts_of_type(kw.page).is_empty());
    assert_eq!(session.fact_count(), 0);
    assert!(session.truth_maintenance().is_empty());

    let cascaded = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SessionEvent::FactRetracted { cascaded: true, .. }))
        .count();
    assert_eq!(cascaded, 2);
}

#[test]
fn unfired_activations_own_nothing() {
    let (mut session, kw) = alarm_session();
    let sensor = session
        .insert(Fact::new(kw.sensor).with(kw.room, "attic").with(kw.hot, true))
        .unwrap();
    assert_eq!(session.pending_activations().len(), 1);
    session.retract(sensor).unwrap();
    assert!(session.pending_activations().is_empty());
    assert_eq!(session.fact_count(), 0);
}

#[test]
fn logical_and_direct_equal_facts_stay_apart() {
    let (mut session, kw) = alarm_session();
    let direct = session.insert(Fact::new(kw.alarm).with(kw.room, "lab")).unwrap();
    session
        .insert(Fact::new(kw.sensor).with(kw.room, "lab").with(kw.hot, true))
        .unwrap();
    session.fire_all_rules().unwrap();

    let alarms = session.facts_of_type(kw.alarm);
    assert_eq!(alarms.len(), 2);
    assert_eq!(session.belief_state(direct).unwrap(), BeliefState::Unjustified);
}

// =============================================================================
// Explicit Justifications
// =============================================================================

#[test]
fn explicit_justifications_support_and_release() {
    let (mut session, kw) = alarm_session();
    let a = session.insert(Fact::new(kw.room).with(kw.room, "a")).unwrap();
    let b = session.insert(Fact::new(kw.room).with(kw.room, "b")).unwrap();

    let derived = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page), vec![a])
        .unwrap();
    let second = session.add_justification(derived, vec![b]).unwrap();
    assert!(matches!(
        session.belief_state(derived).unwrap(),
        BeliefState::Justified(ref ids) if ids.len() == 2
    ));

    session.retract(a).unwrap();
    assert!(session.is_live(derived));
    session.remove_justification(derived, second).unwrap();
    assert!(!session.is_live(derived));
    assert!(session.is_live(b));
}

#[test]
fn diamond_retracts_shared_conclusion_once() {
    let (mut session, kw) = alarm_session();
    let events = Arc::new(Mutex::new(Vec::<SessionEvent>::new()));
    session.add_listener(Arc::clone(&events));

    let top = session.insert(Fact::new(kw.room)).unwrap();
    let left = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 1), vec![top])
        .unwrap();
    let right = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 2), vec![top])
        .unwrap();
    let bottom = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.alarm), vec![left])
        .unwrap();
    session.add_justification(bottom, vec![right]).unwrap();

    session.retract(top).unwrap();
    assert_eq!(session.fact_count(), 0);
    assert!(session.truth_maintenance().is_empty());

    let events = events.lock().unwrap();
    let retractions_of = |handle| {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::FactRetracted { handle: h, .. } if *h == handle))
            .count()
    };
    assert_eq!(retractions_of(bottom), 1);
    assert_eq!(retractions_of(left), 1);
    assert_eq!(retractions_of(right), 1);
}

#[test]
fn equal_logical_insert_finds_oldest_after_updates() {
    let (mut session, kw) = alarm_session();
    let base = session.insert(Fact::new(kw.room)).unwrap();
    let first = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 1), vec![base])
        .unwrap();
    let second = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 2), vec![base])
        .unwrap();

    // Pass the second fact through the first one's value and away again.
    session.update(second, Fact::new(kw.page).with(kw.room, 1)).unwrap();
    session.update(second, Fact::new(kw.page).with(kw.room, 5)).unwrap();

    let again = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 1), vec![base])
        .unwrap();
    assert_eq!(again, first);
    assert_eq!(session.facts_of_type(kw.page).len(), 2);
}

#[test]
fn invalid_justifications_are_rejected() {
    let (mut session, kw) = alarm_session();
    let base = session.insert(Fact::new(kw.room)).unwrap();
    let derived = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page), vec![base])
        .unwrap();
    let further = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.alarm), vec![derived])
        .unwrap();

    let empty = session.insert_justified(EntryPointId::DEFAULT, Fact::new(kw.hot), vec![]);
    assert!(matches!(empty.unwrap_err().kind, ErrorKind::InvalidJustification { .. }));

    let direct = session.add_justification(base, vec![derived]);
    assert!(matches!(direct.unwrap_err().kind, ErrorKind::InvalidJustification { .. }));

    let cycle = session.add_justification(derived, vec![further]);
    assert!(matches!(cycle.unwrap_err().kind, ErrorKind::InvalidJustification { .. }));

    let self_support = session.add_justification(derived, vec![derived]);
    assert!(matches!(self_support.unwrap_err().kind, ErrorKind::InvalidJustification { .. }));

    let bogus = thicket_engine::JustificationId(999);
    let missing = session.remove_justification(derived, bogus);
    assert!(matches!(missing.unwrap_err().kind, ErrorKind::InvalidJustification { .. }));

    // Rejections leave the ledger untouched.
    assert_eq!(session.justifications(derived).len(), 1);
    assert_eq!(session.fact_count(), 3);
}

#[test]
fn dead_justifiers_are_unknown_handles() {
    let (mut session, kw) = alarm_session();
    let gone = session.insert(Fact::new(kw.room)).unwrap();
    session.retract(gone).unwrap();
    let err = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page), vec![gone])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownHandle(h) if h == gone));
}

#[test]
fn logical_update_keeps_support() {
    let (mut session, kw) = alarm_session();
    let base = session.insert(Fact::new(kw.room)).unwrap();
    let derived = session
        .insert_justified(EntryPointId::DEFAULT, Fact::new(kw.page).with(kw.room, 1), vec![base])
        .unwrap();
    session
        .update(derived, Fact::new(kw.page).with(kw.room, 2))
        .unwrap();
    assert!(session.is_live(derived));
    assert_eq!(session.justifications(derived).len(), 1);
    assert_eq!(session.fact(derived).unwrap().get(kw.room), Some(&Value::Int(2)));
}

#[test]
fn join_support_is_released_with_either_side() {
    let mut builder = RuleBaseBuilder::new();
    let kw = keywords(&mut builder);
    let page = kw.page;
    builder.add_rule(
        Rule::new("pair")
            .when(Condition::Pattern(Pattern::new(kw.sensor).bind_field("r", kw.room)))
            .when(Condition::Pattern(
                Pattern::new(kw.alarm).join(JoinConstraint::equals(kw.room, "r")),
            ))
            .then(move |ctx| {
                ctx.insert_logical(Fact::new(page))?;
                Ok(())
            }),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(kw.sensor).with(kw.room, 1)).unwrap();
    let alarm = session.insert(Fact::new(kw.alarm).with(kw.room, 1)).unwrap();
    session.fire_all_rules().unwrap();
    let derived = session.facts_of_type(kw.page)[0];
    assert_eq!(session.justifications(derived)[0].justifiers.len(), 2);

    session.retract(alarm).unwrap();
    assert!(!session.is_live(derived));
}
