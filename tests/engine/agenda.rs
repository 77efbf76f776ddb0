//! Integration tests for the agenda and the firing loop
//!
//! Tests firing order, halting, rule attributes, limits, and event streams.

use std::sync::{Arc, Mutex};

use thicket_engine::{
    ActivationStatus, ClockType, Condition, Pattern, Rule, RuleBaseBuilder, Session, SessionConfig,
    SessionEvent,
};
use thicket_foundation::{ErrorKind, Fact, SemanticLimit, Value};

fn fired_rules(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::RuleFired { rule, .. } => Some(rule.to_string()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Firing Order
// =============================================================================

#[test]
fn higher_salience_fires_first() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    for (name, salience) in [("low", -5), ("mid", 0), ("high", 10)] {
        builder.add_rule(
            Rule::new(name)
                .salience(salience)
                .when(Condition::Pattern(Pattern::new(item))),
        );
    }
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    session.add_listener(Arc::clone(&events));

    session.insert(Fact::new(item)).unwrap();
    let order: Vec<i32> = session.pending_activations().iter().map(|a| a.salience).collect();
    assert_eq!(order, vec![10, 0, -5]);

    session.fire_all_rules().unwrap();
    assert_eq!(fired_rules(&events), vec!["high", "mid", "low"]);
}

#[test]
fn equal_salience_fires_in_creation_order() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    let n = builder.keyword("n");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    builder.add_rule(
        Rule::new("log")
            .when(Condition::Pattern(Pattern::new(item).bind_field("n", n)))
            .then(move |ctx| {
                let value = ctx.get("n").cloned().unwrap_or(Value::Nil);
                log.lock().unwrap().push(value);
                Ok(())
            }),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    for i in 0..5 {
        session.insert(Fact::new(item).with(n, i)).unwrap();
    }
    session.fire_all_rules().unwrap();
    let expected: Vec<Value> = (0..5).map(Value::Int).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn activations_created_while_firing_join_the_queue() {
    let mut builder = RuleBaseBuilder::new();
    let seed = builder.keyword("seed");
    let grown = builder.keyword("grown");
    builder.add_rule(
        Rule::new("grow")
            .when(Condition::Pattern(Pattern::new(seed)))
            .then(move |ctx| {
                ctx.insert(Fact::new(grown))?;
                Ok(())
            }),
    );
    builder.add_rule(Rule::new("harvest").when(Condition::Pattern(Pattern::new(grown))));
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    session.add_listener(Arc::clone(&events));

    session.insert(Fact::new(seed)).unwrap();
    let summary = session.fire_all_rules().unwrap();
    assert_eq!(summary.fired, 2);
    assert_eq!(fired_rules(&events), vec!["grow", "harvest"]);
    assert!(session.pending_activations().is_empty());
}

// =============================================================================
// Halting and Limits
// =============================================================================

#[test]
fn action_halt_stops_the_loop() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    builder.add_rule(
        Rule::new("stop")
            .salience(1)
            .when(Condition::Pattern(Pattern::new(item)))
            .then(|ctx| {
                ctx.halt();
                Ok(())
            }),
    );
    builder.add_rule(Rule::new("later").when(Condition::Pattern(Pattern::new(item))));
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(item)).unwrap();

    let summary = session.fire_all_rules().unwrap();
    assert_eq!(summary.fired, 1);
    assert!(summary.halted);
    assert!(session.is_halted());
    assert_eq!(session.pending_activations().len(), 1);

    // Working memory stays usable while halted.
    session.insert(Fact::new(item)).unwrap();
    assert!(matches!(session.fire_all_rules().unwrap_err().kind, ErrorKind::SessionHalted));

    session.resume();
    let summary = session.fire_all_rules().unwrap();
    assert_eq!(summary.fired, 1);
    assert!(summary.halted);
}

#[test]
fn limit_reports_the_last_rule() {
    let mut builder = RuleBaseBuilder::new();
    let tick = builder.keyword("tick");
    let n = builder.keyword("n");
    builder.add_rule(
        Rule::new("count-up")
            .when(Condition::Pattern(Pattern::new(tick).bind_field("n", n)))
            .then(move |ctx| {
                let next = ctx.get("n").and_then(Value::as_int).unwrap_or(0) + 1;
                ctx.insert(Fact::new(tick).with(n, next))?;
                Ok(())
            }),
    );
    let config = SessionConfig::new().max_activations(3);
    let mut session = Session::with_config(builder.build().unwrap(), config).unwrap();
    session.insert(Fact::new(tick).with(n, 0)).unwrap();

    let err = session.fire_all_rules().unwrap_err();
    match err.kind {
        ErrorKind::LimitExceeded(SemanticLimit::MaxActivations { limit, context }) => {
            assert_eq!(limit, 3);
            assert!(context.unwrap().contains("count-up"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.fact_count(), 4);
}

#[test]
fn limit_is_not_hit_when_the_agenda_drains() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    builder.add_rule(Rule::new("once").when(Condition::Pattern(Pattern::new(item))));
    let config = SessionConfig::new().max_activations(2);
    let mut session = Session::with_config(builder.build().unwrap(), config).unwrap();
    session.insert(Fact::new(item)).unwrap();
    session.insert(Fact::new(item)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap().fired, 2);
}

// =============================================================================
// Rule Attributes
// =============================================================================

#[test]
fn disabled_rules_never_activate() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    builder.add_rule(
        Rule::new("off")
            .enabled(false)
            .when(Condition::Pattern(Pattern::new(item))),
    );
    let rule_base = builder.build().unwrap();
    assert_eq!(rule_base.rule_count(), 1);

    let mut session = Session::new(rule_base).unwrap();
    session.insert(Fact::new(item)).unwrap();
    assert!(session.pending_activations().is_empty());
}

#[test]
fn fired_activation_stays_fired_until_unmatched() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    builder.add_rule(Rule::new("r").when(Condition::Pattern(Pattern::new(item))));
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    let handle = session.insert(Fact::new(item)).unwrap();
    let id = session.pending_activations()[0].id;

    session.fire_all_rules().unwrap();
    assert_eq!(session.activation(id).unwrap().status, ActivationStatus::Fired);
    assert_eq!(session.activation_handles(id).unwrap(), vec![handle]);
    // A fired match does not fire again.
    assert_eq!(session.fire_all_rules().unwrap().fired, 0);

    session.retract(handle).unwrap();
    assert!(session.activation(id).is_none());
}

#[test]
fn context_reports_unbound_variables() {
    let mut builder = RuleBaseBuilder::new();
    let item = builder.keyword("item");
    builder.add_rule(
        Rule::new("lookup")
            .when(Condition::Pattern(Pattern::new(item).bind_fact("i")))
            .then(|ctx| {
                assert_eq!(ctx.rule_name(), "lookup");
                assert_eq!(ctx.handles().len(), 1);
                assert!(ctx.fact(ctx.handle("i")?).is_some());
                ctx.handle("missing").map(|_| ())
            }),
    );
    let mut session = Session::new(builder.build().unwrap()).unwrap();
    session.insert(Fact::new(item)).unwrap();
    let summary = session.fire_all_rules().unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].to_string().contains("missing"));
}

// =============================================================================
// Event Streams
// =============================================================================

#[test]
fn stream_facts_carry_clock_metadata() {
    let mut builder = RuleBaseBuilder::new();
    let reading = builder.keyword("reading");
    let sensors = builder.stream("sensors");
    let mut session = Session::with_config(
        builder.build().unwrap(),
        SessionConfig::new().clock(ClockType::Pseudo),
    )
    .unwrap();

    session.advance_time(100);
    let first = session.insert_event(sensors, Fact::new(reading), 25).unwrap();
    session.advance_time(50);
    let second = session.insert_into(sensors, Fact::new(reading)).unwrap();
    let plain = session.insert(Fact::new(reading)).unwrap();

    let meta = session.event_metadata(first).unwrap();
    assert_eq!(meta.timestamp, 100);
    assert_eq!(meta.end(), 125);
    assert_eq!(session.event_metadata(second).unwrap().timestamp, 150);
    assert!(session.event_metadata(plain).is_none());

    let err = session
        .insert_event(thicket_foundation::EntryPointId::DEFAULT, Fact::new(reading), 1)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownEntryPoint(_)));
}
