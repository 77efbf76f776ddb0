//! A `Tracer` listening to a live session

use std::sync::{Arc, Mutex};

use thicket_debug::{TraceRecord, Tracer, TracerConfig};
use thicket_engine::{Session, SessionEvent};

use crate::shop::Shop;

fn traced(shop: &Shop, config: TracerConfig) -> (Session, Arc<Mutex<Tracer>>) {
    let mut session = shop.session();
    let tracer = Tracer::new(config).with_interner(session.interner().clone());
    let tracer = Arc::new(Mutex::new(tracer));
    session.add_listener(Arc::clone(&tracer));
    (session, tracer)
}

fn types(records: &[&TraceRecord]) -> Vec<&'static str> {
    records.iter().map(|r| r.event_type()).collect()
}

#[test]
fn records_a_full_run() {
    let shop = Shop::new();
    let (mut session, tracer) = traced(&shop, TracerConfig::new().enabled());

    shop.add_customer(&mut session, 1);
    shop.add_order(&mut session, 1, 60);
    shop.add_order(&mut session, 1, 50);
    session.fire_all_rules().unwrap();

    let tracer = tracer.lock().unwrap();
    assert_eq!(tracer.current_firing(), 2);

    let before = tracer.buffer().records_for_firing(0);
    assert_eq!(
        before.iter().filter(|r| r.event_type() == "fact-inserted").count(),
        3
    );

    let big = types(&tracer.buffer().by_rule("big-spender"));
    assert_eq!(big.first(), Some(&"activation-created"));
    assert_eq!(big.last(), Some(&"rule-fired"));
    assert_eq!(big.iter().filter(|t| **t == "rule-firing").count(), 1);

    let first_firing = types(&tracer.buffer().records_for_firing(1));
    assert!(first_firing.contains(&"justification-added"));
    assert_eq!(tracer.buffer().by_event_type("rule-fired").len(), 2);
}

#[test]
fn follows_one_fact_through_its_life() {
    let shop = Shop::new();
    let (mut session, tracer) = traced(&shop, TracerConfig::new().enabled());

    let customer = shop.add_customer(&mut session, 1);
    shop.add_order(&mut session, 1, 150);
    session.fire_all_rules().unwrap();
    let vip = session.facts_of_type(shop.vip)[0];
    session.retract(customer).unwrap();

    let tracer = tracer.lock().unwrap();
    let history = tracer.buffer().by_handle(vip);
    let kinds = types(&history);
    assert_eq!(kinds.first(), Some(&"fact-inserted"));
    assert!(kinds.contains(&"justification-added"));
    assert!(history.iter().any(|r| matches!(
        r.event,
        SessionEvent::FactRetracted { cascaded: true, .. }
    )));
    assert!(history.iter().all(|r| !r.is_rule_event()));
}

#[test]
fn formats_with_session_keywords() {
    let shop = Shop::new();
    let (mut session, tracer) = traced(&shop, TracerConfig::new().enabled());

    shop.add_customer(&mut session, 7);
    shop.add_order(&mut session, 7, 200);
    session.fire_all_rules().unwrap();
    let vip = session.facts_of_type(shop.vip)[0];

    let mut tracer = tracer.lock().unwrap();
    let record = tracer.buffer().by_handle(vip)[0].clone();
    let line = tracer.format_record(&record, session.interner());
    assert!(line.contains("INSERT-LOGICAL"));
    assert!(line.contains(":vip"));
    assert!(line.starts_with("F0001"));

    tracer.set_json_format(true);
    let welcome = tracer.buffer().by_rule("welcome-vip");
    let json = tracer.format_records(&welcome, session.interner());
    assert!(json.starts_with('['));
    assert!(json.contains("\"rule\":\"welcome-vip\""));
    assert!(json.contains("\"type\":\"rule-fired\""));
}

#[test]
fn filtered_tracer_keeps_only_requested_events() {
    let shop = Shop::new();
    let config = TracerConfig::new()
        .enabled()
        .filter_events(vec!["rule-fired".to_string()]);
    let (mut session, tracer) = traced(&shop, config);

    shop.add_customer(&mut session, 1);
    shop.add_order(&mut session, 1, 100);
    session.fire_all_rules().unwrap();

    let tracer = tracer.lock().unwrap();
    assert_eq!(tracer.buffer().len(), 2);
    assert_eq!(tracer.current_firing(), 2);
    let stats = tracer.stats();
    assert_eq!(stats.event_counts.get("rule-fired"), Some(&2));
}

#[test]
fn disabled_tracer_costs_nothing_but_can_be_switched_on() {
    let shop = Shop::new();
    let (mut session, tracer) = traced(&shop, TracerConfig::new());

    shop.add_customer(&mut session, 1);
    assert!(tracer.lock().unwrap().buffer().is_empty());

    tracer.lock().unwrap().enable();
    shop.add_order(&mut session, 1, 100);
    session.fire_all_rules().unwrap();

    let tracer = tracer.lock().unwrap();
    assert!(!tracer.buffer().is_empty());
    assert!(tracer.buffer().by_rule("big-spender").len() >= 2);
}
