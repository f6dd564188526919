use std::thread::sleep;
use std::time::{Duration, Instant};

use klangfeld::nodes::{Delay, Oscillator};
use klangfeld::{worker, Error, Event, EventKind, Field, NodeRef, Patchbay, When};

/// Poll `cond` until it holds or two seconds pass.
fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(5));
    }
    cond()
}

fn delays(field: &Field, names: &[&str]) -> Vec<NodeRef> {
    names
        .iter()
        .map(|name| {
            let node = worker::spawn(*name, Delay::new(0.1)).unwrap();
            field.add(node.clone()).unwrap();
            node
        })
        .collect()
}

#[test]
fn lookups_and_duplicates() {
    let field = Field::new();
    delays(&field, &["a"]);

    assert!(matches!(field.get("nope"), Err(Error::NotFound(n)) if n == "nope"));
    let dup = worker::spawn("a", Delay::new(0.1)).unwrap();
    assert!(matches!(field.add(dup.clone()), Err(Error::AlreadyExists(n)) if n == "a"));
    dup.send(Event::kill()).unwrap();

    assert!(matches!(field.connect("a", "nope"), Err(Error::NotFound(_))));
    assert!(matches!(field.connect("nope", "a"), Err(Error::NotFound(_))));
    assert_eq!(field.names(), vec!["a".to_string()]);
}

#[test]
fn connect_then_disconnect() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b"]);
    let (a, b) = (&nodes[0], &nodes[1]);

    field.connect("a", "b").unwrap();
    assert!(eventually(|| a.has_child("b") && b.has_parent("a")));

    field.disconnect("a", "b").unwrap();
    assert!(eventually(|| !a.has_child("b") && !b.has_parent("a")));

    assert!(matches!(field.disconnect("a", "b"), Err(Error::NotConnected { .. })));
}

#[test]
fn disconnect_right_after_connect() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b"]);
    let (a, b) = (&nodes[0], &nodes[1]);

    for _ in 0..50 {
        field.connect("a", "b").unwrap();
        field.disconnect("a", "b").unwrap();
    }
    assert!(!field.is_linked("a", "b"));

    sleep(Duration::from_millis(50));
    assert!(eventually(|| a.children().is_empty() && b.parents().is_empty()));
}

#[test]
fn cycles_are_refused_before_the_workers_catch_up() {
    let field = Field::new();
    delays(&field, &["a", "b", "c"]);

    field.connect("a", "b").unwrap();
    field.connect("b", "c").unwrap();
    assert!(matches!(field.connect("c", "a"), Err(Error::CycleDetected { .. })));

    field.disconnect("b", "c").unwrap();
    field.connect("c", "a").unwrap();
    assert!(field.is_linked("c", "a"));
}

#[test]
fn cycles_are_refused() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b", "c"]);

    field.connect("a", "b").unwrap();
    field.connect("b", "c").unwrap();
    assert!(eventually(|| nodes[0].has_child("b") && nodes[1].has_child("c")));

    assert!(matches!(
        field.connect("c", "a"),
        Err(Error::CycleDetected { src, dst }) if src == "c" && dst == "a"
    ));
    assert!(matches!(field.connect("b", "b"), Err(Error::CycleDetected { .. })));

    // nothing was sent
    sleep(Duration::from_millis(50));
    assert!(nodes[2].children().is_empty());
    assert!(nodes[0].parents().is_empty());
}

#[test]
fn single_child_nodes_give_up_the_old_child() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b", "c"]);
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    field.connect("a", "b").unwrap();
    assert!(eventually(|| a.has_child("b") && b.has_parent("a")));

    field.connect("a", "c").unwrap();
    assert!(eventually(|| {
        a.children().len() == 1 && a.has_child("c") && c.has_parent("a") && !b.has_parent("a")
    }));
}

#[test]
fn delete_unhooks_both_sides() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b", "c"]);

    field.connect("a", "b").unwrap();
    field.connect("b", "c").unwrap();
    assert!(eventually(|| nodes[0].has_child("b") && nodes[2].has_parent("b")));

    field.delete("b").unwrap();
    assert!(!field.contains("b"));
    assert!(!field.is_linked("a", "b") && !field.is_linked("b", "c"));
    assert!(eventually(|| nodes[0].children().is_empty() && nodes[2].parents().is_empty()));
    assert!(matches!(field.delete("b"), Err(Error::NotFound(_))));
}

#[test]
fn disconnect_all_clears_children() {
    let bay = Patchbay::new().unwrap();
    bay.add("sine", "a").unwrap();
    bay.add("sine", "b").unwrap();
    bay.connect("a", "mixer").unwrap();
    bay.connect("b", "mixer").unwrap();
    let mixer = bay.get("mixer").unwrap();
    assert!(eventually(|| mixer.parents().len() == 2));

    bay.disconnect_all("a").unwrap();
    assert!(eventually(|| mixer.parents().len() == 1 && mixer.has_parent("b")));
    assert!(eventually(|| bay.mixer().producers() == vec!["b".to_string()]));
}

#[test]
fn arity_is_checked() {
    let bay = Patchbay::new().unwrap();
    bay.add("sine", "a").unwrap();

    assert!(matches!(bay.connect("a", "clock"), Err(Error::Incompatible { .. })));
    assert!(matches!(bay.connect("mixer", "a"), Err(Error::Incompatible { .. })));
}

#[test]
fn deferred_needs_a_clock() {
    let field = Field::new();
    delays(&field, &["a"]);
    let ev = Event::with_value(EventKind::Delay, 0.5);
    assert!(matches!(field.fire("a", ev, When::Deferred), Err(Error::NoClock)));
}

#[test]
fn deferred_events_arrive_with_a_tick() {
    let bay = Patchbay::with_settings(600.0, 0.5).unwrap();
    let a = bay.add("sine", "a").unwrap();

    bay.fire("a", Event::with_value(EventKind::Hz, 220.0), When::Deferred).unwrap();
    assert!(eventually(|| a.describe().contains("hz=220.00")));
}

#[test]
fn immediate_events_update_the_summary() {
    let field = Field::new();
    let node = worker::spawn("lead", Oscillator::sine()).unwrap();
    field.add(node.clone()).unwrap();

    field.fire("lead", Event::with_value(EventKind::Gain, 0.25), When::Immediate).unwrap();
    assert!(eventually(|| node.describe().contains("gain=0.25")));
    assert!(eventually(|| field.describe().contains("lead")));
}

#[test]
fn dot_lists_nodes_and_edges() {
    let field = Field::new();
    let nodes = delays(&field, &["a", "b"]);
    field.connect("a", "b").unwrap();
    assert!(eventually(|| nodes[0].has_child("b")));

    let dot = field.dot();
    assert!(dot.starts_with("digraph"), "{}", dot);
    assert!(dot.contains("delay 'a'"), "{}", dot);
    assert!(dot.contains("->"), "{}", dot);
}
