// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use common::{builtin, diagnostics_from, float, inner, instance, world};
use protoscene_core::values::{SfBool, SfFloat, ValueKind};
use protoscene_core::{
    DiagnosticSource, InitialValues, InterfaceError, RouteError, Severity, World, WorldConfig,
};
use protoscene_dry_tests::{broken_routes, spinner, Catalog};

#[test]
fn unusable_internal_routes_are_skipped_and_reported() {
    let (mut world, catalog) = world();
    let model = broken_routes(&catalog).expect("broken");
    let node = instance(&mut world, &model, InitialValues::new());

    assert_eq!(diagnostics_from(&world, DiagnosticSource::Route), 2);
    assert_eq!(diagnostics_from(&world, DiagnosticSource::IsMapping), 1);
    assert!(world
        .diagnostics()
        .iter()
        .all(|d| d.severity == Severity::Warn));
    assert!(world
        .diagnostics()
        .from_source(DiagnosticSource::Route)
        .any(|d| d.message.contains("nope_changed")));

    let a = inner(&world, node, "A");
    let b = inner(&world, node, "B");
    assert_eq!(float(&world, a, "value"), 0.25);
    let level = world.event_listener(node, "level").expect("listener");
    world.send_event(&level, SfFloat(0.7).into(), 1.0).expect("send");
    assert_eq!(float(&world, a, "value"), 0.7);
    assert_eq!(float(&world, b, "value"), 0.7);

    let poke = world.event_listener(node, "poke").expect("declared eventIn");
    world.send_event(&poke, SfFloat(1.0).into(), 2.0).expect("send");
    assert_eq!(float(&world, a, "value"), 0.7);
}

#[test]
fn routes_are_unique_per_endpoint_pair() {
    let (mut world, catalog) = world();
    let a = builtin(&mut world, &catalog, "Holder");
    let b = builtin(&mut world, &catalog, "Holder");

    assert_eq!(world.add_route(a, "value_changed", b, "set_value"), Ok(true));
    assert_eq!(world.add_route(a, "value", b, "value"), Ok(false));
    assert_eq!(world.add_route(a, "value_changed", b, "set_value"), Ok(false));

    let send = world.event_listener(a, "set_value").expect("listener");
    world.send_event(&send, SfFloat(3.0).into(), 1.0).expect("send");
    assert_eq!(float(&world, b, "value"), 3.0);

    assert!(world.delete_route(a, "value", b, "set_value"));
    assert!(!world.delete_route(a, "value_changed", b, "set_value"));
    world.send_event(&send, SfFloat(4.0).into(), 2.0).expect("send");
    assert_eq!(float(&world, a, "value"), 4.0);
    assert_eq!(float(&world, b, "value"), 3.0);
}

#[test]
fn bad_routes_are_rejected() {
    let (mut world, catalog) = world();
    let a = builtin(&mut world, &catalog, "Holder");
    let relay = builtin(&mut world, &catalog, "Relay");

    assert_eq!(
        world.add_route(a, "nodes_changed", relay, "set_value"),
        Err(RouteError::KindMismatch {
            from: ValueKind::MfNode,
            to: ValueKind::SfFloat,
        })
    );
    assert!(matches!(
        world.add_route(a, "nope", relay, "set_value"),
        Err(RouteError::Source(InterfaceError::UnsupportedInterface { .. }))
    ));
    assert!(matches!(
        world.add_route(relay, "value_changed", a, "weight"),
        Err(RouteError::Destination(InterfaceError::UnsupportedInterface { .. }))
    ));
    assert!(matches!(
        world.add_route(relay, "set_value", a, "set_value"),
        Err(RouteError::Source(_))
    ));
}

#[test]
fn cycles_stop_at_one_emission_per_timestamp() {
    let (mut world, catalog) = world();
    let r1 = builtin(&mut world, &catalog, "Relay");
    let r2 = builtin(&mut world, &catalog, "Relay");
    world
        .add_route(r1, "value_changed", r2, "set_value")
        .expect("forward");
    world
        .add_route(r2, "value_changed", r1, "set_value")
        .expect("back");

    let start = world.event_listener(r1, "set_value").expect("listener");
    world.send_event(&start, SfFloat(1.0).into(), 1.0).expect("send");

    for relay in [r1, r2] {
        let out = world.event_emitter(relay, "value_changed").expect("emitter");
        assert_eq!(world.last_emitted(&out), Some((SfFloat(1.0).into(), 1.0)));
    }
    assert_eq!(diagnostics_from(&world, DiagnosticSource::Event), 0);

    world.send_event(&start, SfFloat(2.0).into(), 2.0).expect("send");
    let out = world.event_emitter(r2, "value_changed").expect("emitter");
    assert_eq!(world.last_emitted(&out), Some((SfFloat(2.0).into(), 2.0)));
}

#[test]
fn runaway_cascades_are_cut_off() {
    let catalog = Catalog::new().expect("catalog");
    let config = WorldConfig {
        max_cascade: 3,
        ..WorldConfig::default()
    };
    let mut world = World::new(config);
    catalog.install(&mut world);

    let chain: Vec<_> = (0..6)
        .map(|_| builtin(&mut world, &catalog, "Relay"))
        .collect();
    for pair in chain.windows(2) {
        world
            .add_route(pair[0], "value_changed", pair[1], "set_value")
            .expect("link");
    }

    let start = world.event_listener(chain[0], "set_value").expect("listener");
    world.send_event(&start, SfFloat(1.0).into(), 1.0).expect("send");

    let reached = |world: &World, i: usize| {
        let listener = world.event_listener(chain[i], "set_value").expect("listener");
        world.last_received(&listener).is_some()
    };
    assert!(reached(&world, 2));
    assert!(!reached(&world, 3));
    assert_eq!(diagnostics_from(&world, DiagnosticSource::Event), 1);

    world.send_event(&start, SfFloat(2.0).into(), 2.0).expect("cascade state was reset");
    assert_eq!(diagnostics_from(&world, DiagnosticSource::Event), 1);
    assert_eq!(
        world
            .diagnostics()
            .from_source(DiagnosticSource::Event)
            .map(|d| d.repeats)
            .sum::<u32>(),
        2
    );
}

#[test]
fn events_are_checked_at_the_boundary() {
    let (mut world, catalog) = world();
    let holder = builtin(&mut world, &catalog, "Holder");
    let listener = world.event_listener(holder, "set_value").expect("listener");

    assert!(matches!(
        world.send_event(&listener, SfBool(true).into(), 1.0),
        Err(InterfaceError::TypeMismatch { .. })
    ));
    assert!(world.release(holder));
    assert_eq!(
        world.send_event(&listener, SfFloat(1.0).into(), 1.0),
        Err(InterfaceError::DeadNode(holder))
    );
    assert_eq!(
        world.event_listener(holder, "set_value"),
        Err(InterfaceError::DeadNode(holder))
    );
}

#[test]
fn emitted_events_follow_routes() {
    let (mut world, catalog) = world();
    let clock = builtin(&mut world, &catalog, "Clock");
    let holder = builtin(&mut world, &catalog, "Holder");
    world
        .add_route(clock, "fraction_changed", holder, "set_value")
        .expect("route");

    let tick = world.event_emitter(clock, "fraction_changed").expect("emitter");
    world.emit_event(&tick, SfFloat(0.5).into(), 1.0).expect("emit");
    assert_eq!(world.emitter_value(&tick), Some(SfFloat(0.5).into()));
    assert_eq!(float(&world, holder, "value"), 0.5);
    assert!(world.modified(holder));

    let active = world.event_emitter(clock, "isActive").expect("emitter");
    assert!(world.emit_event(&active, SfFloat(1.0).into(), 1.0).is_err());
}

#[test]
fn releasing_a_destination_removes_its_routes() {
    let (mut world, catalog) = world();
    let a = builtin(&mut world, &catalog, "Holder");
    let b = builtin(&mut world, &catalog, "Holder");
    let c = builtin(&mut world, &catalog, "Holder");
    world
        .add_route(a, "value_changed", b, "set_value")
        .expect("route");
    world
        .add_route(a, "value_changed", c, "set_value")
        .expect("route");
    assert_eq!(world.routes_from(a, "value_changed").len(), 2);

    assert!(world.release(b));
    let left = world.routes_from(a, "value_changed");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].node(), c);

    let send = world.event_listener(a, "set_value").expect("listener");
    world.send_event(&send, SfFloat(1.0).into(), 1.0).expect("send");
    assert_eq!(float(&world, a, "value"), 1.0);
    assert_eq!(float(&world, c, "value"), 1.0);
    assert!(world.diagnostics().is_empty());
}

#[test]
fn routes_into_released_instances_are_removed() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let clock = builtin(&mut world, &catalog, "Clock");
    for _ in 0..10 {
        let node = instance(&mut world, &model, InitialValues::new());
        world
            .add_route(clock, "fraction_changed", node, "set_fraction")
            .expect("route");
        assert!(world.release(node));
    }
    assert!(world.routes_from(clock, "fraction_changed").is_empty());
}

#[test]
fn released_destinations_do_not_count_against_the_cascade() {
    let catalog = Catalog::new().expect("catalog");
    let config = WorldConfig {
        max_cascade: 2,
        ..WorldConfig::default()
    };
    let mut world = World::new(config);
    catalog.install(&mut world);

    let source = builtin(&mut world, &catalog, "Relay");
    let gone: Vec<_> = (0..4)
        .map(|_| builtin(&mut world, &catalog, "Holder"))
        .collect();
    let kept = builtin(&mut world, &catalog, "Holder");
    for &target in gone.iter().chain([&kept]) {
        world
            .add_route(source, "value_changed", target, "set_value")
            .expect("route");
    }
    for node in gone {
        world.release(node);
    }

    let start = world.event_listener(source, "set_value").expect("listener");
    world.send_event(&start, SfFloat(0.5).into(), 1.0).expect("send");
    assert_eq!(float(&world, kept, "value"), 0.5);
    assert_eq!(diagnostics_from(&world, DiagnosticSource::Event), 0);
}
