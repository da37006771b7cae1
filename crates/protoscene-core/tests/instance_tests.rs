// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use common::{builtin, float, inner, initial, instance, world};
use protoscene_core::values::{SfFloat, SfInt32};
use protoscene_core::{Access, InitialValues, InterfaceError, InterfaceSet, NodeClass, ScopeId};
use protoscene_dry_tests::{nested, spinner};

#[test]
fn instances_do_not_share_state() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let first = instance(&mut world, &model, InitialValues::new());
    let second = instance(&mut world, &model, InitialValues::new());

    assert_ne!(inner(&world, first, "A"), inner(&world, second, "A"));
    assert_ne!(world.instance_scope(first), world.instance_scope(second));

    let speed = world.event_listener(first, "set_speed").expect("listener");
    world
        .send_event(&speed, SfFloat(4.0).into(), 1.0)
        .expect("send");

    assert_eq!(float(&world, first, "speed"), 4.0);
    assert_eq!(float(&world, second, "speed"), 1.5);
    assert_eq!(float(&world, inner(&world, second, "A"), "value"), 1.5);
}

#[test]
fn public_event_fans_out_to_every_is_target() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());

    let speed = world.event_listener(node, "speed").expect("listener");
    world
        .send_event(&speed, SfFloat(2.5).into(), 1.0)
        .expect("send");

    assert_eq!(float(&world, inner(&world, node, "A"), "value"), 2.5);
    assert_eq!(float(&world, inner(&world, node, "B"), "value"), 2.5);
    let emitter = world.event_emitter(node, "speed_changed").expect("emitter");
    assert_eq!(world.last_emitted(&emitter), Some((SfFloat(2.5).into(), 1.0)));
    assert_eq!(world.last_received(&speed), Some((SfFloat(2.5).into(), 1.0)));
}

#[test]
fn initial_values_override_template_defaults() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let defaulted = instance(&mut world, &model, InitialValues::new());
    let custom = instance(
        &mut world,
        &model,
        initial([("speed", SfFloat(7.0).into()), ("offset", SfFloat(2.0).into())]),
    );

    assert_eq!(float(&world, inner(&world, defaulted, "B"), "value"), 1.5);
    assert_eq!(float(&world, defaulted, "offset"), 0.0);
    assert_eq!(float(&world, inner(&world, custom, "B"), "value"), 7.0);
    assert_eq!(float(&world, inner(&world, custom, "LOG"), "weight"), 2.0);
    assert_eq!(float(&world, custom, "offset"), 2.0);
}

#[test]
fn exposed_field_names_resolve_to_one_interface() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());

    let bare = world.event_listener(node, "speed").expect("bare");
    let prefixed = world.event_listener(node, "set_speed").expect("set_");
    assert_eq!(bare, prefixed);
    assert_eq!(bare.interface(), "speed");
    let changed = world.event_emitter(node, "speed_changed").expect("_changed");
    assert_eq!(changed.interface(), "speed");

    assert!(matches!(
        world.event_listener(node, "set_offset"),
        Err(InterfaceError::UnsupportedInterface {
            access: Access::EventIn,
            ..
        })
    ));
    assert!(world.event_emitter(node, "set_fraction").is_err());
}

#[test]
fn each_interface_emits_once_per_timestamp() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());
    let speed = world.event_listener(node, "speed").expect("listener");
    let changed = world.event_emitter(node, "speed").expect("emitter");

    world.send_event(&speed, SfFloat(4.0).into(), 2.0).expect("send");
    world.send_event(&speed, SfFloat(5.0).into(), 2.0).expect("send");
    assert_eq!(world.last_emitted(&changed), Some((SfFloat(4.0).into(), 2.0)));

    world.send_event(&speed, SfFloat(6.0).into(), 3.0).expect("send");
    assert_eq!(world.last_emitted(&changed), Some((SfFloat(6.0).into(), 3.0)));
}

#[test]
fn event_ins_drive_internal_routes_and_event_outs() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());
    let outside = builtin(&mut world, &catalog, "Holder");
    assert!(world
        .add_route(node, "fraction_changed", outside, "set_value")
        .expect("route"));

    let fraction = world.event_listener(node, "set_fraction").expect("listener");
    world
        .send_event(&fraction, SfFloat(0.25).into(), 1.0)
        .expect("send");

    assert_eq!(float(&world, inner(&world, node, "LOG"), "value"), 0.25);
    assert_eq!(float(&world, outside, "value"), 0.25);
    let out = world.event_emitter(node, "fraction_changed").expect("emitter");
    assert_eq!(world.last_emitted(&out), Some((SfFloat(0.25).into(), 1.0)));
    assert_eq!(world.field(node, "fraction_changed").ok(), None);
}

#[test]
fn wrong_kinds_are_rejected_at_the_boundary() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let ty = protoscene_core::NodeType::proto_full(&model);

    assert!(matches!(
        world.create_node(&ty, ScopeId::ROOT, initial([("speed", SfInt32(3).into())])),
        Err(InterfaceError::TypeMismatch { .. })
    ));
    assert!(matches!(
        world.create_node(&ty, ScopeId::ROOT, initial([("set_fraction", SfFloat(3.0).into())])),
        Err(InterfaceError::UnsupportedInterface { .. })
    ));

    let node = instance(&mut world, &model, InitialValues::new());
    let speed = world.event_listener(node, "speed").expect("listener");
    assert!(world.send_event(&speed, SfInt32(1).into(), 1.0).is_err());
    assert_eq!(float(&world, node, "speed"), 1.5);
}

#[test]
fn field_writes_reach_is_targets_without_events() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());

    world
        .set_field(node, "speed", SfFloat(6.0).into())
        .expect("set speed");
    world
        .set_field(node, "offset", SfFloat(0.5).into())
        .expect("set offset");

    assert_eq!(float(&world, inner(&world, node, "A"), "value"), 6.0);
    assert_eq!(float(&world, inner(&world, node, "B"), "value"), 6.0);
    assert_eq!(float(&world, inner(&world, node, "LOG"), "weight"), 0.5);
    let changed = world.event_emitter(node, "speed").expect("emitter");
    assert_eq!(world.last_emitted(&changed), None);
}

#[test]
fn nested_instances_forward_through_both_levels() {
    let (mut world, catalog) = world();
    let inner_model = spinner(&catalog).expect("spinner");
    let outer_model = nested(&catalog, &inner_model).expect("outer");
    let outer = instance(&mut world, &outer_model, InitialValues::new());

    let spinner_node = inner(&world, outer, "INNER");
    assert!(matches!(
        world.node_type(spinner_node).map(|t| t.class()),
        Some(NodeClass::Proto(_))
    ));
    assert_eq!(float(&world, outer, "speed"), 3.0);
    assert_eq!(float(&world, inner(&world, spinner_node, "A"), "value"), 3.0);

    let speed = world.event_listener(outer, "speed").expect("listener");
    world.send_event(&speed, SfFloat(9.0).into(), 1.0).expect("send");
    assert_eq!(float(&world, inner(&world, spinner_node, "B"), "value"), 9.0);

    let fraction = world
        .event_listener(spinner_node, "set_fraction")
        .expect("listener");
    world
        .send_event(&fraction, SfFloat(0.5).into(), 2.0)
        .expect("send");
    let out = world.event_emitter(outer, "fraction_changed").expect("emitter");
    assert_eq!(world.last_emitted(&out), Some((SfFloat(0.5).into(), 2.0)));

    let transform = inner(&world, spinner_node, "T");
    assert_eq!(world.primary_node(outer), Some(transform));
}

#[test]
fn release_frees_everything_the_instance_created() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let before = world.node_count();
    let node = instance(&mut world, &model, InitialValues::new());
    let a = inner(&world, node, "A");
    assert_eq!(world.node_count(), before + 7);

    assert!(world.release(node));
    assert_eq!(world.node_count(), before);
    assert!(!world.contains(a));
    assert!(!world.release(node));
    assert!(world.field(node, "speed").is_err());
}

#[test]
fn churned_instances_recycle_their_scopes() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let nodes = world.node_count();
    let scopes = world.scope_count();

    let first = instance(&mut world, &model, InitialValues::new());
    let first_scope = world.instance_scope(first).expect("instance scope");
    assert_eq!(world.scope_count(), scopes + 1);
    assert!(world.release(first));
    assert_eq!(world.scope_id(first_scope), None);

    for _ in 0..1000 {
        let node = instance(&mut world, &model, InitialValues::new());
        assert!(world.release(node));
    }
    assert_eq!(world.node_count(), nodes);
    assert_eq!(world.scope_count(), scopes);

    let next = world.create_scope(ScopeId::ROOT, "Fresh");
    assert_eq!(next.index(), first_scope.index());
    assert_ne!(next, first_scope);
    assert_eq!(world.find_node(first_scope, "A"), None);
}

#[test]
fn nested_release_frees_every_level_of_scope() {
    let (mut world, catalog) = world();
    let inner_model = spinner(&catalog).expect("spinner");
    let outer_model = nested(&catalog, &inner_model).expect("outer");
    let scopes = world.scope_count();

    let outer = instance(&mut world, &outer_model, InitialValues::new());
    let spinner_node = inner(&world, outer, "INNER");
    let inner_scope = world.instance_scope(spinner_node).expect("inner scope");
    assert_eq!(world.scope_count(), scopes + 2);
    assert_eq!(world.parent_scope(inner_scope), world.instance_scope(outer));

    assert!(world.release(outer));
    assert_eq!(world.scope_count(), scopes);
    assert_eq!(world.scope_id(inner_scope), None);
}

#[test]
fn lifecycle_follows_the_first_root() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let node = instance(&mut world, &model, InitialValues::new());
    let roots = world.impl_nodes(node).to_vec();
    assert_eq!(roots.len(), 4);
    assert_eq!(roots[0], inner(&world, node, "T"));

    world.initialize(node, 0.0);
    assert!(world.is_initialized(node));
    assert!(roots.iter().all(|&r| world.is_initialized(r)));
    assert!(world.modified(node));

    world.set_modified(node, false);
    assert!(!world.modified(node));
    assert!(!world.modified(roots[0]));

    world.shutdown_node(node, 1.0);
    assert!(!world.is_initialized(node));
    assert!(!world.is_initialized(roots[1]));
}

#[test]
fn restricted_types_hide_interfaces() {
    let (mut world, catalog) = world();
    let model = spinner(&catalog).expect("spinner");
    let visible: InterfaceSet = model
        .interfaces()
        .iter()
        .filter(|i| i.name == "speed")
        .cloned()
        .collect();
    let ty = world
        .create_type(&NodeClass::Proto(model), "SpeedOnly", &visible)
        .expect("subset type");
    let node = world
        .create_node(&ty, ScopeId::ROOT, InitialValues::new())
        .expect("node");

    assert_eq!(float(&world, node, "speed"), 1.5);
    assert!(world.event_listener(node, "set_fraction").is_err());
    assert!(world.field(node, "offset").is_err());
}
