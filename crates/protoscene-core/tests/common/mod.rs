// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::sync::Arc;

use protoscene_core::values::{FieldValue, NodeId, SfFloat};
use protoscene_core::{
    DiagnosticSource, InitialValues, NodeType, ScopeId, TemplateModel, World, WorldConfig,
};
use protoscene_dry_tests::Catalog;

/// A world with every catalog class registered.
pub fn world() -> (World, Catalog) {
    let catalog = Catalog::new().expect("catalog classes are valid");
    let mut world = World::new(WorldConfig::default());
    catalog.install(&mut world);
    (world, catalog)
}

/// Builds initial values from `(name, value)` pairs.
pub fn initial<const N: usize>(pairs: [(&str, FieldValue); N]) -> InitialValues {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

/// Reads an SFFloat field.
pub fn float(world: &World, node: NodeId, name: &str) -> f32 {
    match world.field(node, name).expect("field is readable") {
        FieldValue::SfFloat(SfFloat(v)) => v,
        other => panic!("{name} is not SFFloat: {other:?}"),
    }
}

/// Creates an instance of `model` exposing its whole interface.
pub fn instance(world: &mut World, model: &Arc<TemplateModel>, values: InitialValues) -> NodeId {
    let ty = NodeType::proto_full(model);
    world
        .create_node(&ty, ScopeId::ROOT, values)
        .expect("instance is created")
}

/// Creates a builtin node of catalog class `class`.
pub fn builtin(world: &mut World, catalog: &Catalog, class: &str) -> NodeId {
    let ty = catalog.node_type(class).expect("catalog class exists");
    world
        .create_node(&ty, ScopeId::ROOT, InitialValues::new())
        .expect("builtin node is created")
}

/// DEF-named node inside an instance.
pub fn inner(world: &World, instance: NodeId, def: &str) -> NodeId {
    let scope = world.instance_scope(instance).expect("node is an instance");
    world.find_node(scope, def).expect("DEF name exists in the instance")
}

/// Number of diagnostics from `source`.
pub fn diagnostics_from(world: &World, source: DiagnosticSource) -> usize {
    world.diagnostics().from_source(source).count()
}
