// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! PROTO fixtures built with [`TemplateBuilder`].

use std::sync::Arc;

use protoscene_core::{DefinitionError, NodeType, TemplateBuilder, TemplateModel};
use protoscene_values::{MfNode, SfFloat, SfNode, ValueKind};

use crate::classes::Catalog;

fn ty(catalog: &Catalog, id: &str) -> Result<Arc<NodeType>, DefinitionError> {
    catalog
        .node_type(id)
        .ok_or_else(|| DefinitionError::UnknownInterface(id.to_owned()))
}

/// `Spinner`:
///
/// ```text
/// PROTO Spinner [
///   exposedField SFFloat speed 1.5
///   field        SFFloat offset 0
///   eventIn      SFFloat set_fraction
///   eventOut     SFFloat fraction_changed
///   exposedField MFNode  children []
/// ] {
///   DEF T Transform { children [ DEF A Holder { value IS speed }
///                                DEF B Holder { value IS speed } ] }
///   DEF RELAY Relay { set_value IS set_fraction  value_changed IS fraction_changed }
///   DEF LOG Holder { weight IS offset }
///   DEF GROUP Group { children IS children }
///   ROUTE RELAY.value_changed TO LOG.set_value
/// }
/// ```
pub fn spinner(catalog: &Catalog) -> Result<Arc<TemplateModel>, DefinitionError> {
    let transform = ty(catalog, "Transform")?;
    let holder = ty(catalog, "Holder")?;
    let relay = ty(catalog, "Relay")?;
    let group = ty(catalog, "Group")?;

    let mut b = TemplateBuilder::new("Spinner");
    b.exposed_field("speed", SfFloat(1.5).into())?
        .field("offset", SfFloat(0.0).into())?
        .event_in("set_fraction", ValueKind::SfFloat)?
        .event_out("fraction_changed", ValueKind::SfFloat)?
        .exposed_field("children", MfNode(Vec::new()).into())?;

    let t = b.node(&transform, Some("T"));
    let a = b.node(&holder, Some("A"));
    let c = b.node(&holder, Some("B"));
    let r = b.node(&relay, Some("RELAY"));
    let log = b.node(&holder, Some("LOG"));
    let g = b.node(&group, Some("GROUP"));

    b.set_field(t, "children", MfNode(vec![a, c]).into())?
        .root(t)?
        .root(r)?
        .root(log)?
        .root(g)?
        .is("speed", a, "value")?
        .is("speed", c, "value")?
        .is("set_fraction", r, "set_value")?
        .is("fraction_changed", r, "value_changed")?
        .is("offset", log, "weight")?
        .is("children", g, "children")?
        .route(r, "value_changed", log, "set_value")?;
    b.build().map(Arc::new)
}

/// `Loop`: one Holder whose `node` field points at itself.
pub fn self_referencing(catalog: &Catalog) -> Result<Arc<TemplateModel>, DefinitionError> {
    let holder = ty(catalog, "Holder")?;
    let mut b = TemplateBuilder::new("Loop");
    let me = b.node(&holder, Some("SELF"));
    b.set_field(me, "node", SfNode(Some(me)).into())?.root(me)?;
    b.build().map(Arc::new)
}

/// `Shared`: a Group with two Holders that both reference one Material.
pub fn shared_child(catalog: &Catalog) -> Result<Arc<TemplateModel>, DefinitionError> {
    let group = ty(catalog, "Group")?;
    let holder = ty(catalog, "Holder")?;
    let material = ty(catalog, "Material")?;

    let mut b = TemplateBuilder::new("Shared");
    let root = b.node(&group, Some("ROOT"));
    let left = b.node(&holder, Some("L"));
    let right = b.node(&holder, Some("R"));
    let shared = b.node(&material, Some("M"));
    b.set_field(root, "children", MfNode(vec![left, right]).into())?
        .set_field(left, "nodes", MfNode(vec![shared]).into())?
        .set_field(right, "node", SfNode(Some(shared)).into())?
        .root(root)?;
    b.build().map(Arc::new)
}

/// `Broken`: one working internal route next to routes and IS bindings that
/// cannot be wired.
///
/// - `A.value_changed TO B.set_value` works.
/// - `A.nope_changed TO B.set_value` names a missing interface.
/// - `A.nodes_changed TO RELAY.set_value` connects MFNode to SFFloat.
/// - `poke IS A.missing` binds to a missing interface.
/// - `level IS A.value` works.
pub fn broken_routes(catalog: &Catalog) -> Result<Arc<TemplateModel>, DefinitionError> {
    let holder = ty(catalog, "Holder")?;
    let relay = ty(catalog, "Relay")?;

    let mut b = TemplateBuilder::new("Broken");
    b.event_in("poke", ValueKind::SfFloat)?
        .exposed_field("level", SfFloat(0.25).into())?;
    let a = b.node(&holder, Some("A"));
    let c = b.node(&holder, Some("B"));
    let r = b.node(&relay, Some("RELAY"));
    b.root(a)?
        .root(c)?
        .root(r)?
        .route(a, "value_changed", c, "set_value")?
        .route(a, "nope_changed", c, "set_value")?
        .route(a, "nodes_changed", r, "set_value")?
        .is("poke", a, "missing")?
        .is("level", a, "value")?;
    b.build().map(Arc::new)
}

/// `Outer`: wraps a [`spinner`] instance and forwards `speed` to it.
///
/// `inner` must be the Spinner template.
pub fn nested(
    catalog: &Catalog,
    inner: &Arc<TemplateModel>,
) -> Result<Arc<TemplateModel>, DefinitionError> {
    let holder = ty(catalog, "Holder")?;
    let spinner = NodeType::proto_full(inner);

    let mut b = TemplateBuilder::new("Outer");
    b.exposed_field("speed", SfFloat(3.0).into())?
        .event_out("fraction_changed", ValueKind::SfFloat)?;
    let s = b.node(&spinner, Some("INNER"));
    let side = b.node(&holder, Some("SIDE"));
    b.root(s)?
        .root(side)?
        .is("speed", s, "speed")?
        .is("fraction_changed", s, "fraction_changed")?;
    b.build().map(Arc::new)
}
