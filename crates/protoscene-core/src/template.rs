// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! PROTO template definitions.
//!
//! A [`TemplateModel`] is the immutable result of parsing one PROTO: its
//! public interface, default values, the body sub-graph, internal routes and
//! the IS mapping. Parsers build one through [`TemplateBuilder`]; the model is
//! then shared by every instance through an `Arc`.
use std::collections::BTreeMap;
use std::sync::Arc;

use protoscene_values::{FieldValue, KindMismatch, NodeId, ValueKind};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::arena::NodeArena;
use crate::graph_view::NodeGraph;
use crate::interface::{Access, DuplicateInterface, InterfaceSet, NodeInterface};
use crate::node_type::NodeType;
use crate::path::{compute_path, resolve_path, NodePath};

/// Authoring errors caught while describing a template or builtin class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Interface names must be unique.
    #[error(transparent)]
    DuplicateInterface(#[from] DuplicateInterface),
    /// A field or exposedField was declared without a default.
    #[error("field `{0}` has no default value")]
    MissingDefault(String),
    /// An eventIn or eventOut was given a default.
    #[error("event `{0}` cannot have a default value")]
    DefaultOnEvent(String),
    /// A value does not have the kind its interface declares.
    #[error("`{name}`: {source}")]
    KindMismatch {
        /// Interface name.
        name: String,
        /// Kinds involved.
        #[source]
        source: KindMismatch,
    },
    /// Reference to an interface that was never declared.
    #[error("unknown interface `{0}`")]
    UnknownInterface(String),
    /// Reference to a node that is not part of the body.
    #[error("node {0} is not part of the template body")]
    UnknownNode(NodeId),
    /// A pass-through pair connects interfaces of different kinds.
    #[error("pass-through `{event_in}` -> `{event_out}` connects different kinds")]
    PassthroughMismatch {
        /// Receiving interface.
        event_in: String,
        /// Emitting interface.
        event_out: String,
    },
    /// A template needs at least one root node.
    #[error("template `{0}` has no root nodes")]
    EmptyBody(String),
}

/// A node of a template body, as authored.
#[derive(Debug, Clone)]
pub struct BodyNode {
    ty: Arc<NodeType>,
    name: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl BodyNode {
    /// Node type.
    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.ty
    }

    /// DEF name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Explicitly authored field value. Unset fields take the class default
    /// when the node is cloned.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Route between two body nodes, by interface name as authored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoRoute {
    /// Emitting node.
    pub from: NodeId,
    /// eventOut (or `x` / `x_changed`) on `from`.
    pub event_out: String,
    /// Receiving node.
    pub to: NodeId,
    /// eventIn (or `x` / `set_x`) on `to`.
    pub event_in: String,
}

/// One IS binding of a public interface to a body node's interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsMapping {
    /// Public interface name.
    pub public: String,
    /// Body node.
    pub node: NodeId,
    /// Interface of `node`.
    pub interface: String,
}

/// An immutable PROTO definition.
#[derive(Debug, Clone)]
pub struct TemplateModel {
    id: String,
    interfaces: InterfaceSet,
    defaults: BTreeMap<String, FieldValue>,
    body: NodeArena<BodyNode>,
    roots: Vec<NodeId>,
    routes: Vec<ProtoRoute>,
    is_map: Vec<IsMapping>,
    paths: FxHashMap<NodeId, NodePath>,
}

impl TemplateModel {
    /// Template id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Public interface.
    pub fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    /// Default for a public field or exposedField. Node references point into
    /// the body.
    pub fn default_value(&self, name: &str) -> Option<&FieldValue> {
        self.defaults.get(name)
    }

    /// Body root nodes in declaration order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// A body node.
    pub fn body_node(&self, id: NodeId) -> Option<&BodyNode> {
        self.body.get(id)
    }

    /// Every body node, including ones only reachable through defaults.
    pub fn body_nodes(&self) -> impl Iterator<Item = (NodeId, &BodyNode)> {
        self.body.iter()
    }

    /// Internal routes.
    pub fn routes(&self) -> &[ProtoRoute] {
        &self.routes
    }

    /// Full IS table in declaration order.
    pub fn is_mappings(&self) -> &[IsMapping] {
        &self.is_map
    }

    /// IS bindings of one public interface, in declaration order.
    pub fn is_targets<'a>(&'a self, public: &'a str) -> impl Iterator<Item = &'a IsMapping> + 'a {
        self.is_map.iter().filter(move |m| m.public == public)
    }

    /// IS bindings that target one body node's interface.
    pub(crate) fn is_sources<'a>(
        &'a self,
        node: NodeId,
        interface: &'a str,
    ) -> impl Iterator<Item = &'a IsMapping> + 'a {
        self.is_map
            .iter()
            .filter(move |m| m.node == node && m.interface == interface)
    }

    /// Precomputed path of a route endpoint or IS target; `None` when the
    /// node is not reachable from the roots.
    pub fn path_to(&self, node: NodeId) -> Option<&NodePath> {
        self.paths.get(&node)
    }
}

impl NodeGraph for TemplateModel {
    fn interfaces(&self, node: NodeId) -> Option<&InterfaceSet> {
        self.body.get(node).map(|n| n.ty.interfaces())
    }

    fn field_value(&self, node: NodeId, name: &str) -> Option<FieldValue> {
        let body = self.body.get(node)?;
        if let Some(value) = body.fields.get(name) {
            return Some(value.clone());
        }
        let interface = body.ty.interfaces().find_field(name)?;
        Some(
            body.ty
                .class_default(name)
                .unwrap_or_else(|| FieldValue::default_for(interface.kind)),
        )
    }
}

/// Incremental construction of a [`TemplateModel`].
#[derive(Debug)]
pub struct TemplateBuilder {
    id: String,
    interfaces: InterfaceSet,
    defaults: BTreeMap<String, FieldValue>,
    body: NodeArena<BodyNode>,
    roots: Vec<NodeId>,
    routes: Vec<ProtoRoute>,
    is_map: Vec<IsMapping>,
}

impl TemplateBuilder {
    /// Starts a template named `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interfaces: InterfaceSet::new(),
            defaults: BTreeMap::new(),
            body: NodeArena::new(),
            roots: Vec::new(),
            routes: Vec::new(),
            is_map: Vec::new(),
        }
    }

    /// Declares a public interface. Fields and exposedFields need a default;
    /// events must not have one.
    pub fn declare(
        &mut self,
        interface: NodeInterface,
        default: Option<FieldValue>,
    ) -> Result<&mut Self, DefinitionError> {
        match (interface.access.is_field(), default) {
            (true, None) => return Err(DefinitionError::MissingDefault(interface.name)),
            (false, Some(_)) => return Err(DefinitionError::DefaultOnEvent(interface.name)),
            (true, Some(value)) => {
                check_kind(&interface.name, interface.kind, &value)?;
                self.check_refs(&value)?;
                self.interfaces.insert(interface.clone())?;
                self.defaults.insert(interface.name, value);
            }
            (false, None) => self.interfaces.insert(interface)?,
        }
        Ok(self)
    }

    /// Declares a public field.
    pub fn field(&mut self, name: &str, default: FieldValue) -> Result<&mut Self, DefinitionError> {
        let interface = NodeInterface::new(Access::Field, default.kind(), name);
        self.declare(interface, Some(default))
    }

    /// Declares a public exposedField.
    pub fn exposed_field(
        &mut self,
        name: &str,
        default: FieldValue,
    ) -> Result<&mut Self, DefinitionError> {
        let interface = NodeInterface::new(Access::ExposedField, default.kind(), name);
        self.declare(interface, Some(default))
    }

    /// Declares a public eventIn.
    pub fn event_in(&mut self, name: &str, kind: ValueKind) -> Result<&mut Self, DefinitionError> {
        self.declare(NodeInterface::new(Access::EventIn, kind, name), None)
    }

    /// Declares a public eventOut.
    pub fn event_out(&mut self, name: &str, kind: ValueKind) -> Result<&mut Self, DefinitionError> {
        self.declare(NodeInterface::new(Access::EventOut, kind, name), None)
    }

    /// Adds a body node of type `ty`, optionally DEF-named.
    pub fn node(&mut self, ty: &Arc<NodeType>, name: Option<&str>) -> NodeId {
        self.body.insert(BodyNode {
            ty: Arc::clone(ty),
            name: name.map(str::to_owned),
            fields: BTreeMap::new(),
        })
    }

    /// Body node DEF-named `name`.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.body
            .iter()
            .find(|(_, node)| node.name.as_deref() == Some(name))
            .map(|(id, _)| id)
    }

    /// Sets a field or exposedField of a body node. Node references must
    /// name body nodes.
    pub fn set_field(
        &mut self,
        node: NodeId,
        name: &str,
        value: FieldValue,
    ) -> Result<&mut Self, DefinitionError> {
        self.check_refs(&value)?;
        let body = self
            .body
            .get_mut(node)
            .ok_or(DefinitionError::UnknownNode(node))?;
        let interface = body
            .ty
            .interfaces()
            .find_field(name)
            .ok_or_else(|| DefinitionError::UnknownInterface(name.to_owned()))?;
        check_kind(name, interface.kind, &value)?;
        body.fields.insert(name.to_owned(), value);
        Ok(self)
    }

    /// Appends a root node.
    pub fn root(&mut self, node: NodeId) -> Result<&mut Self, DefinitionError> {
        self.check_node(node)?;
        self.roots.push(node);
        Ok(self)
    }

    /// Adds an internal route. Interface names are checked when an instance
    /// re-creates the route; a bad name is reported there and skipped.
    pub fn route(
        &mut self,
        from: NodeId,
        event_out: &str,
        to: NodeId,
        event_in: &str,
    ) -> Result<&mut Self, DefinitionError> {
        self.check_node(from)?;
        self.check_node(to)?;
        self.routes.push(ProtoRoute {
            from,
            event_out: event_out.to_owned(),
            to,
            event_in: event_in.to_owned(),
        });
        Ok(self)
    }

    /// Binds public interface `public` to `interface` on body node `node`.
    pub fn is(
        &mut self,
        public: &str,
        node: NodeId,
        interface: &str,
    ) -> Result<&mut Self, DefinitionError> {
        if self.interfaces.get(public).is_none() {
            return Err(DefinitionError::UnknownInterface(public.to_owned()));
        }
        self.check_node(node)?;
        self.is_map.push(IsMapping {
            public: public.to_owned(),
            node,
            interface: interface.to_owned(),
        });
        Ok(self)
    }

    /// Freezes the definition and precomputes node paths.
    pub fn build(self) -> Result<TemplateModel, DefinitionError> {
        if self.roots.is_empty() {
            return Err(DefinitionError::EmptyBody(self.id));
        }
        let mut model = TemplateModel {
            id: self.id,
            interfaces: self.interfaces,
            defaults: self.defaults,
            body: self.body,
            roots: self.roots,
            routes: self.routes,
            is_map: self.is_map,
            paths: FxHashMap::default(),
        };
        let targets = model
            .routes
            .iter()
            .flat_map(|r| [r.from, r.to])
            .chain(model.is_map.iter().map(|m| m.node));
        let mut paths = FxHashMap::default();
        for node in targets {
            if paths.contains_key(&node) {
                continue;
            }
            if let Some(path) = compute_path(&model, &model.roots, node) {
                debug_assert_eq!(resolve_path(&model, &path, &model.roots), Some(node));
                paths.insert(node, path);
            }
        }
        model.paths = paths;
        Ok(model)
    }

    fn check_node(&self, node: NodeId) -> Result<(), DefinitionError> {
        if self.body.contains(node) {
            Ok(())
        } else {
            Err(DefinitionError::UnknownNode(node))
        }
    }

    fn check_refs(&self, value: &FieldValue) -> Result<(), DefinitionError> {
        value
            .node_refs()
            .iter()
            .try_for_each(|&node| self.check_node(node))
    }
}

fn check_kind(name: &str, kind: ValueKind, value: &FieldValue) -> Result<(), DefinitionError> {
    value
        .expect_kind(kind)
        .map_err(|source| DefinitionError::KindMismatch {
            name: name.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use protoscene_values::{MfNode, SfFloat, SfNode};

    use super::*;
    use crate::node_type::BuiltinClass;

    fn group() -> Arc<NodeType> {
        let class = BuiltinClass::builder("Group")
            .exposed_field("children", MfNode(Vec::new()).into())
            .build();
        match class {
            Ok(class) => NodeType::builtin(&class),
            Err(e) => unreachable!("fixture class is valid: {e}"),
        }
    }

    #[test]
    fn fields_need_defaults_and_events_refuse_them() {
        let mut b = TemplateBuilder::new("T");
        assert_eq!(
            b.declare(
                NodeInterface::new(Access::Field, ValueKind::SfFloat, "f"),
                None
            )
            .err(),
            Some(DefinitionError::MissingDefault("f".into()))
        );
        assert_eq!(
            b.declare(
                NodeInterface::new(Access::EventIn, ValueKind::SfFloat, "e"),
                Some(SfFloat(1.0).into())
            )
            .err(),
            Some(DefinitionError::DefaultOnEvent("e".into()))
        );
        assert!(matches!(
            b.declare(
                NodeInterface::new(Access::Field, ValueKind::SfInt32, "g"),
                Some(SfFloat(1.0).into())
            ),
            Err(DefinitionError::KindMismatch { .. })
        ));
    }

    #[test]
    fn build_requires_roots_and_records_paths() -> Result<(), DefinitionError> {
        assert_eq!(
            TemplateBuilder::new("Empty").build().err(),
            Some(DefinitionError::EmptyBody("Empty".into()))
        );

        let ty = group();
        let mut b = TemplateBuilder::new("Nest");
        let outer = b.node(&ty, Some("OUTER"));
        let inner = b.node(&ty, Some("INNER"));
        let orphan = b.node(&ty, None);
        b.set_field(outer, "children", MfNode(vec![inner]).into())?
            .root(outer)?
            .route(inner, "children_changed", outer, "set_children")?
            .exposed_field("extra", SfNode(None).into())?
            .is("extra", orphan, "children")?;
        assert_eq!(b.find_node("INNER"), Some(inner));

        let model = b.build()?;
        assert_eq!(model.roots(), &[outer]);
        assert_eq!(model.path_to(inner).map(|p| p.elements().len()), Some(2));
        assert_eq!(model.path_to(outer).map(|p| p.elements().len()), Some(1));
        assert!(model.path_to(orphan).is_none());
        Ok(())
    }

    #[test]
    fn body_references_must_stay_inside_the_body() {
        let ty = group();
        let mut b = TemplateBuilder::new("Bad");
        let n = b.node(&ty, None);
        let stranger = NodeId::from_parts(40, 0);
        assert_eq!(
            b.set_field(n, "children", MfNode(vec![stranger]).into()).err(),
            Some(DefinitionError::UnknownNode(stranger))
        );
        assert_eq!(
            b.is("nope", n, "children").err(),
            Some(DefinitionError::UnknownInterface("nope".into()))
        );
    }
}
