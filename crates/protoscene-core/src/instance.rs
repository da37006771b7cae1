// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! PROTO instances.
//!
//! Instantiating a template clones its body into a fresh child scope,
//! re-creates the internal routes between the clones, and wires every
//! event-capable public interface to the clones it is IS-bound to. Routes or
//! IS bindings that do not resolve in the clone are reported as diagnostics
//! and skipped; the instance is still created.
use std::collections::BTreeMap;
use std::sync::Arc;

use protoscene_values::{FieldValue, NodeId};
use tracing::{debug, instrument};

use crate::clone::ImplCloner;
use crate::diagnostics::{DiagnosticSource, Severity};
use crate::event::{AdapterSet, Destination};
use crate::interface::{Access, InterfaceError, NodeInterface};
use crate::node_type::NodeType;
use crate::path::resolve_path;
use crate::scope::ScopeId;
use crate::template::TemplateModel;
use crate::world::{InitialValues, NodeBody, NodeRecord, World};

/// State of a PROTO instance.
#[derive(Debug)]
pub(crate) struct ProtoNode {
    pub(crate) model: Arc<TemplateModel>,
    /// Scope holding every node the instance created.
    pub(crate) scope: ScopeId,
    /// Clones of the body roots.
    pub(crate) roots: Vec<NodeId>,
    /// Public field values (fields only; exposedFields live in the adapters).
    pub(crate) fields: BTreeMap<String, FieldValue>,
    pub(crate) adapters: AdapterSet,
}

impl World {
    #[instrument(level = "debug", skip_all, fields(instance = %id, template = model.id()))]
    pub(crate) fn instantiate(
        &mut self,
        id: NodeId,
        ty: &Arc<NodeType>,
        model: &Arc<TemplateModel>,
        scope: ScopeId,
        initial_values: InitialValues,
    ) -> Result<ProtoNode, InterfaceError> {
        let instance_scope = self.scopes.create(scope, model.id());
        let result = ImplCloner::new(model, &initial_values, instance_scope).clone_instance(self);
        let cloned = match result {
            Ok(cloned) => cloned,
            Err(e) => {
                self.scopes.remove(instance_scope);
                return Err(e);
            }
        };
        debug!(roots = cloned.roots.len(), "body cloned");

        let public = cloned.public;
        let mut adapters = AdapterSet::for_interfaces(ty.interfaces(), |name, kind| {
            public
                .get(name)
                .cloned()
                .unwrap_or_else(|| FieldValue::default_for(kind))
        });
        let fields = public
            .iter()
            .filter(|(name, _)| {
                model
                    .interfaces()
                    .get(name)
                    .is_some_and(|i| i.access == Access::Field)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        self.copy_routes(model, &cloned.roots);
        self.bind_interfaces(id, ty, model, &cloned.roots, &mut adapters);

        Ok(ProtoNode {
            model: Arc::clone(model),
            scope: instance_scope,
            roots: cloned.roots,
            fields,
            adapters,
        })
    }

    /// Clone of body node `body` inside the instance whose roots are `roots`.
    fn locate(&self, model: &TemplateModel, body: NodeId, roots: &[NodeId]) -> Option<NodeId> {
        resolve_path(self, model.path_to(body)?, roots)
    }

    fn copy_routes(&mut self, model: &TemplateModel, roots: &[NodeId]) {
        for route in model.routes() {
            let (Some(from), Some(to)) = (
                self.locate(model, route.from, roots),
                self.locate(model, route.to, roots),
            ) else {
                self.report(
                    Severity::Warn,
                    DiagnosticSource::Route,
                    format!(
                        "{}: ROUTE {}.{} TO {}.{} has an endpoint outside the instance",
                        model.id(),
                        route.from,
                        route.event_out,
                        route.to,
                        route.event_in
                    ),
                );
                continue;
            };
            if let Err(e) = self.add_route(from, &route.event_out, to, &route.event_in) {
                self.report(
                    Severity::Warn,
                    DiagnosticSource::Route,
                    format!(
                        "{}: ROUTE {}.{} TO {}.{} skipped: {e}",
                        model.id(),
                        route.from,
                        route.event_out,
                        route.to,
                        route.event_in
                    ),
                );
            }
        }
    }

    fn bind_interfaces(
        &mut self,
        instance: NodeId,
        ty: &NodeType,
        model: &TemplateModel,
        roots: &[NodeId],
        adapters: &mut AdapterSet,
    ) {
        for public in ty.interfaces().iter().filter(|i| i.access != Access::Field) {
            for mapping in model.is_targets(&public.name) {
                let bound = self
                    .locate(model, mapping.node, roots)
                    .ok_or(InterfaceError::DeadNode(mapping.node))
                    .and_then(|target| {
                        self.bind(instance, public, target, &mapping.interface, adapters)
                    });
                if let Err(e) = bound {
                    self.report(
                        Severity::Warn,
                        DiagnosticSource::IsMapping,
                        format!(
                            "{}: {} IS {}.{} skipped: {e}",
                            model.id(),
                            public.name,
                            mapping.node,
                            mapping.interface
                        ),
                    );
                }
            }
        }
    }

    /// Connects public interface `public` of `instance` to `internal` on
    /// `target`: incoming events fan out to the target, outgoing ones are
    /// relayed back through the instance.
    pub(crate) fn bind(
        &mut self,
        instance: NodeId,
        public: &NodeInterface,
        target: NodeId,
        internal: &str,
        adapters: &mut AdapterSet,
    ) -> Result<(), InterfaceError> {
        if public.access.receives() {
            let listener = self.event_listener(target, internal)?;
            if listener.kind != public.kind {
                return Err(InterfaceError::mismatch(internal, public.kind, listener.kind));
            }
            adapters.add_delegate(
                &public.name,
                Destination::EventIn {
                    node: target,
                    interface: listener.interface,
                },
            );
        }
        if public.access.emits() {
            let emitter = self.event_emitter(target, internal)?;
            if emitter.kind != public.kind {
                return Err(InterfaceError::mismatch(internal, public.kind, emitter.kind));
            }
            self.nodes
                .get_mut(target)
                .ok_or(InterfaceError::DeadNode(target))?
                .connect(
                    &emitter.interface,
                    Destination::Relay {
                        node: instance,
                        interface: public.name.clone(),
                    },
                );
        }
        Ok(())
    }

    /// Reads a public field: through the first IS binding that resolves,
    /// else from the value the instance holds itself.
    pub(crate) fn proto_field(
        &self,
        record: &NodeRecord,
        proto: &ProtoNode,
        interface: &NodeInterface,
    ) -> Result<FieldValue, InterfaceError> {
        for mapping in proto.model.is_targets(&interface.name) {
            let Some(target) = self.locate(&proto.model, mapping.node, &proto.roots) else {
                continue;
            };
            if let Ok(value) = self.field(target, &mapping.interface) {
                return Ok(value);
            }
        }
        proto
            .fields
            .get(&interface.name)
            .cloned()
            .or_else(|| proto.adapters.value(&interface.name))
            .ok_or_else(|| InterfaceError::unsupported(record.ty.id(), Access::Field, &interface.name))
    }

    /// Writes a public field and every internal field it is IS-bound to.
    pub(crate) fn set_proto_field(
        &mut self,
        node: NodeId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), InterfaceError> {
        let Some(NodeBody::Proto(proto)) = self.nodes.get_mut(node).map(|r| &mut r.body) else {
            return Err(InterfaceError::DeadNode(node));
        };
        match proto.adapters.set_exposed(name, &value) {
            Some(result) => result.map_err(|source| InterfaceError::TypeMismatch {
                name: name.to_owned(),
                source,
            })?,
            None => {
                proto.fields.insert(name.to_owned(), value.clone());
            }
        }
        let model = Arc::clone(&proto.model);
        let roots = proto.roots.clone();
        for mapping in model.is_targets(name) {
            let Some(target) = self.locate(&model, mapping.node, &roots) else {
                continue;
            };
            if let Err(e) = self.set_field(target, &mapping.interface, value.clone()) {
                self.report(
                    Severity::Warn,
                    DiagnosticSource::IsMapping,
                    format!("{}: {name} IS {}.{}: {e}", model.id(), mapping.node, mapping.interface),
                );
            }
        }
        Ok(())
    }

    /// Scope holding the nodes an instance created; `None` for other nodes.
    pub fn instance_scope(&self, node: NodeId) -> Option<ScopeId> {
        match &self.nodes.get(node)?.body {
            NodeBody::Proto(proto) => Some(proto.scope),
            NodeBody::Placeholder(placeholder) => {
                placeholder.upgraded.and_then(|up| self.instance_scope(up))
            }
            NodeBody::Builtin(_) => None,
        }
    }

    /// Template an instance was created from, through upgraded placeholders.
    pub fn instance_template(&self, node: NodeId) -> Option<&Arc<TemplateModel>> {
        match &self.nodes.get(node)?.body {
            NodeBody::Proto(proto) => Some(&proto.model),
            NodeBody::Placeholder(placeholder) => {
                placeholder.upgraded.and_then(|up| self.instance_template(up))
            }
            NodeBody::Builtin(_) => None,
        }
    }
}
