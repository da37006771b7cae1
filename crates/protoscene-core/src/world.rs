// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The world: every live node, the class registry, routes and the event queue.
//!
//! There is no global registry. Everything that creates, connects or drives
//! nodes goes through a [`World`], and everything a world owns is released
//! with it.
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use protoscene_values::{FieldValue, NodeId, ValueKind};
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::arena::NodeArena;
use crate::config::WorldConfig;
use crate::diagnostics::{DiagnosticSource, Diagnostics, Severity};
use crate::event::{Destination, EventEmitter, EventListener, PendingEvent};
use crate::externproto::{ExternTable, PlaceholderNode};
use crate::graph_view::NodeGraph;
use crate::instance::ProtoNode;
use crate::interface::{Access, InterfaceError, InterfaceSet};
use crate::node_type::{BuiltinClass, NodeClass, NodeType};
use crate::registry::ClassRegistry;
use crate::resolver::{DocumentParser, ResourceFetcher, Resolver, Unavailable};
use crate::scope::{ScopeId, ScopeTable};

/// Field values supplied when creating a node, by field name.
pub type InitialValues = BTreeMap<String, FieldValue>;

/// Why a route could not be added.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The source node or its eventOut is unusable.
    #[error("route source: {0}")]
    Source(#[source] InterfaceError),
    /// The destination node or its eventIn is unusable.
    #[error("route destination: {0}")]
    Destination(#[source] InterfaceError),
    /// The endpoints carry different kinds.
    #[error("route connects {from} to {to}")]
    KindMismatch {
        /// eventOut kind.
        from: ValueKind,
        /// eventIn kind.
        to: ValueKind,
    },
}

/// State of an ordinary node.
#[derive(Debug)]
pub(crate) struct BuiltinNode {
    pub(crate) class: Arc<BuiltinClass>,
    pub(crate) fields: BTreeMap<String, FieldValue>,
    pub(crate) last_events: BTreeMap<String, (FieldValue, f64)>,
}

#[derive(Debug)]
pub(crate) enum NodeBody {
    Builtin(BuiltinNode),
    Proto(ProtoNode),
    Placeholder(PlaceholderNode),
}

#[derive(Debug)]
pub(crate) struct NodeRecord {
    pub(crate) ty: Arc<NodeType>,
    pub(crate) name: Option<String>,
    pub(crate) scope: ScopeId,
    /// Outgoing destinations per canonical emitting interface.
    pub(crate) routes: BTreeMap<String, Vec<Destination>>,
    /// Last emission per canonical emitting interface.
    pub(crate) emitted: BTreeMap<String, (FieldValue, f64)>,
    pub(crate) modified: bool,
    pub(crate) initialized: bool,
    pub(crate) body: NodeBody,
}

impl NodeRecord {
    pub(crate) fn connect(&mut self, event_out: &str, destination: Destination) -> bool {
        let list = self.routes.entry(event_out.to_owned()).or_default();
        if list.contains(&destination) {
            return false;
        }
        list.push(destination);
        true
    }
}

/// Scene runtime context.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) nodes: NodeArena<NodeRecord>,
    pub(crate) scopes: ScopeTable,
    pub(crate) classes: ClassRegistry,
    pub(crate) externs: ExternTable,
    pub(crate) resolver: Resolver,
    pub(crate) diagnostics: Diagnostics,
    queue: VecDeque<PendingEvent>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("nodes", &self.nodes.len())
            .field("resolver", &self.resolver)
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    /// A world without EXTERNPROTO support: every resolution fails.
    pub fn new(config: WorldConfig) -> Self {
        Self::with_resolver(config, Arc::new(Unavailable), Arc::new(Unavailable))
    }

    /// A world that resolves EXTERNPROTOs with `fetcher` and `parser`.
    pub fn with_resolver(
        config: WorldConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        parser: Arc<dyn DocumentParser>,
    ) -> Self {
        let resolver = Resolver::new(fetcher, parser, config.resolver_thread_name.clone());
        Self {
            diagnostics: Diagnostics::new(config.diagnostics_capacity),
            config,
            nodes: NodeArena::new(),
            scopes: ScopeTable::new(),
            classes: ClassRegistry::default(),
            externs: ExternTable::default(),
            resolver,
            queue: VecDeque::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Problems reported (not returned) so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Mutable access, e.g. to drain the log.
    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub(crate) fn report(&mut self, severity: Severity, source: DiagnosticSource, message: String) {
        match severity {
            Severity::Info => debug!(?source, "{message}"),
            Severity::Warn => warn!(?source, "{message}"),
            Severity::Error => error!(?source, "{message}"),
        }
        self.diagnostics.push(severity, source, message);
    }

    // ── scopes ──────────────────────────────────────────────────────────

    /// The root scope.
    pub fn root_scope(&self) -> ScopeId {
        ScopeId::ROOT
    }

    /// Opens a child scope of `parent`.
    pub fn create_scope(&mut self, parent: ScopeId, id: &str) -> ScopeId {
        self.scopes.create(parent, id)
    }

    /// Node DEF-named `name` in `scope` (not its parents).
    pub fn find_node(&self, scope: ScopeId, name: &str) -> Option<NodeId> {
        self.scopes
            .find(scope, name)
            .filter(|&node| self.nodes.contains(node))
    }

    /// Nodes created in `scope`, in creation order.
    pub fn scope_members(&self, scope: ScopeId) -> &[NodeId] {
        self.scopes.members(scope)
    }

    /// Enclosing scope; `None` for the root.
    pub fn parent_scope(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.parent(scope)
    }

    /// Scope id (the template id for instance scopes).
    pub fn scope_id(&self, scope: ScopeId) -> Option<&str> {
        self.scopes.id(scope)
    }

    /// Number of live scopes, the root included. Releasing an instance
    /// frees its scope.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    // ── nodes ───────────────────────────────────────────────────────────

    /// Creates an unnamed node of `ty` in `scope`.
    pub fn create_node(
        &mut self,
        ty: &Arc<NodeType>,
        scope: ScopeId,
        initial_values: InitialValues,
    ) -> Result<NodeId, InterfaceError> {
        self.create_named_node(ty, scope, None, initial_values)
    }

    /// Creates a node of `ty` in `scope`, optionally DEF-named.
    ///
    /// Initial values may only name fields and exposedFields of the type and
    /// must have their declared kinds.
    pub fn create_named_node(
        &mut self,
        ty: &Arc<NodeType>,
        scope: ScopeId,
        name: Option<&str>,
        initial_values: InitialValues,
    ) -> Result<NodeId, InterfaceError> {
        let id = self.nodes.reserve();
        self.create_node_at(id, ty, scope, name, initial_values)?;
        Ok(id)
    }

    /// Builds a node into the reserved slot `id`. The slot is released on
    /// failure.
    pub(crate) fn create_node_at(
        &mut self,
        id: NodeId,
        ty: &Arc<NodeType>,
        scope: ScopeId,
        name: Option<&str>,
        initial_values: InitialValues,
    ) -> Result<(), InterfaceError> {
        let body = match self.build_body(id, ty, scope, initial_values) {
            Ok(body) => body,
            Err(e) => {
                self.nodes.unreserve(id);
                return Err(e);
            }
        };
        let (ty, body) = match body {
            Built::Node(body) => (Arc::clone(ty), body),
            Built::Redirected(resolved, body) => (resolved, body),
        };
        let record = NodeRecord {
            ty,
            name: name.map(str::to_owned),
            scope,
            routes: BTreeMap::new(),
            emitted: BTreeMap::new(),
            modified: false,
            initialized: false,
            body,
        };
        if self.nodes.fill(id, record).is_err() {
            error!(node = %id, "node slot was not reserved");
            return Err(InterfaceError::DeadNode(id));
        }
        self.scopes.register(scope, id, name);
        trace!(node = %id, "created");
        Ok(())
    }

    fn build_body(
        &mut self,
        id: NodeId,
        ty: &Arc<NodeType>,
        scope: ScopeId,
        initial_values: InitialValues,
    ) -> Result<Built, InterfaceError> {
        validate_initial(ty, &initial_values)?;
        match ty.class() {
            NodeClass::Builtin(class) => {
                let mut fields: BTreeMap<String, FieldValue> = class
                    .interfaces()
                    .iter()
                    .filter(|i| i.access.is_field())
                    .filter_map(|i| Some((i.name.clone(), class.default_value(&i.name)?.clone())))
                    .collect();
                fields.extend(initial_values);
                Ok(Built::Node(NodeBody::Builtin(BuiltinNode {
                    class: Arc::clone(class),
                    fields,
                    last_events: BTreeMap::new(),
                })))
            }
            NodeClass::Proto(model) => {
                let model = Arc::clone(model);
                self.instantiate(id, ty, &model, scope, initial_values)
                    .map(|node| Built::Node(NodeBody::Proto(node)))
            }
            NodeClass::Extern(_) => match self.externs.resolved_type(ty) {
                Some(resolved) => self
                    .build_body(id, &resolved, scope, initial_values)
                    .map(|built| match built {
                        Built::Node(body) => Built::Redirected(resolved, body),
                        redirected @ Built::Redirected(..) => redirected,
                    }),
                None => Ok(Built::Node(NodeBody::Placeholder(
                    self.build_placeholder(id, ty, initial_values),
                ))),
            },
        }
    }

    /// `true` when `node` is live.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Type of a live node.
    pub fn node_type(&self, node: NodeId) -> Option<&Arc<NodeType>> {
        self.nodes.get(node).map(|r| &r.ty)
    }

    /// DEF name of a live node.
    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node)?.name.as_deref()
    }

    /// Scope a live node was created in.
    pub fn node_scope(&self, node: NodeId) -> Option<ScopeId> {
        self.nodes.get(node).map(|r| r.scope)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn record(&self, node: NodeId) -> Result<&NodeRecord, InterfaceError> {
        self.nodes.get(node).ok_or(InterfaceError::DeadNode(node))
    }

    // ── fields ──────────────────────────────────────────────────────────

    /// Current value of a field or exposedField.
    pub fn field(&self, node: NodeId, name: &str) -> Result<FieldValue, InterfaceError> {
        let record = self.record(node)?;
        let unsupported = || InterfaceError::unsupported(record.ty.id(), Access::Field, name);
        let interface = record.ty.interfaces().find_field(name).ok_or_else(unsupported)?;
        match &record.body {
            NodeBody::Builtin(builtin) => builtin.fields.get(name).cloned().ok_or_else(unsupported),
            NodeBody::Proto(proto) => self.proto_field(record, proto, interface),
            NodeBody::Placeholder(placeholder) => match placeholder.upgraded {
                Some(upgraded) => self.field(upgraded, name),
                None => placeholder.value(name).ok_or_else(unsupported),
            },
        }
    }

    /// Writes a field or exposedField without generating an event.
    pub fn set_field(
        &mut self,
        node: NodeId,
        name: &str,
        value: FieldValue,
    ) -> Result<(), InterfaceError> {
        let record = self.nodes.get_mut(node).ok_or(InterfaceError::DeadNode(node))?;
        let interface = record
            .ty
            .interfaces()
            .find_field(name)
            .ok_or_else(|| InterfaceError::unsupported(record.ty.id(), Access::Field, name))?;
        value
            .expect_kind(interface.kind)
            .map_err(|source| InterfaceError::TypeMismatch {
                name: name.to_owned(),
                source,
            })?;
        let name = interface.name.clone();
        match &mut record.body {
            NodeBody::Builtin(builtin) => {
                builtin.fields.insert(name, value);
                record.modified = true;
                Ok(())
            }
            NodeBody::Proto(_) => self.set_proto_field(node, &name, value),
            NodeBody::Placeholder(placeholder) => match placeholder.upgraded {
                Some(upgraded) => self.set_field(upgraded, &name, value),
                None => {
                    placeholder.buffer_field(&name, value);
                    record.modified = true;
                    Ok(())
                }
            },
        }
    }

    // ── events ──────────────────────────────────────────────────────────

    /// Handle for sending events to `name` (an eventIn, an exposedField, or
    /// `set_<exposedField>`).
    pub fn event_listener(&self, node: NodeId, name: &str) -> Result<EventListener, InterfaceError> {
        let record = self.record(node)?;
        let interface = record
            .ty
            .interfaces()
            .find_event_in(name)
            .ok_or_else(|| InterfaceError::unsupported(record.ty.id(), Access::EventIn, name))?;
        Ok(EventListener {
            node,
            interface: interface.name.clone(),
            kind: interface.kind,
        })
    }

    /// Handle for observing `name` (an eventOut, an exposedField, or
    /// `<exposedField>_changed`).
    pub fn event_emitter(&self, node: NodeId, name: &str) -> Result<EventEmitter, InterfaceError> {
        let record = self.record(node)?;
        let interface = record
            .ty
            .interfaces()
            .find_event_out(name)
            .ok_or_else(|| InterfaceError::unsupported(record.ty.id(), Access::EventOut, name))?;
        Ok(EventEmitter {
            node,
            interface: interface.name.clone(),
            kind: interface.kind,
        })
    }

    /// Delivers an event and runs the resulting cascade to completion.
    pub fn send_event(
        &mut self,
        listener: &EventListener,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<(), InterfaceError> {
        if !self.nodes.contains(listener.node) {
            return Err(InterfaceError::DeadNode(listener.node));
        }
        value
            .expect_kind(listener.kind)
            .map_err(|source| InterfaceError::TypeMismatch {
                name: listener.interface.clone(),
                source,
            })?;
        self.queue.push_back(PendingEvent {
            destination: Destination::EventIn {
                node: listener.node,
                interface: listener.interface.clone(),
            },
            value,
            timestamp,
        });
        self.run_cascade();
        Ok(())
    }

    /// Emits from an eventOut of a node, as its implementation would, and
    /// runs the resulting cascade.
    pub fn emit_event(
        &mut self,
        emitter: &EventEmitter,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<(), InterfaceError> {
        if !self.nodes.contains(emitter.node) {
            return Err(InterfaceError::DeadNode(emitter.node));
        }
        value
            .expect_kind(emitter.kind)
            .map_err(|source| InterfaceError::TypeMismatch {
                name: emitter.interface.clone(),
                source,
            })?;
        self.emit(emitter.node, &emitter.interface, value, timestamp);
        self.run_cascade();
        Ok(())
    }

    /// Last value emitted through `emitter` and when.
    pub fn last_emitted(&self, emitter: &EventEmitter) -> Option<(FieldValue, f64)> {
        self.nodes
            .get(emitter.node)?
            .emitted
            .get(&emitter.interface)
            .cloned()
    }

    /// Value of the last emission through `emitter`.
    pub fn emitter_value(&self, emitter: &EventEmitter) -> Option<FieldValue> {
        self.last_emitted(emitter).map(|(value, _)| value)
    }

    /// Last event received on an eventIn or exposedField and when.
    pub fn last_received(&self, listener: &EventListener) -> Option<(FieldValue, f64)> {
        let record = self.nodes.get(listener.node)?;
        match &record.body {
            NodeBody::Builtin(builtin) => builtin.last_events.get(&listener.interface).cloned(),
            NodeBody::Proto(proto) => proto.adapters.last_received(&listener.interface),
            NodeBody::Placeholder(placeholder) => {
                placeholder.adapters.last_received(&listener.interface)
            }
        }
    }

    /// Connects an eventOut to an eventIn. Returns `false` if the route
    /// already existed.
    pub fn add_route(
        &mut self,
        from: NodeId,
        event_out: &str,
        to: NodeId,
        event_in: &str,
    ) -> Result<bool, RouteError> {
        let source = self.event_emitter(from, event_out).map_err(RouteError::Source)?;
        let target = self
            .event_listener(to, event_in)
            .map_err(RouteError::Destination)?;
        if source.kind != target.kind {
            return Err(RouteError::KindMismatch {
                from: source.kind,
                to: target.kind,
            });
        }
        let record = self
            .nodes
            .get_mut(from)
            .ok_or(RouteError::Source(InterfaceError::DeadNode(from)))?;
        Ok(record.connect(
            &source.interface,
            Destination::EventIn {
                node: to,
                interface: target.interface,
            },
        ))
    }

    /// Destinations routed from `event_out` of `node`, in connection order.
    pub fn routes_from(&self, node: NodeId, event_out: &str) -> &[Destination] {
        let Ok(source) = self.event_emitter(node, event_out) else {
            return &[];
        };
        self.nodes
            .get(node)
            .and_then(|r| r.routes.get(&source.interface))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Removes a route. Returns `false` if it did not exist.
    pub fn delete_route(&mut self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> bool {
        let (Ok(source), Ok(target)) = (
            self.event_emitter(from, event_out),
            self.event_listener(to, event_in),
        ) else {
            return false;
        };
        let Some(list) = self
            .nodes
            .get_mut(from)
            .and_then(|r| r.routes.get_mut(&source.interface))
        else {
            return false;
        };
        let before = list.len();
        list.retain(|d| {
            *d != Destination::EventIn {
                node: to,
                interface: target.interface.clone(),
            }
        });
        list.len() != before
    }

    /// Records an emission and queues its routes, unless something was
    /// already emitted on this interface at `timestamp` or later.
    pub(crate) fn emit(&mut self, node: NodeId, interface: &str, value: FieldValue, timestamp: f64) {
        let Some(record) = self.nodes.get_mut(node) else {
            return;
        };
        if record
            .emitted
            .get(interface)
            .is_some_and(|&(_, last)| timestamp <= last)
        {
            trace!(%node, interface, timestamp, "suppressed repeat emission");
            return;
        }
        record
            .emitted
            .insert(interface.to_owned(), (value.clone(), timestamp));
        if let Some(destinations) = record.routes.get(interface) {
            self.queue.extend(destinations.iter().map(|destination| PendingEvent {
                destination: destination.clone(),
                value: value.clone(),
                timestamp,
            }));
        }
    }

    fn run_cascade(&mut self) {
        let mut delivered = 0usize;
        while let Some(event) = self.queue.pop_front() {
            delivered += 1;
            if delivered > self.config.max_cascade {
                let dropped = self.queue.len() + 1;
                self.queue.clear();
                self.report(
                    Severity::Warn,
                    DiagnosticSource::Event,
                    format!("event cascade exceeded {} deliveries; dropped {dropped}", self.config.max_cascade),
                );
                return;
            }
            self.deliver(event);
        }
    }

    fn deliver(&mut self, event: PendingEvent) {
        let PendingEvent {
            destination,
            value,
            timestamp,
        } = event;
        let (node, interface, relay) = match destination {
            Destination::EventIn { node, interface } => (node, interface, false),
            Destination::Relay { node, interface } => (node, interface, true),
        };
        let Some(record) = self.nodes.get_mut(node) else {
            trace!(%node, "dropping event for released node");
            return;
        };
        let effect = if relay {
            deliver_relay(record, &interface, &value)
        } else {
            deliver_event_in(record, &interface, &value, timestamp)
        };
        match effect {
            Ok(Effect { forward, emit }) => {
                self.queue.extend(forward.into_iter().map(|destination| PendingEvent {
                    destination,
                    value: value.clone(),
                    timestamp,
                }));
                if let Some(event_out) = emit {
                    self.emit(node, &event_out, value, timestamp);
                }
            }
            Err(e) => self.report(
                Severity::Warn,
                DiagnosticSource::Event,
                format!("event for {node}.{interface} dropped: {e}"),
            ),
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Initializes a node. Instances initialize their implementation roots;
    /// placeholders remember the time and initialize their upgrade.
    pub fn initialize(&mut self, node: NodeId, timestamp: f64) {
        let Some(record) = self.nodes.get_mut(node) else {
            return;
        };
        if record.initialized {
            return;
        }
        record.initialized = true;
        match &mut record.body {
            NodeBody::Builtin(_) => {}
            NodeBody::Proto(proto) => {
                let roots = proto.roots.clone();
                for &root in &roots {
                    self.initialize(root, timestamp);
                }
                if let Some(&first) = roots.first() {
                    self.set_modified(first, true);
                }
            }
            NodeBody::Placeholder(placeholder) => {
                placeholder.initialized_at = Some(timestamp);
                if let Some(upgraded) = placeholder.upgraded {
                    self.initialize(upgraded, timestamp);
                }
            }
        }
    }

    /// Shuts a node down, forwarding like [`initialize`](Self::initialize).
    pub fn shutdown_node(&mut self, node: NodeId, timestamp: f64) {
        let Some(record) = self.nodes.get_mut(node) else {
            return;
        };
        if !record.initialized {
            return;
        }
        record.initialized = false;
        let forward: Vec<NodeId> = match &mut record.body {
            NodeBody::Builtin(_) => Vec::new(),
            NodeBody::Proto(proto) => proto.roots.clone(),
            NodeBody::Placeholder(placeholder) => {
                placeholder.initialized_at = None;
                placeholder.upgraded.into_iter().collect()
            }
        };
        for child in forward {
            self.shutdown_node(child, timestamp);
        }
    }

    /// `true` once `initialize` ran and until `shutdown_node`.
    pub fn is_initialized(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(|r| r.initialized)
    }

    /// Needs-redraw flag. An instance reports its first implementation root.
    pub fn modified(&self, node: NodeId) -> bool {
        let Some(record) = self.nodes.get(node) else {
            return false;
        };
        match &record.body {
            NodeBody::Builtin(_) => record.modified,
            NodeBody::Proto(proto) => proto.roots.first().is_some_and(|&r| self.modified(r)),
            NodeBody::Placeholder(placeholder) => match placeholder.upgraded {
                Some(upgraded) => self.modified(upgraded),
                None => record.modified,
            },
        }
    }

    /// Sets or clears the needs-redraw flag, with the same forwarding as
    /// [`modified`](Self::modified).
    pub fn set_modified(&mut self, node: NodeId, value: bool) {
        let Some(record) = self.nodes.get_mut(node) else {
            return;
        };
        let forward = match &record.body {
            NodeBody::Builtin(_) => None,
            NodeBody::Proto(proto) => proto.roots.first().copied(),
            NodeBody::Placeholder(placeholder) => placeholder.upgraded,
        };
        match forward {
            Some(next) => self.set_modified(next, value),
            None => record.modified = value,
        }
    }

    /// Implementation roots of an instance (through an upgraded placeholder).
    /// Empty for ordinary nodes and pending placeholders.
    pub fn impl_nodes(&self, node: NodeId) -> &[NodeId] {
        match self.nodes.get(node).map(|r| &r.body) {
            Some(NodeBody::Proto(proto)) => proto.roots.as_slice(),
            Some(NodeBody::Placeholder(placeholder)) => placeholder
                .upgraded
                .map_or(&[][..], |upgraded| self.impl_nodes(upgraded)),
            _ => &[][..],
        }
    }

    /// The node that determines what `node` effectively is: itself for
    /// ordinary nodes, otherwise the first implementation root, followed
    /// through nested instances and upgraded placeholders.
    pub fn primary_node(&self, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            let next = match &self.nodes.get(current)?.body {
                NodeBody::Builtin(_) => return Some(current),
                NodeBody::Proto(proto) => proto.roots.first().copied(),
                NodeBody::Placeholder(placeholder) => placeholder.upgraded,
            };
            match next {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
    }

    /// Frees a node. An instance also frees every node created in its scope;
    /// an upgraded placeholder frees its upgrade. Routes other nodes held
    /// toward the freed nodes are removed. Returns `false` if the node was
    /// not live.
    pub fn release(&mut self, node: NodeId) -> bool {
        let mut freed = FxHashSet::default();
        self.free_tree(node, &mut freed);
        if freed.is_empty() {
            return false;
        }
        for record in self.nodes.values_mut() {
            for destinations in record.routes.values_mut() {
                destinations.retain(|d| !freed.contains(&d.node()));
            }
            record.routes.retain(|_, destinations| !destinations.is_empty());
        }
        debug!(%node, freed = freed.len(), "released");
        true
    }

    fn free_tree(&mut self, node: NodeId, freed: &mut FxHashSet<NodeId>) {
        let Some(record) = self.nodes.remove(node) else {
            return;
        };
        freed.insert(node);
        self.scopes.forget(record.scope, node);
        match record.body {
            NodeBody::Builtin(_) => {}
            NodeBody::Proto(proto) => {
                for member in self.scopes.remove(proto.scope) {
                    self.free_tree(member, freed);
                }
            }
            NodeBody::Placeholder(placeholder) => {
                if let Some(upgraded) = placeholder.upgraded {
                    self.free_tree(upgraded, freed);
                }
            }
        }
    }

    /// Scene shutdown: waits for every outstanding EXTERNPROTO worker,
    /// applies what they produced, then shuts down every initialized node.
    pub fn shutdown(&mut self, timestamp: f64) {
        self.await_resolutions();
        self.resolver.join_all();
        let live: Vec<NodeId> = self.nodes.iter().map(|(id, _)| id).collect();
        for node in live {
            self.shutdown_node(node, timestamp);
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if self.config.join_on_drop {
            self.resolver.join_all();
        }
    }
}

impl NodeGraph for World {
    fn interfaces(&self, node: NodeId) -> Option<&InterfaceSet> {
        self.nodes.get(node).map(|r| r.ty.interfaces())
    }

    fn field_value(&self, node: NodeId, name: &str) -> Option<FieldValue> {
        self.field(node, name).ok()
    }
}

enum Built {
    Node(NodeBody),
    Redirected(Arc<NodeType>, NodeBody),
}

#[derive(Default)]
struct Effect {
    forward: Vec<Destination>,
    emit: Option<String>,
}

fn validate_initial(ty: &NodeType, initial: &InitialValues) -> Result<(), InterfaceError> {
    for (name, value) in initial {
        let interface = ty
            .interfaces()
            .find_field(name)
            .ok_or_else(|| InterfaceError::unsupported(ty.id(), Access::Field, name))?;
        value
            .expect_kind(interface.kind)
            .map_err(|source| InterfaceError::TypeMismatch {
                name: name.clone(),
                source,
            })?;
    }
    Ok(())
}

fn deliver_event_in(
    record: &mut NodeRecord,
    interface: &str,
    value: &FieldValue,
    timestamp: f64,
) -> Result<Effect, InterfaceError> {
    let unsupported = || InterfaceError::unsupported(record.ty.id(), Access::EventIn, interface);
    let mismatch = |source| InterfaceError::TypeMismatch {
        name: interface.to_owned(),
        source,
    };
    match &mut record.body {
        NodeBody::Builtin(builtin) => {
            let declared = record
                .ty
                .interfaces()
                .get(interface)
                .filter(|i| i.access.receives())
                .ok_or_else(unsupported)?;
            value.expect_kind(declared.kind).map_err(mismatch)?;
            if declared.access == Access::ExposedField {
                builtin.fields.insert(interface.to_owned(), value.clone());
                record.modified = true;
                return Ok(Effect {
                    forward: Vec::new(),
                    emit: Some(interface.to_owned()),
                });
            }
            builtin
                .last_events
                .insert(interface.to_owned(), (value.clone(), timestamp));
            Ok(Effect {
                forward: Vec::new(),
                emit: builtin.class.passthrough_target(interface).map(str::to_owned),
            })
        }
        NodeBody::Proto(proto) => {
            let received = proto
                .adapters
                .receive(interface, value, timestamp)
                .ok_or_else(unsupported)?
                .map_err(mismatch)?;
            Ok(Effect {
                forward: received.delegates,
                emit: received.exposed.then(|| interface.to_owned()),
            })
        }
        NodeBody::Placeholder(placeholder) => {
            let received = placeholder
                .adapters
                .receive(interface, value, timestamp)
                .ok_or_else(unsupported)?
                .map_err(mismatch)?;
            if received.exposed {
                placeholder.received.insert(interface.to_owned());
                if placeholder.upgraded.is_none() {
                    record.modified = true;
                }
            }
            Ok(Effect {
                forward: received.delegates,
                emit: received.exposed.then(|| interface.to_owned()),
            })
        }
    }
}

fn deliver_relay(
    record: &mut NodeRecord,
    interface: &str,
    value: &FieldValue,
) -> Result<Effect, InterfaceError> {
    let unsupported = || InterfaceError::unsupported(record.ty.id(), Access::EventOut, interface);
    let adapters = match &mut record.body {
        NodeBody::Builtin(_) => return Err(unsupported()),
        NodeBody::Proto(proto) => &mut proto.adapters,
        NodeBody::Placeholder(placeholder) => &mut placeholder.adapters,
    };
    adapters
        .relay(interface, value)
        .ok_or_else(unsupported)?
        .map_err(|source| InterfaceError::TypeMismatch {
            name: interface.to_owned(),
            source,
        })?;
    Ok(Effect {
        forward: Vec::new(),
        emit: Some(interface.to_owned()),
    })
}
