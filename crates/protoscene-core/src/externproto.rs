// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! EXTERNPROTO classes, their placeholder nodes, and upgrades.
//!
//! Declaring an EXTERNPROTO starts a background resolution (unless a
//! template for one of its URLs is already registered). Until it finishes,
//! nodes of the class are placeholders: they keep their initial values and
//! exposedField state, and accept routes on their declared interface. When
//! the resolution is applied, each type of the class is resolved once and
//! each pending placeholder is upgraded exactly once to a real instance that
//! it then forwards to.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use protoscene_values::{FieldValue, NodeId};
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticSource, Severity};
use crate::event::AdapterSet;
use crate::interface::{Access, InterfaceError, InterfaceSet};
use crate::node_type::{NodeClass, NodeType};
use crate::resolver::{absolutize, split_fragment, Outcome, ParsedDocument, ResolveError};
use crate::template::TemplateModel;
use crate::world::{InitialValues, NodeBody, World};

/// Handle to an EXTERNPROTO class declared in a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternClassId(pub(crate) u32);

impl fmt::Display for ExternClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extern#{}", self.0)
    }
}

/// Slot of one node type created from an EXTERNPROTO class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternTypeId(pub(crate) u32);

/// Where an EXTERNPROTO class stands.
#[derive(Debug, Clone)]
pub enum ResolutionState {
    /// A worker is fetching the document.
    Pending,
    /// The template was found; new nodes are real instances.
    Resolved(Arc<TemplateModel>),
    /// Resolution failed; placeholders stay placeholders.
    Failed(ResolveError),
}

impl ResolutionState {
    /// `true` while waiting for the worker.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
struct ExternClass {
    id: String,
    uris: Vec<String>,
    state: ResolutionState,
    types: Vec<ExternTypeId>,
}

#[derive(Debug)]
struct ExternType {
    id: String,
    interfaces: InterfaceSet,
    resolved: Option<Arc<NodeType>>,
    pending: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct ExternTable {
    classes: Vec<ExternClass>,
    types: Vec<ExternType>,
}

impl ExternTable {
    fn class(&self, id: ExternClassId) -> Option<&ExternClass> {
        self.classes.get(id.0 as usize)
    }

    fn class_mut(&mut self, id: ExternClassId) -> Option<&mut ExternClass> {
        self.classes.get_mut(id.0 as usize)
    }

    fn slot_mut(&mut self, slot: ExternTypeId) -> Option<&mut ExternType> {
        self.types.get_mut(slot.0 as usize)
    }

    /// Resolved PROTO type behind a placeholder type, once known.
    pub(crate) fn resolved_type(&self, ty: &NodeType) -> Option<Arc<NodeType>> {
        let slot = ty.placeholder_slot()?;
        self.types.get(slot.0 as usize)?.resolved.clone()
    }
}

/// State of a node whose EXTERNPROTO has not produced an instance.
#[derive(Debug)]
pub(crate) struct PlaceholderNode {
    /// Values the node was created with, plus later `set_field` writes.
    pub(crate) initial: InitialValues,
    /// Field (not exposedField) values.
    pub(crate) values: BTreeMap<String, FieldValue>,
    pub(crate) adapters: AdapterSet,
    /// exposedFields that received events before the upgrade.
    pub(crate) received: BTreeSet<String>,
    pub(crate) initialized_at: Option<f64>,
    pub(crate) upgraded: Option<NodeId>,
}

impl PlaceholderNode {
    pub(crate) fn value(&self, name: &str) -> Option<FieldValue> {
        self.adapters
            .value(name)
            .or_else(|| self.values.get(name).cloned())
    }

    pub(crate) fn buffer_field(&mut self, name: &str, value: FieldValue) {
        if self.adapters.set_exposed(name, &value).is_none() {
            self.values.insert(name.to_owned(), value.clone());
        }
        self.initial.insert(name.to_owned(), value);
    }

    /// Initial values for the upgrade: creation values, field writes and
    /// exposedField events received meanwhile.
    fn upgrade_values(&self) -> InitialValues {
        let mut values = self.initial.clone();
        for name in &self.received {
            if let Some(value) = self.adapters.value(name) {
                values.insert(name.clone(), value);
            }
        }
        values
    }
}

impl World {
    /// Declares an EXTERNPROTO named `id` with candidate `uris`, made
    /// absolute against the configured base URL.
    ///
    /// If a template is already registered under one of the candidates the
    /// class is resolved immediately; otherwise a background worker starts.
    pub fn declare_extern_proto<I, S>(&mut self, id: &str, uris: I) -> ExternClassId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base = self.config.base_url.clone();
        let uris: Vec<String> = uris
            .into_iter()
            .map(|uri| absolutize(base.as_deref(), uri.as_ref()))
            .collect();
        let class = ExternClassId(u32::try_from(self.externs.classes.len()).unwrap_or(u32::MAX));

        let state = match uris.iter().find_map(|uri| self.find_existing_proto(uri)) {
            Some(model) => {
                debug!(%class, id, "EXTERNPROTO reuses a registered PROTO");
                ResolutionState::Resolved(model)
            }
            None => match self.resolver.spawn(class, id, uris.clone()) {
                Ok(()) => {
                    debug!(%class, id, candidates = uris.len(), "EXTERNPROTO resolution started");
                    ResolutionState::Pending
                }
                Err(e) => {
                    self.report(
                        Severity::Error,
                        DiagnosticSource::Resolution,
                        format!("EXTERNPROTO {id}: {e}"),
                    );
                    ResolutionState::Failed(e)
                }
            },
        };
        self.externs.classes.push(ExternClass {
            id: id.to_owned(),
            uris,
            state,
            types: Vec::new(),
        });
        class
    }

    /// Current state of an EXTERNPROTO class.
    pub fn resolution_state(&self, class: ExternClassId) -> Option<&ResolutionState> {
        self.externs.class(class).map(|c| &c.state)
    }

    pub(crate) fn create_extern_type(
        &mut self,
        class: ExternClassId,
        type_id: &str,
        interfaces: &InterfaceSet,
    ) -> Result<Arc<NodeType>, InterfaceError> {
        let slot = ExternTypeId(u32::try_from(self.externs.types.len()).unwrap_or(u32::MAX));
        let entry = self
            .externs
            .class(class)
            .ok_or_else(|| InterfaceError::UnknownClass(class.to_string()))?;
        let resolved = match &entry.state {
            ResolutionState::Resolved(model) => Some(NodeType::proto(model, type_id, interfaces)?),
            ResolutionState::Pending | ResolutionState::Failed(_) => None,
        };
        self.externs.types.push(ExternType {
            id: type_id.to_owned(),
            interfaces: interfaces.clone(),
            resolved,
            pending: Vec::new(),
        });
        if let Some(entry) = self.externs.class_mut(class) {
            entry.types.push(slot);
        }
        Ok(NodeType::placeholder(
            class,
            slot,
            type_id.to_owned(),
            interfaces.clone(),
        ))
    }

    pub(crate) fn build_placeholder(
        &mut self,
        id: NodeId,
        ty: &NodeType,
        initial_values: InitialValues,
    ) -> PlaceholderNode {
        let adapters = AdapterSet::for_interfaces(ty.interfaces(), |name, kind| {
            initial_values
                .get(name)
                .cloned()
                .unwrap_or_else(|| FieldValue::default_for(kind))
        });
        let values = ty
            .interfaces()
            .iter()
            .filter(|i| i.access == Access::Field)
            .map(|i| {
                let value = initial_values
                    .get(&i.name)
                    .cloned()
                    .unwrap_or_else(|| FieldValue::default_for(i.kind));
                (i.name.clone(), value)
            })
            .collect();

        let pending = match ty.class() {
            NodeClass::Extern(class) => self
                .externs
                .class(*class)
                .is_some_and(|c| c.state.is_pending()),
            _ => false,
        };
        if pending {
            if let Some(slot) = ty.placeholder_slot().and_then(|s| self.externs.slot_mut(s)) {
                slot.pending.push(id);
            }
        }
        PlaceholderNode {
            initial: initial_values,
            values,
            adapters,
            received: BTreeSet::new(),
            initialized_at: None,
            upgraded: None,
        }
    }

    /// The instance a placeholder was upgraded to.
    pub fn upgraded_node(&self, node: NodeId) -> Option<NodeId> {
        match &self.nodes.get(node)?.body {
            NodeBody::Placeholder(placeholder) => placeholder.upgraded,
            NodeBody::Builtin(_) | NodeBody::Proto(_) => None,
        }
    }

    /// Applies every resolution that has finished, without blocking.
    /// Returns how many were applied.
    pub fn process_resolutions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(outcome) = self.resolver.try_next() {
            self.apply_resolution(outcome);
            applied += 1;
        }
        self.resolver.reap();
        applied
    }

    /// Waits for every outstanding resolution and applies it.
    pub fn await_resolutions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(outcome) = self.resolver.next_blocking() {
            self.apply_resolution(outcome);
            applied += 1;
        }
        self.resolver.reap();
        applied
    }

    /// Resolutions not yet applied.
    pub fn outstanding_resolutions(&self) -> usize {
        self.resolver.outstanding()
    }

    fn apply_resolution(&mut self, outcome: Outcome) {
        let Outcome { class, result } = outcome;
        let Some(entry) = self.externs.class(class) else {
            return;
        };
        let id = entry.id.clone();
        let uris = entry.uris.clone();
        match result.and_then(|document| self.select_template(&uris, document)) {
            Ok(model) => {
                info!(%class, id, template = model.id(), "EXTERNPROTO resolved");
                if let Some(entry) = self.externs.class_mut(class) {
                    entry.state = ResolutionState::Resolved(Arc::clone(&model));
                }
                self.upgrade_class(class, &model);
            }
            Err(e) => {
                let slots = match self.externs.class_mut(class) {
                    Some(entry) => {
                        entry.state = ResolutionState::Failed(e.clone());
                        entry.types.clone()
                    }
                    None => Vec::new(),
                };
                for slot in slots {
                    if let Some(ty) = self.externs.slot_mut(slot) {
                        ty.pending.clear();
                    }
                }
                self.report(
                    Severity::Error,
                    DiagnosticSource::Resolution,
                    format!("EXTERNPROTO {id}: {e}"),
                );
            }
        }
    }

    /// Registers every template of `document` and picks the one the
    /// candidates name: the fragment's template, or the first one when the
    /// candidate has no fragment.
    fn select_template(
        &mut self,
        uris: &[String],
        document: ParsedDocument,
    ) -> Result<Arc<TemplateModel>, ResolveError> {
        let ParsedDocument { url, templates } = document;
        let mut registered = Vec::with_capacity(templates.len());
        for template in templates {
            let model = self.register_proto(format!("{url}#{}", template.name), template.model);
            registered.push((template.name, model));
        }
        if let Some((_, first)) = registered.first() {
            self.register_proto(url.clone(), Arc::clone(first));
        }

        let (document_url, _) = split_fragment(&url);
        let same_document: Vec<&String> = uris
            .iter()
            .filter(|uri| split_fragment(uri).0 == document_url)
            .collect();
        let candidates = if same_document.is_empty() {
            uris.iter().collect()
        } else {
            same_document
        };
        candidates
            .into_iter()
            .find_map(|uri| match split_fragment(uri).1 {
                Some(name) => registered.iter().find(|(n, _)| *n == name),
                None => registered.first(),
            })
            .map(|(_, model)| Arc::clone(model))
            .ok_or(ResolveError::NoTemplate { url })
    }

    fn upgrade_class(&mut self, class: ExternClassId, model: &Arc<TemplateModel>) {
        let slots = self
            .externs
            .class(class)
            .map(|c| c.types.clone())
            .unwrap_or_default();
        for slot in slots {
            let Some(entry) = self.externs.slot_mut(slot) else {
                continue;
            };
            let pending = std::mem::take(&mut entry.pending);
            let resolved = match NodeType::proto(model, entry.id.clone(), &entry.interfaces) {
                Ok(resolved) => resolved,
                Err(e) => {
                    let type_id = entry.id.clone();
                    self.report(
                        Severity::Error,
                        DiagnosticSource::Resolution,
                        format!("EXTERNPROTO type {type_id} does not match {}: {e}", model.id()),
                    );
                    continue;
                }
            };
            entry.resolved = Some(Arc::clone(&resolved));
            for node in pending {
                self.upgrade_placeholder(node, &resolved);
            }
        }
    }

    fn upgrade_placeholder(&mut self, node: NodeId, resolved: &Arc<NodeType>) {
        let Some(record) = self.nodes.get_mut(node) else {
            debug!(%node, "placeholder released before its upgrade");
            return;
        };
        let scope = record.scope;
        let NodeBody::Placeholder(placeholder) = &mut record.body else {
            return;
        };
        if placeholder.upgraded.is_some() {
            return;
        }
        let values = placeholder.upgrade_values();
        let initialized_at = placeholder.initialized_at;

        let upgraded = match self.create_node(resolved, scope, values) {
            Ok(upgraded) => upgraded,
            Err(e) => {
                self.report(
                    Severity::Error,
                    DiagnosticSource::Resolution,
                    format!("placeholder {node} could not be upgraded to {}: {e}", resolved.id()),
                );
                return;
            }
        };

        let Some(record) = self.nodes.get_mut(node) else {
            return;
        };
        let interfaces = record.ty.interfaces().clone();
        let NodeBody::Placeholder(placeholder) = &mut record.body else {
            return;
        };
        placeholder.upgraded = Some(upgraded);
        let mut adapters = std::mem::take(&mut placeholder.adapters);
        for public in interfaces.iter().filter(|i| i.access != Access::Field) {
            if let Err(e) = self.bind(node, public, upgraded, &public.name, &mut adapters) {
                self.report(
                    Severity::Warn,
                    DiagnosticSource::Resolution,
                    format!("placeholder {node}.{}: {e}", public.name),
                );
            }
        }
        if let Some(NodeBody::Placeholder(placeholder)) = self.nodes.get_mut(node).map(|r| &mut r.body) {
            placeholder.adapters = adapters;
        }
        debug!(placeholder = %node, %upgraded, "placeholder upgraded");
        if let Some(timestamp) = initialized_at {
            self.initialize(upgraded, timestamp);
        }
    }
}
