// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deep copy of a template body into the world.
//!
//! Every body node is cloned at most once per instance: the clone's slot is
//! reserved and memoized before its fields are copied, so self-references,
//! cycles and shared sub-graphs all come out with the same shape as the body.
use std::collections::BTreeMap;

use protoscene_values::{FieldValue, NodeId};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::interface::InterfaceError;
use crate::scope::ScopeId;
use crate::template::TemplateModel;
use crate::world::{InitialValues, World};

/// Result of cloning one instance.
pub(crate) struct Cloned {
    /// Clones of the body roots, in order.
    pub(crate) roots: Vec<NodeId>,
    /// Every public field and exposedField value.
    pub(crate) public: BTreeMap<String, FieldValue>,
}

pub(crate) struct ImplCloner<'a> {
    model: &'a TemplateModel,
    initial: &'a InitialValues,
    scope: ScopeId,
    memo: FxHashMap<NodeId, NodeId>,
}

impl<'a> ImplCloner<'a> {
    pub(crate) fn new(model: &'a TemplateModel, initial: &'a InitialValues, scope: ScopeId) -> Self {
        Self {
            model,
            initial,
            scope,
            memo: FxHashMap::default(),
        }
    }

    /// Clones the body roots, then the value of every public field. On
    /// failure every node this cloner created is released again.
    pub(crate) fn clone_instance(&mut self, world: &mut World) -> Result<Cloned, InterfaceError> {
        let result = self.clone_roots(world);
        if result.is_err() {
            self.discard(world);
        }
        result
    }

    fn clone_roots(&mut self, world: &mut World) -> Result<Cloned, InterfaceError> {
        let model = self.model;
        let roots = model
            .roots()
            .iter()
            .map(|&root| self.clone_node(world, root))
            .collect::<Result<Vec<_>, _>>()?;
        let mut public = BTreeMap::new();
        for interface in model.interfaces().iter().filter(|i| i.access.is_field()) {
            if let Some(value) = self.resolve_public(world, &interface.name)? {
                public.insert(interface.name.clone(), value);
            }
        }
        Ok(Cloned { roots, public })
    }

    /// Value of a public field for this instance: the caller's initial value
    /// as given, else the template default with its nodes cloned.
    fn resolve_public(
        &mut self,
        world: &mut World,
        name: &str,
    ) -> Result<Option<FieldValue>, InterfaceError> {
        if let Some(value) = self.initial.get(name) {
            return Ok(Some(value.clone()));
        }
        let model = self.model;
        match model.default_value(name) {
            Some(default) => self.clone_value(world, default).map(Some),
            None => Ok(None),
        }
    }

    fn clone_node(&mut self, world: &mut World, body_id: NodeId) -> Result<NodeId, InterfaceError> {
        if let Some(&done) = self.memo.get(&body_id) {
            return Ok(done);
        }
        let model = self.model;
        let body = model
            .body_node(body_id)
            .ok_or(InterfaceError::DeadNode(body_id))?;
        let id = world.nodes.reserve();
        self.memo.insert(body_id, id);
        trace!(body = %body_id, clone = %id, "cloning body node");

        let ty = body.node_type();
        let mut values = InitialValues::new();
        for interface in ty.interfaces().iter().filter(|i| i.access.is_field()) {
            let bound = model
                .is_sources(body_id, &interface.name)
                .find(|m| {
                    model
                        .interfaces()
                        .get(&m.public)
                        .is_some_and(|p| p.access.is_field())
                })
                .map(|m| m.public.clone());
            let value = match bound {
                Some(public) => {
                    let Some(value) = self.resolve_public(world, &public)? else {
                        continue;
                    };
                    value.expect_kind(interface.kind).map_err(|source| {
                        InterfaceError::TypeMismatch {
                            name: interface.name.clone(),
                            source,
                        }
                    })?;
                    value
                }
                None => match body.field(&interface.name) {
                    Some(explicit) => self.clone_value(world, explicit)?,
                    None => continue,
                },
            };
            values.insert(interface.name.clone(), value);
        }
        world.create_node_at(id, ty, self.scope, body.name(), values)?;
        Ok(id)
    }

    fn clone_value(&mut self, world: &mut World, value: &FieldValue) -> Result<FieldValue, InterfaceError> {
        value.try_map_nodes(|node| self.clone_node(world, node))
    }

    fn discard(&mut self, world: &mut World) {
        for (_, id) in self.memo.drain() {
            if !world.release(id) {
                world.nodes.unreserve(id);
            }
        }
    }
}
