// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Class registry: builtin classes and PROTO templates by id.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::interface::{InterfaceError, InterfaceSet};
use crate::node_type::{BuiltinClass, NodeClass, NodeType};
use crate::template::TemplateModel;
use crate::world::World;

#[derive(Debug, Default)]
pub(crate) struct ClassRegistry {
    builtins: BTreeMap<String, Arc<BuiltinClass>>,
    protos: BTreeMap<String, Arc<TemplateModel>>,
}

impl World {
    /// Registers a builtin class under its id, replacing any earlier one.
    pub fn register_builtin(&mut self, class: Arc<BuiltinClass>) -> Option<Arc<BuiltinClass>> {
        self.classes
            .builtins
            .insert(class.id().to_owned(), class)
    }

    /// Builtin class registered as `id`.
    pub fn builtin_class(&self, id: &str) -> Option<&Arc<BuiltinClass>> {
        self.classes.builtins.get(id)
    }

    /// Full node type of the builtin class `id`.
    pub fn builtin_type(&self, id: &str) -> Option<Arc<NodeType>> {
        self.builtin_class(id).map(NodeType::builtin)
    }

    /// Registers a PROTO template under `id` (a document-qualified
    /// `url#Name` for external templates). The first registration of an id
    /// wins; the registered template is returned either way.
    pub fn register_proto(
        &mut self,
        id: impl Into<String>,
        model: Arc<TemplateModel>,
    ) -> Arc<TemplateModel> {
        let id = id.into();
        if let Some(existing) = self.classes.protos.get(&id) {
            debug!(%id, "PROTO already registered; keeping the existing class");
            return Arc::clone(existing);
        }
        debug!(%id, "registered PROTO");
        self.classes.protos.insert(id, Arc::clone(&model));
        model
    }

    /// Template registered as `id`, if any.
    pub fn find_existing_proto(&self, id: &str) -> Option<Arc<TemplateModel>> {
        self.classes.protos.get(id).cloned()
    }

    /// Creates a node type of `class` named `type_id` exposing `interfaces`.
    ///
    /// For builtin and PROTO classes every requested interface must exist in
    /// the class with the same access and kind. EXTERNPROTO classes accept
    /// any interface set while resolution is pending.
    pub fn create_type(
        &mut self,
        class: &NodeClass,
        type_id: &str,
        interfaces: &InterfaceSet,
    ) -> Result<Arc<NodeType>, InterfaceError> {
        match class {
            NodeClass::Builtin(builtin) => {
                for interface in interfaces.iter() {
                    if !builtin.interfaces().contains(interface) {
                        return Err(InterfaceError::unsupported(
                            builtin.id(),
                            interface.access,
                            &interface.name,
                        ));
                    }
                }
                Ok(NodeType::restricted(type_id, class.clone(), interfaces.clone()))
            }
            NodeClass::Proto(model) => NodeType::proto(model, type_id, interfaces),
            NodeClass::Extern(extern_class) => {
                self.create_extern_type(*extern_class, type_id, interfaces)
            }
        }
    }
}
