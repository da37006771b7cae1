// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! protoscene-core: PROTO / EXTERNPROTO instantiation and event routing.
//!
//! A [`TemplateModel`] describes a PROTO: public interface, defaults, a body
//! sub-graph, internal routes and IS bindings. Creating a node of a PROTO
//! type in a [`World`] clones the body into a fresh scope, re-creates the
//! internal routes on the clones and wires the public interface onto them.
//! The resulting instance behaves like any other node: routes can target it,
//! events sent to it reach the bound internal nodes, and events the internal
//! nodes emit leave through it.
//!
//! EXTERNPROTO classes are resolved in the background by a
//! [`ResourceFetcher`] and a [`DocumentParser`]. Their nodes start as
//! placeholders and are upgraded when [`World::process_resolutions`] or
//! [`World::await_resolutions`] applies the result.
//!
//! Problems that do not fail an operation (a template route that cannot be
//! re-created, an IS binding that does not resolve, a failed resolution) are
//! logged through `tracing` and kept in the world's [`Diagnostics`].
#![forbid(unsafe_code)]

mod arena;
mod clone;
mod config;
mod diagnostics;
mod event;
mod externproto;
mod graph_view;
mod instance;
mod interface;
mod node_type;
mod path;
mod registry;
mod resolver;
mod scope;
mod template;
mod world;

pub use arena::NodeArena;
pub use config::{ConfigError, WorldConfig};
pub use diagnostics::{Diagnostic, DiagnosticId, DiagnosticSource, Diagnostics, Severity};
pub use event::{
    event_in_adapter, event_out_adapter, exposed_field_adapter, Adapter, Destination,
    EventEmitter, EventInAdapter, EventListener, EventOutAdapter, ExposedFieldAdapter,
    ProtoEventIn, ProtoEventOut, ProtoExposedField,
};
pub use externproto::{ExternClassId, ExternTypeId, ResolutionState};
pub use graph_view::NodeGraph;
pub use interface::{Access, DuplicateInterface, InterfaceError, InterfaceSet, NodeInterface};
pub use node_type::{BuiltinClass, BuiltinClassBuilder, NodeClass, NodeType};
pub use path::{compute_path, resolve_path, NodePath, PathElement, PathStep};
pub use resolver::{
    DocumentParser, FetchError, ParseError, ParsedDocument, ParsedTemplate, ResolveError,
    Resource, ResourceFetcher,
};
pub use scope::ScopeId;
pub use template::{
    BodyNode, DefinitionError, IsMapping, ProtoRoute, TemplateBuilder, TemplateModel,
};
pub use world::{InitialValues, RouteError, World};

pub use protoscene_values as values;
