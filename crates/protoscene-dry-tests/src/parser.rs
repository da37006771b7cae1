// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON template documents and a [`DocumentParser`] for them.
//!
//! The format mirrors a PROTO declaration one to one:
//!
//! ```json
//! { "protos": [ {
//!     "name": "Blinker",
//!     "interface": [
//!       { "access": "exposedField", "kind": "SFFloat", "name": "level",
//!         "default": { "SfFloat": 0.5 } } ],
//!     "body": [ { "def": "H", "type": "Holder" } ],
//!     "roots": [ "H" ],
//!     "routes": [],
//!     "is": [ { "public": "level", "node": "H", "interface": "value" } ]
//! } ] }
//! ```
//!
//! Values are serialized [`FieldValue`]s, except node values, which are
//! written as `{ "nodes": ["DEF", ...] }` and resolved against the body.
//! Body node types are catalog classes or PROTOs defined earlier in the
//! same document.

use std::collections::BTreeMap;
use std::sync::Arc;

use protoscene_core::{
    Access, DocumentParser, NodeInterface, NodeType, ParseError, ParsedTemplate, Resource,
    TemplateBuilder, TemplateModel,
};
use protoscene_values::{FieldValue, MfNode, NodeId, SfNode, ValueKind};
use serde::{Deserialize, Serialize};

use crate::classes::Catalog;

/// A whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentSpec {
    /// PROTOs in document order.
    pub protos: Vec<ProtoSpec>,
}

/// One PROTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtoSpec {
    /// PROTO name.
    pub name: String,
    /// Public interface.
    #[serde(default)]
    pub interface: Vec<InterfaceSpec>,
    /// Body nodes.
    pub body: Vec<NodeSpec>,
    /// DEF names of the root nodes.
    pub roots: Vec<String>,
    /// Internal routes.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    /// IS bindings.
    #[serde(default)]
    pub is: Vec<IsSpec>,
}

/// One public interface declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceSpec {
    /// Access type.
    pub access: Access,
    /// Scene-language kind name (`"SFFloat"`).
    pub kind: String,
    /// Interface name.
    pub name: String,
    /// Default for fields and exposedFields.
    #[serde(default)]
    pub default: Option<ValueSpec>,
}

/// A value as written in a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    /// Body nodes by DEF name.
    Nodes {
        /// DEF names.
        nodes: Vec<String>,
    },
    /// Any other value.
    Value(FieldValue),
}

/// One body node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    /// DEF name; required for nodes referenced elsewhere.
    #[serde(default)]
    pub def: Option<String>,
    /// Class or PROTO name.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Explicit field values.
    #[serde(default)]
    pub fields: BTreeMap<String, ValueSpec>,
}

/// One internal route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RouteSpec {
    /// Source DEF name.
    pub from: String,
    /// eventOut on `from`.
    pub event_out: String,
    /// Destination DEF name.
    pub to: String,
    /// eventIn on `to`.
    pub event_in: String,
}

/// One IS binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsSpec {
    /// Public interface.
    pub public: String,
    /// Body node DEF name.
    pub node: String,
    /// Interface on that node.
    pub interface: String,
}

/// [`DocumentParser`] for [`DocumentSpec`] JSON.
#[derive(Debug, Clone)]
pub struct JsonDocumentParser {
    catalog: Catalog,
}

impl JsonDocumentParser {
    /// Parser resolving body types against `catalog`.
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Parses `text` as the document at `url`.
    pub fn parse_str(&self, url: &str, text: &str) -> Result<Vec<ParsedTemplate>, ParseError> {
        let error = |message: String| ParseError {
            url: url.to_owned(),
            message,
        };
        let document: DocumentSpec =
            serde_json::from_str(text).map_err(|e| error(e.to_string()))?;
        let mut parsed: Vec<ParsedTemplate> = Vec::with_capacity(document.protos.len());
        for proto in &document.protos {
            let model = self
                .build(proto, &parsed)
                .map_err(|message| error(format!("PROTO {}: {message}", proto.name)))?;
            parsed.push(ParsedTemplate {
                name: proto.name.clone(),
                model,
            });
        }
        Ok(parsed)
    }

    fn node_type(&self, name: &str, earlier: &[ParsedTemplate]) -> Result<Arc<NodeType>, String> {
        if let Some(ty) = self.catalog.node_type(name) {
            return Ok(ty);
        }
        earlier
            .iter()
            .find(|t| t.name == name)
            .map(|t| NodeType::proto_full(&t.model))
            .ok_or_else(|| format!("unknown node type `{name}`"))
    }

    fn build(&self, proto: &ProtoSpec, earlier: &[ParsedTemplate]) -> Result<Arc<TemplateModel>, String> {
        let mut b = TemplateBuilder::new(proto.name.clone());
        let mut names: BTreeMap<&str, NodeId> = BTreeMap::new();
        let mut nodes = Vec::with_capacity(proto.body.len());
        for spec in &proto.body {
            let ty = self.node_type(&spec.node_type, earlier)?;
            let id = b.node(&ty, spec.def.as_deref());
            if let Some(def) = &spec.def {
                names.insert(def, id);
            }
            nodes.push((id, ty));
        }
        let lookup = |def: &str| {
            names
                .get(def)
                .copied()
                .ok_or_else(|| format!("no body node DEF `{def}`"))
        };

        for interface in &proto.interface {
            let kind = ValueKind::from_name(&interface.kind).map_err(|e| e.to_string())?;
            let default = interface
                .default
                .as_ref()
                .map(|value| resolve(value, kind, &lookup))
                .transpose()?;
            b.declare(NodeInterface::new(interface.access, kind, interface.name.clone()), default)
                .map_err(|e| e.to_string())?;
        }
        for (spec, (id, ty)) in proto.body.iter().zip(&nodes) {
            for (name, value) in &spec.fields {
                let kind = ty
                    .interfaces()
                    .find_field(name)
                    .map(|i| i.kind)
                    .ok_or_else(|| format!("{} has no field `{name}`", spec.node_type))?;
                let value = resolve(value, kind, &lookup)?;
                b.set_field(*id, name, value).map_err(|e| e.to_string())?;
            }
        }
        for root in &proto.roots {
            b.root(lookup(root)?).map_err(|e| e.to_string())?;
        }
        for route in &proto.routes {
            b.route(lookup(&route.from)?, &route.event_out, lookup(&route.to)?, &route.event_in)
                .map_err(|e| e.to_string())?;
        }
        for binding in &proto.is {
            b.is(&binding.public, lookup(&binding.node)?, &binding.interface)
                .map_err(|e| e.to_string())?;
        }
        b.build().map(Arc::new).map_err(|e| e.to_string())
    }
}

fn resolve(
    value: &ValueSpec,
    kind: ValueKind,
    lookup: &impl Fn(&str) -> Result<NodeId, String>,
) -> Result<FieldValue, String> {
    match value {
        ValueSpec::Value(value) => Ok(value.clone()),
        ValueSpec::Nodes { nodes } => {
            let ids = nodes
                .iter()
                .map(|def| lookup(def))
                .collect::<Result<Vec<_>, _>>()?;
            match (kind, ids.as_slice()) {
                (ValueKind::MfNode, _) => Ok(MfNode(ids).into()),
                (ValueKind::SfNode, []) => Ok(SfNode(None).into()),
                (ValueKind::SfNode, [one]) => Ok(SfNode(Some(*one)).into()),
                (ValueKind::SfNode, _) => Err("SFNode takes at most one node".to_owned()),
                (other, _) => Err(format!("node list given for a {other} value")),
            }
        }
    }
}

impl DocumentParser for JsonDocumentParser {
    fn parse(&self, resource: &Resource) -> Result<Vec<ParsedTemplate>, ParseError> {
        let text = std::str::from_utf8(&resource.bytes).map_err(|e| ParseError {
            url: resource.url.clone(),
            message: e.to_string(),
        })?;
        self.parse_str(&resource.url, text)
    }
}

/// A two-PROTO library document:
///
/// - `Blinker`: `exposedField SFFloat level 0.5` IS a Holder's `value`,
///   `eventIn SFFloat set_fraction` IS a Relay's `set_value` and
///   `eventOut SFFloat fraction_changed` IS its `value_changed`.
/// - `Pair`: two Blinkers side by side, `level` forwarded to the first one.
pub fn library_document() -> String {
    serde_json::json!({
        "protos": [
            {
                "name": "Blinker",
                "interface": [
                    { "access": "exposedField", "kind": "SFFloat", "name": "level",
                      "default": { "SfFloat": 0.5 } },
                    { "access": "eventIn", "kind": "SFFloat", "name": "set_fraction" },
                    { "access": "eventOut", "kind": "SFFloat", "name": "fraction_changed" }
                ],
                "body": [
                    { "def": "H", "type": "Holder" },
                    { "def": "R", "type": "Relay" }
                ],
                "roots": ["H", "R"],
                "routes": [
                    { "from": "R", "eventOut": "value_changed", "to": "H", "eventIn": "set_value" }
                ],
                "is": [
                    { "public": "level", "node": "H", "interface": "value" },
                    { "public": "set_fraction", "node": "R", "interface": "set_value" },
                    { "public": "fraction_changed", "node": "R", "interface": "value_changed" }
                ]
            },
            {
                "name": "Pair",
                "interface": [
                    { "access": "exposedField", "kind": "SFFloat", "name": "level",
                      "default": { "SfFloat": 0.75 } }
                ],
                "body": [
                    { "def": "G", "type": "Group", "fields": { "children": { "nodes": ["L", "R"] } } },
                    { "def": "L", "type": "Blinker" },
                    { "def": "R", "type": "Blinker" }
                ],
                "roots": ["G"],
                "is": [ { "public": "level", "node": "L", "interface": "level" } ]
            }
        ]
    })
    .to_string()
}
