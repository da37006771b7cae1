// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for protoscene crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`classes`] - Builtin node classes (Group, Transform, Holder, Relay, ...)
//! - [`fetcher`] - In-memory, optionally gated resource fetcher
//! - [`parser`] - JSON template documents and their parser
//! - [`templates`] - PROTO fixtures built in code

pub mod classes;
pub mod fetcher;
pub mod parser;
pub mod templates;

pub use classes::Catalog;
pub use fetcher::{Gate, MemoryFetcher};
pub use parser::{library_document, DocumentSpec, JsonDocumentParser};
pub use templates::{broken_routes, nested, self_referencing, shared_child, spinner};
