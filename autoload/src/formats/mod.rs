//! Format normalizer
//!
//! Converts one foreign export document into the canonical collection tree
//! plus side artifacts (plugins, embedded environments).
//!
//! ## Supported formats
//!
//! | Tag        | Module       | Output                         |
//! |------------|--------------|--------------------------------|
//! | `native`   | [`native`]   | tree + environments + plugins  |
//! | `Postman`  | [`postman`]  | v1: tree, v2: tree + plugins   |
//! | `Insomnia` | [`insomnia`] | tree + environments            |
//! | `OpenAPI`  | [`openapi`]  | tree                           |
//!
//! Identifiers in the output are document-scoped. Run the result through
//! [`crate::remap`] before merging it into a live workspace.

pub mod insomnia;
pub mod native;
pub mod openapi;
pub mod postman;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{node_count, CollectionItem, Environment, ImportFormat, Plugin, RawFile};

/// Output of normalizing one source document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedImport {
    pub tree: Vec<CollectionItem>,
    pub plugins: Vec<Plugin>,
    pub environments: Vec<Environment>,
}

impl NormalizedImport {
    pub fn from_tree(tree: Vec<CollectionItem>) -> Self {
        Self {
            tree,
            ..Default::default()
        }
    }

    pub fn node_count(&self) -> usize {
        node_count(&self.tree)
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty() && self.plugins.is_empty() && self.environments.is_empty()
    }
}

/// Normalize one raw file in the given format
///
/// Unknown formats yield an empty result and a warning. Structurally invalid
/// documents fail with `MalformedDocument`.
pub fn normalize(
    file: &RawFile,
    format: &ImportFormat,
    workspace_id: &str,
) -> Result<NormalizedImport> {
    let mut result = match format {
        ImportFormat::Native => native::convert(&file.to_value()?)?,
        ImportFormat::Postman => postman::convert(&file.to_value()?)?,
        ImportFormat::Insomnia => insomnia::convert(&file.to_value()?)?,
        // The OpenAPI parser works on text, so structured content is re-serialized
        ImportFormat::OpenApi => openapi::convert(&file.to_text())?,
        ImportFormat::Other(tag) => {
            warn!(file = %file.name, format = %tag, "Unsupported import format, skipping");
            return Ok(NormalizedImport::default());
        }
    };

    for root in &mut result.tree {
        root.walk_mut(&mut |item| item.workspace_id = Some(workspace_id.to_string()));
    }

    debug!(
        file = %file.name,
        format = %format,
        nodes = result.node_count(),
        plugins = result.plugins.len(),
        environments = result.environments.len(),
        "Normalized document"
    );

    Ok(result)
}

// ============================================================================
// Shared helpers for the format modules
// ============================================================================

/// Sequential ids scoped to one document, for nodes that arrive without one
pub(crate) struct ScopedIds {
    prefix: &'static str,
    next: u64,
}

impl ScopedIds {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub(crate) fn next(&mut self) -> String {
        self.next += 1;
        format!("{}-{}", self.prefix, self.next)
    }

    /// Use the document's own id when present
    pub(crate) fn or_next(&mut self, existing: Option<&str>) -> String {
        match existing {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.next(),
        }
    }
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
