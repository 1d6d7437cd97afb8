//! Native export format
//!
//! The application's own export is a flat list of items linked by `parentId`:
//!
//! ```json
//! {
//!   "exportedFrom": "Restfox-0.x",
//!   "collection": [
//!     { "_id": "g1", "_type": "request_group", "name": "Users", "parentId": null },
//!     { "_id": "r1", "_type": "request", "name": "List", "parentId": "g1", "url": "..." }
//!   ],
//!   "environments": [ { "name": "Local", "environment": { "host": "localhost" } } ],
//!   "plugins": []
//! }
//! ```
//!
//! A bare item array is accepted as well.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::NormalizedImport;
use crate::error::{AutoLoadError, Result};
use crate::types::{CollectionItem, Environment, KeyValue, Plugin, RequestBody, RequestSpec};

const FORMAT: &str = "native";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeExport {
    collection: Vec<NativeItem>,
    #[serde(default)]
    environments: Vec<Environment>,
    #[serde(default)]
    plugins: Vec<Plugin>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: Vec<KeyValue>,
    #[serde(default)]
    parameters: Vec<KeyValue>,
    #[serde(default)]
    body: Option<NativeBody>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    sort_order: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeBody {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    params: Vec<KeyValue>,
}

pub fn convert(document: &Value) -> Result<NormalizedImport> {
    let export = if document.is_array() {
        let collection: Vec<NativeItem> = serde_json::from_value(document.clone())
            .map_err(|e| AutoLoadError::malformed(FORMAT, e.to_string()))?;
        NativeExport {
            collection,
            environments: Vec::new(),
            plugins: Vec::new(),
        }
    } else {
        serde_json::from_value::<NativeExport>(document.clone())
            .map_err(|e| AutoLoadError::malformed(FORMAT, e.to_string()))?
    };

    let tree = build_tree(export.collection);

    Ok(NormalizedImport {
        tree,
        plugins: export.plugins,
        environments: export.environments,
    })
}

/// Rebuild the nested tree from the flat item list
fn build_tree(items: Vec<NativeItem>) -> Vec<CollectionItem> {
    let items: Vec<NativeItem> = items
        .into_iter()
        .filter(|item| match item.kind.as_str() {
            "request_group" | "request" => true,
            other => {
                debug!(kind = other, name = %item.name, "Skipping unsupported native item");
                false
            }
        })
        .collect();

    let group_ids: HashSet<&str> = items
        .iter()
        .filter(|item| item.kind == "request_group")
        .filter_map(|item| item.id.as_deref())
        .collect();

    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match item.parent_id.as_deref() {
            Some(parent) if group_ids.contains(parent) && item.id.as_deref() != Some(parent) => {
                children.entry(parent).or_default().push(idx);
            }
            _ => roots.push(idx),
        }
    }

    let mut visited = vec![false; items.len()];
    let mut tree = Vec::new();
    for idx in sorted(&items, roots) {
        if let Some(node) = build_node(&items, idx, &children, &mut visited) {
            tree.push(node);
        }
    }

    // Items caught in a parent cycle never hang off a root; keep them at the top level
    for idx in 0..items.len() {
        if !visited[idx] {
            if let Some(node) = build_node(&items, idx, &children, &mut visited) {
                tree.push(node);
            }
        }
    }

    // A root keeps its parentId only when that parent lives outside this document
    let known_ids: HashSet<&str> = items.iter().filter_map(|item| item.id.as_deref()).collect();
    for root in &mut tree {
        if root.parent_id.as_deref().is_some_and(|p| known_ids.contains(p)) {
            debug!(name = %root.name, "Parent cannot hold this item, promoting to root");
            root.parent_id = None;
        }
    }

    tree
}

fn sorted(items: &[NativeItem], mut indices: Vec<usize>) -> Vec<usize> {
    indices.sort_by(|a, b| {
        let a = items[*a].sort_order.unwrap_or(f64::MAX);
        let b = items[*b].sort_order.unwrap_or(f64::MAX);
        a.total_cmp(&b)
    });
    indices
}

fn build_node(
    items: &[NativeItem],
    idx: usize,
    children: &HashMap<&str, Vec<usize>>,
    visited: &mut [bool],
) -> Option<CollectionItem> {
    if visited[idx] {
        return None;
    }
    visited[idx] = true;

    let item = &items[idx];
    let mut node = if item.kind == "request_group" {
        CollectionItem::folder(item.id.clone(), item.name.clone())
    } else {
        CollectionItem::request(item.id.clone(), item.name.clone(), request_spec(item))
    };
    node.parent_id = item.parent_id.clone();
    node.description = item.description.clone();

    if let Some(child_indices) = item.id.as_deref().and_then(|id| children.get(id)) {
        for child_idx in sorted(items, child_indices.clone()) {
            if let Some(child) = build_node(items, child_idx, children, visited) {
                node.push_child(child);
            }
        }
    }

    Some(node)
}

fn request_spec(item: &NativeItem) -> RequestSpec {
    let body = item.body.as_ref().and_then(|body| {
        let mime_type = body.mime_type.clone()?;
        if mime_type == "No Body" {
            return None;
        }
        Some(RequestBody {
            mime_type,
            text: body.text.clone(),
            params: body.params.clone(),
        })
    });

    RequestSpec {
        method: item.method.clone().unwrap_or_else(|| "GET".to_string()),
        url: item.url.clone().unwrap_or_default(),
        headers: item.headers.clone(),
        parameters: item.parameters.clone(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind;
    use serde_json::json;

    #[test]
    fn test_flat_list_becomes_tree() {
        let doc = json!({
            "exportedFrom": "Restfox-0.30.0",
            "collection": [
                { "_id": "r2", "_type": "request", "name": "Get user", "parentId": "g1",
                  "method": "GET", "url": "/users/1", "sortOrder": 2 },
                { "_id": "g1", "_type": "request_group", "name": "Users", "parentId": null },
                { "_id": "r1", "_type": "request", "name": "List users", "parentId": "g1",
                  "method": "GET", "url": "/users", "sortOrder": 1 },
                { "_id": "r3", "_type": "request", "name": "Ping", "url": "/ping" }
            ]
        });

        let result = convert(&doc).unwrap();
        assert_eq!(result.tree.len(), 2);

        let users = &result.tree[0];
        assert_eq!(users.kind, ItemKind::Folder);
        assert_eq!(users.children.len(), 2);
        assert_eq!(users.children[0].name, "List users");
        assert_eq!(users.children[1].parent_id.as_deref(), Some("g1"));

        let ping = &result.tree[1];
        assert_eq!(ping.request.as_ref().unwrap().method, "GET");
    }

    #[test]
    fn test_embedded_environments_surfaced() {
        let doc = json!({
            "collection": [ { "_id": "r1", "_type": "request", "name": "A", "url": "/a" } ],
            "environments": [
                { "name": "Default", "environment": { "base": "http://localhost" },
                  "color": "#ff0000" }
            ]
        });

        let result = convert(&doc).unwrap();
        assert_eq!(result.environments.len(), 1);
        assert_eq!(result.environments[0].variables["base"], "http://localhost");
        assert_eq!(result.environments[0].color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn test_orphan_keeps_external_parent() {
        let doc = json!([
            { "_id": "r1", "_type": "request", "name": "A", "parentId": "outside", "url": "/a" }
        ]);

        let result = convert(&doc).unwrap();
        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree[0].parent_id.as_deref(), Some("outside"));
    }

    #[test]
    fn test_parent_cycle_does_not_lose_items() {
        let doc = json!([
            { "_id": "a", "_type": "request_group", "name": "A", "parentId": "b" },
            { "_id": "b", "_type": "request_group", "name": "B", "parentId": "a" }
        ]);

        let result = convert(&doc).unwrap();
        assert_eq!(result.node_count(), 2);

        let root = &result.tree[0];
        assert_eq!(root.parent_id, None);
        assert_eq!(root.children[0].parent_id, root.id);
    }

    #[test]
    fn test_item_under_request_promoted_to_root() {
        let doc = json!([
            { "_id": "r1", "_type": "request", "name": "A", "url": "/a" },
            { "_id": "r2", "_type": "request", "name": "B", "parentId": "r1", "url": "/b" }
        ]);

        let result = convert(&doc).unwrap();
        assert_eq!(result.tree.len(), 2);
        assert_eq!(result.tree[1].name, "B");
        assert_eq!(result.tree[1].parent_id, None);
    }

    #[test]
    fn test_no_body_marker_dropped() {
        let doc = json!([
            { "_id": "r1", "_type": "request", "name": "A", "url": "/a",
              "body": { "mimeType": "No Body" } },
            { "_id": "r2", "_type": "request", "name": "B", "url": "/b", "method": "POST",
              "body": { "mimeType": "application/json", "text": "{}" } }
        ]);

        let result = convert(&doc).unwrap();
        assert!(result.tree[0].request.as_ref().unwrap().body.is_none());
        let body = result.tree[1].request.as_ref().unwrap().body.as_ref().unwrap();
        assert_eq!(body.mime_type, "application/json");
    }

    #[test]
    fn test_missing_collection_is_malformed() {
        let err = convert(&json!({ "environments": [] })).unwrap_err();
        assert!(matches!(err, AutoLoadError::MalformedDocument { .. }));
    }
}
