//! Insomnia export format (`__export_format: 4`)
//!
//! All resources live in one flat `resources` array linked by `parentId`.
//! Workspaces become collections, request groups become folders, and
//! environment resources are surfaced as environments.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::{array_field, str_field, NormalizedImport};
use crate::error::{AutoLoadError, Result};
use crate::types::{
    value_to_string, CollectionItem, Environment, KeyValue, RequestBody, RequestSpec,
};

const FORMAT: &str = "Insomnia";

pub fn convert(document: &Value) -> Result<NormalizedImport> {
    let resources: Vec<&Value> = document
        .get("resources")
        .and_then(Value::as_array)
        .ok_or_else(|| AutoLoadError::malformed(FORMAT, "missing `resources` array"))?
        .iter()
        .filter(|r| is_tree_resource(r))
        .collect();

    let ids: HashSet<&str> = resources.iter().filter_map(|r| str_field(r, "_id")).collect();
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, resource) in resources.iter().enumerate() {
        match str_field(resource, "parentId") {
            Some(parent) if ids.contains(parent) => children.entry(parent).or_default().push(idx),
            _ => roots.push(idx),
        }
    }

    let mut visited = vec![false; resources.len()];
    let mut tree = Vec::new();
    for idx in roots {
        if let Some(node) = build_node(&resources, idx, &children, &mut visited, 0)? {
            tree.push(node);
        }
    }

    // Resources in a parent cycle or under a request never hang off a root
    let mut promoted = 0;
    for idx in 0..resources.len() {
        if let Some(mut node) = build_node(&resources, idx, &children, &mut visited, 0)? {
            node.parent_id = None;
            tree.push(node);
            promoted += 1;
        }
    }
    if promoted > 0 {
        warn!(promoted, "Unreachable Insomnia resources kept at the top level");
    }

    let environments = document
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|r| str_field(r, "_type") == Some("environment"))
        .map(environment)
        .collect();

    Ok(NormalizedImport {
        tree,
        plugins: Vec::new(),
        environments,
    })
}

fn is_tree_resource(resource: &Value) -> bool {
    matches!(
        str_field(resource, "_type"),
        Some("workspace" | "request_group" | "request")
    )
}

fn build_node(
    resources: &[&Value],
    idx: usize,
    children: &HashMap<&str, Vec<usize>>,
    visited: &mut [bool],
    depth: usize,
) -> Result<Option<CollectionItem>> {
    if visited[idx] {
        return Ok(None);
    }
    if depth > 64 {
        return Err(AutoLoadError::malformed(FORMAT, "resource nesting too deep"));
    }
    visited[idx] = true;

    let resource = resources[idx];
    let id = str_field(resource, "_id").map(str::to_string);
    let name = str_field(resource, "name").unwrap_or("Untitled");

    let mut node = match str_field(resource, "_type") {
        Some("workspace") => CollectionItem::collection(id, name),
        Some("request_group") => CollectionItem::folder(id, name),
        _ => CollectionItem::request(id, name, request_spec(resource)),
    };
    node.parent_id = str_field(resource, "parentId").map(str::to_string);
    node.description = str_field(resource, "description")
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    if node.is_container() {
        if let Some(kids) = node.id.as_deref().and_then(|id| children.get(id)) {
            let mut kids = kids.clone();
            kids.sort_by(|a, b| sort_key(resources[*a]).total_cmp(&sort_key(resources[*b])));
            for kid in kids {
                if let Some(child) = build_node(resources, kid, children, visited, depth + 1)? {
                    node.push_child(child);
                }
            }
        }
    }

    Ok(Some(node))
}

fn sort_key(resource: &Value) -> f64 {
    resource
        .get("metaSortKey")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn request_spec(resource: &Value) -> RequestSpec {
    let body = resource.get("body").and_then(|body| {
        let mime_type = str_field(body, "mimeType")?;
        Some(RequestBody {
            mime_type: mime_type.to_string(),
            text: str_field(body, "text").map(str::to_string),
            params: array_field(body, "params").iter().filter_map(pair).collect(),
        })
    });

    RequestSpec {
        method: str_field(resource, "method").unwrap_or("GET").to_uppercase(),
        url: str_field(resource, "url").unwrap_or_default().to_string(),
        headers: array_field(resource, "headers").iter().filter_map(pair).collect(),
        parameters: array_field(resource, "parameters").iter().filter_map(pair).collect(),
        body,
    }
}

fn pair(entry: &Value) -> Option<KeyValue> {
    let name = str_field(entry, "name")?;
    Some(KeyValue {
        name: name.to_string(),
        value: entry.get("value").map(value_to_string).unwrap_or_default(),
        disabled: entry.get("disabled").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn environment(resource: &Value) -> Environment {
    let mut env = Environment::new(str_field(resource, "name").unwrap_or("Environment"));
    if let Some(data) = resource.get("data").and_then(Value::as_object) {
        for (key, value) in data {
            env.variables.insert(key.clone(), value_to_string(value));
        }
    }
    env.color = str_field(resource, "color").map(str::to_string);
    debug!(name = %env.name, variables = env.variables.len(), "Insomnia environment");
    env
}
