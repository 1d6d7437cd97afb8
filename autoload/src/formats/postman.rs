//! Postman collection formats
//!
//! Both schema generations are handled here and produce the same output
//! shape. v1 documents carry flat `folders`/`requests` lists linked by id and
//! `order` arrays; v2.x documents nest `item` arrays and may attach `event`
//! scripts, which become plugins.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use super::{array_field, str_field, NormalizedImport, ScopedIds};
use crate::error::{AutoLoadError, Result};
use crate::types::{
    value_to_string, CollectionItem, KeyValue, Plugin, PluginCode, RequestBody, RequestSpec,
};

const FORMAT: &str = "Postman";

/// Schema generation of a Postman document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostmanVersion {
    V1,
    V2,
}

pub fn detect_version(document: &Value) -> Option<PostmanVersion> {
    let schema = document
        .get("info")
        .and_then(|info| str_field(info, "schema"))
        .unwrap_or_default();

    if schema.contains("/v2.") || document.get("item").is_some_and(Value::is_array) {
        Some(PostmanVersion::V2)
    } else if document.get("requests").is_some_and(Value::is_array) {
        Some(PostmanVersion::V1)
    } else {
        None
    }
}

pub fn convert(document: &Value) -> Result<NormalizedImport> {
    match detect_version(document) {
        Some(PostmanVersion::V2) => convert_v2(document),
        Some(PostmanVersion::V1) => convert_v1(document).map(NormalizedImport::from_tree),
        None => Err(AutoLoadError::malformed(
            FORMAT,
            "document has neither an `item` nor a `requests` array",
        )),
    }
}

// ============================================================================
// v2.x
// ============================================================================

fn convert_v2(document: &Value) -> Result<NormalizedImport> {
    let info = document.get("info").cloned().unwrap_or(Value::Null);
    let items = document
        .get("item")
        .and_then(Value::as_array)
        .ok_or_else(|| AutoLoadError::malformed(FORMAT, "`item` must be an array"))?;

    let mut ids = ScopedIds::new("postman");
    let mut plugins = Vec::new();

    let root_id = ids.or_next(str_field(&info, "_postman_id"));
    let root_name = str_field(&info, "name").unwrap_or("Postman Collection");
    let mut root = CollectionItem::collection(Some(root_id.clone()), root_name);
    root.description = description_text(info.get("description"));

    if let Some(plugin) = plugin_from_events(root_name, &root_id, document) {
        plugins.push(plugin);
    }

    for item in items {
        root.push_child(v2_item(item, &mut ids, &mut plugins)?);
    }

    Ok(NormalizedImport {
        tree: vec![root],
        plugins,
        environments: Vec::new(),
    })
}

fn v2_item(item: &Value, ids: &mut ScopedIds, plugins: &mut Vec<Plugin>) -> Result<CollectionItem> {
    if !item.is_object() {
        return Err(AutoLoadError::malformed(FORMAT, "collection item must be an object"));
    }

    let id = ids.or_next(str_field(item, "id").or_else(|| str_field(item, "_postman_id")));
    let name = str_field(item, "name").unwrap_or("Untitled").to_string();

    let mut node = if let Some(children) = item.get("item").and_then(Value::as_array) {
        let mut folder = CollectionItem::folder(Some(id.clone()), name.clone());
        for child in children {
            folder.push_child(v2_item(child, ids, plugins)?);
        }
        folder
    } else {
        let request = item.get("request").cloned().unwrap_or(Value::Null);
        CollectionItem::request(Some(id.clone()), name.clone(), v2_request(&request))
    };

    node.description = description_text(item.get("description")).or_else(|| {
        item.get("request")
            .and_then(|r| description_text(r.get("description")))
    });

    if let Some(plugin) = plugin_from_events(&name, &id, item) {
        plugins.push(plugin);
    }

    Ok(node)
}

fn v2_request(request: &Value) -> RequestSpec {
    // A request may be just a URL string
    if let Some(url) = request.as_str() {
        return RequestSpec {
            method: "GET".to_string(),
            url: url.to_string(),
            ..Default::default()
        };
    }

    let url = request.get("url");
    let url_text = match url {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => str_field(obj, "raw").unwrap_or_default().to_string(),
        None => String::new(),
    };

    let parameters = url
        .map(|u| array_field(u, "query"))
        .unwrap_or(&[])
        .iter()
        .filter_map(v2_pair)
        .collect::<Vec<_>>();

    // Query params are already part of the raw URL
    let url_text = if parameters.is_empty() {
        url_text
    } else {
        url_text.split('?').next().unwrap_or_default().to_string()
    };

    RequestSpec {
        method: str_field(request, "method").unwrap_or("GET").to_uppercase(),
        url: url_text,
        headers: array_field(request, "header").iter().filter_map(v2_pair).collect(),
        parameters,
        body: request.get("body").and_then(v2_body),
    }
}

fn v2_pair(entry: &Value) -> Option<KeyValue> {
    let name = str_field(entry, "key")?;
    Some(KeyValue {
        name: name.to_string(),
        value: entry.get("value").map(value_to_string).unwrap_or_default(),
        disabled: entry.get("disabled").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn v2_body(body: &Value) -> Option<RequestBody> {
    match str_field(body, "mode")? {
        "raw" => {
            let language = body
                .pointer("/options/raw/language")
                .and_then(Value::as_str)
                .unwrap_or("text");
            let mime_type = match language {
                "json" => "application/json",
                "xml" => "application/xml",
                "html" => "text/html",
                "javascript" => "application/javascript",
                _ => "text/plain",
            };
            Some(RequestBody {
                mime_type: mime_type.to_string(),
                text: Some(str_field(body, "raw").unwrap_or_default().to_string()),
                params: Vec::new(),
            })
        }
        "urlencoded" => Some(RequestBody {
            mime_type: "application/x-www-form-urlencoded".to_string(),
            text: None,
            params: array_field(body, "urlencoded").iter().filter_map(v2_pair).collect(),
        }),
        "formdata" => Some(RequestBody {
            mime_type: "multipart/form-data".to_string(),
            text: None,
            params: array_field(body, "formdata").iter().filter_map(v2_pair).collect(),
        }),
        "graphql" => {
            let graphql = body.get("graphql").cloned().unwrap_or(Value::Null);
            let variables = graphql
                .get("variables")
                .and_then(Value::as_str)
                .and_then(|v| serde_json::from_str::<Value>(v).ok())
                .unwrap_or_else(|| Value::Object(Default::default()));
            let payload = serde_json::json!({
                "query": str_field(&graphql, "query").unwrap_or_default(),
                "variables": variables,
            });
            Some(RequestBody {
                mime_type: "application/graphql".to_string(),
                text: Some(payload.to_string()),
                params: Vec::new(),
            })
        }
        other => {
            debug!(mode = other, "Unsupported Postman body mode");
            None
        }
    }
}

/// Collect `prerequest` and `test` scripts into one plugin
fn plugin_from_events(name: &str, target_id: &str, holder: &Value) -> Option<Plugin> {
    let mut code = PluginCode::default();

    for event in array_field(holder, "event") {
        let script = event
            .pointer("/script/exec")
            .map(|exec| match exec {
                Value::Array(lines) => lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => value_to_string(other),
            })
            .unwrap_or_default();

        if script.trim().is_empty() {
            continue;
        }

        match str_field(event, "listen") {
            Some("prerequest") => code.pre_request = script,
            Some("test") => code.post_request = script,
            _ => {}
        }
    }

    if code.pre_request.is_empty() && code.post_request.is_empty() {
        return None;
    }

    Some(Plugin::script(name, Some(target_id.to_string()), code))
}

fn description_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

// ============================================================================
// v1
// ============================================================================

fn convert_v1(document: &Value) -> Result<Vec<CollectionItem>> {
    let mut ids = ScopedIds::new("postman-v1");

    let request_list: Vec<(String, &Value)> = array_field(document, "requests")
        .iter()
        .map(|r| (ids.or_next(str_field(r, "id")), r))
        .collect();

    if request_list.is_empty() && array_field(document, "folders").is_empty() {
        return Err(AutoLoadError::malformed(FORMAT, "v1 collection has no requests"));
    }

    let requests: HashMap<String, &Value> = request_list
        .iter()
        .map(|(id, r)| (id.clone(), *r))
        .collect();

    let folders: HashMap<&str, &Value> = array_field(document, "folders")
        .iter()
        .filter_map(|f| str_field(f, "id").map(|id| (id, f)))
        .collect();

    let root_id = ids.or_next(str_field(document, "id"));
    let mut root = CollectionItem::collection(
        Some(root_id),
        str_field(document, "name").unwrap_or("Postman Collection"),
    );
    root.description = description_text(document.get("description"));

    let mut placed: HashSet<String> = HashSet::new();
    let mut placed_folders: HashSet<&str> = HashSet::new();

    // Top-level folders: `folders_order` when present, otherwise folders no one nests
    let nested: HashSet<&str> = folders
        .values()
        .flat_map(|f| array_field(f, "folders_order").iter().filter_map(Value::as_str))
        .collect();
    let top_folders: Vec<&str> = if document.get("folders_order").is_some() {
        array_field(document, "folders_order")
            .iter()
            .filter_map(Value::as_str)
            .collect()
    } else {
        array_field(document, "folders")
            .iter()
            .filter_map(|f| str_field(f, "id"))
            .filter(|id| !nested.contains(id))
            .collect()
    };

    for folder_id in top_folders {
        if let Some(folder) =
            v1_folder(folder_id, &folders, &requests, &mut placed, &mut placed_folders)
        {
            root.push_child(folder);
        }
    }

    for request_id in array_field(document, "order").iter().filter_map(Value::as_str) {
        if let Some(request) = requests.get(request_id) {
            if placed.insert(request_id.to_string()) {
                root.push_child(v1_request(request_id, request));
            }
        }
    }

    // Requests no order list mentions keep their document position
    for (request_id, request) in &request_list {
        if placed.insert(request_id.clone()) {
            root.push_child(v1_request(request_id, request));
        }
    }

    Ok(vec![root])
}

fn v1_folder<'a>(
    folder_id: &'a str,
    folders: &HashMap<&'a str, &'a Value>,
    requests: &HashMap<String, &Value>,
    placed: &mut HashSet<String>,
    placed_folders: &mut HashSet<&'a str>,
) -> Option<CollectionItem> {
    let folder: &'a Value = *folders.get(folder_id)?;
    if !placed_folders.insert(folder_id) {
        return None;
    }

    let mut node = CollectionItem::folder(
        Some(folder_id.to_string()),
        str_field(folder, "name").unwrap_or("Untitled"),
    );
    node.description = description_text(folder.get("description"));

    for child_id in array_field(folder, "folders_order").iter().filter_map(Value::as_str) {
        if let Some(child) = v1_folder(child_id, folders, requests, placed, placed_folders) {
            node.push_child(child);
        }
    }

    for request_id in array_field(folder, "order").iter().filter_map(Value::as_str) {
        if let Some(request) = requests.get(request_id) {
            if placed.insert(request_id.to_string()) {
                node.push_child(v1_request(request_id, request));
            }
        }
    }

    Some(node)
}

fn v1_request(id: &str, request: &Value) -> CollectionItem {
    let headers = str_field(request, "headers")
        .unwrap_or_default()
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let disabled = line.starts_with("//");
            let line = line.trim_start_matches("//").trim();
            let (name, value) = line.split_once(':')?;
            Some(KeyValue {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                disabled,
            })
        })
        .collect();

    let body = match str_field(request, "dataMode") {
        Some("raw") => Some(RequestBody {
            mime_type: "text/plain".to_string(),
            text: str_field(request, "rawModeData").map(str::to_string),
            params: Vec::new(),
        }),
        Some(mode @ ("urlencoded" | "params")) => Some(RequestBody {
            mime_type: if mode == "urlencoded" {
                "application/x-www-form-urlencoded"
            } else {
                "multipart/form-data"
            }
            .to_string(),
            text: None,
            params: array_field(request, "data").iter().filter_map(v2_pair).collect(),
        }),
        _ => None,
    };

    let mut node = CollectionItem::request(
        Some(id.to_string()),
        str_field(request, "name").unwrap_or("Untitled"),
        RequestSpec {
            method: str_field(request, "method").unwrap_or("GET").to_uppercase(),
            url: str_field(request, "url").unwrap_or_default().to_string(),
            headers,
            parameters: Vec::new(),
            body,
        },
    );
    node.description = description_text(request.get("description"));
    node
}
