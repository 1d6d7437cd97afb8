//! OpenAPI 3.x and Swagger 2.0 specs
//!
//! The spec arrives as text (YAML or JSON). Every operation becomes a request
//! under a root collection named after `info.title`, grouped into folders by
//! its first tag.

use serde_json::Value;

use super::{array_field, str_field, NormalizedImport};
use crate::error::{AutoLoadError, Result};
use crate::types::{value_to_string, CollectionItem, KeyValue, RequestBody, RequestSpec};

const FORMAT: &str = "OpenAPI";

const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecVersion {
    Swagger2,
    OpenApi3,
}

pub fn convert(text: &str) -> Result<NormalizedImport> {
    let doc: Value =
        serde_yaml::from_str(text).map_err(|e| AutoLoadError::malformed(FORMAT, e.to_string()))?;

    let version = if doc.get("openapi").is_some() {
        SpecVersion::OpenApi3
    } else if doc.get("swagger").is_some() {
        SpecVersion::Swagger2
    } else {
        return Err(AutoLoadError::malformed(
            FORMAT,
            "document declares neither `openapi` nor `swagger`",
        ));
    };

    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| AutoLoadError::malformed(FORMAT, "missing `paths` object"))?;

    let info = doc.get("info").cloned().unwrap_or(Value::Null);
    let mut root = CollectionItem::collection(
        Some("openapi-root".to_string()),
        str_field(&info, "title").unwrap_or("OpenAPI"),
    );
    root.description = str_field(&info, "description").map(str::to_string);

    let base_url = base_url(&doc, version);
    let mut folders: Vec<(String, CollectionItem)> = Vec::new();
    let mut untagged: Vec<CollectionItem> = Vec::new();
    let mut next_id = 0u64;

    for (path, path_item) in paths {
        let path_item = resolve(&doc, path_item);
        let shared_params = array_field(path_item, "parameters");

        for method in METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };
            next_id += 1;
            let request =
                operation_request(&doc, version, &base_url, path, method, operation, shared_params);

            let name = str_field(operation, "summary")
                .or_else(|| str_field(operation, "operationId"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} {}", method.to_uppercase(), path));
            let mut node =
                CollectionItem::request(Some(format!("openapi-{}", next_id)), name, request);
            node.description = str_field(operation, "description").map(str::to_string);

            match array_field(operation, "tags").first().and_then(Value::as_str) {
                Some(tag) => folder_for(&mut folders, tag, &mut next_id).push_child(node),
                None => untagged.push(node),
            }
        }
    }

    for (_, folder) in folders {
        root.push_child(folder);
    }
    for node in untagged {
        root.push_child(node);
    }

    Ok(NormalizedImport::from_tree(vec![root]))
}

fn folder_for<'a>(
    folders: &'a mut Vec<(String, CollectionItem)>,
    tag: &str,
    next_id: &mut u64,
) -> &'a mut CollectionItem {
    let idx = match folders.iter().position(|(name, _)| name == tag) {
        Some(idx) => idx,
        None => {
            *next_id += 1;
            let folder = CollectionItem::folder(Some(format!("openapi-{}", next_id)), tag);
            folders.push((tag.to_string(), folder));
            folders.len() - 1
        }
    };
    &mut folders[idx].1
}

fn base_url(doc: &Value, version: SpecVersion) -> String {
    let base = match version {
        SpecVersion::OpenApi3 => {
            let server = array_field(doc, "servers").first();
            let mut url = server
                .and_then(|s| str_field(s, "url"))
                .unwrap_or_default()
                .to_string();
            if let Some(vars) = server.and_then(|s| s.get("variables")).and_then(Value::as_object) {
                for (name, var) in vars {
                    if let Some(default) = var.get("default") {
                        url = url.replace(&format!("{{{}}}", name), &value_to_string(default));
                    }
                }
            }
            url
        }
        SpecVersion::Swagger2 => {
            let base_path = str_field(doc, "basePath").unwrap_or_default();
            match str_field(doc, "host") {
                Some(host) => {
                    let scheme = array_field(doc, "schemes")
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or("https");
                    format!("{}://{}{}", scheme, host, base_path)
                }
                None => base_path.to_string(),
            }
        }
    };
    base.trim_end_matches('/').to_string()
}

/// Follow a local `$ref` one level; unresolvable refs return the node unchanged
fn resolve<'a>(doc: &'a Value, node: &'a Value) -> &'a Value {
    match str_field(node, "$ref").and_then(|r| r.strip_prefix('#')) {
        Some(pointer) => doc.pointer(pointer).unwrap_or(node),
        None => node,
    }
}

fn operation_request(
    doc: &Value,
    version: SpecVersion,
    base_url: &str,
    path: &str,
    method: &str,
    operation: &Value,
    shared_params: &[Value],
) -> RequestSpec {
    // Operation-level parameters override path-level ones with the same name and location
    let mut params: Vec<&Value> = Vec::new();
    for param in array_field(operation, "parameters").iter().chain(shared_params) {
        let param = resolve(doc, param);
        let key = (str_field(param, "name"), str_field(param, "in"));
        if params
            .iter()
            .all(|p| (str_field(p, "name"), str_field(p, "in")) != key)
        {
            params.push(param);
        }
    }

    let mut headers = Vec::new();
    let mut parameters = Vec::new();
    let mut form_params = Vec::new();
    let mut body = None;

    for param in &params {
        let Some(name) = str_field(param, "name") else {
            continue;
        };
        match str_field(param, "in") {
            Some("query") => parameters.push(KeyValue::new(name, sample_value(doc, param))),
            Some("header") => headers.push(KeyValue::new(name, sample_value(doc, param))),
            Some("formData") => form_params.push(KeyValue::new(name, sample_value(doc, param))),
            Some("body") => {
                let schema = param.get("schema").map(|s| resolve(doc, s));
                let mime_type = array_field(operation, "consumes")
                    .first()
                    .or_else(|| array_field(doc, "consumes").first())
                    .and_then(Value::as_str)
                    .unwrap_or("application/json");
                body = Some(RequestBody {
                    mime_type: mime_type.to_string(),
                    text: schema.and_then(|s| s.get("example")).map(example_text),
                    params: Vec::new(),
                });
            }
            _ => {}
        }
    }

    if !form_params.is_empty() {
        let mime_type = array_field(operation, "consumes")
            .first()
            .and_then(Value::as_str)
            .unwrap_or("application/x-www-form-urlencoded");
        body = Some(RequestBody {
            mime_type: mime_type.to_string(),
            text: None,
            params: form_params,
        });
    }

    if version == SpecVersion::OpenApi3 {
        if let Some(request_body) = operation.get("requestBody").map(|b| resolve(doc, b)) {
            body = openapi3_body(doc, request_body).or(body);
        }
    }

    RequestSpec {
        method: method.to_uppercase(),
        url: format!("{}{}", base_url, path),
        headers,
        parameters,
        body,
    }
}

fn openapi3_body(doc: &Value, request_body: &Value) -> Option<RequestBody> {
    let content = request_body.get("content").and_then(Value::as_object)?;
    let (mime_type, media) = match content.get("application/json") {
        Some(media) => ("application/json".to_string(), media),
        None => {
            let (mime_type, media) = content.iter().next()?;
            (mime_type.clone(), media)
        }
    };

    let schema = media.get("schema").map(|s| resolve(doc, s));

    if mime_type == "application/x-www-form-urlencoded" || mime_type == "multipart/form-data" {
        let params = schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| KeyValue::new(name.clone(), sample_from_schema(doc, prop)))
                    .collect()
            })
            .unwrap_or_default();
        return Some(RequestBody {
            mime_type,
            text: None,
            params,
        });
    }

    let example = media
        .get("example")
        .or_else(|| {
            media
                .get("examples")
                .and_then(Value::as_object)
                .and_then(|examples| examples.values().next())
                .map(|ex| resolve(doc, ex))
                .and_then(|ex| ex.get("value"))
        })
        .or_else(|| schema.and_then(|s| s.get("example")));

    Some(RequestBody {
        mime_type,
        text: example.map(example_text),
        params: Vec::new(),
    })
}

fn example_text(example: &Value) -> String {
    match example {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn sample_value(doc: &Value, param: &Value) -> String {
    if let Some(example) = param.get("example") {
        return value_to_string(example);
    }
    if let Some(default) = param.get("default") {
        return value_to_string(default);
    }
    param
        .get("schema")
        .map(|schema| sample_from_schema(doc, schema))
        .unwrap_or_default()
}

fn sample_from_schema(doc: &Value, schema: &Value) -> String {
    let schema = resolve(doc, schema);
    schema
        .get("example")
        .or_else(|| schema.get("default"))
        .or_else(|| array_field(schema, "enum").first())
        .map(value_to_string)
        .unwrap_or_default()
}
