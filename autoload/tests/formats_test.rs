//! Every supported format normalizes a minimal single-request document

use autoload::types::node_count;
use autoload::{normalize, ImportFormat, ItemKind, RawFile};
use serde_json::json;

fn requests_in(tree: &[autoload::CollectionItem]) -> usize {
    let mut count = 0;
    for root in tree {
        root.walk(&mut |item| {
            if item.kind == ItemKind::Request {
                count += 1;
            }
        });
    }
    count
}

#[test]
fn test_native_single_request() {
    let file = RawFile::structured(
        "native.json",
        json!({
            "collection": [
                { "_id": "r", "_type": "request", "name": "Only", "method": "GET", "url": "/" }
            ]
        }),
    );
    let result = normalize(&file, &ImportFormat::Native, "ws").unwrap();
    assert!(node_count(&result.tree) >= 1);
    assert_eq!(requests_in(&result.tree), 1);
}

#[test]
fn test_postman_v2_single_request() {
    let file = RawFile::structured(
        "pm.json",
        json!({
            "info": {
                "name": "One",
                "schema": "https://schema.getpostman.com/json/collection/v2.0.0/collection.json"
            },
            "item": [ { "name": "Only", "request": "https://api.test/only" } ]
        }),
    );
    let result = normalize(&file, &ImportFormat::Postman, "ws").unwrap();
    assert_eq!(requests_in(&result.tree), 1);
}

#[test]
fn test_postman_v1_single_request() {
    let file = RawFile::structured(
        "pm1.json",
        json!({
            "id": "c1",
            "name": "Legacy",
            "order": ["r1"],
            "requests": [
                { "id": "r1", "name": "Only", "method": "GET", "url": "https://api.test/only" }
            ]
        }),
    );
    let result = normalize(&file, &ImportFormat::Postman, "ws").unwrap();
    assert_eq!(requests_in(&result.tree), 1);
    assert!(result.plugins.is_empty());
}

#[test]
fn test_insomnia_single_request() {
    let file = RawFile::structured(
        "insomnia.json",
        json!({
            "_type": "export",
            "__export_format": 4,
            "resources": [
                { "_id": "req_1", "_type": "request", "parentId": "wrk_missing", "name": "Only",
                  "method": "GET", "url": "/" }
            ]
        }),
    );
    let result = normalize(&file, &ImportFormat::Insomnia, "ws").unwrap();
    assert_eq!(requests_in(&result.tree), 1);
}

#[test]
fn test_openapi_text_single_operation() {
    let file = RawFile::text(
        "api.yaml",
        "openapi: 3.0.0\ninfo:\n  title: One\n  version: '1'\n\
         paths:\n  /only:\n    get:\n      summary: Only\n",
    );
    let result = normalize(&file, &ImportFormat::OpenApi, "ws").unwrap();
    assert_eq!(requests_in(&result.tree), 1);
}

#[test]
fn test_yaml_text_for_structured_formats() {
    // Exports handed over as YAML text are parsed before conversion
    let file = RawFile::text(
        "native.yaml",
        "collection:\n  - _id: r\n    _type: request\n    name: Only\n",
    );
    let result = normalize(&file, &ImportFormat::Native, "ws").unwrap();
    assert_eq!(requests_in(&result.tree), 1);
}

#[test]
fn test_unknown_format_never_raises() {
    let file = RawFile::text("data.har", "{}");
    let result = normalize(&file, &ImportFormat::from("har"), "ws").unwrap();
    assert!(result.is_empty());
}
