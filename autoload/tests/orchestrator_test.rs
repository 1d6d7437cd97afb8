//! End-to-end runs of the auto-load pipeline
//!
//! The direct topology is driven by an in-memory reader that counts reads;
//! the delegated topology runs against a wiremock cache service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoload::store::WorkspaceStore;
use autoload::{
    AutoLoadSettings, AutoLoader, CacheClient, CollectionItem, Environment, FileReader,
    ImportFormat, ImportSource, InMemoryWorkspace, RawFile, RetryPolicy, SourceError, Topology,
};
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves files from a map and counts every read
#[derive(Default)]
struct MockReader {
    files: HashMap<String, RawFile>,
    reads: AtomicUsize,
}

impl MockReader {
    fn with(mut self, path: &str, file: RawFile) -> Self {
        self.files.insert(path.to_string(), file);
        self
    }

    fn with_json(self, path: &str, value: Value) -> Self {
        self.with(path, RawFile::structured(path, value))
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileReader for MockReader {
    async fn read(&self, source: &ImportSource) -> Result<RawFile, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(&source.path)
            .cloned()
            .map(|file| file.with_format(source.format.clone()))
            .ok_or_else(|| SourceError::NotFound(source.path.clone()))
    }
}

fn native_export(name: &str) -> Value {
    json!({
        "exportedFrom": "app",
        "collection": [
            { "_id": "grp", "_type": "request_group", "name": name, "parentId": null },
            { "_id": "req", "_type": "request", "name": "Ping", "parentId": "grp",
              "method": "GET", "url": "/ping" }
        ],
        "environments": [ { "name": "Embedded", "environment": { "token": "abc" } } ]
    })
}

fn postman_collection() -> Value {
    json!({
        "info": {
            "_postman_id": "pm",
            "name": "Postman API",
            "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json"
        },
        "item": [
            { "name": "Health", "request": { "method": "GET", "url": "https://api.test/health" } }
        ]
    })
}

fn direct(reader: Arc<MockReader>, settings: AutoLoadSettings) -> AutoLoader {
    AutoLoader::new(settings, Topology::direct(reader, "autoload.yaml"))
}

#[tokio::test]
async fn test_skip_on_existing_data_performs_no_reads() {
    let config = RawFile::text("autoload.yaml", "collections:\n  - a.json\n");
    let reader = Arc::new(MockReader::default().with("autoload.yaml", config));
    let workspace = InMemoryWorkspace::new("ws")
        .with_collections(vec![CollectionItem::folder(Some("existing".into()), "Existing")]);

    let report = direct(reader.clone(), AutoLoadSettings::default()).run(&workspace).await;

    assert!(report.success);
    assert_eq!(report.collections_loaded, 0);
    assert_eq!(report.environments_loaded, 0);
    assert_eq!(reader.reads(), 0);
}

#[tokio::test]
async fn test_disabled_performs_no_reads() {
    let reader = Arc::new(MockReader::default());
    let settings = AutoLoadSettings {
        enabled: false,
        ..Default::default()
    };

    let report = direct(reader.clone(), settings).run(&InMemoryWorkspace::new("ws")).await;

    assert!(report.success);
    assert_eq!(reader.reads(), 0);
}

#[tokio::test]
async fn test_partial_success_is_success() {
    let config = "collections:\n  - missing.json\n  - good.json\n";
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", config))
            .with_json("good.json", native_export("Good")),
    );
    let workspace = InMemoryWorkspace::new("ws");

    let report = direct(reader.clone(), AutoLoadSettings::default()).run(&workspace).await;

    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.collections_loaded, 1);
    assert_eq!(reader.reads(), 3);

    let snapshot = workspace.snapshot();
    assert_eq!(snapshot.collections.len(), 1);
    assert_eq!(snapshot.collections[0].name, "Good");
    assert_eq!(snapshot.collections[0].workspace_id.as_deref(), Some("ws"));
}

#[tokio::test]
async fn test_malformed_source_skipped_others_loaded() {
    let config = json!({
        "collections": [
            "broken.json",
            { "path": "postman.json", "format": "Postman" }
        ]
    });
    let reader = Arc::new(
        MockReader::default()
            .with_json("autoload.yaml", config)
            .with_json("broken.json", json!({ "not": "a native export" }))
            .with_json("postman.json", postman_collection()),
    );
    let workspace = InMemoryWorkspace::new("ws");

    let report = direct(reader, AutoLoadSettings::default()).run(&workspace).await;

    assert!(report.success);
    assert_eq!(report.collections_loaded, 1);
    assert_eq!(workspace.snapshot().collections[0].name, "Postman API");
}

#[tokio::test]
async fn test_sources_remapped_without_collisions() {
    // Same document twice: identical document-scoped ids
    let config = "collections:\n  - one.json\n  - two.json\n";
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", config))
            .with_json("one.json", native_export("One"))
            .with_json("two.json", native_export("Two")),
    );
    let workspace = InMemoryWorkspace::new("ws");

    let report = direct(reader, AutoLoadSettings::default()).run(&workspace).await;
    assert_eq!(report.collections_loaded, 2);

    let snapshot = workspace.snapshot();
    let mut ids = Vec::new();
    for root in &snapshot.collections {
        root.walk(&mut |item| ids.push(item.id.clone().unwrap()));
        for child in &root.children {
            assert_eq!(child.parent_id, root.id);
        }
    }
    assert_eq!(ids.len(), 4);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert!(!ids.contains(&"grp".to_string()));
}

#[tokio::test]
async fn test_environment_merge_policy() {
    let config = "collections:\n  - app.json\nenvironments:\n  - dev.json\n  - list.json\n";
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", config))
            .with_json("app.json", native_export("App"))
            .with_json("dev.json", json!({ "name": "Dev", "variables": { "host": "dev.local" } }))
            .with_json(
                "list.json",
                json!([
                    { "name": "Existing", "variables": { "v": "9" } },
                    { "name": "Prod", "variables": { "host": "prod" } }
                ]),
            ),
    );
    let workspace = InMemoryWorkspace::new("ws").with_environments(vec![
        Environment::new("Existing").with_variable("v", "1"),
        Environment::new("Keep"),
    ]);

    let report = direct(reader, AutoLoadSettings::default()).run(&workspace).await;

    assert!(report.success);
    // One embedded, one single-object file, two from the list
    assert_eq!(report.environments_loaded, 4);

    let names: Vec<String> = workspace.environments().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Existing", "Keep", "Embedded", "Dev", "Prod"]);
    assert_eq!(workspace.environments()[0].variables["v"], "9");
}

#[tokio::test]
async fn test_replace_policy_takes_last_batch() {
    let config = "environments:\n  - a.json\n  - b.json\n";
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", config))
            .with_json("a.json", json!({ "name": "A" }))
            .with_json("b.json", json!({ "name": "B" })),
    );
    let workspace = InMemoryWorkspace::new("ws").with_environments(vec![Environment::new("Old")]);
    let settings = AutoLoadSettings {
        merge_environments: false,
        ..Default::default()
    };

    let report = direct(reader, settings).run(&workspace).await;

    assert!(report.success);
    assert_eq!(workspace.environments(), vec![Environment::new("B")]);
}

#[tokio::test]
async fn test_commit_failure_fails_run() {
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", "collections:\n  - app.json\n"))
            .with_json("app.json", native_export("App")),
    );
    let workspace = InMemoryWorkspace::new("ws").rejecting("store is read-only");

    let report = direct(reader, AutoLoadSettings::default()).run(&workspace).await;

    assert!(!report.success);
    assert_eq!(report.collections_loaded, 0);
    assert!(report.error.as_deref().unwrap().contains("store is read-only"));

    // Embedded environments were committed before the dispatch failed
    assert_eq!(report.environments_loaded, 1);
    let names: Vec<String> = workspace.environments().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Embedded".to_string()]);
}

#[tokio::test]
async fn test_missing_config_fails_run() {
    let reader = Arc::new(MockReader::default());
    let report = direct(reader, AutoLoadSettings::default())
        .run(&InMemoryWorkspace::new("ws"))
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("config"));
}

#[tokio::test]
async fn test_default_import_type_applies() {
    let reader = Arc::new(
        MockReader::default()
            .with("autoload.yaml", RawFile::text("autoload.yaml", "collections:\n  - pm.json\n"))
            .with_json("pm.json", postman_collection()),
    );
    let settings = AutoLoadSettings {
        default_import_type: ImportFormat::Postman,
        ..Default::default()
    };
    let workspace = InMemoryWorkspace::new("ws");

    let report = direct(reader, settings).run(&workspace).await;
    assert_eq!(report.collections_loaded, 1);
}

// ============================================================================
// Delegated topology
// ============================================================================

fn delegated(server: &MockServer, attempts: u32) -> AutoLoader {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    let client = CacheClient::new(base, Duration::from_secs(5)).unwrap();
    AutoLoader::new(
        AutoLoadSettings::default(),
        Topology::Delegated {
            client,
            readiness: RetryPolicy::new(attempts, Duration::from_millis(5)),
        },
    )
}

#[tokio::test]
async fn test_delegated_loads_cached_objects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": true })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collections": [
                { "name": "pm.json", "content": postman_collection(),
                  "kind": "structured", "format": "Postman" }
            ],
            "environments": [
                { "name": "env.yaml", "kind": "text",
                  "content": "name: Staging\nvariables:\n  host: staging\n" }
            ]
        })))
        .mount(&server)
        .await;

    let workspace = InMemoryWorkspace::new("ws");
    let report = delegated(&server, 3).run(&workspace).await;

    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.collections_loaded, 1);
    assert_eq!(report.environments_loaded, 1);
    assert_eq!(workspace.environments()[0].variables["host"], "staging");
}

#[tokio::test]
async fn test_delegated_readiness_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": false })))
        .mount(&server)
        .await;

    let report = delegated(&server, 3).run(&InMemoryWorkspace::new("ws")).await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("3 attempts"));
}
