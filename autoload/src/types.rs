//! Canonical data model shared by the normalizer, remapper and orchestrator
//!
//! Every foreign export format is converted into these types. The cache
//! service reuses [`RawFile`] and [`ImportSource`] on the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AutoLoadError, Result};

// ============================================================================
// Import sources and raw files
// ============================================================================

/// Foreign export format of a collection source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImportFormat {
    /// The application's own export format
    #[default]
    Native,
    /// Postman collection, schema v1 or v2.x
    Postman,
    /// Insomnia export (format 4)
    Insomnia,
    /// OpenAPI 3.x or Swagger 2.0
    OpenApi,
    /// Anything else; normalizes to an empty result
    Other(String),
}

impl ImportFormat {
    pub fn as_str(&self) -> &str {
        match self {
            ImportFormat::Native => "native",
            ImportFormat::Postman => "Postman",
            ImportFormat::Insomnia => "Insomnia",
            ImportFormat::OpenApi => "OpenAPI",
            ImportFormat::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ImportFormat {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "native" | "restfox" => ImportFormat::Native,
            "postman" => ImportFormat::Postman,
            "insomnia" => ImportFormat::Insomnia,
            "openapi" | "swagger" => ImportFormat::OpenApi,
            _ => ImportFormat::Other(tag.to_string()),
        }
    }
}

impl From<String> for ImportFormat {
    fn from(tag: String) -> Self {
        ImportFormat::from(tag.as_str())
    }
}

impl From<ImportFormat> for String {
    fn from(format: ImportFormat) -> Self {
        format.as_str().to_string()
    }
}

impl FromStr for ImportFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ImportFormat::from(s))
    }
}

/// A file path or URL listed in the auto-load config
///
/// Written either as a bare string or as `{ path, format }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceRepr")]
pub struct ImportSource {
    pub path: String,
    /// Overrides the default import format for this source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImportFormat>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceRepr {
    Path(String),
    Full {
        path: String,
        #[serde(default)]
        format: Option<ImportFormat>,
    },
}

impl From<SourceRepr> for ImportSource {
    fn from(repr: SourceRepr) -> Self {
        match repr {
            SourceRepr::Path(path) => ImportSource { path, format: None },
            SourceRepr::Full { path, format } => ImportSource { path, format },
        }
    }
}

impl ImportSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: ImportFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Last path segment, used as the display name of the loaded file
    pub fn file_name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
        without_query
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.path)
    }
}

/// Whether a raw file's content was parsed on read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Structured,
    Text,
}

/// Result of reading one import source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    /// Parsed JSON for `structured`, a JSON string for `text`
    pub content: Value,
    pub kind: FileKind,
    /// Format carried over from the source's config entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImportFormat>,
}

impl RawFile {
    pub fn structured(name: impl Into<String>, content: Value) -> Self {
        Self {
            name: name.into(),
            content,
            kind: FileKind::Structured,
            format: None,
        }
    }

    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Value::String(content.into()),
            kind: FileKind::Text,
            format: None,
        }
    }

    pub fn with_format(mut self, format: Option<ImportFormat>) -> Self {
        self.format = format;
        self
    }

    /// Classify fetched bytes: JSON-looking files are parsed, the rest kept as text
    pub fn from_body(name: impl Into<String>, body: String, json_hint: bool) -> Self {
        let name = name.into();
        let looks_json = json_hint || name.to_ascii_lowercase().ends_with(".json");
        if looks_json {
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                return Self::structured(name, value);
            }
        }
        Self::text(name, body)
    }

    /// Content as text, serializing structured content back to JSON
    pub fn to_text(&self) -> String {
        match (&self.kind, &self.content) {
            (FileKind::Text, Value::String(s)) => s.clone(),
            (_, value) => value.to_string(),
        }
    }

    /// Content as a JSON value, parsing text content as YAML or JSON
    pub fn to_value(&self) -> Result<Value> {
        match (&self.kind, &self.content) {
            (FileKind::Text, Value::String(s)) => serde_yaml::from_str::<Value>(s).map_err(|e| {
                AutoLoadError::malformed("text", format!("{}: {}", self.name, e))
            }),
            (_, value) => Ok(value.clone()),
        }
    }
}

// ============================================================================
// Collection tree
// ============================================================================

/// Node variant in the canonical collection tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Top-level container created from a whole foreign collection
    Collection,
    /// Nested container
    Folder,
    Request,
}

/// Name/value pair used for headers, query parameters and form fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl KeyValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyValue>,
}

/// Request fields carried by `request` nodes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
}

/// One node of the canonical collection tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CollectionItem>,
}

impl CollectionItem {
    fn node(kind: ItemKind, id: Option<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id: None,
            kind,
            name: name.into(),
            workspace_id: None,
            description: None,
            request: None,
            children: Vec::new(),
        }
    }

    pub fn collection(id: Option<String>, name: impl Into<String>) -> Self {
        Self::node(ItemKind::Collection, id, name)
    }

    pub fn folder(id: Option<String>, name: impl Into<String>) -> Self {
        Self::node(ItemKind::Folder, id, name)
    }

    pub fn request(id: Option<String>, name: impl Into<String>, request: RequestSpec) -> Self {
        let mut item = Self::node(ItemKind::Request, id, name);
        item.request = Some(request);
        item
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ItemKind::Collection | ItemKind::Folder)
    }

    /// Append a child, linking its parent id to this node
    pub fn push_child(&mut self, mut child: CollectionItem) {
        child.parent_id = self.id.clone();
        self.children.push(child);
    }

    /// Visit this node and all descendants, depth first
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a CollectionItem)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut CollectionItem)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Total number of nodes in a forest
pub fn node_count(tree: &[CollectionItem]) -> usize {
    let mut count = 0;
    for root in tree {
        root.walk(&mut |_| count += 1);
    }
    count
}

// ============================================================================
// Plugins and environments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginCode {
    #[serde(default)]
    pub pre_request: String,
    #[serde(default)]
    pub post_request: String,
}

/// Script attached to a collection node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_plugin_type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Target node; `None` for workspace-wide plugins
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub code: PluginCode,
}

fn default_plugin_type() -> String {
    "script".to_string()
}

fn default_true() -> bool {
    true
}

impl Plugin {
    pub fn script(
        name: impl Into<String>,
        collection_id: Option<String>,
        code: PluginCode,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: default_plugin_type(),
            enabled: true,
            collection_id,
            code,
        }
    }
}

/// Named set of variables, unique by name within a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default, alias = "environment", deserialize_with = "string_map")]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: BTreeMap::new(),
            color: None,
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Scalar values are stringified; nested values keep their JSON text
fn string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, value_to_string(&v)))
        .collect())
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
