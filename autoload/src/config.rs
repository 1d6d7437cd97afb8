//! Auto-load configuration
//!
//! Two layers:
//! - [`AutoLoadConfig`]: the declarative document listing which sources to
//!   load (`collections` and `environments`), YAML or JSON.
//! - [`AutoLoadSettings`]: the orchestrator switches, loaded from TOML with
//!   per-field defaults.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AutoLoadError, Result};
use crate::types::{FileKind, ImportFormat, ImportSource, RawFile};

// ============================================================================
// Declarative source list
// ============================================================================

/// Ordered collection and environment sources
///
/// Order is significant: sources are loaded first-listed first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoLoadConfig {
    #[serde(rename = "collections", default, deserialize_with = "nullable_list")]
    pub collection_sources: Vec<ImportSource>,

    #[serde(rename = "environments", default, deserialize_with = "nullable_list")]
    pub environment_sources: Vec<ImportSource>,
}

fn nullable_list<'de, D>(deserializer: D) -> std::result::Result<Vec<ImportSource>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ImportSource>>::deserialize(deserializer)?.unwrap_or_default())
}

impl AutoLoadConfig {
    pub fn is_empty(&self) -> bool {
        self.collection_sources.is_empty() && self.environment_sources.is_empty()
    }

    /// Parse a config document read from disk or fetched over HTTP
    ///
    /// Structured content is deserialized directly. Text goes through the
    /// YAML parser (which also accepts JSON) and falls back to
    /// [`parse_line_list`] when that fails.
    pub fn from_raw(file: &RawFile) -> Result<Self> {
        match (&file.kind, &file.content) {
            (FileKind::Text, Value::String(text)) => Self::from_text(text),
            (_, value) => Self::from_value(value.clone()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        // An empty document is an empty config, not an error
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| AutoLoadError::Config(format!("invalid config: {}", e)))
    }

    pub fn from_text(text: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(text) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                warn!(error = %e, "Config is not valid YAML, using line parser");
                let config = parse_line_list(text);
                if config.is_empty() && !text.trim().is_empty() {
                    return Err(AutoLoadError::Config(format!("unparseable config: {}", e)));
                }
                Ok(config)
            }
        }
    }
}

/// Minimal parser for the list-only subset of the config
///
/// Recognizes a `collections:` or `environments:` header followed by
/// `- item` lines. Anything else is ignored.
pub fn parse_line_list(text: &str) -> AutoLoadConfig {
    #[derive(Clone, Copy)]
    enum Section {
        None,
        Collections,
        Environments,
    }

    let mut config = AutoLoadConfig::default();
    let mut section = Section::None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix('-') {
            let item = unquote(item.trim());
            if item.is_empty() {
                continue;
            }
            let source = ImportSource::new(item);
            match section {
                Section::Collections => config.collection_sources.push(source),
                Section::Environments => config.environment_sources.push(source),
                Section::None => {}
            }
            continue;
        }

        section = match trimmed.trim_end_matches(':').trim() {
            "collections" if trimmed.ends_with(':') => Section::Collections,
            "environments" if trimmed.ends_with(':') => Section::Environments,
            _ => Section::None,
        };
    }

    debug!(
        collections = config.collection_sources.len(),
        environments = config.environment_sources.len(),
        "Parsed config with line parser"
    );
    config
}

fn unquote(s: &str) -> &str {
    let s = s.split(" #").next().unwrap_or(s).trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

// ============================================================================
// Orchestrator switches
// ============================================================================

/// Switches consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoadSettings {
    /// Run auto-load at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Skip when the workspace already has collection content
    #[serde(default = "default_true")]
    pub skip_on_existing_data: bool,

    /// Merge environments by name instead of replacing the whole list
    #[serde(default = "default_true")]
    pub merge_environments: bool,

    /// Format used for sources without an explicit `format`
    #[serde(default)]
    pub default_import_type: ImportFormat,
}

fn default_true() -> bool {
    true
}

impl Default for AutoLoadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_on_existing_data: true,
            merge_environments: true,
            default_import_type: ImportFormat::Native,
        }
    }
}

impl AutoLoadSettings {
    /// Load from a TOML file, using defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutoLoadError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AutoLoadError::Config(format!("invalid settings: {}", e)))
    }

    /// Format for one source: its own override, else the default
    pub fn format_for(&self, source_format: Option<&ImportFormat>) -> ImportFormat {
        source_format.cloned().unwrap_or_else(|| self.default_import_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_config_preserves_order() {
        let yaml = r#"
collections:
  - first.json
  - path: https://example.test/second.yaml
    format: OpenAPI
environments:
  - envs/dev.json
extra: ignored
"#;
        let config = AutoLoadConfig::from_text(yaml).unwrap();
        let paths: Vec<&str> = config.collection_sources.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["first.json", "https://example.test/second.yaml"]);
        assert_eq!(config.collection_sources[1].format, Some(ImportFormat::OpenApi));
        assert_eq!(config.environment_sources, vec![ImportSource::new("envs/dev.json")]);
    }

    #[test]
    fn test_json_structured_config() {
        let file = RawFile::structured(
            "autoload.json",
            json!({ "collections": ["a.json"], "environments": null }),
        );
        let config = AutoLoadConfig::from_raw(&file).unwrap();
        assert_eq!(config.collection_sources.len(), 1);
        assert!(config.environment_sources.is_empty());
    }

    #[test]
    fn test_empty_document_is_empty_config() {
        assert!(AutoLoadConfig::from_text("").unwrap().is_empty());
    }

    #[test]
    fn test_line_parser_fallback() {
        // Tab indentation is rejected by YAML
        let text =
            "collections:\n\t- 'a.json'\n\t- \"b.json\"  # second\nenvironments:\n\t- env.json\n";
        let config = AutoLoadConfig::from_text(text).unwrap();
        let paths: Vec<&str> = config.collection_sources.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["a.json", "b.json"]);
        assert_eq!(config.environment_sources.len(), 1);
    }

    #[test]
    fn test_line_parser_ignores_unknown_sections() {
        let config = parse_line_list("other:\n - x\ncollections:\n - y\n");
        assert_eq!(config.collection_sources, vec![ImportSource::new("y")]);
    }

    #[test]
    fn test_garbage_config_is_error() {
        let err = AutoLoadConfig::from_text("\t: : [").unwrap_err();
        assert!(matches!(err, AutoLoadError::Config(_)));
    }

    #[test]
    fn test_settings_defaults_and_toml() {
        let settings = AutoLoadSettings::from_toml(
            "mergeEnvironments = false\ndefaultImportType = \"Postman\"\n",
        )
        .unwrap();
        assert!(settings.enabled);
        assert!(settings.skip_on_existing_data);
        assert!(!settings.merge_environments);
        assert_eq!(settings.default_import_type, ImportFormat::Postman);

        assert_eq!(settings.format_for(None), ImportFormat::Postman);
        assert_eq!(settings.format_for(Some(&ImportFormat::Insomnia)), ImportFormat::Insomnia);
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AutoLoadSettings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, AutoLoadSettings::default());
    }
}
