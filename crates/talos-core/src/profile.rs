//! Profile - Layered run configuration
//!
//! A profile is a YAML document (optionally embedded as `---`-fenced
//! frontmatter in a Markdown file whose narrative body is ignored)
//! selecting and configuring the modules for a run. Profiles may extend a
//! parent; resolution follows the `extends` chain root-to-leaf and merges
//! section by section into a single [`ResolvedProfile`] consumed by the
//! module coordinator.
//!
//! Merge rules: scalar keys are overwritten by the more specific profile;
//! the module-list sections (`providers`, `tools`, `hooks`) merge by
//! descriptor name, replacing in place and appending new entries; `agents`
//! is an order-preserving union; `session` merges key-shallow; unknown
//! sections pass through, the more specific profile winning on conflict.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Selects and configures one module instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique name on its mount point; defaults to `source` when omitted
    #[serde(default)]
    pub name: String,
    /// Opaque source locator, resolved against the module catalog
    pub source: String,
    /// Module configuration mapping
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ModuleDescriptor {
    /// Create a descriptor with an empty config
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            config: Map::new(),
        }
    }

    /// Set a config key
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    fn fill_default_name(&mut self) {
        if self.name.is_empty() {
            self.name = self.source.clone();
        }
    }
}

/// The `session` section: loop-level module selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    /// Orchestrator module for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<ModuleDescriptor>,
    /// Context-manager module for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ModuleDescriptor>,
    /// Remaining session keys, passed through untyped
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A fully merged profile, ready for the module coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    /// Profile name (the requested leaf)
    pub name: String,
    /// Profile version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Session section
    #[serde(default)]
    pub session: SessionSection,
    /// Provider modules
    #[serde(default)]
    pub providers: Vec<ModuleDescriptor>,
    /// Tool modules
    #[serde(default)]
    pub tools: Vec<ModuleDescriptor>,
    /// Hook modules
    #[serde(default)]
    pub hooks: Vec<ModuleDescriptor>,
    /// Agent definition directories
    #[serde(default)]
    pub agents: Vec<String>,
    /// Unknown sections, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResolvedProfile {
    /// Build a typed profile from a merged document tree
    pub(crate) fn from_merged(reference: &str, mut merged: Map<String, Value>) -> Result<Self> {
        merged.remove("extends");
        if !merged.contains_key("name") {
            return Err(Error::Resolution(format!(
                "profile '{reference}' has no 'name'"
            )));
        }

        let mut profile: ResolvedProfile = serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::Resolution(format!("profile '{reference}': {e}")))?;

        for descriptor in profile
            .providers
            .iter_mut()
            .chain(profile.tools.iter_mut())
            .chain(profile.hooks.iter_mut())
        {
            descriptor.fill_default_name();
        }
        if let Some(descriptor) = profile.session.orchestrator.as_mut() {
            descriptor.fill_default_name();
        }
        if let Some(descriptor) = profile.session.context.as_mut() {
            descriptor.fill_default_name();
        }

        for section in ["providers", "tools", "hooks"] {
            let list = match section {
                "providers" => &profile.providers,
                "tools" => &profile.tools,
                _ => &profile.hooks,
            };
            for (i, a) in list.iter().enumerate() {
                if list[i + 1..].iter().any(|b| b.name == a.name) {
                    return Err(Error::Resolution(format!(
                        "profile '{reference}': duplicate module name '{}' in section '{section}'",
                        a.name
                    )));
                }
            }
        }

        Ok(profile)
    }
}

/// Trait for profile document sources (filesystem, remote registry, tests)
#[async_trait::async_trait]
pub trait ProfileSource: Send + Sync {
    /// Load the raw document text for a profile reference
    async fn load(&self, reference: &str) -> Result<String>;
}

/// Loads profiles from `<dir>/<reference>.{yaml,yml,md}`
pub struct DirProfileSource {
    dir: PathBuf,
}

impl DirProfileSource {
    /// Create a source rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl ProfileSource for DirProfileSource {
    async fn load(&self, reference: &str) -> Result<String> {
        for extension in ["yaml", "yml", "md"] {
            let path = self.dir.join(format!("{reference}.{extension}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::Resolution(format!(
                        "reading '{}': {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(Error::Resolution(format!(
            "profile '{reference}' not found under '{}'",
            self.dir.display()
        )))
    }
}

/// Extract a `---`-fenced frontmatter block, if the document carries one
fn extract_frontmatter(text: &str) -> Option<&str> {
    let trimmed = text.trim_start_matches('\u{feff}');
    let body = trimmed.strip_prefix("---")?;
    let body = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n'))?;
    let end = body.find("\n---")?;
    Some(&body[..end])
}

/// Parse a profile document into an untyped section map
pub(crate) fn parse_document(text: &str) -> Result<Map<String, Value>> {
    let yaml_text = extract_frontmatter(text).unwrap_or(text);
    let yaml: serde_yaml::Value = serde_yaml::from_str(yaml_text)
        .map_err(|e| Error::Resolution(format!("invalid profile document: {e}")))?;
    let json = serde_json::to_value(yaml)
        .map_err(|e| Error::Resolution(format!("invalid profile document: {e}")))?;
    match json {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::Resolution(
            "profile document must be a mapping".to_string(),
        )),
    }
}

/// Merge two module lists by descriptor name: overlay entries replace
/// same-named base entries in place, new entries append in order
fn merge_module_lists(base: Option<&Value>, overlay: &Value) -> Value {
    let Some(overlay_list) = overlay.as_array() else {
        return overlay.clone();
    };
    let mut merged = base
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for entry in overlay_list {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| entry.get("source").and_then(Value::as_str));
        let position = name.and_then(|n| {
            merged.iter().position(|existing| {
                existing
                    .get("name")
                    .and_then(Value::as_str)
                    .or_else(|| existing.get("source").and_then(Value::as_str))
                    == Some(n)
            })
        });
        match position {
            Some(i) => merged[i] = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    Value::Array(merged)
}

/// Order-preserving union of two lists
fn merge_unions(base: Option<&Value>, overlay: &Value) -> Value {
    let Some(overlay_list) = overlay.as_array() else {
        return overlay.clone();
    };
    let mut merged = base
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for entry in overlay_list {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    Value::Array(merged)
}

/// Shallow key merge of two mappings, overlay winning
fn merge_maps(base: Option<&Value>, overlay: &Value) -> Value {
    let (Some(Value::Object(base_map)), Value::Object(overlay_map)) = (base, overlay) else {
        return overlay.clone();
    };
    let mut merged = base_map.clone();
    for (key, value) in overlay_map {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// Merge one more-specific document over a base document
pub(crate) fn merge_documents(
    base: &Map<String, Value>,
    overlay: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let combined = match key.as_str() {
            "providers" | "tools" | "hooks" => merge_module_lists(base.get(key), value),
            "agents" => merge_unions(base.get(key), value),
            "session" => merge_maps(base.get(key), value),
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

/// Resolves profile references into merged configuration trees
pub struct ProfileResolver {
    source: Arc<dyn ProfileSource>,
}

impl ProfileResolver {
    /// Create a resolver over the given document source
    #[must_use]
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    /// Resolve a profile reference into one merged configuration
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedProfile> {
        let chain = self.ancestor_chain(reference).await?;
        debug!(reference = %reference, depth = chain.len(), "Resolved profile chain");

        let merged = chain
            .into_iter()
            .reduce(|base, overlay| merge_documents(&base, &overlay))
            .unwrap_or_default();

        ResolvedProfile::from_merged(reference, merged)
    }

    /// Follow `extends` into an ordered root-to-leaf document chain,
    /// rejecting cycles
    async fn ancestor_chain(&self, reference: &str) -> Result<Vec<Map<String, Value>>> {
        let mut chain = Vec::new();
        let mut visited: Vec<String> = Vec::new();
        let mut next = Some(reference.to_string());

        while let Some(current) = next {
            if visited.contains(&current) {
                let mut path = visited.clone();
                path.push(current);
                return Err(Error::CyclicInheritance {
                    chain: path.join(" -> "),
                });
            }
            visited.push(current.clone());

            let text = self.source.load(&current).await?;
            let document = parse_document(&text)?;
            next = document
                .get("extends")
                .and_then(Value::as_str)
                .map(String::from);
            chain.push(document);
        }

        chain.reverse();
        Ok(chain)
    }
}
