//! Context service definitions
//!
//! A definition names a context service and lists which categories it
//! propagates, clears and leaves unchanged. Definitions are plain
//! configuration: they can be built in code or loaded from TOML, YAML or
//! JSON files.
//!
//! # File Layout
//!
//! ```toml
//! [[context_service]]
//! name = "app/ContextA"
//! propagated = ["Application", "IntContext"]
//! cleared = ["StringContext"]
//! unchanged = ["Remaining"]
//!
//! [[context_service]]
//! name = "app/ContextB"
//! propagated = ["Remaining"]
//! cleared = []
//! unchanged = ["IntContext"]
//! ```
//!
//! Lists left out take the default definition's values: everything is
//! propagated except the transaction, which is cleared.

use crate::context_type::{ContextType, TypeSelector};
use crate::error::{ContextError, ContextResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_propagated() -> Vec<String> {
    vec![TypeSelector::ALL_REMAINING.to_string()]
}

fn default_cleared() -> Vec<String> {
    vec![ContextType::TRANSACTION.to_string()]
}

/// Name, and policy lists, of one context service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextServiceDefinition {
    /// Name the service is looked up by
    pub name: String,

    /// Categories whose captured value the worker sees
    #[serde(default = "default_propagated")]
    pub propagated: Vec<String>,

    /// Categories reset to their cleared value on the worker
    #[serde(default = "default_cleared")]
    pub cleared: Vec<String>,

    /// Categories the worker keeps as they are
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl ContextServiceDefinition {
    /// Name of the definition used when none is configured
    pub const DEFAULT_NAME: &'static str = "default";

    /// Create a definition with the default lists
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            propagated: default_propagated(),
            cleared: default_cleared(),
            unchanged: Vec::new(),
        }
    }

    /// Replace the propagated list (builder pattern)
    pub fn with_propagated<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.propagated = types.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the cleared list (builder pattern)
    pub fn with_cleared<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleared = types.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the unchanged list (builder pattern)
    pub fn with_unchanged<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unchanged = types.into_iter().map(Into::into).collect();
        self
    }

    /// Check the definition is well-formed
    ///
    /// Conflicts between lists are only detected at resolution time, against
    /// the categories a registry actually knows.
    pub fn validate(&self) -> ContextResult<()> {
        if self.name.trim().is_empty() {
            return Err(ContextError::configuration(
                "context service definition has an empty name",
            ));
        }
        let blank = self
            .propagated
            .iter()
            .chain(&self.cleared)
            .chain(&self.unchanged)
            .any(|t| t.trim().is_empty());
        if blank {
            return Err(ContextError::configuration(format!(
                "context service definition {} lists an empty context type",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for ContextServiceDefinition {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

/// Supported definition file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Toml,
    Yaml,
    Json,
}

impl DefinitionFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ContextResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "toml" => Ok(DefinitionFormat::Toml),
            "yaml" | "yml" => Ok(DefinitionFormat::Yaml),
            "json" => Ok(DefinitionFormat::Json),
            _ => Err(ContextError::configuration(format!(
                "Unknown file format: {}",
                extension
            ))),
        }
    }
}

/// A collection of definitions, as loaded from one configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSet {
    #[serde(rename = "context_service", default)]
    pub definitions: Vec<ContextServiceDefinition>,
}

impl DefinitionSet {
    pub fn new(definitions: Vec<ContextServiceDefinition>) -> ContextResult<Self> {
        let set = Self { definitions };
        set.validate()?;
        Ok(set)
    }

    /// Parse TOML content
    pub fn from_toml_str(content: &str) -> ContextResult<Self> {
        let set: Self = toml::from_str(content)?;
        set.validate()?;
        Ok(set)
    }

    /// Parse YAML content
    pub fn from_yaml_str(content: &str) -> ContextResult<Self> {
        let set: Self = serde_yaml::from_str(content)?;
        set.validate()?;
        Ok(set)
    }

    /// Parse JSON content
    pub fn from_json_str(content: &str) -> ContextResult<Self> {
        let set: Self = serde_json::from_str(content)?;
        set.validate()?;
        Ok(set)
    }

    /// Parse content in the given format
    pub fn from_str_as(content: &str, format: DefinitionFormat) -> ContextResult<Self> {
        match format {
            DefinitionFormat::Toml => Self::from_toml_str(content),
            DefinitionFormat::Yaml => Self::from_yaml_str(content),
            DefinitionFormat::Json => Self::from_json_str(content),
        }
    }

    /// Load a definition file, detecting the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        let path = path.as_ref();
        let format = DefinitionFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_str_as(&content, format)?;

        tracing::debug!(
            path = %path.display(),
            definitions = set.definitions.len(),
            "Loaded context service definitions"
        );
        Ok(set)
    }

    /// Look up a definition by name
    pub fn get(&self, name: &str) -> Option<&ContextServiceDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Definition names, in file order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Check every definition, and that names are unique
    pub fn validate(&self) -> ContextResult<()> {
        let mut seen = HashSet::new();
        for definition in &self.definitions {
            definition.validate()?;
            if !seen.insert(definition.name.as_str()) {
                return Err(ContextError::DuplicateDefinition(definition.name.clone()));
            }
        }
        Ok(())
    }
}
