//! Parser registry
//!
//! Maps file extensions to structured formats. Files with an unregistered
//! extension are read as raw text and wrapped as `{"value": <content>}`.

use crate::error::TreeError;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;

/// Structured formats understood by the config tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Hcl,
    Yaml,
    Toml,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Hcl => "hcl",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        }
    }

    /// Parse text into a JSON value
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        match self {
            Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Format::Hcl => hcl::from_str(text).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

/// Extension to format mapping
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    formats: HashMap<String, Format>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::empty()
            .register("json", Format::Json)
            .register("hcl", Format::Hcl)
            .register("yaml", Format::Yaml)
            .register("yml", Format::Yaml)
            .register("toml", Format::Toml)
    }
}

impl ParserRegistry {
    /// A registry with no formats: every file is raw text
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Register (or replace) the format for an extension, without the dot
    pub fn register(mut self, extension: &str, format: Format) -> Self {
        self.formats
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), format);
        self
    }

    /// Format registered for a path's extension
    pub fn format_for(&self, path: &Path) -> Option<Format> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.formats.get(&ext.to_ascii_lowercase()))
            .copied()
    }

    /// Parse already-read content according to the path's extension
    pub fn parse_str(&self, path: &Path, content: &str) -> Result<Value, TreeError> {
        match self.format_for(path) {
            Some(format) => format.parse(content).map_err(|reason| TreeError::Parse {
                path: path.to_path_buf(),
                format: format.as_str(),
                reason,
            }),
            None => Ok(json!({ "value": content })),
        }
    }
}
