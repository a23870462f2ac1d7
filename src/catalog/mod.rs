// Catalog module
// Durable JSON store of harvested tool records


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Result, ToolsyError};

/// Display fallback for a field the registry did not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// Structured description of a tool as returned by the registry detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDetail {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Distinct operation terms, sorted
    pub operations: Vec<String>,
    /// Distinct topic terms, sorted
    pub topics: Vec<String>,
    pub homepage: Option<String>,
    pub documentation: Option<String>,
}

/// One harvested tool, the unit of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    pub text_content: String,
    /// Detail endpoint URL the record was built from
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl ToolRecord {
    /// Build a record from a fetched detail, composing its searchable text
    #[inline]
    pub fn from_detail(id: &str, detail: ToolDetail, source: &str) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ToolsyError::MissingIdentifier(
                detail
                    .name
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            ));
        }

        let tool_name = detail.name.filter(|name| !name.trim().is_empty());
        let name = tool_name.clone().unwrap_or_else(|| id.to_string());

        let mut record = Self {
            id: id.to_string(),
            name,
            text_content: String::new(),
            source: source.to_string(),
            description: detail.description,
            operations: detail.operations,
            topics: detail.topics,
            homepage: detail.homepage,
            documentation: detail.documentation,
        };
        record.text_content = record.compose_text(tool_name.as_deref());
        Ok(record)
    }

    /// Render the text block that gets chunked and embedded
    fn compose_text(&self, tool_name: Option<&str>) -> String {
        format!(
            "Tool Name: {}\nDescription: {}\nFunctions: {}\nTopics: {}\nHomepage: {}\nDocumentation: {}\n",
            display_or_fallback(tool_name),
            display_or_fallback(self.description.as_deref()),
            display_list(&self.operations),
            display_list(&self.topics),
            display_or_fallback(self.homepage.as_deref()),
            display_or_fallback(self.documentation.as_deref()),
        )
    }
}

fn display_or_fallback(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_AVAILABLE)
}

fn display_list(values: &[String]) -> String {
    if values.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        values.join(", ")
    }
}

/// Ordered, append-only collection of tool records with unique identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: Vec<ToolRecord>,
    ids: HashSet<String>,
}

impl Catalog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from records, rejecting duplicate identifiers
    #[inline]
    pub fn from_records(records: Vec<ToolRecord>) -> Result<Self> {
        let mut catalog = Self::new();
        for record in records {
            catalog.push(record)?;
        }
        Ok(catalog)
    }

    /// Append a record; a duplicate identifier is refused
    #[inline]
    pub fn push(&mut self, record: ToolRecord) -> Result<()> {
        if self.ids.contains(&record.id) {
            return Err(ToolsyError::Storage(format!(
                "Duplicate tool identifier in catalog: {}",
                record.id
            )));
        }
        self.ids.insert(record.id.clone());
        self.records.push(record);
        Ok(())
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[ToolRecord] {
        &self.records
    }

    #[inline]
    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ToolRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ToolRecord;
    type IntoIter = std::slice::Iter<'a, ToolRecord>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// On-disk home of the catalog, a single JSON array
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog; a missing file is an empty catalog
    #[inline]
    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            debug!("No catalog at {}, starting empty", self.path.display());
            return Ok(Catalog::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ToolsyError::Storage(format!(
                "Failed to read catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let records: Vec<ToolRecord> = serde_json::from_str(&content).map_err(|e| {
            ToolsyError::Storage(format!(
                "Failed to parse catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let catalog = Catalog::from_records(records)?;
        info!(
            "Loaded {} tools from {}",
            catalog.len(),
            self.path.display()
        );
        Ok(catalog)
    }

    /// Persist the whole catalog; the file is replaced only once fully written
    #[inline]
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ToolsyError::Storage(format!(
                    "Failed to create catalog directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = serde_json::to_string_pretty(catalog.records())
            .map_err(|e| ToolsyError::Storage(format!("Failed to serialize catalog: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| {
            ToolsyError::Storage(format!(
                "Failed to write catalog {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ToolsyError::Storage(format!(
                "Failed to replace catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Saved {} tools to {}", catalog.len(), self.path.display());
        Ok(())
    }
}
