use serde::{Deserialize, Serialize}; // Journal records are built from these types
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error; // For domain-specific errors

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid document name for path '{0}'")]
    InvalidDocumentName(String),
    #[error("Document '{0}' is not valid UTF-8")]
    InvalidEncoding(String),
    #[error("Invalid node path '{path}': {reason}")]
    InvalidNodePath { path: String, reason: String },
    #[error("Unsupported index type '{0}'")]
    UnsupportedIndexType(String),
}

// --- Document Name ---

/// Identifies a document inside a container: the base file name, extension included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentName(String);

impl DocumentName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidDocumentName(name));
        }
        Ok(Self(name))
    }

    /// Derives the name from the final component of `path`.
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DomainError::InvalidDocumentName(path.display().to_string()))?;
        Self::new(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DocumentName> for String {
    fn from(name: DocumentName) -> Self {
        name.0
    }
}

// --- XML Document ---

/// One XML file's contents, as inserted into a container. Immutable once built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    name: DocumentName,
    content: String,
}

impl XmlDocument {
    pub fn new(name: DocumentName, content: impl Into<String>) -> Self {
        Self {
            name,
            content: content.into(),
        }
    }

    /// Builds a document from raw file bytes. The store only accepts UTF-8 input.
    pub fn from_bytes(name: DocumentName, bytes: Vec<u8>) -> Result<Self, DomainError> {
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Self { name, content }),
            Err(_) => Err(DomainError::InvalidEncoding(name.0)),
        }
    }

    pub fn name(&self) -> &DocumentName {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

// --- Index Definitions ---

/// An `element/@attribute` node path, e.g. `person/@xml:id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath {
    pub element: String,
    pub attribute: String,
}

impl NodePath {
    pub fn parse(expr: &str) -> Result<Self, DomainError> {
        let invalid = |reason: &str| DomainError::InvalidNodePath {
            path: expr.to_string(),
            reason: reason.to_string(),
        };

        let (element, attribute) = expr
            .trim()
            .split_once("/@")
            .ok_or_else(|| invalid("expected the form 'element/@attribute'"))?;
        if element.is_empty() || element.contains('/') {
            return Err(invalid("element step must be a single non-empty name"));
        }
        if attribute.is_empty() || attribute.contains('/') || attribute.contains('@') {
            return Err(invalid("attribute step must be a single non-empty name"));
        }
        Ok(Self {
            element: element.to_string(),
            attribute: attribute.to_string(),
        })
    }

    /// Whether an element with this local name carries the indexed attribute.
    pub fn matches_element(&self, local_name: &str) -> bool {
        self.element == local_name
    }

    /// Prefixed path attributes (`xml:id`) match on the qualified name,
    /// unprefixed ones (`sameAs`) on the local name.
    pub fn matches_attribute(&self, qualified_name: &str) -> bool {
        if self.attribute.contains(':') {
            self.attribute == qualified_name
        } else {
            let local = qualified_name
                .rsplit_once(':')
                .map_or(qualified_name, |(_, local)| local);
            self.attribute == local
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/@{}", self.element, self.attribute)
    }
}

/// String-equality index over attribute values, optionally unique across the container.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexType {
    pub unique: bool,
}

const ATTRIBUTE_EQUALITY_STRING: &str = "node-attribute-equality-string";

impl IndexType {
    /// Parses `[unique-]node-attribute-equality-string`. Surrounding whitespace is ignored.
    pub fn parse(spec: &str) -> Result<Self, DomainError> {
        let trimmed = spec.trim();
        let (unique, rest) = match trimmed.strip_prefix("unique-") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if rest != ATTRIBUTE_EQUALITY_STRING {
            return Err(DomainError::UnsupportedIndexType(spec.to_string()));
        }
        Ok(Self { unique })
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            f.write_str("unique-")?;
        }
        f.write_str(ATTRIBUTE_EQUALITY_STRING)
    }
}

/// A declarative index rule registered against a container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDefinition {
    /// Namespace prefix the rule is declared under (`tei`).
    pub namespace: String,
    pub path: NodePath,
    pub index_type: IndexType,
}

impl IndexDefinition {
    pub fn parse(namespace: &str, path: &str, index_type: &str) -> Result<Self, DomainError> {
        Ok(Self {
            namespace: namespace.to_string(),
            path: NodePath::parse(path)?,
            index_type: IndexType::parse(index_type)?,
        })
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.namespace, self.path, self.index_type)
    }
}

// --- Data Layout (path resolution) ---

const CASES_DIR: &str = "cases";
const MASTER_LISTS_DIR: &str = "master-lists";
const CASES_CONTAINER: &str = "cases.dbxml";
const NAMES_CONTAINER: &str = "names.dbxml";

/// Name-list files imported into the names container, in import order.
pub const NAME_FILES: [&str; 4] = [
    "names-forman-only.xml",
    "names-napier-only.xml",
    "names-both-forman-napier.xml",
    "names-hands.xml",
];

/// Fixed sub-paths of a casebooks data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub data_dir: PathBuf,
    pub case_dir: PathBuf,
    pub master_lists_dir: PathBuf,
    pub names_container: PathBuf,
    pub cases_container: PathBuf,
}

impl DataLayout {
    pub fn resolve(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let case_dir = data_dir.join(CASES_DIR);
        let master_lists_dir = data_dir.join(MASTER_LISTS_DIR);
        Self {
            names_container: master_lists_dir.join(NAMES_CONTAINER),
            cases_container: case_dir.join(CASES_CONTAINER),
            data_dir,
            case_dir,
            master_lists_dir,
        }
    }

    pub fn name_files(&self) -> Vec<PathBuf> {
        NAME_FILES
            .iter()
            .map(|file| self.master_lists_dir.join(file))
            .collect()
    }
}

// --- Run Configuration ---

/// Settings for one import run. Built once by the entry point and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub layout: DataLayout,
    /// Announce what would be imported without creating or changing containers.
    pub simulate: bool,
    /// Announce each file as it is imported.
    pub verbose: bool,
}

impl RunConfig {
    pub fn new(data_dir: impl Into<PathBuf>, simulate: bool, verbose: bool) -> Self {
        Self {
            layout: DataLayout::resolve(data_dir),
            simulate,
            verbose,
        }
    }

    /// Progress lines are shown in verbose mode and always when simulating.
    pub fn announces_progress(&self) -> bool {
        self.verbose || self.simulate
    }
}
