use async_trait::async_trait;
use domain::{DocumentName, DomainError, IndexDefinition, NodePath, RunConfig, XmlDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, trace};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Container already exists: {}", .0.display())]
    ContainerAlreadyExists(PathBuf),
    #[error("Container not found: {}", .0.display())]
    ContainerNotFound(PathBuf),
    #[error("Container file '{}' is corrupt: {reason}", .path.display())]
    CorruptContainer { path: PathBuf, reason: String },
    #[error("Document '{document}' already exists in container '{container}'")]
    DocumentAlreadyExists {
        container: String,
        document: DocumentName,
    },
    #[error("Document '{document}' is not well-formed XML: {reason}")]
    MalformedDocument {
        document: DocumentName,
        reason: String,
    },
    #[error("Unique index {index} in container '{container}' already holds value '{value}'")]
    UniqueConstraintViolation {
        container: String,
        index: String,
        value: String,
    },
    #[error("Index {index} is already defined on container '{container}'")]
    IndexAlreadyExists { container: String, index: String },
    #[error("No index on '{path}' in container '{container}'")]
    IndexNotFound { container: String, path: String },
    #[error("External file access is disabled, cannot read {}", .0.display())]
    ExternalAccessDenied(PathBuf),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
}

impl ApplicationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ApplicationError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors raised by the document store itself, as opposed to I/O or input problems.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ApplicationError::ContainerAlreadyExists(_)
                | ApplicationError::ContainerNotFound(_)
                | ApplicationError::CorruptContainer { .. }
                | ApplicationError::DocumentAlreadyExists { .. }
                | ApplicationError::MalformedDocument { .. }
                | ApplicationError::UniqueConstraintViolation { .. }
                | ApplicationError::IndexAlreadyExists { .. }
                | ApplicationError::IndexNotFound { .. }
        )
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// Handle through which containers are created or opened and input files are read.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a new, empty container at `path`. Fails if one already exists there.
    async fn create_container(&self, path: &Path) -> Result<Arc<dyn Container>, ApplicationError>;
    /// Opens an existing container.
    async fn open_container(&self, path: &Path) -> Result<Arc<dyn Container>, ApplicationError>;
    /// Reads a local file so it can be inserted as a document.
    async fn open_input(&self, path: &Path) -> Result<Vec<u8>, ApplicationError>;
}

/// A named, persistent collection of XML documents plus its index definitions.
#[async_trait]
pub trait Container: Send + Sync {
    fn name(&self) -> &str;
    fn path(&self) -> &Path;
    /// Inserts a document under its name. Duplicate names are rejected.
    async fn put_document(&self, document: XmlDocument) -> Result<(), ApplicationError>;
    /// Registers an index and builds it over the documents already present.
    async fn add_index(&self, definition: &IndexDefinition) -> Result<(), ApplicationError>;
    async fn document_count(&self) -> Result<usize, ApplicationError>;
    /// Names of all documents, sorted.
    async fn document_names(&self) -> Result<Vec<DocumentName>, ApplicationError>;
    async fn get_document(
        &self,
        name: &DocumentName,
    ) -> Result<Option<XmlDocument>, ApplicationError>;
    async fn indexes(&self) -> Result<Vec<IndexDefinition>, ApplicationError>;
    /// Documents holding `value` at `path`, via a registered index.
    async fn lookup(
        &self,
        path: &NodePath,
        value: &str,
    ) -> Result<Vec<DocumentName>, ApplicationError>;
}

/// Receives the user-facing progress of a run.
pub trait ProgressReporter: Send + Sync {
    fn importing(&self, document: &DocumentName);
    fn import_failed(&self, failure: &ImportFailure);
    fn container_done(&self, label: &str);
}

// --- Dry-run Container ---

/// Stand-in container used in simulate mode. Every mutation is accepted and dropped.
#[derive(Debug, Clone)]
pub struct DryRunContainer {
    name: String,
    path: PathBuf,
}

impl DryRunContainer {
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Container for DryRunContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn put_document(&self, document: XmlDocument) -> Result<(), ApplicationError> {
        debug!(container = %self.name, document = %document.name(), "Dry run: document not stored");
        Ok(())
    }

    async fn add_index(&self, definition: &IndexDefinition) -> Result<(), ApplicationError> {
        debug!(container = %self.name, index = %definition, "Dry run: index not registered");
        Ok(())
    }

    async fn document_count(&self) -> Result<usize, ApplicationError> {
        Ok(0)
    }

    async fn document_names(&self) -> Result<Vec<DocumentName>, ApplicationError> {
        Ok(Vec::new())
    }

    async fn get_document(
        &self,
        _name: &DocumentName,
    ) -> Result<Option<XmlDocument>, ApplicationError> {
        Ok(None)
    }

    async fn indexes(&self) -> Result<Vec<IndexDefinition>, ApplicationError> {
        Ok(Vec::new())
    }

    async fn lookup(
        &self,
        _path: &NodePath,
        _value: &str,
    ) -> Result<Vec<DocumentName>, ApplicationError> {
        Ok(Vec::new())
    }
}

// --- Import Results ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The store rejected the document (duplicate name, malformed XML, unique index).
    Store,
    /// Anything else: unreadable file, bad encoding, unusable file name.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    /// Document name, or the raw path when no name could be derived.
    pub document: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(DocumentName),
    Simulated(DocumentName),
    Failed(ImportFailure),
}

/// Per-container result of a builder run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub container: String,
    pub imported: Vec<DocumentName>,
    pub simulated: Vec<DocumentName>,
    pub failures: Vec<ImportFailure>,
    pub indexes: Vec<IndexDefinition>,
}

impl ImportReport {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Imported(name) => self.imported.push(name),
            ImportOutcome::Simulated(name) => self.simulated.push(name),
            ImportOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    pub fn attempted(&self) -> usize {
        self.imported.len() + self.simulated.len() + self.failures.len()
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cases: ImportReport,
    pub names: ImportReport,
}

impl RunSummary {
    pub fn failure_count(&self) -> usize {
        self.cases.failures.len() + self.names.failures.len()
    }
}

// --- Index declarations ---

/// (namespace prefix, node path, index type) for the cases container.
pub const CASE_INDEXES: [(&str, &str, &str); 2] = [
    ("tei", "person/@xml:id", "node-attribute-equality-string"),
    ("tei", "TEI/@xml:id", "unique-node-attribute-equality-string"),
];

/// (namespace prefix, node path, index type) for the names container.
pub const NAME_INDEXES: [(&str, &str, &str); 3] = [
    ("tei", "person/@xml:id", "unique-node-attribute-equality-string"),
    ("tei", "TEI/@xml:id", "unique-node-attribute-equality-string"),
    ("tei", "link/@sameAs", "node-attribute-equality-string"),
];

// --- Application Services (Use Cases) ---

/// Inserts single files into a container, never failing the caller.
pub struct DocumentImporter {
    config: Arc<RunConfig>,
    store: Arc<dyn DocumentStore>,
    reporter: Arc<dyn ProgressReporter>,
}

impl DocumentImporter {
    pub fn new(
        config: Arc<RunConfig>,
        store: Arc<dyn DocumentStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            store,
            reporter,
        }
    }

    /// Imports `file` under its base name. Failures are reported and returned as an
    /// outcome so one bad file never aborts the run.
    #[instrument(skip(self, container), fields(container = %container.name(), file = %file.display()))]
    pub async fn import(&self, file: &Path, container: &dyn Container) -> ImportOutcome {
        let name = match DocumentName::from_path(file) {
            Ok(name) => name,
            Err(e) => return self.fail(file.display().to_string(), e.into()),
        };

        if self.config.announces_progress() {
            self.reporter.importing(&name);
        }
        if self.config.simulate {
            return ImportOutcome::Simulated(name);
        }

        match self.insert(file, &name, container).await {
            Ok(()) => {
                debug!(document = %name, "Document imported");
                ImportOutcome::Imported(name)
            }
            Err(e) => self.fail(name.to_string(), e),
        }
    }

    async fn insert(
        &self,
        file: &Path,
        name: &DocumentName,
        container: &dyn Container,
    ) -> Result<(), ApplicationError> {
        let bytes = self.store.open_input(file).await?;
        let document = XmlDocument::from_bytes(name.clone(), bytes)?;
        container.put_document(document).await
    }

    fn fail(&self, document: String, err: ApplicationError) -> ImportOutcome {
        let kind = if err.is_store_error() {
            FailureKind::Store
        } else {
            FailureKind::Other
        };
        debug!(document = %document, kind = ?kind, "Import failed: {}", err);
        let failure = ImportFailure {
            document,
            kind,
            reason: err.to_string(),
        };
        self.reporter.import_failed(&failure);
        ImportOutcome::Failed(failure)
    }
}

/// Creates the target container, or a dry-run stand-in when simulating.
async fn open_target(
    config: &RunConfig,
    store: &dyn DocumentStore,
    path: &Path,
) -> Result<Arc<dyn Container>, ApplicationError> {
    if config.simulate {
        info!(container = %path.display(), "Simulating: container will not be created");
        return Ok(Arc::new(DryRunContainer::new(path)));
    }
    store.create_container(path).await
}

async fn register_indexes(
    container: &dyn Container,
    declarations: &[(&str, &str, &str)],
) -> Result<Vec<IndexDefinition>, ApplicationError> {
    let mut registered = Vec::with_capacity(declarations.len());
    for (namespace, path, index_type) in declarations {
        let definition = IndexDefinition::parse(namespace, path, index_type)?;
        container.add_index(&definition).await?;
        info!(container = %container.name(), index = %definition, "Index registered");
        registered.push(definition);
    }
    Ok(registered)
}

/// Only `*.xml` with exactly that lowercase extension counts as a case file.
fn is_case_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "xml")
}

/// Builds the cases container from every `*.xml` file of a directory.
pub struct CaseContainerBuilder {
    config: Arc<RunConfig>,
    store: Arc<dyn DocumentStore>,
    importer: Arc<DocumentImporter>,
}

impl CaseContainerBuilder {
    pub fn new(
        config: Arc<RunConfig>,
        store: Arc<dyn DocumentStore>,
        importer: Arc<DocumentImporter>,
    ) -> Self {
        Self {
            config,
            store,
            importer,
        }
    }

    /// Entries are imported in whatever order the filesystem lists them.
    #[instrument(skip(self), fields(case_dir = %case_dir.display()))]
    pub async fn build(
        &self,
        case_dir: &Path,
        container_path: &Path,
    ) -> Result<ImportReport, ApplicationError> {
        let container = open_target(&self.config, self.store.as_ref(), container_path).await?;
        let mut report = ImportReport::new(container.name());

        let mut entries = tokio::fs::read_dir(case_dir)
            .await
            .map_err(|e| ApplicationError::io(case_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApplicationError::io(case_dir, e))?
        {
            let path = entry.path();
            if !is_case_file(&path) {
                trace!(entry = %path.display(), "Skipping non-case entry");
                continue;
            }
            // Unreadable entries (dangling links) go to the importer and fail there.
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_dir() {
                    trace!(entry = %path.display(), "Skipping directory entry");
                    continue;
                }
            }
            report.record(self.importer.import(&path, container.as_ref()).await);
        }

        report.indexes = register_indexes(container.as_ref(), &CASE_INDEXES).await?;
        info!(
            container = %report.container,
            imported = report.imported.len(),
            failed = report.failures.len(),
            "Cases container built"
        );
        Ok(report)
    }
}

/// Builds the names container from a fixed, ordered list of files.
pub struct NameContainerBuilder {
    config: Arc<RunConfig>,
    store: Arc<dyn DocumentStore>,
    importer: Arc<DocumentImporter>,
}

impl NameContainerBuilder {
    pub fn new(
        config: Arc<RunConfig>,
        store: Arc<dyn DocumentStore>,
        importer: Arc<DocumentImporter>,
    ) -> Self {
        Self {
            config,
            store,
            importer,
        }
    }

    #[instrument(skip(self, name_files), fields(files = name_files.len()))]
    pub async fn build(
        &self,
        name_files: &[PathBuf],
        container_path: &Path,
    ) -> Result<ImportReport, ApplicationError> {
        let container = open_target(&self.config, self.store.as_ref(), container_path).await?;
        let mut report = ImportReport::new(container.name());

        for file in name_files {
            report.record(self.importer.import(file, container.as_ref()).await);
        }

        report.indexes = register_indexes(container.as_ref(), &NAME_INDEXES).await?;
        info!(
            container = %report.container,
            imported = report.imported.len(),
            failed = report.failures.len(),
            "Names container built"
        );
        Ok(report)
    }
}

/// One full import run: cases first, then names.
pub struct GenerateDbService {
    config: Arc<RunConfig>,
    reporter: Arc<dyn ProgressReporter>,
    cases: CaseContainerBuilder,
    names: NameContainerBuilder,
}

impl GenerateDbService {
    pub fn new(
        config: Arc<RunConfig>,
        store: Arc<dyn DocumentStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let importer = Arc::new(DocumentImporter::new(
            config.clone(),
            store.clone(),
            reporter.clone(),
        ));
        Self {
            cases: CaseContainerBuilder::new(config.clone(), store.clone(), importer.clone()),
            names: NameContainerBuilder::new(config.clone(), store, importer),
            config,
            reporter,
        }
    }

    #[instrument(skip(self), fields(data_dir = %self.config.layout.data_dir.display(), simulate = self.config.simulate))]
    pub async fn run(&self) -> Result<RunSummary, ApplicationError> {
        let layout = &self.config.layout;

        let cases = self
            .cases
            .build(&layout.case_dir, &layout.cases_container)
            .await?;
        self.reporter.container_done("cases");

        let names = self
            .names
            .build(&layout.name_files(), &layout.names_container)
            .await?;
        self.reporter.container_done("names");

        Ok(RunSummary { cases, names })
    }
}
