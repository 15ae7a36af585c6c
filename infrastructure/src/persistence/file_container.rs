use super::journal::{Journal, JournalRecord};
use crate::search::attribute_index::{AttributeIndex, scan_document};
use application::{ApplicationError, Container};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{DocumentName, IndexDefinition, NodePath, XmlDocument};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

/// A container persisted as a journal file. Documents and indices live in memory;
/// every accepted mutation is appended to the journal before it becomes visible.
#[derive(Debug)]
pub struct FileContainer {
    name: String,
    path: PathBuf,
    documents: DashMap<DocumentName, Arc<XmlDocument>>,
    indexes: RwLock<Vec<AttributeIndex>>,
    // Held for the whole of each mutation, so mutations never interleave
    journal: Mutex<Journal>,
}

fn container_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl FileContainer {
    fn with_journal(name: String, path: &Path, journal: Journal) -> Self {
        Self {
            name,
            path: path.to_path_buf(),
            documents: DashMap::new(),
            indexes: RwLock::new(Vec::new()),
            journal: Mutex::new(journal),
        }
    }

    pub async fn create(path: &Path) -> Result<Self, ApplicationError> {
        let name = container_name(path);
        let journal = Journal::create(path, &name).await?;
        info!(container = %name, path = %path.display(), "Container created");
        Ok(Self::with_journal(name, path, journal))
    }

    /// Replays the journal at `path`, rebuilding documents and indices.
    pub async fn open(path: &Path) -> Result<Self, ApplicationError> {
        let corrupt = |reason: String| ApplicationError::CorruptContainer {
            path: path.to_path_buf(),
            reason,
        };

        let (journal, records) = Journal::open(path).await?;
        let mut records = records.into_iter();
        let name = match records.next() {
            Some(JournalRecord::Created { container, .. }) => container,
            _ => return Err(corrupt("missing header record".to_string())),
        };
        let container = Self::with_journal(name, path, journal);

        {
            let mut indexes = container.indexes.write().await;
            for record in records {
                match record {
                    JournalRecord::Created { .. } => {
                        return Err(corrupt("duplicate header record".to_string()));
                    }
                    JournalRecord::Document { document } => {
                        let document = document.into_owned();
                        let keys = container
                            .check_document(&document, &indexes)
                            .map_err(|e| corrupt(e.to_string()))?;
                        container.commit_document(document, &indexes, keys);
                    }
                    JournalRecord::Index { definition } => {
                        let index = container
                            .build_index(definition.into_owned(), &indexes)
                            .map_err(|e| corrupt(e.to_string()))?;
                        indexes.push(index);
                    }
                }
            }
        }

        info!(
            container = %container.name,
            documents = container.documents.len(),
            "Container opened"
        );
        Ok(container)
    }

    /// Validates `document` against the container without changing it and returns
    /// its keys for each index, in index order.
    fn check_document(
        &self,
        document: &XmlDocument,
        indexes: &[AttributeIndex],
    ) -> Result<Vec<Vec<String>>, ApplicationError> {
        if self.documents.contains_key(document.name()) {
            return Err(ApplicationError::DocumentAlreadyExists {
                container: self.name.clone(),
                document: document.name().clone(),
            });
        }

        let paths: Vec<&NodePath> = indexes.iter().map(|i| &i.definition().path).collect();
        let keys = scan_document(document.content(), &paths).map_err(|reason| {
            ApplicationError::MalformedDocument {
                document: document.name().clone(),
                reason,
            }
        })?;

        for (index, keys) in indexes.iter().zip(&keys) {
            index
                .check_insert(keys)
                .map_err(|value| ApplicationError::UniqueConstraintViolation {
                    container: self.name.clone(),
                    index: index.definition().to_string(),
                    value,
                })?;
        }
        Ok(keys)
    }

    fn commit_document(
        &self,
        document: XmlDocument,
        indexes: &[AttributeIndex],
        keys: Vec<Vec<String>>,
    ) {
        for (index, keys) in indexes.iter().zip(keys) {
            index.insert(document.name(), keys);
        }
        self.documents
            .insert(document.name().clone(), Arc::new(document));
    }

    /// Builds a new index over the stored documents.
    fn build_index(
        &self,
        definition: IndexDefinition,
        existing: &[AttributeIndex],
    ) -> Result<AttributeIndex, ApplicationError> {
        if existing.iter().any(|i| i.definition() == &definition) {
            return Err(ApplicationError::IndexAlreadyExists {
                container: self.name.clone(),
                index: definition.to_string(),
            });
        }

        let index = AttributeIndex::new(definition);
        for entry in self.documents.iter() {
            let document = entry.value();
            let mut keys = scan_document(document.content(), &[&index.definition().path])
                .map_err(|reason| ApplicationError::MalformedDocument {
                    document: document.name().clone(),
                    reason,
                })?;
            let keys = keys.pop().unwrap_or_default();
            index
                .check_insert(&keys)
                .map_err(|value| ApplicationError::UniqueConstraintViolation {
                    container: self.name.clone(),
                    index: index.definition().to_string(),
                    value,
                })?;
            index.insert(document.name(), keys);
        }
        Ok(index)
    }
}

#[async_trait]
impl Container for FileContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, document), fields(container = %self.name, document = %document.name()))]
    async fn put_document(&self, document: XmlDocument) -> Result<(), ApplicationError> {
        let mut journal = self.journal.lock().await;
        let indexes = self.indexes.read().await;

        let keys = self.check_document(&document, &indexes).map_err(|e| {
            debug!("Document rejected: {}", e);
            e
        })?;
        journal
            .append(&JournalRecord::Document {
                document: Cow::Borrowed(&document),
            })
            .await?;
        self.commit_document(document, &indexes, keys);
        debug!("Document stored");
        Ok(())
    }

    #[instrument(skip(self), fields(container = %self.name))]
    async fn add_index(&self, definition: &IndexDefinition) -> Result<(), ApplicationError> {
        let mut journal = self.journal.lock().await;
        let mut indexes = self.indexes.write().await;

        let index = self.build_index(definition.clone(), &indexes)?;
        journal
            .append(&JournalRecord::Index {
                definition: Cow::Borrowed(definition),
            })
            .await?;
        debug!(keys = index.key_count(), "Index built");
        indexes.push(index);
        Ok(())
    }

    async fn document_count(&self) -> Result<usize, ApplicationError> {
        Ok(self.documents.len())
    }

    async fn document_names(&self) -> Result<Vec<DocumentName>, ApplicationError> {
        let mut names: Vec<DocumentName> =
            self.documents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn get_document(
        &self,
        name: &DocumentName,
    ) -> Result<Option<XmlDocument>, ApplicationError> {
        Ok(self
            .documents
            .get(name)
            .map(|doc_ref| (**doc_ref).clone()))
    }

    async fn indexes(&self) -> Result<Vec<IndexDefinition>, ApplicationError> {
        let indexes = self.indexes.read().await;
        Ok(indexes.iter().map(|i| i.definition().clone()).collect())
    }

    #[instrument(skip(self), fields(container = %self.name))]
    async fn lookup(
        &self,
        path: &NodePath,
        value: &str,
    ) -> Result<Vec<DocumentName>, ApplicationError> {
        let indexes = self.indexes.read().await;
        indexes
            .iter()
            .find(|i| &i.definition().path == path)
            .map(|i| i.lookup(value))
            .ok_or_else(|| ApplicationError::IndexNotFound {
                container: self.name.clone(),
                path: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(name: &str, content: &str) -> XmlDocument {
        XmlDocument::new(DocumentName::new(name).unwrap(), content)
    }

    fn def(path: &str, index_type: &str) -> IndexDefinition {
        IndexDefinition::parse("tei", path, index_type).unwrap()
    }

    fn unique_tei() -> IndexDefinition {
        def("TEI/@xml:id", "unique-node-attribute-equality-string")
    }

    fn person() -> IndexDefinition {
        def("person/@xml:id", "node-attribute-equality-string")
    }

    async fn new_container(dir: &TempDir) -> FileContainer {
        FileContainer::create(&dir.path().join("cases.dbxml"))
            .await
            .expect("Failed to create container")
    }

    #[tokio::test]
    async fn create_writes_file_and_refuses_second_create() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        assert_eq!(container.name(), "cases.dbxml");
        assert!(container.path().exists());

        let again = FileContainer::create(container.path()).await;
        assert!(matches!(again, Err(ApplicationError::ContainerAlreadyExists(_))));
    }

    #[tokio::test]
    async fn put_document_rejects_duplicate_names() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        container.put_document(doc("a.xml", "<TEI/>")).await.unwrap();

        let result = container.put_document(doc("a.xml", "<TEI/>")).await;

        assert!(matches!(result, Err(ApplicationError::DocumentAlreadyExists { .. })));
        assert_eq!(container.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn put_document_rejects_malformed_xml() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;

        let result = container.put_document(doc("bad.xml", "<TEI><p></TEI>")).await;

        assert!(matches!(result, Err(ApplicationError::MalformedDocument { .. })));
        assert_eq!(container.document_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_index_covers_existing_and_later_documents() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        container
            .put_document(doc("a.xml", r#"<TEI xml:id="A"><person xml:id="P1"/></TEI>"#))
            .await
            .unwrap();

        container.add_index(&person()).await.unwrap();
        container
            .put_document(doc("b.xml", r#"<TEI xml:id="B"><person xml:id="P1"/></TEI>"#))
            .await
            .unwrap();

        let hits = container.lookup(&person().path, "P1").await.unwrap();
        let hits: Vec<&str> = hits.iter().map(|n| n.as_str()).collect();
        assert_eq!(hits, vec!["a.xml", "b.xml"]);
        assert!(container.lookup(&person().path, "P2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_index_rejects_conflicting_document() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        container.add_index(&unique_tei()).await.unwrap();
        container
            .put_document(doc("a.xml", r#"<TEI xml:id="A"/>"#))
            .await
            .unwrap();

        let result = container
            .put_document(doc("b.xml", r#"<TEI xml:id="A"/>"#))
            .await;

        assert!(matches!(
            result,
            Err(ApplicationError::UniqueConstraintViolation { ref value, .. }) if value == "A"
        ));
        assert_eq!(container.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unique_index_cannot_be_added_over_duplicates() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        container.put_document(doc("a.xml", r#"<TEI xml:id="A"/>"#)).await.unwrap();
        container.put_document(doc("b.xml", r#"<TEI xml:id="A"/>"#)).await.unwrap();

        let result = container.add_index(&unique_tei()).await;

        assert!(matches!(result, Err(ApplicationError::UniqueConstraintViolation { .. })));
        assert!(container.indexes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_index_twice_is_an_error() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;
        container.add_index(&person()).await.unwrap();

        let result = container.add_index(&person()).await;

        assert!(matches!(result, Err(ApplicationError::IndexAlreadyExists { .. })));
        assert_eq!(container.indexes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookup_without_index_fails() {
        let dir = TempDir::new().unwrap();
        let container = new_container(&dir).await;

        let result = container.lookup(&person().path, "P1").await;

        assert!(matches!(result, Err(ApplicationError::IndexNotFound { .. })));
    }

    #[tokio::test]
    async fn reopen_restores_documents_and_indexes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("names.dbxml");
        {
            let container = FileContainer::create(&path).await.unwrap();
            container
                .put_document(doc("n.xml", r#"<TEI xml:id="N"><person xml:id="P7"/></TEI>"#))
                .await
                .unwrap();
            container.add_index(&unique_tei()).await.unwrap();
            // Rejected documents never reach the journal
            let _ = container.put_document(doc("n.xml", "<TEI/>")).await;
            let _ = container.put_document(doc("m.xml", "<oops>")).await;
        }

        let reopened = FileContainer::open(&path).await.unwrap();

        assert_eq!(reopened.name(), "names.dbxml");
        assert_eq!(
            reopened.document_names().await.unwrap(),
            vec![DocumentName::new("n.xml").unwrap()]
        );
        assert_eq!(reopened.indexes().await.unwrap(), vec![unique_tei()]);
        assert_eq!(
            reopened.lookup(&unique_tei().path, "N").await.unwrap(),
            vec![DocumentName::new("n.xml").unwrap()]
        );
        let stored = reopened
            .get_document(&DocumentName::new("n.xml").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.content().contains("P7"));
    }

    #[tokio::test]
    async fn open_missing_container_fails() {
        let dir = TempDir::new().unwrap();
        let result = FileContainer::open(&dir.path().join("nope.dbxml")).await;
        assert!(matches!(result, Err(ApplicationError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn open_rejects_file_without_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.dbxml");
        std::fs::write(
            &path,
            "{\"op\":\"index\",\"definition\":{\"namespace\":\"tei\",\"path\":{\"element\":\"a\",\"attribute\":\"id\"},\"index_type\":{\"unique\":false}}}\n",
        )
        .unwrap();

        let result = FileContainer::open(&path).await;

        assert!(matches!(result, Err(ApplicationError::CorruptContainer { .. })));
    }
}
