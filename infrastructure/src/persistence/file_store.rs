use super::file_container::FileContainer;
use application::{ApplicationError, Container, DocumentStore};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Store-wide settings, fixed when the store is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Allow documents to be read from local files outside any container.
    pub allow_external_access: bool,
}

/// Document store whose containers are journal files on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentStore {
    options: StoreOptions,
}

impl FileDocumentStore {
    pub fn new(options: StoreOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    #[instrument(skip(self))]
    async fn create_container(&self, path: &Path) -> Result<Arc<dyn Container>, ApplicationError> {
        let container = FileContainer::create(path).await?;
        Ok(Arc::new(container))
    }

    #[instrument(skip(self))]
    async fn open_container(&self, path: &Path) -> Result<Arc<dyn Container>, ApplicationError> {
        let container = FileContainer::open(path).await?;
        Ok(Arc::new(container))
    }

    #[instrument(skip(self))]
    async fn open_input(&self, path: &Path) -> Result<Vec<u8>, ApplicationError> {
        if !self.options.allow_external_access {
            warn!("Refusing to read local file: external access is disabled");
            return Err(ApplicationError::ExternalAccessDenied(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApplicationError::io(path, e))?;
        debug!(bytes = bytes.len(), "Input read");
        Ok(bytes)
    }
}
