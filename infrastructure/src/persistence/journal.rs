use application::ApplicationError;
use domain::{IndexDefinition, XmlDocument};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

pub(crate) const FORMAT_VERSION: u32 = 1;

/// One line of a container file. Records are replayed in order on open.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalRecord<'a> {
    Created { format: u32, container: String },
    Document { document: Cow<'a, XmlDocument> },
    Index { definition: Cow<'a, IndexDefinition> },
}

/// Append-only JSON Lines file backing a container.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Creates the file and writes its header record. Fails if the file exists.
    #[instrument]
    pub(crate) async fn create(path: &Path, container: &str) -> Result<Self, ApplicationError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ApplicationError::ContainerAlreadyExists(path.to_path_buf()),
                _ => ApplicationError::io(path, e),
            })?;
        let mut journal = Self {
            path: path.to_path_buf(),
            file,
        };
        journal
            .append(&JournalRecord::Created {
                format: FORMAT_VERSION,
                container: container.to_string(),
            })
            .await?;
        Ok(journal)
    }

    /// Reads every record and reopens the file for appending.
    #[instrument]
    pub(crate) async fn open(
        path: &Path,
    ) -> Result<(Self, Vec<JournalRecord<'static>>), ApplicationError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ApplicationError::ContainerNotFound(path.to_path_buf()),
                ErrorKind::InvalidData => ApplicationError::CorruptContainer {
                    path: path.to_path_buf(),
                    reason: "file is not valid UTF-8".to_string(),
                },
                _ => ApplicationError::io(path, e),
            })?;

        let mut records = Vec::new();
        for (line_number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord<'static> =
                serde_json::from_str(line).map_err(|e| ApplicationError::CorruptContainer {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {}", line_number + 1, e),
                })?;
            records.push(record);
        }
        debug!(records = records.len(), "Journal read");

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| ApplicationError::io(path, e))?;
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            records,
        ))
    }

    /// Writes one record and flushes it before returning.
    pub(crate) async fn append(&mut self, record: &JournalRecord<'_>) -> Result<(), ApplicationError> {
        let mut line = serde_json::to_string(record).map_err(|e| {
            ApplicationError::io(&self.path, std::io::Error::new(ErrorKind::InvalidData, e))
        })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ApplicationError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| ApplicationError::io(&self.path, e))
    }
}
