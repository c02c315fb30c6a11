use crate::config::UploadConfig;
use crate::media_store::{FileRecord, MediaStore};
use crate::object_store::{ObjectStore, UploadError};
use crate::thumbnail::{make_thumbnail, ThumbnailError};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// An upload as received from the client, before any processing
#[derive(Debug)]
pub struct ReceivedUpload {
    /// Original file name as submitted
    pub file_name: String,
    /// Raw upload bytes
    pub bytes: Vec<u8>,
}

/// Remote object operations the pipeline depends on
#[async_trait]
pub trait ObjectSink: Send + Sync {
    fn generate_key(&self, extension: &str) -> String;
    async fn put_file(&self, path: &Path, key: &str) -> Result<String, UploadError>;
    async fn put_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String, UploadError>;
    async fn delete(&self, key: &str) -> Result<(), UploadError>;
}

#[async_trait]
impl ObjectSink for ObjectStore {
    fn generate_key(&self, extension: &str) -> String {
        ObjectStore::generate_key(self, extension)
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<String, UploadError> {
        ObjectStore::put_file(self, path, key).await
    }

    async fn put_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String, UploadError> {
        ObjectStore::put_bytes(self, bytes, key).await
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        ObjectStore::delete(self, key).await
    }
}

/// Metadata persistence the pipeline depends on
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn insert_file(
        &self,
        file_uri: &str,
        thumbnail_uri: &str,
    ) -> Result<FileRecord, sqlx::Error>;
}

#[async_trait]
impl MediaSink for MediaStore {
    async fn insert_file(
        &self,
        file_uri: &str,
        thumbnail_uri: &str,
    ) -> Result<FileRecord, sqlx::Error> {
        MediaStore::insert_file(self, file_uri, thumbnail_uri).await
    }
}

/// Stages of the ingestion state machine. Linear, no back-edges; an abort is
/// reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Validated,
    Staged,
    RemoteUploaded,
    ThumbnailBuilt,
    ThumbnailUploaded,
    Persisted,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Received => "received",
            IngestStage::Validated => "validated",
            IngestStage::Staged => "staged",
            IngestStage::RemoteUploaded => "remote_uploaded",
            IngestStage::ThumbnailBuilt => "thumbnail_built",
            IngestStage::ThumbnailUploaded => "thumbnail_uploaded",
            IngestStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Ingestion failure. The variant identifies the transition that aborted.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid file type, only jpeg, jpg, png allowed")]
    UnsupportedExtension,
    #[error("file exceeds the maximum upload size")]
    TooLarge,
    #[error("failed to stage upload locally")]
    Stage(#[source] std::io::Error),
    #[error("failed to upload file to object store")]
    UploadOriginal(#[source] UploadError),
    #[error("failed to derive thumbnail")]
    Transform(#[source] ThumbnailError),
    #[error("failed to upload thumbnail to object store")]
    UploadThumbnail(#[source] UploadError),
    #[error("failed to persist media record")]
    Persist(#[source] sqlx::Error),
}

impl IngestError {
    /// Whether the failure is the client's fault (bad input, never retried)
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::UnsupportedExtension | IngestError::TooLarge)
    }

    /// The last stage the pipeline completed before aborting
    pub fn aborted_from(&self) -> IngestStage {
        match self {
            IngestError::UnsupportedExtension | IngestError::TooLarge => IngestStage::Received,
            IngestError::Stage(_) => IngestStage::Validated,
            IngestError::UploadOriginal(_) => IngestStage::Staged,
            IngestError::Transform(_) => IngestStage::RemoteUploaded,
            IngestError::UploadThumbnail(_) => IngestStage::ThumbnailBuilt,
            IngestError::Persist(_) => IngestStage::ThumbnailUploaded,
        }
    }
}

/// Validate an upload before any I/O happens.
///
/// Returns the normalized (lowercase) extension on success.
pub fn validate_upload(
    config: &UploadConfig,
    upload: &ReceivedUpload,
) -> Result<String, IngestError> {
    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or(IngestError::UnsupportedExtension)?;

    if !config.allowed_extensions.iter().any(|e| *e == extension) {
        return Err(IngestError::UnsupportedExtension);
    }

    if upload.bytes.len() > config.max_size_bytes {
        return Err(IngestError::TooLarge);
    }

    Ok(extension)
}

/// Sequences a single upload through validation, local staging, remote
/// uploads, thumbnail derivation and metadata persistence as one logical
/// unit of work.
pub struct IngestPipeline {
    object_store: Arc<dyn ObjectSink>,
    media_store: Arc<dyn MediaSink>,
    config: UploadConfig,
}

impl IngestPipeline {
    pub fn new(
        object_store: Arc<dyn ObjectSink>,
        media_store: Arc<dyn MediaSink>,
        config: UploadConfig,
    ) -> Self {
        Self {
            object_store,
            media_store,
            config,
        }
    }

    /// Run the ingestion state machine for one upload.
    ///
    /// On success returns the persisted record with both public URLs. On
    /// abort, already-uploaded remote objects are deleted best-effort and the
    /// local scratch file is removed on every terminal path.
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size_bytes = upload.bytes.len()))]
    pub async fn ingest(&self, upload: ReceivedUpload) -> Result<FileRecord, IngestError> {
        let result = self.run(&upload).await;

        match &result {
            Ok(record) => {
                info!(
                    stage = %IngestStage::Persisted,
                    file_id = record.id,
                    "Ingestion completed"
                );
                metrics::counter!("ingest.completed").increment(1);
                metrics::counter!("ingest.bytes_uploaded").increment(upload.bytes.len() as u64);
            }
            Err(e) => {
                metrics::counter!("ingest.aborted").increment(1);
                warn!(stage = %e.aborted_from(), error = %e, "Ingestion aborted");
            }
        }

        result
    }

    async fn run(&self, upload: &ReceivedUpload) -> Result<FileRecord, IngestError> {
        // Received -> Validated, before any I/O.
        let extension = validate_upload(&self.config, upload)?;
        debug!(stage = %IngestStage::Validated, "Upload validated");

        // Validated -> Staged: write the bytes to local scratch.
        let original_key = self.object_store.generate_key(&extension);
        let scratch_path = self.stage(&upload.bytes, &original_key).await?;
        debug!(stage = %IngestStage::Staged, path = %scratch_path.display(), "Upload staged");

        let result = self
            .run_remote(&upload.bytes, &scratch_path, &original_key)
            .await;

        // The scratch file is removed on success and abort alike.
        if let Err(e) = tokio::fs::remove_file(&scratch_path).await {
            warn!(
                error = %e,
                path = %scratch_path.display(),
                "Failed to remove scratch file"
            );
        }

        result
    }

    async fn stage(&self, bytes: &[u8], key: &str) -> Result<PathBuf, IngestError> {
        let dir = PathBuf::from(&self.config.scratch_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(IngestError::Stage)?;

        let path = dir.join(key);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            // A partially written file must not linger.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(IngestError::Stage(e));
        }

        Ok(path)
    }

    /// Remote stages of the state machine, with compensation: when a later
    /// transition aborts, objects uploaded by earlier transitions are deleted
    /// so no orphan outlives the request without a database row.
    async fn run_remote(
        &self,
        bytes: &[u8],
        scratch_path: &Path,
        original_key: &str,
    ) -> Result<FileRecord, IngestError> {
        let mut uploaded_keys: Vec<String> = Vec::new();

        let result = self
            .advance(bytes, scratch_path, original_key, &mut uploaded_keys)
            .await;

        if result.is_err() {
            self.compensate(&uploaded_keys).await;
        }

        result
    }

    async fn advance(
        &self,
        bytes: &[u8],
        scratch_path: &Path,
        original_key: &str,
        uploaded_keys: &mut Vec<String>,
    ) -> Result<FileRecord, IngestError> {
        // Staged -> RemoteUploaded: stream the staged file to the store.
        let file_uri = self
            .object_store
            .put_file(scratch_path, original_key)
            .await
            .map_err(IngestError::UploadOriginal)?;
        uploaded_keys.push(original_key.to_string());
        debug!(stage = %IngestStage::RemoteUploaded, uri = %file_uri, "Original uploaded");

        // RemoteUploaded -> ThumbnailBuilt.
        let thumbnail = make_thumbnail(bytes).map_err(IngestError::Transform)?;
        debug!(stage = %IngestStage::ThumbnailBuilt, size_bytes = thumbnail.len(), "Thumbnail built");

        // ThumbnailBuilt -> ThumbnailUploaded, under a fresh key.
        let thumbnail_key = self.object_store.generate_key("jpg");
        let thumbnail_uri = self
            .object_store
            .put_bytes(thumbnail, &thumbnail_key)
            .await
            .map_err(IngestError::UploadThumbnail)?;
        uploaded_keys.push(thumbnail_key);
        debug!(stage = %IngestStage::ThumbnailUploaded, uri = %thumbnail_uri, "Thumbnail uploaded");

        // ThumbnailUploaded -> Persisted.
        self.media_store
            .insert_file(&file_uri, &thumbnail_uri)
            .await
            .map_err(IngestError::Persist)
    }

    /// Best-effort deletion of already-uploaded objects after an abort
    async fn compensate(&self, uploaded_keys: &[String]) {
        for key in uploaded_keys {
            if let Err(e) = self.object_store.delete(key).await {
                warn!(
                    error = %e,
                    key = %key,
                    "Failed to delete orphaned object during compensation"
                );
                metrics::counter!("ingest.compensation_failures").increment(1);
            }
        }
    }
}
